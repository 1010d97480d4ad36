//! Park-level state: finances, rides, research and rating.

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

use crate::checksum::StateHash;
use crate::fixed::{Money, Ticks, money};
use crate::id::{Coords3, RideId};

/// Maximum number of rides a park may hold.
pub const MAX_RIDES: usize = 255;

/// Highest entrance fee a park may charge.
pub const MAX_ENTRANCE_FEE: Money = money(200);

// ---------------------------------------------------------------------------
// Finance
// ---------------------------------------------------------------------------

/// Ledger category for money spent or earned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ExpenditureType {
    #[default]
    None = 0,
    RideConstruction = 1,
    RideRunningCosts = 2,
    LandPurchase = 3,
    Landscaping = 4,
    ParkEntranceTickets = 5,
    RideTickets = 6,
    Wages = 7,
    Research = 8,
    Marketing = 9,
}

impl ExpenditureType {
    pub const COUNT: usize = 10;
}

/// Running totals per expenditure category. Positive values are spending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenditureLedger {
    totals: [Money; ExpenditureType::COUNT],
}

impl ExpenditureLedger {
    pub fn record(&mut self, kind: ExpenditureType, amount: Money) {
        self.totals[kind as usize] += amount;
    }

    pub fn total(&self, kind: ExpenditureType) -> Money {
        self.totals[kind as usize]
    }

    fn hash_into(&self, hash: &mut StateHash) {
        for t in &self.totals {
            hash.write_i64(*t);
        }
    }
}

// ---------------------------------------------------------------------------
// Rides
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RideKind {
    #[default]
    Coaster = 0,
    FlatRide = 1,
    Shop = 2,
    Transport = 3,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RideStatus {
    #[default]
    Closed = 0,
    Open = 1,
    Broken = 2,
}

/// One placed piece of ride track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackPiece {
    pub position: Coords3,
    pub piece_type: u8,
    pub direction: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ride {
    pub name: String,
    pub kind: RideKind,
    pub status: RideStatus,
    pub track: Vec<TrackPiece>,
    pub price: Money,
    pub customers: u32,
    pub income: Money,
    /// 0..=100. Breakdown chance grows as reliability falls.
    pub reliability: u8,
    pub last_breakdown_tick: Ticks,
}

impl Ride {
    pub fn new(name: impl Into<String>, kind: RideKind) -> Self {
        Self {
            name: name.into(),
            kind,
            status: RideStatus::Closed,
            track: Vec::new(),
            price: money(2),
            customers: 0,
            income: 0,
            reliability: 100,
            last_breakdown_tick: 0,
        }
    }

    pub fn track_at(&self, position: Coords3) -> Option<usize> {
        self.track.iter().position(|p| p.position == position)
    }

    /// Construction value of the built track, used for refunds.
    pub fn track_value(&self) -> Money {
        self.track.len() as Money * TRACK_PIECE_COST
    }

    fn hash_into(&self, hash: &mut StateHash) {
        hash.write_str(&self.name);
        hash.write_u8(self.kind as u8);
        hash.write_u8(self.status as u8);
        hash.write_u32(self.track.len() as u32);
        for piece in &self.track {
            hash.write_i32(piece.position.x);
            hash.write_i32(piece.position.y);
            hash.write_i32(piece.position.z);
            hash.write_u8(piece.piece_type);
            hash.write_u8(piece.direction);
        }
        hash.write_i64(self.price);
        hash.write_u32(self.customers);
        hash.write_i64(self.income);
        hash.write_u8(self.reliability);
        hash.write_u32(self.last_breakdown_tick);
    }
}

/// Cost of one piece of track.
pub const TRACK_PIECE_COST: Money = money(25);

/// Positional ride storage.
///
/// A new ride takes the lowest free index. The choice depends only on which
/// slots are occupied, so a park restored from an image hands out the same
/// ids as the park it was exported from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideTable {
    slots: Vec<Option<Ride>>,
}

impl RideTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `ride` in the lowest free slot. Callers enforce [`MAX_RIDES`].
    pub fn insert(&mut self, ride: Ride) -> RideId {
        match self.slots.iter().position(Option::is_none) {
            Some(index) => {
                self.slots[index] = Some(ride);
                RideId(index as u16)
            }
            None => {
                self.slots.push(Some(ride));
                RideId((self.slots.len() - 1) as u16)
            }
        }
    }

    pub fn remove(&mut self, id: RideId) -> Option<Ride> {
        let ride = self.slots.get_mut(id.index())?.take();
        while self.slots.last().is_some_and(Option::is_none) {
            self.slots.pop();
        }
        ride
    }

    pub fn get(&self, id: RideId) -> Option<&Ride> {
        self.slots.get(id.index())?.as_ref()
    }

    pub fn get_mut(&mut self, id: RideId) -> Option<&mut Ride> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    pub fn contains_key(&self, id: RideId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (RideId, &Ride)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|r| (RideId(i as u16), r)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RideId, &mut Ride)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|r| (RideId(i as u16), r)))
    }

    pub fn keys(&self) -> impl Iterator<Item = RideId> + '_ {
        self.iter().map(|(id, _)| id)
    }

    pub fn values(&self) -> impl Iterator<Item = &Ride> {
        self.slots.iter().flatten()
    }
}

impl Index<RideId> for RideTable {
    type Output = Ride;

    fn index(&self, id: RideId) -> &Ride {
        match self.get(id) {
            Some(ride) => ride,
            None => panic!("no ride at {id:?}"),
        }
    }
}

impl IndexMut<RideId> for RideTable {
    fn index_mut(&mut self, id: RideId) -> &mut Ride {
        match self.get_mut(id) {
            Some(ride) => ride,
            None => panic!("no ride at {id:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Park
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Park {
    pub name: String,
    pub cash: Money,
    pub loan: Money,
    pub entrance_fee: Money,
    /// 0..=999.
    pub rating: u16,
    pub is_open: bool,
    pub rides: RideTable,
    pub guests_in_park: u32,
    pub next_guest_id: u32,
    pub research_funding: u8,
    pub research_progress: u16,
    pub research_items_completed: u16,
    pub expenditure: ExpenditureLedger,
}

impl Default for Park {
    fn default() -> Self {
        Self {
            name: String::from("Unnamed Park"),
            cash: money(10_000),
            loan: money(10_000),
            entrance_fee: money(10),
            rating: 500,
            is_open: true,
            rides: RideTable::new(),
            guests_in_park: 0,
            next_guest_id: 1,
            research_funding: 2,
            research_progress: 0,
            research_items_completed: 0,
            expenditure: ExpenditureLedger::default(),
        }
    }
}

impl Park {
    /// Apply a cost (positive) or income (negative) to cash and the ledger.
    pub fn spend(&mut self, kind: ExpenditureType, amount: Money) {
        self.cash -= amount;
        self.expenditure.record(kind, amount);
    }

    pub fn parameters(&self) -> ParkParameters {
        ParkParameters {
            name: self.name.clone(),
            cash: self.cash,
            loan: self.loan,
            entrance_fee: self.entrance_fee,
            rating: self.rating,
            is_open: self.is_open,
            guests_in_park: self.guests_in_park,
            research_funding: self.research_funding,
            research_progress: self.research_progress,
            ride_count: self.rides.len() as u32,
        }
    }

    pub(crate) fn hash_into(&self, hash: &mut StateHash) {
        hash.write_str(&self.name);
        hash.write_i64(self.cash);
        hash.write_i64(self.loan);
        hash.write_i64(self.entrance_fee);
        hash.write_u16(self.rating);
        hash.write_u8(self.is_open as u8);
        hash.write_u32(self.rides.len() as u32);
        for (id, ride) in self.rides.iter() {
            hash.write_u16(id.0);
            ride.hash_into(hash);
        }
        hash.write_u32(self.guests_in_park);
        hash.write_u32(self.next_guest_id);
        hash.write_u8(self.research_funding);
        hash.write_u16(self.research_progress);
        hash.write_u16(self.research_items_completed);
        self.expenditure.hash_into(hash);
    }
}

// ---------------------------------------------------------------------------
// Park parameters
// ---------------------------------------------------------------------------

/// Scalar park settings recorded alongside snapshots and replays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkParameters {
    pub name: String,
    pub cash: Money,
    pub loan: Money,
    pub entrance_fee: Money,
    pub rating: u16,
    pub is_open: bool,
    pub guests_in_park: u32,
    pub research_funding: u8,
    pub research_progress: u16,
    pub ride_count: u32,
}

/// A single differing park parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDiff {
    pub name: &'static str,
    pub before: String,
    pub after: String,
}

impl ParkParameters {
    /// Write the settings (not the derived counters) back into a park.
    pub fn apply(&self, park: &mut Park) {
        park.name.clone_from(&self.name);
        park.loan = self.loan;
        park.entrance_fee = self.entrance_fee;
        park.is_open = self.is_open;
        park.research_funding = self.research_funding;
    }

    fn fields(&self) -> [(&'static str, String); 10] {
        [
            ("name", self.name.clone()),
            ("cash", self.cash.to_string()),
            ("loan", self.loan.to_string()),
            ("entrance_fee", self.entrance_fee.to_string()),
            ("rating", self.rating.to_string()),
            ("is_open", self.is_open.to_string()),
            ("guests_in_park", self.guests_in_park.to_string()),
            ("research_funding", self.research_funding.to_string()),
            ("research_progress", self.research_progress.to_string()),
            ("ride_count", self.ride_count.to_string()),
        ]
    }

    /// Every parameter that differs between `self` and `other`.
    pub fn diff(&self, other: &ParkParameters) -> Vec<ParameterDiff> {
        self.fields()
            .into_iter()
            .zip(other.fields())
            .filter(|((_, a), (_, b))| a != b)
            .map(|((name, before), (_, after))| ParameterDiff {
                name,
                before,
                after,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spend_updates_cash_and_ledger() {
        let mut park = Park::default();
        let start = park.cash;
        park.spend(ExpenditureType::RideConstruction, money(50));
        park.spend(ExpenditureType::RideTickets, -money(3));
        assert_eq!(park.cash, start - money(47));
        assert_eq!(park.expenditure.total(ExpenditureType::RideConstruction), money(50));
        assert_eq!(park.expenditure.total(ExpenditureType::RideTickets), -money(3));
    }

    #[test]
    fn parameter_diff_reports_changed_fields_only() {
        let mut park = Park::default();
        let before = park.parameters();
        park.entrance_fee = money(25);
        park.name = String::from("Forest Frontiers");
        let after = park.parameters();

        let diff = before.diff(&after);
        let names: Vec<_> = diff.iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["name", "entrance_fee"]);
        assert_eq!(diff[1].after, money(25).to_string());
        assert!(before.diff(&before).is_empty());
    }

    #[test]
    fn apply_restores_settings() {
        let mut park = Park::default();
        let params = ParkParameters {
            name: String::from("Dinky Park"),
            entrance_fee: money(5),
            is_open: false,
            ..park.parameters()
        };
        params.apply(&mut park);
        assert_eq!(park.name, "Dinky Park");
        assert_eq!(park.entrance_fee, money(5));
        assert!(!park.is_open);
    }

    #[test]
    fn freed_ride_slots_are_reused_lowest_first() {
        let mut rides = RideTable::new();
        let a = rides.insert(Ride::new("A", RideKind::Coaster));
        let b = rides.insert(Ride::new("B", RideKind::FlatRide));
        let c = rides.insert(Ride::new("C", RideKind::Shop));
        assert_eq!((a, b, c), (RideId(0), RideId(1), RideId(2)));

        rides.remove(b);
        rides.remove(a);
        assert_eq!(rides.len(), 1);
        assert_eq!(rides.insert(Ride::new("D", RideKind::Coaster)), RideId(0));
        assert_eq!(rides.insert(Ride::new("E", RideKind::Coaster)), RideId(1));
        assert_eq!(rides.keys().collect::<Vec<_>>(), vec![RideId(0), RideId(1), RideId(2)]);
    }

    #[test]
    fn removing_the_last_ride_trims_the_table() {
        let mut rides = RideTable::new();
        let a = rides.insert(Ride::new("A", RideKind::Coaster));
        let b = rides.insert(Ride::new("B", RideKind::Coaster));
        assert!(rides.remove(b).is_some());
        assert!(rides.remove(b).is_none());
        assert!(rides.remove(a).is_some());
        assert!(rides.is_empty());
        assert_eq!(rides, RideTable::new());
    }

    #[test]
    fn ride_hash_covers_track() {
        let mut a = Ride::new("Coaster 1", RideKind::Coaster);
        let b = a.clone();
        a.track.push(TrackPiece {
            position: Coords3::new(32, 32, 16),
            piece_type: 0,
            direction: 0,
        });
        let mut ha = StateHash::new();
        let mut hb = StateHash::new();
        a.hash_into(&mut ha);
        b.hash_into(&mut hb);
        assert_ne!(ha.finish(), hb.finish());
        assert_eq!(a.track_value(), TRACK_PIECE_COST);
    }
}
