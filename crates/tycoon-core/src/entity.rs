//! The entity table: a fixed-capacity, positionally indexed pool of
//! guests, staff, vehicles, litter and miscellaneous effects.
//!
//! Every entity can be rendered into a fixed-layout little-endian byte image.
//! The layout of each kind is described by a field descriptor table derived
//! from the same writer that produces the image, so snapshot diffs and
//! checksums always agree on what a field is and where it lives.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::checksum::StateHash;
use crate::fixed::{Fixed64, Money, fixed64_bits};
use crate::id::{Coords3, EntityId, RideId};

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// Discriminator stored alongside every entity image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntityKind {
    Guest = 0,
    Staff = 1,
    Vehicle = 2,
    Litter = 3,
    Misc = 4,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Guest,
        EntityKind::Staff,
        EntityKind::Vehicle,
        EntityKind::Litter,
        EntityKind::Misc,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Guest => "guest",
            EntityKind::Staff => "staff",
            EntityKind::Vehicle => "vehicle",
            EntityKind::Litter => "litter",
            EntityKind::Misc => "misc",
        }
    }

    /// Field layout of this kind's byte image.
    pub fn descriptors(self) -> Vec<FieldDescriptor> {
        let prototype = match self {
            EntityKind::Guest => Entity::Guest(Guest::default()),
            EntityKind::Staff => Entity::Staff(Staff::default()),
            EntityKind::Vehicle => Entity::Vehicle(Vehicle::default()),
            EntityKind::Litter => Entity::Litter(Litter::default()),
            EntityKind::Misc => Entity::Misc(MiscEntity::default()),
        };
        let mut writer = ImageWriter::new();
        prototype.write_image(&mut writer);
        writer.fields
    }
}

// ---------------------------------------------------------------------------
// Shared base
// ---------------------------------------------------------------------------

/// Screen-space bounds used only by the renderer. Never part of simulation
/// state; excluded from checksums and snapshot comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteBounds {
    pub width: u8,
    pub height_negative: u8,
    pub height_positive: u8,
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityBase {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub direction: u8,
    pub sprite: SpriteBounds,
}

impl EntityBase {
    pub fn at(x: i32, y: i32, z: i32) -> Self {
        let mut base = Self {
            x,
            y,
            z,
            ..Self::default()
        };
        base.invalidate_sprite();
        base
    }

    pub fn position(&self) -> Coords3 {
        Coords3::new(self.x, self.y, self.z)
    }

    pub fn move_to(&mut self, x: i32, y: i32, z: i32) {
        self.x = x;
        self.y = y;
        self.z = z;
        self.invalidate_sprite();
    }

    /// Recompute the screen-space bounding box from the world position.
    pub fn invalidate_sprite(&mut self) {
        let screen_x = self.y - self.x;
        let screen_y = ((self.x + self.y) / 2) - self.z;
        let half = self.sprite.width.max(8) as i32;
        self.sprite.width = half as u8;
        self.sprite.height_negative = self.sprite.height_negative.max(16);
        self.sprite.height_positive = self.sprite.height_positive.max(8);
        self.sprite.left = screen_x - half;
        self.sprite.right = screen_x + half;
        self.sprite.top = screen_y - self.sprite.height_negative as i32;
        self.sprite.bottom = screen_y + self.sprite.height_positive as i32;
    }

    fn write_image(&self, w: &mut ImageWriter) {
        w.put_signed("x", self.x.to_le_bytes());
        w.put_signed("y", self.y.to_le_bytes());
        w.put_signed("z", self.z.to_le_bytes());
        w.put("direction", [self.direction]);
        w.put_render("sprite_width", [self.sprite.width]);
        w.put_render("sprite_height_negative", [self.sprite.height_negative]);
        w.put_render("sprite_height_positive", [self.sprite.height_positive]);
        w.put_render_signed("sprite_left", self.sprite.left.to_le_bytes());
        w.put_render_signed("sprite_top", self.sprite.top.to_le_bytes());
        w.put_render_signed("sprite_right", self.sprite.right.to_le_bytes());
        w.put_render_signed("sprite_bottom", self.sprite.bottom.to_le_bytes());
    }
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum GuestState {
    #[default]
    Walking = 0,
    OnRide = 1,
    Leaving = 2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guest {
    pub base: EntityBase,
    pub guest_id: u32,
    pub name: Option<String>,
    pub state: GuestState,
    pub energy: Fixed64,
    pub happiness: u8,
    pub cash: Money,
    pub ride: Option<RideId>,
    pub ticks_in_park: u32,
}

impl Default for Guest {
    fn default() -> Self {
        Self {
            base: EntityBase::default(),
            guest_id: 0,
            name: None,
            state: GuestState::Walking,
            energy: Fixed64::from_num(1),
            happiness: 128,
            cash: 0,
            ride: None,
            ticks_in_park: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum StaffType {
    #[default]
    Handyman = 0,
    Mechanic = 1,
    Security = 2,
    Entertainer = 3,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Staff {
    pub base: EntityBase,
    pub staff_id: u32,
    pub staff_type: StaffType,
    pub litter_swept: u32,
    pub rides_fixed: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum VehicleStatus {
    #[default]
    Waiting = 0,
    Travelling = 1,
    Stopped = 2,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub base: EntityBase,
    pub ride: RideId,
    pub track_progress: u32,
    pub velocity: Fixed64,
    pub acceleration: Fixed64,
    pub num_peeps: u8,
    pub status: VehicleStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LitterType {
    #[default]
    Vomit = 0,
    EmptyCan = 1,
    Rubbish = 2,
    EmptyBurgerBox = 3,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Litter {
    pub base: EntityBase,
    pub litter_type: LitterType,
    pub creation_tick: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MiscKind {
    #[default]
    Balloon = 0,
    Duck = 1,
    MoneyEffect = 2,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MiscEntity {
    pub base: EntityBase,
    pub kind: MiscKind,
    pub frame: u16,
    pub lifetime: u16,
    pub value: Money,
}

/// A simulation entity. The table stores these positionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entity {
    Guest(Guest),
    Staff(Staff),
    Vehicle(Vehicle),
    Litter(Litter),
    Misc(MiscEntity),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Guest(_) => EntityKind::Guest,
            Entity::Staff(_) => EntityKind::Staff,
            Entity::Vehicle(_) => EntityKind::Vehicle,
            Entity::Litter(_) => EntityKind::Litter,
            Entity::Misc(_) => EntityKind::Misc,
        }
    }

    pub fn base(&self) -> &EntityBase {
        match self {
            Entity::Guest(e) => &e.base,
            Entity::Staff(e) => &e.base,
            Entity::Vehicle(e) => &e.base,
            Entity::Litter(e) => &e.base,
            Entity::Misc(e) => &e.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut EntityBase {
        match self {
            Entity::Guest(e) => &mut e.base,
            Entity::Staff(e) => &mut e.base,
            Entity::Vehicle(e) => &mut e.base,
            Entity::Litter(e) => &mut e.base,
            Entity::Misc(e) => &mut e.base,
        }
    }

    pub fn as_guest(&self) -> Option<&Guest> {
        match self {
            Entity::Guest(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_guest_mut(&mut self) -> Option<&mut Guest> {
        match self {
            Entity::Guest(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_vehicle(&self) -> Option<&Vehicle> {
        match self {
            Entity::Vehicle(v) => Some(v),
            _ => None,
        }
    }

    /// Render this entity's fixed-layout byte image.
    pub fn image(&self) -> Vec<u8> {
        let mut writer = ImageWriter::new();
        self.write_image(&mut writer);
        writer.bytes
    }

    fn write_image(&self, w: &mut ImageWriter) {
        self.base().write_image(w);
        match self {
            Entity::Guest(g) => {
                w.put("guest_id", g.guest_id.to_le_bytes());
                w.put("name_hash", name_hash(g.name.as_deref()).to_le_bytes());
                w.put("state", [g.state as u8]);
                w.put_signed("energy", fixed64_bits(g.energy).to_le_bytes());
                w.put("happiness", [g.happiness]);
                w.put_signed("cash", g.cash.to_le_bytes());
                w.put("ride", ride_bits(g.ride).to_le_bytes());
                w.put("ticks_in_park", g.ticks_in_park.to_le_bytes());
            }
            Entity::Staff(s) => {
                w.put("staff_id", s.staff_id.to_le_bytes());
                w.put("staff_type", [s.staff_type as u8]);
                w.put("litter_swept", s.litter_swept.to_le_bytes());
                w.put("rides_fixed", s.rides_fixed.to_le_bytes());
            }
            Entity::Vehicle(v) => {
                w.put("ride", ride_bits(Some(v.ride)).to_le_bytes());
                w.put("track_progress", v.track_progress.to_le_bytes());
                w.put_signed("velocity", fixed64_bits(v.velocity).to_le_bytes());
                w.put_signed("acceleration", fixed64_bits(v.acceleration).to_le_bytes());
                w.put("num_peeps", [v.num_peeps]);
                w.put("status", [v.status as u8]);
            }
            Entity::Litter(l) => {
                w.put("litter_type", [l.litter_type as u8]);
                w.put("creation_tick", l.creation_tick.to_le_bytes());
            }
            Entity::Misc(m) => {
                w.put("misc_kind", [m.kind as u8]);
                w.put("frame", m.frame.to_le_bytes());
                w.put("lifetime", m.lifetime.to_le_bytes());
                w.put_signed("value", m.value.to_le_bytes());
            }
        }
    }
}

/// 0 for no ride, otherwise the ride index plus one.
fn ride_bits(ride: Option<RideId>) -> u32 {
    ride.map_or(0, |r| u32::from(r.0) + 1)
}

fn name_hash(name: Option<&str>) -> u32 {
    match name {
        Some(name) => {
            let mut h = StateHash::new();
            h.write(name.as_bytes());
            let v = h.finish();
            (v ^ (v >> 32)) as u32
        }
        None => 0,
    }
}

// ---------------------------------------------------------------------------
// Byte images
// ---------------------------------------------------------------------------

/// Location and meaning of one field inside an entity image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
    /// Rendering-only fields are skipped by checksums and comparisons.
    pub render_only: bool,
    /// Two's-complement field, sign-extended when read.
    pub signed: bool,
}

impl FieldDescriptor {
    /// Little-endian value of this field in `image`, widened to i64.
    /// Returns `None` if the image is too short.
    pub fn read(&self, image: &[u8]) -> Option<i64> {
        let width = self.width.min(8);
        let bytes = image.get(self.offset..self.offset + width)?;
        let mut buf = [0u8; 8];
        buf[..width].copy_from_slice(bytes);
        let raw = u64::from_le_bytes(buf);
        let unused = 64 - 8 * width as u32;
        if self.signed && (1..64).contains(&unused) {
            Some(((raw << unused) as i64) >> unused)
        } else {
            Some(raw as i64)
        }
    }
}

/// Appends fields to an image while recording their layout.
#[derive(Debug, Default)]
struct ImageWriter {
    bytes: Vec<u8>,
    fields: Vec<FieldDescriptor>,
}

impl ImageWriter {
    fn new() -> Self {
        Self::default()
    }

    fn push<const N: usize>(&mut self, name: &'static str, bytes: [u8; N], render_only: bool, signed: bool) {
        self.fields.push(FieldDescriptor {
            name,
            offset: self.bytes.len(),
            width: N,
            render_only,
            signed,
        });
        self.bytes.extend_from_slice(&bytes);
    }

    fn put<const N: usize>(&mut self, name: &'static str, bytes: [u8; N]) {
        self.push(name, bytes, false, false);
    }

    fn put_signed<const N: usize>(&mut self, name: &'static str, bytes: [u8; N]) {
        self.push(name, bytes, false, true);
    }

    fn put_render<const N: usize>(&mut self, name: &'static str, bytes: [u8; N]) {
        self.push(name, bytes, true, false);
    }

    fn put_render_signed<const N: usize>(&mut self, name: &'static str, bytes: [u8; N]) {
        self.push(name, bytes, true, true);
    }
}

/// Feed the simulation-relevant bytes of an image into `hash`.
pub fn hash_image(hash: &mut StateHash, descriptors: &[FieldDescriptor], image: &[u8]) {
    for field in descriptors.iter().filter(|f| !f.render_only) {
        if let Some(bytes) = image.get(field.offset..field.offset + field.width) {
            hash.write(bytes);
        }
    }
}

// ---------------------------------------------------------------------------
// EntityTable
// ---------------------------------------------------------------------------

/// Fixed-capacity positional entity pool.
///
/// Allocation always takes the lowest free index, so two simulations that
/// spawn and remove in the same order assign the same ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTable {
    slots: Vec<Option<Entity>>,
    count: usize,
    /// Lowest index that may be free.
    free_hint: usize,
}

impl EntityTable {
    /// Create an empty table. Capacity is clamped to `1..=u16::MAX`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, u16::MAX as usize);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            count: 0,
            free_hint: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.slots.len()
    }

    /// Place an entity in the lowest free slot. Returns `None` when full.
    pub fn spawn(&mut self, entity: Entity) -> Option<EntityId> {
        let index = (self.free_hint..self.slots.len()).find(|&i| self.slots[i].is_none())?;
        self.slots[index] = Some(entity);
        self.count += 1;
        self.free_hint = index + 1;
        Some(EntityId(index as u16))
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let removed = self.slots.get_mut(id.index())?.take()?;
        self.count -= 1;
        self.free_hint = self.free_hint.min(id.index());
        Some(removed)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.slots.get(id.index())?.as_ref()
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    /// Live entities in index order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|e| (EntityId(i as u16), e)))
    }

    /// Ids of live entities of one kind, in index order.
    pub fn ids_of_kind(&self, kind: EntityKind) -> Vec<EntityId> {
        self.iter()
            .filter(|(_, e)| e.kind() == kind)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn count_kind(&self, kind: EntityKind) -> usize {
        self.iter().filter(|(_, e)| e.kind() == kind).count()
    }

    /// Tile key to entity ids, each list in index order.
    pub fn spatial_index(&self) -> BTreeMap<u32, Vec<EntityId>> {
        let mut index: BTreeMap<u32, Vec<EntityId>> = BTreeMap::new();
        for (id, entity) in self.iter() {
            index
                .entry(entity.base().position().tile_key())
                .or_default()
                .push(id);
        }
        index
    }

    /// Hash every live slot (index, kind and simulation fields).
    pub fn hash_into(&self, hash: &mut StateHash) {
        let descriptors: Vec<(EntityKind, Vec<FieldDescriptor>)> = EntityKind::ALL
            .iter()
            .map(|&k| (k, k.descriptors()))
            .collect();
        hash.write_u32(self.count as u32);
        for (id, entity) in self.iter() {
            let kind = entity.kind();
            hash.write_u16(id.0);
            hash.write_u8(kind as u8);
            let fields = &descriptors[kind as usize].1;
            hash_image(hash, fields, &entity.image());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guest_at(x: i32, y: i32) -> Entity {
        Entity::Guest(Guest {
            base: EntityBase::at(x, y, 0),
            ..Guest::default()
        })
    }

    fn litter_at(x: i32, y: i32) -> Entity {
        Entity::Litter(Litter {
            base: EntityBase::at(x, y, 0),
            ..Litter::default()
        })
    }

    #[test]
    fn spawn_takes_lowest_free_index() {
        let mut table = EntityTable::new(8);
        let a = table.spawn(guest_at(0, 0)).unwrap();
        let b = table.spawn(guest_at(32, 0)).unwrap();
        let c = table.spawn(guest_at(64, 0)).unwrap();
        assert_eq!((a, b, c), (EntityId(0), EntityId(1), EntityId(2)));

        table.remove(b);
        assert_eq!(table.spawn(litter_at(0, 0)), Some(EntityId(1)));
        assert_eq!(table.spawn(litter_at(0, 0)), Some(EntityId(3)));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn spawn_fails_when_full() {
        let mut table = EntityTable::new(2);
        assert!(table.spawn(guest_at(0, 0)).is_some());
        assert!(table.spawn(guest_at(0, 0)).is_some());
        assert!(table.is_full());
        assert!(table.spawn(guest_at(0, 0)).is_none());
    }

    #[test]
    fn remove_missing_is_none() {
        let mut table = EntityTable::new(4);
        assert!(table.remove(EntityId(2)).is_none());
        assert!(table.remove(EntityId(900)).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn descriptors_match_image_length() {
        for kind in EntityKind::ALL {
            let fields = kind.descriptors();
            let last = fields.last().unwrap();
            let prototype_len = last.offset + last.width;
            for pair in fields.windows(2) {
                assert_eq!(pair[0].offset + pair[0].width, pair[1].offset);
            }
            assert!(prototype_len > 0, "{kind:?} has an empty image");
        }
    }

    #[test]
    fn image_field_reads_back_value() {
        let entity = guest_at(-96, 320);
        let image = entity.image();
        let fields = EntityKind::Guest.descriptors();
        let x = fields.iter().find(|f| f.name == "x").unwrap();
        let y = fields.iter().find(|f| f.name == "y").unwrap();
        assert_eq!(x.read(&image), Some(-96));
        assert_eq!(y.read(&image), Some(320));

        let ride = fields.iter().find(|f| f.name == "ride").unwrap();
        assert!(!ride.signed);
        assert_eq!(ride.read(&image), Some(0));
        assert_eq!(x.read(&image[..x.offset + 2]), None);
    }

    #[test]
    fn sprite_fields_are_render_only() {
        let fields = EntityKind::Vehicle.descriptors();
        for f in fields.iter().filter(|f| f.name.starts_with("sprite_")) {
            assert!(f.render_only, "{} should be render-only", f.name);
        }
        assert!(fields.iter().any(|f| f.name == "x" && !f.render_only));
    }

    #[test]
    fn hash_ignores_render_only_fields() {
        let mut a = EntityTable::new(4);
        let mut b = EntityTable::new(4);
        a.spawn(guest_at(32, 32));
        b.spawn(guest_at(32, 32));
        if let Some(e) = b.get_mut(EntityId(0)) {
            e.base_mut().sprite.left += 100;
        }

        let mut ha = StateHash::new();
        let mut hb = StateHash::new();
        a.hash_into(&mut ha);
        b.hash_into(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn hash_tracks_positions() {
        let mut a = EntityTable::new(4);
        let mut b = EntityTable::new(4);
        a.spawn(guest_at(32, 32));
        b.spawn(guest_at(64, 32));

        let mut ha = StateHash::new();
        let mut hb = StateHash::new();
        a.hash_into(&mut ha);
        b.hash_into(&mut hb);
        assert_ne!(ha.finish(), hb.finish());
    }

    #[test]
    fn spatial_index_groups_by_tile() {
        let mut table = EntityTable::new(8);
        table.spawn(guest_at(0, 0));
        table.spawn(litter_at(10, 10));
        table.spawn(guest_at(64, 0));
        let index = table.spatial_index();
        assert_eq!(index.len(), 2);
        let origin = Coords3::new(0, 0, 0).tile_key();
        assert_eq!(index[&origin], vec![EntityId(0), EntityId(1)]);
    }
}
