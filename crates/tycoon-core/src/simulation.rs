//! Per-tick park rules: calendar, weather, guests, staff, vehicles, litter,
//! effects, ride operation, finance, research and rating.
//!
//! All randomness comes from the context RNG, and every loop visits entities
//! and rides in index order, so two contexts with the same state advance
//! identically.

use std::collections::BTreeMap;

use crate::context::SimulationContext;
use crate::date::DateEvents;
use crate::entity::{
    Entity, EntityBase, EntityKind, Guest, GuestState, Litter, LitterType, MiscEntity, MiscKind,
    Staff, StaffType, Vehicle, VehicleStatus,
};
use crate::fixed::{Fixed64, Money, Ticks, money};
use crate::id::{Coords3, EntityId, RideId};
use crate::park::{ExpenditureType, MAX_ENTRANCE_FEE, RideStatus};

/// Map edge length in world units.
pub const MAP_SIZE: i32 = 128 * 32;

/// Where arriving guests appear.
pub const PARK_ENTRANCE: Coords3 = Coords3::new(64 * 32, 32, 16);

const ENERGY_DECAY: Fixed64 = Fixed64::from_bits(1 << 20);
const WANDER_INTERVAL: u32 = 32;
const BOARD_INTERVAL: u32 = 64;
const LITTER_ODDS: u32 = 512;
const LITTER_LIFETIME: Ticks = 16_384;
const BALLOON_LIFETIME: u16 = 256;
const BREAKDOWN_INTERVAL: Ticks = 256;
const RIDE_RUNNING_COST: Money = money(5);
const STAFF_WAGE: Money = money(50);
const RESEARCH_COST_PER_LEVEL: Money = money(100);
const RESEARCH_TARGET: u16 = 1000;
const VEHICLE_MAX_VELOCITY: Fixed64 = Fixed64::from_bits(4 << 32);
const VEHICLE_ACCELERATION: Fixed64 = Fixed64::from_bits(1 << 29);
const PROGRESS_PER_PIECE: u32 = 256;

/// Advance every park rule by one tick. The caller owns the tick counter.
pub fn run_tick(ctx: &mut SimulationContext) {
    let events = ctx.date.advance();
    let month = ctx.date.month();
    ctx.weather.update(&mut ctx.rng, month);

    if events.new_day {
        generate_guests(ctx);
    }
    update_guests(ctx);
    update_staff(ctx);
    update_vehicles(ctx);
    update_litter(ctx);
    update_misc(ctx);
    update_rides(ctx, events);
    if events.new_day {
        update_research(ctx);
        update_rating(ctx);
    }
}

// ---------------------------------------------------------------------------
// Spawning helpers
// ---------------------------------------------------------------------------

/// Admit a guest at `position`, charging the entrance fee.
pub fn spawn_guest(ctx: &mut SimulationContext, position: Coords3) -> Option<EntityId> {
    let guest_id = ctx.park.next_guest_id;
    let cash = money(20) + ctx.rng.next_below(300) as Money;
    let fee = ctx.park.entrance_fee.min(cash);
    let id = ctx.entities.spawn(Entity::Guest(Guest {
        base: EntityBase::at(position.x, position.y, position.z),
        guest_id,
        cash: cash - fee,
        ..Guest::default()
    }))?;
    ctx.park.next_guest_id += 1;
    ctx.park.guests_in_park += 1;
    ctx.park.spend(ExpenditureType::ParkEntranceTickets, -fee);
    Some(id)
}

pub fn spawn_staff(
    ctx: &mut SimulationContext,
    staff_type: StaffType,
    position: Coords3,
) -> Option<EntityId> {
    let staff_id = ctx.entities.count_kind(EntityKind::Staff) as u32 + 1;
    ctx.entities.spawn(Entity::Staff(Staff {
        base: EntityBase::at(position.x, position.y, position.z),
        staff_id,
        staff_type,
        ..Staff::default()
    }))
}

/// Put a vehicle at the start of a ride's track.
pub fn spawn_vehicle(ctx: &mut SimulationContext, ride: RideId) -> Option<EntityId> {
    let start = ctx.park.rides.get(ride)?.track.first()?.position;
    ctx.entities.spawn(Entity::Vehicle(Vehicle {
        base: EntityBase::at(start.x, start.y, start.z),
        ride,
        acceleration: VEHICLE_ACCELERATION,
        ..Vehicle::default()
    }))
}

fn spawn_balloon(ctx: &mut SimulationContext, position: Coords3) {
    let _ = ctx.entities.spawn(Entity::Misc(MiscEntity {
        base: EntityBase::at(position.x, position.y, position.z),
        kind: MiscKind::Balloon,
        lifetime: BALLOON_LIFETIME,
        ..MiscEntity::default()
    }));
}

fn step(base: &mut EntityBase) {
    let (dx, dy) = match base.direction & 3 {
        0 => (-1, 0),
        1 => (0, 1),
        2 => (1, 0),
        _ => (0, -1),
    };
    let x = (base.x + dx).clamp(0, MAP_SIZE - 1);
    let y = (base.y + dy).clamp(0, MAP_SIZE - 1);
    base.move_to(x, y, base.z);
}

// ---------------------------------------------------------------------------
// Guests
// ---------------------------------------------------------------------------

fn generate_guests(ctx: &mut SimulationContext) {
    if !ctx.park.is_open {
        return;
    }
    // Rating draws guests in, high fees push them away.
    let rating = Fixed64::from_num(ctx.park.rating) / Fixed64::from_num(1000);
    let deterrent = Fixed64::from_num(ctx.park.entrance_fee) / Fixed64::from_num(MAX_ENTRANCE_FEE * 2);
    let probability = (rating - deterrent).max(Fixed64::ZERO);

    let arrivals = 1 + ctx.rng.next_below(3);
    for _ in 0..arrivals {
        if ctx.rng.chance(probability) && spawn_guest(ctx, PARK_ENTRANCE).is_none() {
            break;
        }
    }
}

fn update_guests(ctx: &mut SimulationContext) {
    let open_rides: Vec<RideId> = ctx
        .park
        .rides
        .iter()
        .filter(|(_, r)| r.status == RideStatus::Open)
        .map(|(id, _)| id)
        .collect();
    let littering = !ctx.cheats.disable_littering;
    let raining = ctx.weather.kind.is_raining();

    for id in ctx.entities.ids_of_kind(EntityKind::Guest) {
        let Some(Entity::Guest(guest)) = ctx.entities.get_mut(id) else {
            continue;
        };
        guest.ticks_in_park += 1;
        guest.energy = (guest.energy - ENERGY_DECAY).max(Fixed64::ZERO);
        if raining && guest.ticks_in_park % 128 == 0 {
            guest.happiness = guest.happiness.saturating_sub(1);
        }

        let mut litter_at = None;
        let mut boarding = None;
        match guest.state {
            GuestState::OnRide => {
                if ctx.rng.one_in(64) {
                    guest.state = GuestState::Walking;
                    guest.ride = None;
                    guest.happiness = guest.happiness.saturating_add(8);
                }
            }
            GuestState::Walking => {
                if guest.ticks_in_park % WANDER_INTERVAL == 0 {
                    guest.base.direction = ctx.rng.direction();
                }
                step(&mut guest.base);
                if littering && ctx.rng.one_in(LITTER_ODDS) {
                    litter_at = Some(guest.base.position());
                }
                if guest.ticks_in_park % BOARD_INTERVAL == 0
                    && let Some(pick) = ctx.rng.index(open_rides.len())
                {
                    boarding = Some(open_rides[pick]);
                }
                if guest.energy == Fixed64::ZERO {
                    guest.state = GuestState::Leaving;
                }
            }
            GuestState::Leaving => {}
        }

        if let Some(ride_id) = boarding
            && let Some(price) = ctx.park.rides.get(ride_id).map(|r| r.price)
            && guest.cash >= price
        {
            guest.cash -= price;
            guest.state = GuestState::OnRide;
            guest.ride = Some(ride_id);
            if let Some(ride) = ctx.park.rides.get_mut(ride_id) {
                ride.customers += 1;
                ride.income += price;
            }
            ctx.park.spend(ExpenditureType::RideTickets, -price);
        }

        let leaving = guest.state == GuestState::Leaving;
        let position = guest.base.position();

        if let Some(at) = litter_at {
            let litter_type = match ctx.rng.next_below(4) {
                0 => LitterType::Vomit,
                1 => LitterType::EmptyCan,
                2 => LitterType::Rubbish,
                _ => LitterType::EmptyBurgerBox,
            };
            let _ = ctx.entities.spawn(Entity::Litter(Litter {
                base: EntityBase::at(at.x, at.y, at.z),
                litter_type,
                creation_tick: ctx.current_ticks,
            }));
        }
        if leaving {
            ctx.entities.remove(id);
            ctx.park.guests_in_park = ctx.park.guests_in_park.saturating_sub(1);
            if ctx.rng.one_in(8) {
                spawn_balloon(ctx, position);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Staff
// ---------------------------------------------------------------------------

fn update_staff(ctx: &mut SimulationContext) {
    let mut litter_by_tile: BTreeMap<u32, Vec<EntityId>> = BTreeMap::new();
    for (id, entity) in ctx.entities.iter() {
        if entity.kind() == EntityKind::Litter {
            litter_by_tile
                .entry(entity.base().position().tile_key())
                .or_default()
                .push(id);
        }
    }
    let mut broken: Vec<RideId> = ctx
        .park
        .rides
        .iter()
        .filter(|(_, r)| r.status == RideStatus::Broken)
        .map(|(id, _)| id)
        .collect();

    let mut swept = Vec::new();
    for id in ctx.entities.ids_of_kind(EntityKind::Staff) {
        let Some(Entity::Staff(staff)) = ctx.entities.get_mut(id) else {
            continue;
        };
        if ctx.current_ticks % WANDER_INTERVAL == 0 {
            staff.base.direction = ctx.rng.direction();
        }
        step(&mut staff.base);

        match staff.staff_type {
            StaffType::Handyman => {
                let tile = staff.base.position().tile_key();
                if let Some(on_tile) = litter_by_tile.get_mut(&tile)
                    && let Some(litter) = on_tile.pop()
                {
                    swept.push(litter);
                    staff.litter_swept += 1;
                }
            }
            StaffType::Mechanic => {
                if !broken.is_empty()
                    && ctx.rng.one_in(256)
                    && let Some(ride_id) = broken.pop()
                    && let Some(ride) = ctx.park.rides.get_mut(ride_id)
                {
                    ride.status = RideStatus::Open;
                    ride.reliability = ride.reliability.saturating_add(10).min(100);
                    staff.rides_fixed += 1;
                }
            }
            StaffType::Security | StaffType::Entertainer => {}
        }
    }
    for litter in swept {
        ctx.entities.remove(litter);
    }
}

// ---------------------------------------------------------------------------
// Vehicles, litter and effects
// ---------------------------------------------------------------------------

fn update_vehicles(ctx: &mut SimulationContext) {
    let mut orphans = Vec::new();
    for id in ctx.entities.ids_of_kind(EntityKind::Vehicle) {
        let Some(Entity::Vehicle(vehicle)) = ctx.entities.get_mut(id) else {
            continue;
        };
        let Some(ride) = ctx.park.rides.get(vehicle.ride) else {
            orphans.push(id);
            continue;
        };
        if ride.status != RideStatus::Open || ride.track.is_empty() {
            vehicle.velocity = Fixed64::ZERO;
            vehicle.status = VehicleStatus::Stopped;
            continue;
        }

        vehicle.velocity = (vehicle.velocity + vehicle.acceleration).min(VEHICLE_MAX_VELOCITY);
        vehicle.status = VehicleStatus::Travelling;
        let circuit = ride.track.len() as u32 * PROGRESS_PER_PIECE;
        let advance = (vehicle.velocity * Fixed64::from_num(16)).to_num::<u32>();
        vehicle.track_progress = (vehicle.track_progress + advance) % circuit;
        let piece = ride.track[(vehicle.track_progress / PROGRESS_PER_PIECE) as usize];
        vehicle.base.direction = piece.direction;
        vehicle
            .base
            .move_to(piece.position.x, piece.position.y, piece.position.z);
    }
    for id in orphans {
        ctx.entities.remove(id);
    }
}

fn update_litter(ctx: &mut SimulationContext) {
    let now = ctx.current_ticks;
    let expired: Vec<EntityId> = ctx
        .entities
        .iter()
        .filter_map(|(id, e)| match e {
            Entity::Litter(l) if now.wrapping_sub(l.creation_tick) >= LITTER_LIFETIME => Some(id),
            _ => None,
        })
        .collect();
    for id in expired {
        ctx.entities.remove(id);
    }
}

fn update_misc(ctx: &mut SimulationContext) {
    let mut expired = Vec::new();
    for id in ctx.entities.ids_of_kind(EntityKind::Misc) {
        let Some(Entity::Misc(misc)) = ctx.entities.get_mut(id) else {
            continue;
        };
        misc.frame = misc.frame.wrapping_add(1);
        if misc.kind == MiscKind::Balloon {
            let (x, y, z) = (misc.base.x, misc.base.y, misc.base.z + 1);
            misc.base.move_to(x, y, z);
        }
        if misc.lifetime == 0 {
            expired.push(id);
        } else {
            misc.lifetime -= 1;
        }
    }
    for id in expired {
        ctx.entities.remove(id);
    }
}

// ---------------------------------------------------------------------------
// Rides, finance, research, rating
// ---------------------------------------------------------------------------

fn update_rides(ctx: &mut SimulationContext, events: DateEvents) {
    let now = ctx.current_ticks;
    if !ctx.cheats.disable_breakdowns && now % BREAKDOWN_INTERVAL == 0 {
        for (_, ride) in ctx.park.rides.iter_mut() {
            if ride.status != RideStatus::Open {
                continue;
            }
            let odds = 101 - ride.reliability.min(100) as u32;
            if ctx.rng.next_below(1000) < odds {
                ride.status = RideStatus::Broken;
                ride.last_breakdown_tick = now;
            }
        }
    }

    if events.new_month {
        if !ctx.cheats.disable_ride_ageing {
            for (_, ride) in ctx.park.rides.iter_mut() {
                ride.reliability = ride.reliability.saturating_sub(1);
            }
        }
        let running = ctx
            .park
            .rides
            .values()
            .filter(|r| r.status != RideStatus::Closed)
            .count() as Money;
        let staff = ctx.entities.count_kind(EntityKind::Staff) as Money;
        let research = ctx.park.research_funding as Money * RESEARCH_COST_PER_LEVEL;
        ctx.park
            .spend(ExpenditureType::RideRunningCosts, running * RIDE_RUNNING_COST);
        ctx.park.spend(ExpenditureType::Wages, staff * STAFF_WAGE);
        ctx.park.spend(ExpenditureType::Research, research);
    }
}

fn update_research(ctx: &mut SimulationContext) {
    let park = &mut ctx.park;
    park.research_progress += park.research_funding as u16 * 4 + 1;
    if park.research_progress >= RESEARCH_TARGET {
        park.research_progress -= RESEARCH_TARGET;
        park.research_items_completed += 1;
    }
}

fn update_rating(ctx: &mut SimulationContext) {
    let mut rating: i32 = 500;
    let mut open = 0;
    let mut broken = 0;
    for ride in ctx.park.rides.values() {
        match ride.status {
            RideStatus::Open => open += 1,
            RideStatus::Broken => broken += 1,
            RideStatus::Closed => {}
        }
    }
    rating += (open * 20).min(200);
    rating -= broken * 40;

    let (mut guests, mut happiness) = (0i32, 0i32);
    let mut litter = 0i32;
    for (_, entity) in ctx.entities.iter() {
        match entity {
            Entity::Guest(g) => {
                guests += 1;
                happiness += g.happiness as i32;
            }
            Entity::Litter(_) => litter += 1,
            _ => {}
        }
    }
    if guests > 0 {
        rating += happiness / guests - 128;
    }
    rating -= (litter * 4).min(300);
    ctx.park.rating = rating.clamp(0, 999) as u16;
}
