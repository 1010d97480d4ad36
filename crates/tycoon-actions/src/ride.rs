//! Ride lifecycle: create, open/close, demolish.

use serde::{Deserialize, Serialize};
use tracing::debug;
use tycoon_core::action::{ActionError, CommandFlags, GameAction, GameActionResult, ResultExtra, strings};
use tycoon_core::context::SimulationContext;
use tycoon_core::dispatcher::execute_nested;
use tycoon_core::entity::{Entity, EntityKind, GuestState};
use tycoon_core::fixed::{Money, money};
use tycoon_core::id::{ActionType, RideId};
use tycoon_core::park::{ExpenditureType, MAX_RIDES, Ride, RideKind, RideStatus};
use tycoon_core::player::Permissions;
use tycoon_core::simulation::spawn_vehicle;

use crate::opcodes;
use crate::track::{RemoveTrack, closed_ride, removal_refund};

/// Flat cost of founding a ride, before any track.
pub const RIDE_CREATION_COST: Money = money(100);

/// Longest accepted ride or guest name, in bytes.
pub const MAX_NAME_LEN: usize = 32;

// ---------------------------------------------------------------------------
// CreateRide
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRide {
    pub name: String,
    pub kind: RideKind,
}

impl GameAction for CreateRide {
    fn opcode(&self) -> ActionType {
        opcodes::CREATE_RIDE
    }

    fn name(&self) -> &'static str {
        "create_ride"
    }

    fn required_permission(&self) -> Permissions {
        Permissions::BUILD
    }

    fn query(&self, ctx: &SimulationContext, _flags: CommandFlags) -> GameActionResult {
        if self.name.is_empty() || self.name.len() > MAX_NAME_LEN {
            return GameActionResult::error(
                ActionError::InvalidParameters,
                strings::CANT_BUILD_THIS_HERE,
                strings::INVALID_PARAMETERS,
            );
        }
        if ctx.park.rides.len() >= MAX_RIDES {
            return GameActionResult::error(
                ActionError::NoFreeElements,
                strings::CANT_BUILD_THIS_HERE,
                strings::TOO_MANY_RIDES,
            );
        }
        GameActionResult::ok().with_cost(RIDE_CREATION_COST, ExpenditureType::RideConstruction)
    }

    fn execute(&self, ctx: &mut SimulationContext, flags: CommandFlags) -> GameActionResult {
        let result = self.query(ctx, flags);
        if !result.is_ok() {
            return result;
        }
        let id = ctx.park.rides.insert(Ride::new(self.name.clone(), self.kind));
        result.with_extra(ResultExtra::Ride(id))
    }
}

// ---------------------------------------------------------------------------
// SetRideStatus
// ---------------------------------------------------------------------------

/// Open or close a ride. Opening a ride without a vehicle spawns one at the
/// start of its track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRideStatus {
    pub ride: RideId,
    pub status: RideStatus,
}

fn has_vehicle(ctx: &SimulationContext, ride: RideId) -> bool {
    ctx.entities
        .iter()
        .any(|(_, e)| e.as_vehicle().is_some_and(|v| v.ride == ride))
}

impl GameAction for SetRideStatus {
    fn opcode(&self) -> ActionType {
        opcodes::SET_RIDE_STATUS
    }

    fn name(&self) -> &'static str {
        "set_ride_status"
    }

    fn required_permission(&self) -> Permissions {
        Permissions::RIDE_PROPERTIES
    }

    fn query(&self, ctx: &SimulationContext, _flags: CommandFlags) -> GameActionResult {
        let title = strings::CANT_CHANGE_THIS;
        let invalid = || GameActionResult::error(ActionError::InvalidParameters, title, strings::INVALID_PARAMETERS);
        let Some(ride) = ctx.park.rides.get(self.ride) else {
            return invalid();
        };
        match self.status {
            // Breakdowns come from the simulation only.
            RideStatus::Broken => invalid(),
            RideStatus::Closed => GameActionResult::ok(),
            RideStatus::Open => {
                if ride.status == RideStatus::Broken {
                    return GameActionResult::error(ActionError::Broken, title, strings::RIDE_IS_BROKEN);
                }
                if ride.track.is_empty() {
                    return invalid();
                }
                if !has_vehicle(ctx, self.ride) && ctx.entities.is_full() {
                    return GameActionResult::error(ActionError::NoFreeElements, title, strings::TOO_MANY_ENTITIES);
                }
                GameActionResult::ok()
            }
        }
    }

    fn execute(&self, ctx: &mut SimulationContext, flags: CommandFlags) -> GameActionResult {
        let result = self.query(ctx, flags);
        if !result.is_ok() {
            return result;
        }
        if self.status == RideStatus::Open && !has_vehicle(ctx, self.ride) {
            spawn_vehicle(ctx, self.ride);
        }
        if let Some(ride) = ctx.park.rides.get_mut(self.ride) {
            ride.status = self.status;
        }
        result.with_extra(ResultExtra::Ride(self.ride))
    }
}

// ---------------------------------------------------------------------------
// DemolishRide
// ---------------------------------------------------------------------------

/// Remove a closed ride with all its track and vehicles. Track is removed
/// piece by piece through nested [`RemoveTrack`] actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemolishRide {
    pub ride: RideId,
}

impl GameAction for DemolishRide {
    fn opcode(&self) -> ActionType {
        opcodes::DEMOLISH_RIDE
    }

    fn name(&self) -> &'static str {
        "demolish_ride"
    }

    fn required_permission(&self) -> Permissions {
        Permissions::BUILD
    }

    fn query(&self, ctx: &SimulationContext, _flags: CommandFlags) -> GameActionResult {
        match closed_ride(ctx, self.ride, strings::CANT_REMOVE_THIS) {
            Ok(ride) => GameActionResult::ok()
                .with_cost(removal_refund(ride.track.len()), ExpenditureType::RideConstruction)
                .with_extra(ResultExtra::Ride(self.ride)),
            Err(rejection) => rejection,
        }
    }

    fn execute(&self, ctx: &mut SimulationContext, flags: CommandFlags) -> GameActionResult {
        let result = self.query(ctx, flags);
        if !result.is_ok() {
            return result;
        }
        let pieces: Vec<_> = ctx
            .park
            .rides
            .get(self.ride)
            .map(|r| r.track.iter().rev().map(|p| p.position).collect())
            .unwrap_or_default();
        for position in pieces {
            let nested = execute_nested(ctx, &RemoveTrack::at(self.ride, position), flags);
            if !nested.is_ok() {
                return nested;
            }
        }

        for id in ctx.entities.ids_of_kind(EntityKind::Vehicle) {
            if ctx.entities.get(id).and_then(Entity::as_vehicle).is_some_and(|v| v.ride == self.ride) {
                ctx.entities.remove(id);
            }
        }
        for id in ctx.entities.ids_of_kind(EntityKind::Guest) {
            if let Some(guest) = ctx.entities.get_mut(id).and_then(Entity::as_guest_mut)
                && guest.ride == Some(self.ride)
            {
                guest.ride = None;
                guest.state = GuestState::Walking;
            }
        }
        ctx.park.rides.remove(self.ride);
        debug!(tick = ctx.current_ticks, "ride demolished");
        result
    }
}
