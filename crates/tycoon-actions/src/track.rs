//! Single track pieces.

use serde::{Deserialize, Serialize};
use tycoon_core::action::{ActionError, CommandFlags, GameAction, GameActionResult, ResultExtra, strings};
use tycoon_core::context::SimulationContext;
use tycoon_core::fixed::Money;
use tycoon_core::id::{ActionType, Coords3, RideId, StringId};
use tycoon_core::park::{ExpenditureType, Ride, RideStatus, TRACK_PIECE_COST, TrackPiece};
use tycoon_core::player::Permissions;
use tycoon_core::simulation::MAP_SIZE;

use crate::opcodes;

/// Highest z a piece may be placed at.
pub const MAX_TRACK_HEIGHT: i32 = 2048;

/// `Placement::ground_flags` bit: the piece sits on the ground.
pub const ELEMENT_ON_GROUND: u8 = 1 << 0;
/// `Placement::ground_flags` bit: the piece is raised above the ground.
pub const ELEMENT_ABOVE_GROUND: u8 = 1 << 1;

/// Share of the construction cost refunded on removal.
pub fn removal_refund(pieces: usize) -> Money {
    -(pieces as Money * TRACK_PIECE_COST / 2)
}

fn fail(error: ActionError, title: StringId, message: StringId) -> GameActionResult {
    GameActionResult::error(error, title, message)
}

/// Look up a ride that must exist and be closed before its track changes.
pub(crate) fn closed_ride(ctx: &SimulationContext, ride: RideId, title: StringId) -> Result<&Ride, GameActionResult> {
    let Some(r) = ctx.park.rides.get(ride) else {
        return Err(fail(ActionError::InvalidParameters, title, strings::INVALID_PARAMETERS));
    };
    match r.status {
        RideStatus::Closed => Ok(r),
        RideStatus::Open => Err(fail(ActionError::NotClosed, title, strings::RIDE_MUST_BE_CLOSED)),
        RideStatus::Broken => Err(fail(ActionError::Broken, title, strings::RIDE_IS_BROKEN)),
    }
}

// ---------------------------------------------------------------------------
// PlaceTrack
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceTrack {
    pub ride: RideId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub piece_type: u8,
    /// 0..=3.
    pub direction: u8,
}

impl PlaceTrack {
    fn position(&self) -> Coords3 {
        Coords3::new(self.x, self.y, self.z)
    }
}

impl GameAction for PlaceTrack {
    fn opcode(&self) -> ActionType {
        opcodes::PLACE_TRACK
    }

    fn name(&self) -> &'static str {
        "place_track"
    }

    fn required_permission(&self) -> Permissions {
        Permissions::BUILD
    }

    fn query(&self, ctx: &SimulationContext, _flags: CommandFlags) -> GameActionResult {
        let title = strings::CANT_BUILD_THIS_HERE;
        if let Err(rejection) = closed_ride(ctx, self.ride, title) {
            return rejection;
        }
        if self.direction > 3 || !(0..MAP_SIZE).contains(&self.x) || !(0..MAP_SIZE).contains(&self.y) {
            return fail(ActionError::InvalidParameters, title, strings::INVALID_PARAMETERS);
        }
        if self.z < 0 {
            return fail(ActionError::TooLow, title, strings::TOO_LOW);
        }
        if self.z > MAX_TRACK_HEIGHT {
            return fail(ActionError::TooHigh, title, strings::TOO_HIGH);
        }
        let position = self.position();
        if ctx.park.rides.values().any(|r| r.track_at(position).is_some()) {
            return fail(ActionError::ItemAlreadyPlaced, title, strings::ALREADY_PLACED);
        }

        let ground_flags = if self.z == 0 {
            ELEMENT_ON_GROUND
        } else {
            ELEMENT_ABOVE_GROUND
        };
        GameActionResult::ok()
            .with_cost(TRACK_PIECE_COST, ExpenditureType::RideConstruction)
            .at(position)
            .with_extra(ResultExtra::Placement { ground_flags })
    }

    fn execute(&self, ctx: &mut SimulationContext, flags: CommandFlags) -> GameActionResult {
        let result = self.query(ctx, flags);
        if !result.is_ok() {
            return result;
        }
        if let Some(ride) = ctx.park.rides.get_mut(self.ride) {
            ride.track.push(TrackPiece {
                position: self.position(),
                piece_type: self.piece_type,
                direction: self.direction,
            });
        }
        result
    }
}

// ---------------------------------------------------------------------------
// RemoveTrack
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveTrack {
    pub ride: RideId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl RemoveTrack {
    pub fn at(ride: RideId, position: Coords3) -> Self {
        Self {
            ride,
            x: position.x,
            y: position.y,
            z: position.z,
        }
    }

    fn position(&self) -> Coords3 {
        Coords3::new(self.x, self.y, self.z)
    }
}

impl GameAction for RemoveTrack {
    fn opcode(&self) -> ActionType {
        opcodes::REMOVE_TRACK
    }

    fn name(&self) -> &'static str {
        "remove_track"
    }

    fn required_permission(&self) -> Permissions {
        Permissions::BUILD
    }

    fn query(&self, ctx: &SimulationContext, _flags: CommandFlags) -> GameActionResult {
        let title = strings::CANT_REMOVE_THIS;
        let ride = match closed_ride(ctx, self.ride, title) {
            Ok(ride) => ride,
            Err(rejection) => return rejection,
        };
        if ride.track_at(self.position()).is_none() {
            return fail(ActionError::InvalidParameters, title, strings::INVALID_PARAMETERS);
        }
        GameActionResult::ok()
            .with_cost(removal_refund(1), ExpenditureType::RideConstruction)
            .at(self.position())
    }

    fn execute(&self, ctx: &mut SimulationContext, flags: CommandFlags) -> GameActionResult {
        let result = self.query(ctx, flags);
        if !result.is_ok() {
            return result;
        }
        if let Some(ride) = ctx.park.rides.get_mut(self.ride)
            && let Some(index) = ride.track_at(self.position())
        {
            ride.track.remove(index);
        }
        result
    }
}
