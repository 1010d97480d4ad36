//! Game actions for the Tycoon simulation core.
//!
//! Every player-initiated change to the park is one of the actions in this
//! crate. Each is a plain serde struct implementing
//! [`GameAction`](tycoon_core::action::GameAction); [`register_all`] adds
//! them to an [`ActionRegistryBuilder`] under the fixed opcodes in
//! [`opcodes`].
//!
//! # Groups
//!
//! - [`track`] -- place and remove single track pieces.
//! - [`ride`] -- create, open/close and demolish rides.
//! - [`guest`] -- rename and spawn guests.
//! - [`park`] -- entrance fee, cheats and pause.

pub mod guest;
pub mod park;
pub mod ride;
pub mod track;

pub use guest::{RenameGuest, SpawnGuest};
pub use park::{PauseToggle, SetCheat, SetParkEntranceFee};
pub use ride::{CreateRide, DemolishRide, SetRideStatus};
pub use track::{PlaceTrack, RemoveTrack};

use tycoon_core::registry::{ActionRegistry, ActionRegistryBuilder, RegistryError};

/// Wire opcodes. Stable across versions; recorded in replays.
pub mod opcodes {
    use tycoon_core::id::ActionType;

    pub const PLACE_TRACK: ActionType = ActionType(1);
    pub const DEMOLISH_RIDE: ActionType = ActionType(2);
    pub const REMOVE_TRACK: ActionType = ActionType(3);
    pub const CREATE_RIDE: ActionType = ActionType(4);
    pub const SET_RIDE_STATUS: ActionType = ActionType(5);
    pub const RENAME_GUEST: ActionType = ActionType(6);
    pub const SET_PARK_ENTRANCE_FEE: ActionType = ActionType(7);
    pub const SET_CHEAT: ActionType = ActionType(8);
    pub const PAUSE_TOGGLE: ActionType = ActionType(9);
    pub const SPAWN_GUEST: ActionType = ActionType(10);
}

/// Register every game action.
pub fn register_all(builder: &mut ActionRegistryBuilder) -> Result<(), RegistryError> {
    builder.register::<PlaceTrack>()?;
    builder.register::<DemolishRide>()?;
    builder.register::<RemoveTrack>()?;
    builder.register::<CreateRide>()?;
    builder.register::<SetRideStatus>()?;
    builder.register::<RenameGuest>()?;
    builder.register::<SetParkEntranceFee>()?;
    builder.register::<SetCheat>()?;
    builder.register::<PauseToggle>()?;
    builder.register::<SpawnGuest>()?;
    Ok(())
}

/// A frozen registry holding every game action.
pub fn registry() -> Result<ActionRegistry, RegistryError> {
    let mut builder = ActionRegistryBuilder::new();
    register_all(&mut builder)?;
    Ok(builder.build())
}
