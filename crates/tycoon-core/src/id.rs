use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a ride in the park's ride table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RideId(pub u16);

impl RideId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Stable positional handle into the entity table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u16);

impl EntityId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifies a network participant. Player 0 is the host (or the local
/// player in single-player).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u8);

impl PlayerId {
    pub const HOST: PlayerId = PlayerId(0);
}

/// Opcode of a game action kind. Unique per action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionType(pub u32);

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a user-facing string (error titles and messages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StringId(pub u16);

impl StringId {
    pub const NONE: StringId = StringId(0);
}

/// A world position in sub-tile units (32 units per tile).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Coords3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coords3 {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Packed tile key used by the spatial index.
    pub fn tile_key(&self) -> u32 {
        let tx = (self.x >> 5) as u32 & 0xFFFF;
        let ty = (self.y >> 5) as u32 & 0xFFFF;
        (ty << 16) | tx
    }
}
