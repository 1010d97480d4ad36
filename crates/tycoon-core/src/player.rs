//! Players, their permission groups and per-action cooldowns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::BitOr;

use crate::fixed::Ticks;
use crate::id::{ActionType, PlayerId};

/// Bit set of permission groups a player holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permissions(pub u32);

impl Permissions {
    pub const NONE: Permissions = Permissions(0);
    pub const BUILD: Permissions = Permissions(1 << 0);
    pub const RIDE_PROPERTIES: Permissions = Permissions(1 << 1);
    pub const GUEST: Permissions = Permissions(1 << 2);
    pub const PARK_FUNDING: Permissions = Permissions(1 << 3);
    pub const CHEAT: Permissions = Permissions(1 << 4);
    pub const TOGGLE_PAUSE: Permissions = Permissions(1 << 5);
    pub const ALL: Permissions = Permissions(0x3F);

    /// True if every bit of `other` is set. The empty set is always contained.
    pub fn contains(self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Self) -> Self {
        Permissions(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub permissions: Permissions,
    /// Tick at which each action type was last executed by this player.
    last_action_tick: BTreeMap<ActionType, Ticks>,
}

impl Player {
    pub fn new(name: impl Into<String>, permissions: Permissions) -> Self {
        Self {
            name: name.into(),
            permissions,
            last_action_tick: BTreeMap::new(),
        }
    }

    /// True if `opcode` is still cooling down at `now`.
    pub fn is_cooling_down(&self, opcode: ActionType, cooldown: Ticks, now: Ticks) -> bool {
        match self.last_action_tick.get(&opcode) {
            Some(&last) => cooldown > 0 && now.saturating_sub(last) < cooldown,
            None => false,
        }
    }

    pub fn stamp(&mut self, opcode: ActionType, now: Ticks) {
        self.last_action_tick.insert(opcode, now);
    }
}

/// Player table. Single-player games contain only the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerTable {
    players: BTreeMap<PlayerId, Player>,
}

impl Default for PlayerTable {
    fn default() -> Self {
        let mut players = BTreeMap::new();
        players.insert(PlayerId::HOST, Player::new("host", Permissions::ALL));
        Self { players }
    }
}

impl PlayerTable {
    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn insert(&mut self, id: PlayerId, player: Player) {
        self.players.insert(id, player);
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        self.players.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
