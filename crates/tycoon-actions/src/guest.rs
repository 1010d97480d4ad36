//! Guest actions.

use serde::{Deserialize, Serialize};
use tycoon_core::action::{ActionError, CommandFlags, GameAction, GameActionResult, ResultExtra, strings};
use tycoon_core::context::SimulationContext;
use tycoon_core::entity::Entity;
use tycoon_core::id::{ActionType, Coords3, EntityId};
use tycoon_core::player::Permissions;
use tycoon_core::simulation::{MAP_SIZE, spawn_guest};

use crate::opcodes;
use crate::ride::MAX_NAME_LEN;

/// Rename a guest. An empty name restores the numbered default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameGuest {
    pub guest: EntityId,
    pub name: String,
}

impl GameAction for RenameGuest {
    fn opcode(&self) -> ActionType {
        opcodes::RENAME_GUEST
    }

    fn name(&self) -> &'static str {
        "rename_guest"
    }

    fn required_permission(&self) -> Permissions {
        Permissions::GUEST
    }

    fn query(&self, ctx: &SimulationContext, _flags: CommandFlags) -> GameActionResult {
        let is_guest = ctx.entities.get(self.guest).and_then(Entity::as_guest).is_some();
        if !is_guest || self.name.len() > MAX_NAME_LEN {
            return GameActionResult::error(
                ActionError::InvalidParameters,
                strings::CANT_CHANGE_THIS,
                strings::INVALID_PARAMETERS,
            );
        }
        GameActionResult::ok().with_extra(ResultExtra::Entity(self.guest))
    }

    fn execute(&self, ctx: &mut SimulationContext, flags: CommandFlags) -> GameActionResult {
        let result = self.query(ctx, flags);
        if !result.is_ok() {
            return result;
        }
        if let Some(guest) = ctx.entities.get_mut(self.guest).and_then(Entity::as_guest_mut) {
            guest.name = (!self.name.is_empty()).then(|| self.name.clone());
        }
        result
    }
}

/// Admit a guest at a position, as if they had walked through the entrance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnGuest {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl GameAction for SpawnGuest {
    fn opcode(&self) -> ActionType {
        opcodes::SPAWN_GUEST
    }

    fn name(&self) -> &'static str {
        "spawn_guest"
    }

    fn required_permission(&self) -> Permissions {
        Permissions::CHEAT
    }

    fn query(&self, ctx: &SimulationContext, _flags: CommandFlags) -> GameActionResult {
        if !(0..MAP_SIZE).contains(&self.x) || !(0..MAP_SIZE).contains(&self.y) || self.z < 0 {
            return GameActionResult::error(ActionError::InvalidParameters, strings::CANT_DO_THIS, strings::INVALID_PARAMETERS);
        }
        if ctx.entities.is_full() {
            return GameActionResult::error(ActionError::NoFreeElements, strings::CANT_DO_THIS, strings::TOO_MANY_ENTITIES);
        }
        GameActionResult::ok().at(Coords3::new(self.x, self.y, self.z))
    }

    fn execute(&self, ctx: &mut SimulationContext, flags: CommandFlags) -> GameActionResult {
        let result = self.query(ctx, flags);
        if !result.is_ok() {
            return result;
        }
        match spawn_guest(ctx, Coords3::new(self.x, self.y, self.z)) {
            Some(id) => result.with_extra(ResultExtra::Entity(id)),
            None => GameActionResult::error(ActionError::NoFreeElements, strings::CANT_DO_THIS, strings::TOO_MANY_ENTITIES),
        }
    }
}
