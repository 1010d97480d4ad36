//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::action::{
    ActionError, ActionFlags, CommandFlags, GameAction, GameActionResult, ResultExtra, strings,
};
use crate::config::SimulationConfig;
use crate::context::SimulationContext;
use crate::entity::{Entity, EntityBase, Guest};
use crate::fixed::Money;
use crate::game::Game;
use crate::id::{ActionType, Coords3, EntityId};
use crate::park::ExpenditureType;
use crate::player::Permissions;
use crate::registry::{ActionRegistry, ActionRegistryBuilder};

pub const TEST_SEED: u64 = 0x5EED;
pub const TEST_ENTITY_CAPACITY: usize = 64;

// ===========================================================================
// Contexts
// ===========================================================================

/// A small park with one guest at `EntityId(0)`.
pub fn test_context() -> SimulationContext {
    let mut ctx = SimulationContext::new(TEST_SEED, TEST_ENTITY_CAPACITY);
    ctx.entities.spawn(Entity::Guest(Guest {
        base: EntityBase::at(32, 32, 16),
        guest_id: 1,
        ..Guest::default()
    }));
    ctx.park.next_guest_id = 2;
    ctx.park.guests_in_park = 1;
    ctx
}

pub fn test_config() -> SimulationConfig {
    SimulationConfig {
        seed: TEST_SEED,
        entity_capacity: TEST_ENTITY_CAPACITY,
        ..SimulationConfig::default()
    }
}

/// The test actions only.
pub fn test_registry() -> ActionRegistry {
    let mut builder = ActionRegistryBuilder::new();
    register_test_actions(&mut builder);
    builder.build()
}

pub fn register_test_actions(builder: &mut ActionRegistryBuilder) {
    builder.register::<MoveEntity>().expect("MoveEntity");
    builder.register::<SpendMoney>().expect("SpendMoney");
    builder.register::<PauseNote>().expect("PauseNote");
    builder.register::<EditorNote>().expect("EditorNote");
}

/// An offline game over [`test_context`].
pub fn test_game() -> Game {
    Game::from_context(test_config(), Arc::new(test_registry()), test_context()).expect("valid test config")
}

// ===========================================================================
// Actions
// ===========================================================================

/// Teleport an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveEntity {
    pub entity: EntityId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl GameAction for MoveEntity {
    fn opcode(&self) -> ActionType {
        ActionType(9001)
    }

    fn name(&self) -> &'static str {
        "move_entity"
    }

    fn required_permission(&self) -> Permissions {
        Permissions::GUEST
    }

    fn query(&self, ctx: &SimulationContext, _flags: CommandFlags) -> GameActionResult {
        if ctx.entities.get(self.entity).is_none() {
            return GameActionResult::error(
                ActionError::InvalidParameters,
                strings::CANT_DO_THIS,
                strings::INVALID_PARAMETERS,
            );
        }
        GameActionResult::ok()
            .at(Coords3::new(self.x, self.y, self.z))
            .with_extra(ResultExtra::Entity(self.entity))
    }

    fn execute(&self, ctx: &mut SimulationContext, flags: CommandFlags) -> GameActionResult {
        let result = self.query(ctx, flags);
        if let Some(entity) = ctx.entities.get_mut(self.entity) {
            entity.base_mut().move_to(self.x, self.y, self.z);
        }
        result
    }
}

/// Costs `amount` and otherwise does nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpendMoney {
    pub amount: Money,
}

impl GameAction for SpendMoney {
    fn opcode(&self) -> ActionType {
        ActionType(9002)
    }

    fn name(&self) -> &'static str {
        "spend_money"
    }

    fn query(&self, _ctx: &SimulationContext, _flags: CommandFlags) -> GameActionResult {
        GameActionResult::ok().with_cost(self.amount, ExpenditureType::Marketing)
    }

    fn execute(&self, ctx: &mut SimulationContext, flags: CommandFlags) -> GameActionResult {
        self.query(ctx, flags)
    }
}

/// Pausable, with a cooldown. Sets research funding to `note` (capped at 3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PauseNote {
    pub note: u8,
}

impl GameAction for PauseNote {
    fn opcode(&self) -> ActionType {
        ActionType(9003)
    }

    fn name(&self) -> &'static str {
        "pause_note"
    }

    fn action_flags(&self) -> ActionFlags {
        ActionFlags::ALLOW_WHILE_PAUSED
    }

    fn cooldown_ticks(&self) -> u32 {
        10
    }

    fn query(&self, _ctx: &SimulationContext, _flags: CommandFlags) -> GameActionResult {
        GameActionResult::ok()
    }

    fn execute(&self, ctx: &mut SimulationContext, _flags: CommandFlags) -> GameActionResult {
        ctx.park.research_funding = self.note.min(3);
        GameActionResult::ok()
    }
}

/// Valid only in the scenario editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorNote;

impl GameAction for EditorNote {
    fn opcode(&self) -> ActionType {
        ActionType(9004)
    }

    fn name(&self) -> &'static str {
        "editor_note"
    }

    fn action_flags(&self) -> ActionFlags {
        ActionFlags::EDITOR_ONLY
    }

    fn query(&self, _ctx: &SimulationContext, _flags: CommandFlags) -> GameActionResult {
        GameActionResult::ok()
    }

    fn execute(&self, _ctx: &mut SimulationContext, _flags: CommandFlags) -> GameActionResult {
        GameActionResult::ok()
    }
}
