//! Park-wide settings: entrance fee, cheats, pause.

use serde::{Deserialize, Serialize};
use tracing::info;
use tycoon_core::action::{ActionError, ActionFlags, CommandFlags, GameAction, GameActionResult, strings};
use tycoon_core::cheats::CheatKind;
use tycoon_core::context::SimulationContext;
use tycoon_core::fixed::Money;
use tycoon_core::id::ActionType;
use tycoon_core::park::MAX_ENTRANCE_FEE;
use tycoon_core::player::Permissions;

use crate::opcodes;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetParkEntranceFee {
    pub fee: Money,
}

impl GameAction for SetParkEntranceFee {
    fn opcode(&self) -> ActionType {
        opcodes::SET_PARK_ENTRANCE_FEE
    }

    fn name(&self) -> &'static str {
        "set_park_entrance_fee"
    }

    fn action_flags(&self) -> ActionFlags {
        ActionFlags::ALLOW_WHILE_PAUSED
    }

    fn required_permission(&self) -> Permissions {
        Permissions::PARK_FUNDING
    }

    fn query(&self, _ctx: &SimulationContext, _flags: CommandFlags) -> GameActionResult {
        if self.fee < 0 {
            return GameActionResult::error(
                ActionError::InvalidParameters,
                strings::CANT_CHANGE_THIS,
                strings::INVALID_PARAMETERS,
            );
        }
        if self.fee > MAX_ENTRANCE_FEE {
            return GameActionResult::error(ActionError::InvalidParameters, strings::CANT_CHANGE_THIS, strings::FEE_TOO_HIGH);
        }
        GameActionResult::ok()
    }

    fn execute(&self, ctx: &mut SimulationContext, flags: CommandFlags) -> GameActionResult {
        let result = self.query(ctx, flags);
        if result.is_ok() {
            ctx.park.entrance_fee = self.fee;
        }
        result
    }
}

/// Toggle one cheat. `cheat` is the [`CheatKind`] discriminant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCheat {
    pub cheat: u8,
    pub enabled: bool,
}

impl GameAction for SetCheat {
    fn opcode(&self) -> ActionType {
        opcodes::SET_CHEAT
    }

    fn name(&self) -> &'static str {
        "set_cheat"
    }

    fn action_flags(&self) -> ActionFlags {
        ActionFlags::ALLOW_WHILE_PAUSED
    }

    fn required_permission(&self) -> Permissions {
        Permissions::CHEAT
    }

    fn query(&self, _ctx: &SimulationContext, _flags: CommandFlags) -> GameActionResult {
        match CheatKind::from_u8(self.cheat) {
            Some(_) => GameActionResult::ok(),
            None => GameActionResult::error(ActionError::InvalidParameters, strings::CANT_DO_THIS, strings::INVALID_PARAMETERS),
        }
    }

    fn execute(&self, ctx: &mut SimulationContext, flags: CommandFlags) -> GameActionResult {
        let result = self.query(ctx, flags);
        if let Some(kind) = CheatKind::from_u8(self.cheat)
            && result.is_ok()
        {
            ctx.cheats.set(kind, self.enabled);
            info!(tick = ctx.current_ticks, cheat = ?kind, enabled = self.enabled, "cheat changed");
        }
        result
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseToggle;

impl GameAction for PauseToggle {
    fn opcode(&self) -> ActionType {
        opcodes::PAUSE_TOGGLE
    }

    fn name(&self) -> &'static str {
        "pause_toggle"
    }

    fn action_flags(&self) -> ActionFlags {
        ActionFlags::ALLOW_WHILE_PAUSED
    }

    fn required_permission(&self) -> Permissions {
        Permissions::TOGGLE_PAUSE
    }

    fn query(&self, _ctx: &SimulationContext, _flags: CommandFlags) -> GameActionResult {
        GameActionResult::ok()
    }

    fn execute(&self, ctx: &mut SimulationContext, _flags: CommandFlags) -> GameActionResult {
        ctx.toggle_pause();
        GameActionResult::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tycoon_core::action::ActionEnvelope;
    use tycoon_core::dispatcher::{ActionQueue, NullSink};
    use tycoon_core::fixed::money;
    use tycoon_core::id::PlayerId;
    use tycoon_core::player::Player;
    use tycoon_core::test_utils::test_context;

    #[test]
    fn entrance_fee_bounds() {
        let mut ctx = test_context();
        let mut queue = ActionQueue::new();
        let set = |fee| ActionEnvelope::of(SetParkEntranceFee { fee });

        assert!(queue.execute(&mut ctx, set(money(25)), &mut NullSink).is_ok());
        assert_eq!(ctx.park.entrance_fee, money(25));

        let too_high = queue.execute(&mut ctx, set(MAX_ENTRANCE_FEE + 1), &mut NullSink);
        assert_eq!(too_high.error_message, strings::FEE_TOO_HIGH);
        assert_eq!(queue.execute(&mut ctx, set(-1), &mut NullSink).error, ActionError::InvalidParameters);
        assert_eq!(ctx.park.entrance_fee, money(25));
    }

    #[test]
    fn fee_may_change_while_paused() {
        let mut ctx = test_context();
        ctx.pause();
        let mut queue = ActionQueue::new();
        let result = queue.execute(&mut ctx, ActionEnvelope::of(SetParkEntranceFee { fee: 0 }), &mut NullSink);
        assert!(result.is_ok());
    }

    #[test]
    fn cheat_toggles_and_rejects_unknown() {
        let mut ctx = test_context();
        let mut queue = ActionQueue::new();
        let no_money = SetCheat {
            cheat: CheatKind::NoMoney as u8,
            enabled: true,
        };
        assert!(queue.execute(&mut ctx, ActionEnvelope::of(no_money), &mut NullSink).is_ok());
        assert!(ctx.cheats.no_money);

        let bogus = SetCheat { cheat: 200, enabled: true };
        assert_eq!(
            queue.execute(&mut ctx, ActionEnvelope::of(bogus), &mut NullSink).error,
            ActionError::InvalidParameters
        );
    }

    #[test]
    fn pause_requires_permission() {
        let mut ctx = test_context();
        ctx.players.insert(PlayerId(2), Player::new("guest", Permissions::BUILD));
        let mut queue = ActionQueue::new();

        let denied = queue.execute(&mut ctx, ActionEnvelope::of(PauseToggle).with_player(PlayerId(2)), &mut NullSink);
        assert_eq!(denied.error, ActionError::Disallowed);
        assert!(!ctx.is_paused());

        assert!(queue.execute(&mut ctx, ActionEnvelope::of(PauseToggle), &mut NullSink).is_ok());
        assert!(ctx.is_paused());
        assert!(queue.execute(&mut ctx, ActionEnvelope::of(PauseToggle), &mut NullSink).is_ok());
        assert!(!ctx.is_paused());
    }
}
