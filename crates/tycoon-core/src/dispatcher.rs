//! Action queue and the top-level execution pipeline.
//!
//! Actions wait in a min-heap keyed by `(tick, command_index)` and are
//! drained at tick boundaries, so execution order never depends on arrival
//! order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tracing::{debug, info, warn};

use crate::action::{
    ActionEnvelope, ActionError, ActionFlags, ActionOrigin, CommandFlags, GameAction,
    GameActionResult, effective_flags, strings,
};
use crate::context::SimulationContext;
use crate::fixed::Ticks;
use crate::id::{ActionType, PlayerId};

// ---------------------------------------------------------------------------
// Execution sink
// ---------------------------------------------------------------------------

/// Receives every action that completed `execute` at the top level.
pub trait ExecutionSink {
    fn on_executed(&mut self, tick: Ticks, envelope: &ActionEnvelope, result: &GameActionResult);
}

impl<F> ExecutionSink for F
where
    F: FnMut(Ticks, &ActionEnvelope, &GameActionResult),
{
    fn on_executed(&mut self, tick: Ticks, envelope: &ActionEnvelope, result: &GameActionResult) {
        self(tick, envelope, result)
    }
}

/// Discards executed actions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ExecutionSink for NullSink {
    fn on_executed(&mut self, _tick: Ticks, _envelope: &ActionEnvelope, _result: &GameActionResult) {}
}

// ---------------------------------------------------------------------------
// Queue entries
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct QueuedAction {
    tick: Ticks,
    command_index: u32,
    envelope: ActionEnvelope,
}

impl QueuedAction {
    fn key(&self) -> (Ticks, u32) {
        (self.tick, self.command_index)
    }
}

impl PartialEq for QueuedAction {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for QueuedAction {}

impl PartialOrd for QueuedAction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedAction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// One executed (or rejected) top-level action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRecord {
    pub tick: Ticks,
    pub opcode: ActionType,
    pub player: PlayerId,
    pub error: ActionError,
}

// ---------------------------------------------------------------------------
// ActionQueue
// ---------------------------------------------------------------------------

pub struct ActionQueue {
    heap: BinaryHeap<Reverse<QueuedAction>>,
    next_command_index: u32,
    next_network_id: u32,
    suspended: bool,
    history: Vec<ExecutionRecord>,
    /// Maximum history entries to retain. 0 = no history.
    max_history: usize,
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::with_max_history(0)
    }

    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_command_index: 0,
            next_network_id: 1,
            suspended: false,
            history: Vec::new(),
            max_history,
        }
    }

    /// Queue an envelope to run at `tick`. Envelopes without a network id
    /// receive the next one.
    pub fn enqueue(&mut self, mut envelope: ActionEnvelope, tick: Ticks) {
        if envelope.network_id == 0 {
            envelope.network_id = self.next_network_id;
            self.next_network_id = self.next_network_id.wrapping_add(1).max(1);
        }
        let command_index = self.next_command_index;
        self.next_command_index = self.next_command_index.wrapping_add(1);
        self.heap.push(Reverse(QueuedAction {
            tick,
            command_index,
            envelope,
        }));
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Tick of the earliest queued entry.
    pub fn next_tick(&self) -> Option<Ticks> {
        self.heap.peek().map(|Reverse(q)| q.tick)
    }

    /// Drop every pending entry.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn suspend(&mut self) {
        if !self.suspended {
            info!(pending = self.heap.len(), "action queue suspended");
        }
        self.suspended = true;
    }

    pub fn resume(&mut self) {
        if self.suspended {
            info!(pending = self.heap.len(), "action queue resumed");
        }
        self.suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn history(&self) -> &[ExecutionRecord] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Execute every entry due at or before the current tick, in key order.
    /// While paused, entries that may not run while paused stay queued.
    /// Returns the number of entries dispatched.
    pub fn process_queue(&mut self, ctx: &mut SimulationContext, sink: &mut dyn ExecutionSink) -> usize {
        if self.suspended {
            return 0;
        }
        let now = ctx.current_ticks;
        let mut held = Vec::new();
        let mut dispatched = 0;

        while self.heap.peek().is_some_and(|Reverse(q)| q.tick <= now) {
            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };
            if ctx.is_paused() && !may_run_while_paused(ctx, entry.envelope.action.as_ref(), entry.envelope.flags) {
                held.push(entry);
                continue;
            }
            if entry.tick < now {
                warn!(
                    tick = now,
                    scheduled = entry.tick,
                    opcode = entry.envelope.opcode().0,
                    "executing late action"
                );
            }
            self.execute(ctx, entry.envelope, sink);
            dispatched += 1;
        }

        for entry in held {
            self.heap.push(Reverse(entry));
        }
        dispatched
    }

    /// Run one envelope through the full top-level pipeline.
    pub fn execute(
        &mut self,
        ctx: &mut SimulationContext,
        mut envelope: ActionEnvelope,
        sink: &mut dyn ExecutionSink,
    ) -> GameActionResult {
        let (result, executed) = run_pipeline(ctx, &envelope);
        let tick = ctx.current_ticks;

        if !result.is_ok() {
            debug!(
                tick,
                opcode = envelope.opcode().0,
                action = envelope.action.name(),
                error = ?result.error,
                "action rejected"
            );
        }
        self.record(ExecutionRecord {
            tick,
            opcode: envelope.opcode(),
            player: envelope.player,
            error: result.error,
        });

        if executed {
            sink.on_executed(tick, &envelope, &result);
        }
        if let Some(callback) = envelope.take_callback() {
            callback(&result);
        }
        result
    }

    /// Validate and price an envelope without executing it.
    pub fn query(&self, ctx: &SimulationContext, envelope: &ActionEnvelope) -> GameActionResult {
        match precheck(ctx, envelope) {
            Some(rejection) => rejection,
            None => envelope.action.query(ctx, envelope.flags),
        }
    }

    fn record(&mut self, record: ExecutionRecord) {
        if self.max_history == 0 {
            return;
        }
        self.history.push(record);
        let excess = self.history.len().saturating_sub(self.max_history);
        if excess > 0 {
            self.history.drain(..excess);
        }
    }
}

impl std::fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionQueue")
            .field("pending", &self.heap.len())
            .field("suspended", &self.suspended)
            .field("next_command_index", &self.next_command_index)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Whether `action` may run while the game is paused, given its command flags
/// and the build-in-pause-mode cheat.
pub fn may_run_while_paused(ctx: &SimulationContext, action: &dyn GameAction, flags: CommandFlags) -> bool {
    effective_flags(action, flags).contains(ActionFlags::ALLOW_WHILE_PAUSED) || ctx.cheats.build_in_pause_mode
}

/// Pause, editor, permission and cooldown checks.
fn precheck(ctx: &SimulationContext, envelope: &ActionEnvelope) -> Option<GameActionResult> {
    let action = envelope.action.as_ref();
    let flags = effective_flags(action, envelope.flags);

    if ctx.is_paused() && !may_run_while_paused(ctx, action, envelope.flags) {
        return Some(GameActionResult::error(
            ActionError::GamePaused,
            strings::CANT_DO_THIS,
            strings::NOT_ALLOWED_WHILE_PAUSED,
        ));
    }
    if flags.contains(ActionFlags::EDITOR_ONLY) && !ctx.editor_mode {
        return Some(GameActionResult::error(
            ActionError::NotInEditorMode,
            strings::CANT_DO_THIS,
            strings::ONLY_IN_EDITOR,
        ));
    }

    // Recorded actions were authorised when they were recorded.
    if envelope.origin == ActionOrigin::Replay {
        return None;
    }
    let Some(player) = ctx.players.get(envelope.player) else {
        return Some(GameActionResult::error(
            ActionError::Disallowed,
            strings::CANT_DO_THIS,
            strings::PERMISSION_DENIED,
        ));
    };
    if !player.permissions.contains(action.required_permission()) {
        return Some(GameActionResult::error(
            ActionError::Disallowed,
            strings::CANT_DO_THIS,
            strings::PERMISSION_DENIED,
        ));
    }
    if player.is_cooling_down(action.opcode(), action.cooldown_ticks(), ctx.current_ticks) {
        return Some(GameActionResult::error(
            ActionError::Disallowed,
            strings::CANT_DO_THIS,
            strings::ACTION_COOLING_DOWN,
        ));
    }
    None
}

fn spends(ctx: &SimulationContext, flags: CommandFlags) -> bool {
    !flags.intersects(CommandFlags::NO_SPEND | CommandFlags::GHOST) && !ctx.cheats.no_money
}

/// Returns the result and whether `execute` ran.
fn run_pipeline(ctx: &mut SimulationContext, envelope: &ActionEnvelope) -> (GameActionResult, bool) {
    if let Some(rejection) = precheck(ctx, envelope) {
        return (rejection, false);
    }
    let action = envelope.action.as_ref();
    let flags = envelope.flags;

    let query = action.query(ctx, flags);
    if !query.is_ok() {
        return (query, false);
    }
    if spends(ctx, flags) && query.cost > 0 && query.cost > ctx.park.cash {
        return (
            GameActionResult::error(ActionError::InsufficientFunds, query.error_title, strings::NOT_ENOUGH_CASH)
                .with_args(query.cost.to_le_bytes().to_vec()),
            false,
        );
    }
    // Ghosts are placement previews and never touch simulation state.
    if !flags.contains(CommandFlags::APPLY) || flags.contains(CommandFlags::GHOST) {
        return (query, false);
    }

    let result = action.execute(ctx, flags);
    if !result.is_ok() {
        return (result, true);
    }
    if spends(ctx, flags) && !flags.contains(CommandFlags::NO_FINANCE_EFFECT) && result.cost != 0 {
        ctx.park.spend(result.expenditure, result.cost);
    }
    if envelope.origin != ActionOrigin::Replay {
        let now = ctx.current_ticks;
        if let Some(player) = ctx.players.get_mut(envelope.player) {
            player.stamp(action.opcode(), now);
        }
    }
    (result, true)
}

/// Run an action from inside another action's `execute`. Skips the pause,
/// permission, cooldown, funds and finance bookkeeping of the top level.
pub fn execute_nested(
    ctx: &mut SimulationContext,
    action: &dyn GameAction,
    flags: CommandFlags,
) -> GameActionResult {
    let query = action.query(ctx, flags);
    if !query.is_ok() || !flags.contains(CommandFlags::APPLY) || flags.contains(CommandFlags::GHOST) {
        return query;
    }
    action.execute(ctx, flags)
}
