//! The tick update loop.
//!
//! [`Game`] owns the simulation context together with every service that
//! feeds or observes it: the action queue, the replay manager, the snapshot
//! store, the network link and the news feed. Each call to
//! [`Game::update_logic`] runs one cycle:
//!
//! 1. **Gate** -- a network client never runs a tick the server has not declared
//! 2. **Replay** -- recording checksum or auto-stop; playback comparison and command injection
//! 3. **Network in** -- decode received packets and queue them
//! 4. **Rules** -- date, weather, entities, rides, finance, research, rating
//! 5. **Actions** -- drain the queue; executed actions go to the recorder and the broadcast
//! 6. **Server** -- snapshot when debugging desyncs; declare the tick with its checksum
//! 7. **Client** -- compare the local checksum against the server's
//! 8. **Bookkeeping** -- advance the tick counter; flush the network
//!
//! A cycle that starts paused skips steps 4, 6, 7 and the tick advance, and
//! only pausable actions run. The rules therefore run exactly once per tick.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::action::{
    ActionEnvelope, ActionError, ActionFlags, ActionOrigin, CommandFlags, GameActionResult,
    effective_flags, strings,
};
use crate::config::{ConfigError, SimulationConfig};
use crate::context::SimulationContext;
use crate::dispatcher::{ActionQueue, ExecutionSink};
use crate::fixed::Ticks;
use crate::network::{NetworkLink, NetworkMode, OfflineLink};
use crate::news::{NewsFeed, NewsKind};
use crate::registry::ActionRegistry;
use crate::replay::{ReplayError, ReplayEvent, ReplayManager};
use crate::simulation::run_tick;
use crate::snapshot::SnapshotStore;

/// Action history entries kept by the game's queue.
const QUEUE_HISTORY: usize = 256;

// ---------------------------------------------------------------------------
// Execution sink
// ---------------------------------------------------------------------------

/// Routes executed actions to the replay recorder and, on a server, to the
/// outgoing broadcast.
struct TickSink<'a> {
    replay: &'a mut ReplayManager,
    network: &'a mut dyn NetworkLink,
}

impl ExecutionSink for TickSink<'_> {
    fn on_executed(&mut self, tick: Ticks, envelope: &ActionEnvelope, _result: &GameActionResult) {
        if effective_flags(envelope.action.as_ref(), envelope.flags).contains(ActionFlags::CLIENT_ONLY) {
            return;
        }
        if self.replay.wants_actions()
            && let Err(e) = self.replay.add_game_action(tick, envelope)
        {
            error!(tick, opcode = envelope.opcode().0, error = %e, "failed to record action");
        }
        if self.network.mode() == NetworkMode::Server {
            match envelope.to_packet() {
                Ok(packet) => self.network.send_action(packet, tick),
                Err(e) => error!(tick, opcode = envelope.opcode().0, error = %e, "failed to broadcast action"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

pub struct Game {
    ctx: SimulationContext,
    registry: Arc<ActionRegistry>,
    queue: ActionQueue,
    snapshots: SnapshotStore,
    replay: ReplayManager,
    network: Box<dyn NetworkLink>,
    news: NewsFeed,
    config: SimulationConfig,
    /// Real time not yet converted into ticks.
    accumulator_ms: u64,
    step_requested: bool,
    desync_tick: Option<Ticks>,
}

impl Game {
    /// A fresh park seeded from the config.
    pub fn new(config: SimulationConfig, registry: Arc<ActionRegistry>) -> Result<Self, ConfigError> {
        let ctx = SimulationContext::new(config.seed, config.entity_capacity);
        Self::from_context(config, registry, ctx)
    }

    pub fn from_context(
        config: SimulationConfig,
        registry: Arc<ActionRegistry>,
        ctx: SimulationContext,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            ctx,
            registry,
            queue: ActionQueue::with_max_history(QUEUE_HISTORY),
            snapshots: SnapshotStore::new(config.snapshot_capacity),
            replay: ReplayManager::new(config.replay_directory.clone(), config.checksum_interval),
            network: Box::new(OfflineLink),
            news: NewsFeed::default(),
            config,
            accumulator_ms: 0,
            step_requested: false,
            desync_tick: None,
        })
    }

    pub fn with_network(mut self, network: Box<dyn NetworkLink>) -> Self {
        self.network = network;
        self
    }

    // -- accessors ----------------------------------------------------------

    pub fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut SimulationContext {
        &mut self.ctx
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut ActionQueue {
        &mut self.queue
    }

    pub fn replay(&self) -> &ReplayManager {
        &self.replay
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn news(&self) -> &NewsFeed {
        &self.news
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn network_mode(&self) -> NetworkMode {
        self.network.mode()
    }

    pub fn is_desynchronised(&self) -> bool {
        self.desync_tick.is_some()
    }

    /// First tick whose checksum disagreed with the server.
    pub fn desync_tick(&self) -> Option<Ticks> {
        self.desync_tick
    }

    // -- time ---------------------------------------------------------------

    /// Convert elapsed real time into ticks. At most `max_catchup_ticks` run
    /// per call; any further backlog is dropped. Returns the ticks run.
    pub fn update(&mut self, elapsed_ms: u64) -> u32 {
        let tick_ms = u64::from(self.config.tick_duration_ms.max(1));
        self.accumulator_ms = self.accumulator_ms.saturating_add(elapsed_ms);
        let due = self.accumulator_ms / tick_ms;
        let burst = due.min(u64::from(self.config.max_catchup_ticks));

        if due > burst {
            debug!(due, burst, "dropping tick backlog");
            self.accumulator_ms %= tick_ms;
        } else {
            self.accumulator_ms -= burst * tick_ms;
        }

        let mut ran = 0;
        for _ in 0..burst {
            if self.update_logic() {
                ran += 1;
            }
        }
        ran
    }

    /// Run exactly one full cycle on the next `update_logic` while paused,
    /// then pause again. Ignored on a network client and during playback,
    /// which steps on its own wherever the recording did.
    pub fn step_once(&mut self) {
        let replaying = self.replay.is_playing() || self.replay.is_normalising();
        if self.network.mode() != NetworkMode::Client && !replaying {
            self.step_requested = true;
        }
    }

    /// One cycle of the loop. Returns false when a client had to wait for
    /// the server.
    pub fn update_logic(&mut self) -> bool {
        let mode = self.network.mode();

        // Phase 1: Gate.
        if mode == NetworkMode::Client && self.ctx.current_ticks >= self.network.server_tick() {
            return false;
        }
        let requested = std::mem::take(&mut self.step_requested) || self.replay.needs_step(&self.ctx);
        let stepping = requested && self.ctx.is_paused();
        if stepping {
            self.ctx.resume();
        }
        // A cycle that starts paused neither runs the rules nor advances,
        // even if an action unpauses the game part way through.
        let advancing = !self.ctx.is_paused();

        // Phase 2: Replay.
        self.replay.update(&self.ctx, &mut self.queue, &self.registry);
        self.drain_replay_events();

        // Phase 3: Network in.
        self.receive_network_actions(mode);

        // Phase 4: Rules.
        if advancing {
            run_tick(&mut self.ctx);
            self.replay.note_rules_ran(self.ctx.current_ticks);
        }

        // Phase 5: Actions.
        let mut sink = TickSink {
            replay: &mut self.replay,
            network: self.network.as_mut(),
        };
        self.queue.process_queue(&mut self.ctx, &mut sink);
        self.drain_replay_events();

        let tick = self.ctx.current_ticks;

        // Phase 6: Server.
        if mode == NetworkMode::Server && advancing {
            if self.config.desync_debugging
                && let Err(e) = self.snapshots.capture_current(&self.ctx)
            {
                warn!(tick, error = %e, "snapshot capture failed");
            }
            self.network.broadcast_tick(tick, self.ctx.checksum());
        }

        // Phase 7: Client.
        if mode == NetworkMode::Client && advancing {
            self.check_server_checksum(tick);
        }

        // Phase 8: Bookkeeping.
        if advancing {
            self.ctx.current_ticks += 1;
        }
        if stepping {
            self.ctx.pause();
        }
        self.network.flush();
        true
    }

    fn receive_network_actions(&mut self, mode: NetworkMode) {
        for (tick, packet) in self.network.receive_actions() {
            let envelope = match self.registry.envelope_from_packet(&packet, ActionOrigin::Network) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(tick, opcode = packet.opcode.0, error = %e, "dropping undecodable network action");
                    continue;
                }
            };
            let flags = envelope.flags.with(CommandFlags::NETWORKED);
            // Clients run actions on the tick the server ran them.
            let at = match mode {
                NetworkMode::Client => tick,
                _ => self.ctx.current_ticks,
            };
            self.queue.enqueue(envelope.with_flags(flags), at);
        }
    }

    fn check_server_checksum(&mut self, tick: Ticks) {
        let Some(expected) = self.network.server_checksum(tick) else {
            return;
        };
        let actual = self.ctx.checksum();
        if actual == expected || self.desync_tick.is_some() {
            return;
        }
        warn!(tick, expected = %expected, actual = %actual, "client desynchronised from server");
        self.desync_tick = Some(tick);
        self.news.post(
            tick,
            NewsKind::Desync,
            format!("Desynchronised from the server at tick {tick}"),
        );
        if self.config.desync_debugging
            && let Err(e) = self.snapshots.capture_current(&self.ctx)
        {
            warn!(tick, error = %e, "snapshot capture failed");
        }
    }

    fn drain_replay_events(&mut self) {
        let tick = self.ctx.current_ticks;
        for event in self.replay.drain_events() {
            let (kind, text) = match event {
                ReplayEvent::RecordingStarted { name } => (NewsKind::Replay, format!("Recording replay '{name}'")),
                ReplayEvent::RecordingStopped { path } => {
                    (NewsKind::Replay, format!("Replay saved to {}", path.display()))
                }
                ReplayEvent::PlaybackStarted { name } => (NewsKind::Replay, format!("Playing replay '{name}'")),
                ReplayEvent::PlaybackFinished { mismatched: false } => {
                    (NewsKind::Replay, String::from("Replay finished"))
                }
                ReplayEvent::PlaybackFinished { mismatched: true } => {
                    (NewsKind::Desync, String::from("Replay finished out of sync"))
                }
                ReplayEvent::ChecksumMismatch { tick } => {
                    (NewsKind::Desync, format!("Replay diverged at tick {tick}"))
                }
                ReplayEvent::NormalisationFinished { path } => {
                    (NewsKind::Replay, format!("Normalised replay written to {}", path.display()))
                }
            };
            info!(tick, news = %text, "news");
            self.news.post(tick, kind, text);
        }
    }

    // -- actions ------------------------------------------------------------

    /// Local entry point for player actions.
    ///
    /// Client-only actions run at once. A network client forwards everything
    /// else to the server. Otherwise the action runs at once while paused (if
    /// it may) and is queued for the current tick when running; the returned
    /// result is then the preview, and the envelope's callback receives the
    /// final result.
    pub fn execute_action(&mut self, envelope: ActionEnvelope) -> GameActionResult {
        let flags = effective_flags(envelope.action.as_ref(), envelope.flags);
        if self.replay.is_playing() || self.replay.is_normalising() {
            debug!(opcode = envelope.opcode().0, "local action ignored during replay playback");
            return GameActionResult::error(ActionError::Disallowed, strings::CANT_DO_THIS, strings::PERMISSION_DENIED);
        }

        if flags.contains(ActionFlags::CLIENT_ONLY) {
            return self.execute_now(envelope);
        }

        if self.network.mode() == NetworkMode::Client {
            let preview = self.queue.query(&self.ctx, &envelope);
            if !preview.is_ok() {
                return preview;
            }
            match envelope.to_packet() {
                Ok(packet) => self.network.send_action(packet, self.ctx.current_ticks),
                Err(e) => {
                    error!(opcode = envelope.opcode().0, error = %e, "failed to submit action");
                    return GameActionResult::error(
                        ActionError::InvalidParameters,
                        strings::CANT_DO_THIS,
                        strings::INVALID_PARAMETERS,
                    );
                }
            }
            return preview;
        }

        if self.ctx.is_paused() {
            return self.execute_now(envelope);
        }
        let preview = self.queue.query(&self.ctx, &envelope);
        if preview.is_ok() {
            self.queue.enqueue(envelope, self.ctx.current_ticks);
        }
        preview
    }

    fn execute_now(&mut self, envelope: ActionEnvelope) -> GameActionResult {
        // Playback compares this tick before the action is re-run.
        self.replay.sample_checksum(&self.ctx);
        let mut sink = TickSink {
            replay: &mut self.replay,
            network: self.network.as_mut(),
        };
        let result = self.queue.execute(&mut self.ctx, envelope, &mut sink);
        self.drain_replay_events();
        result
    }

    // -- replay -------------------------------------------------------------

    /// Record to `<replay_directory>/<name>.sv6r`, bounded by `max_replay_ticks`.
    pub fn start_recording(&mut self, name: &str) -> Result<(), ReplayError> {
        let max_ticks = self.config.max_replay_ticks;
        self.start_recording_to(name, max_ticks, None)
    }

    pub fn start_recording_to(&mut self, name: &str, max_ticks: Ticks, path: Option<&Path>) -> Result<(), ReplayError> {
        let result = self.replay.start_recording(&self.ctx, name, max_ticks, path);
        self.drain_replay_events();
        result
    }

    pub fn stop_recording(&mut self) -> Result<PathBuf, ReplayError> {
        let result = self.replay.stop_recording(&self.ctx);
        self.drain_replay_events();
        result
    }

    /// Replace the park with a replay's baseline and play it. Pending local
    /// actions are discarded.
    pub fn start_playback(&mut self, path: &Path) -> Result<(), ReplayError> {
        self.replay.start_playback(&mut self.ctx, &self.registry, path)?;
        self.reset_after_load();
        Ok(())
    }

    pub fn stop_playback(&mut self) {
        self.replay.stop_playback();
        self.drain_replay_events();
    }

    pub fn normalise_replay(&mut self, input: &Path, output: &Path) -> Result<(), ReplayError> {
        self.replay.normalise_replay(&mut self.ctx, &self.registry, input, output)?;
        self.reset_after_load();
        Ok(())
    }

    fn reset_after_load(&mut self) {
        self.queue.clear();
        self.snapshots.clear();
        self.accumulator_ms = 0;
        self.desync_tick = None;
        self.drain_replay_events();
    }
}

impl std::fmt::Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("tick", &self.ctx.current_ticks)
            .field("paused", &self.ctx.is_paused())
            .field("mode", &self.network.mode())
            .field("replay", &self.replay.mode())
            .field("queue", &self.queue)
            .finish()
    }
}
