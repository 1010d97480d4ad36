//! Replay recording, playback and normalisation.
//!
//! A recording captures a baseline park image plus every top-level action
//! that executed, keyed by `(tick, command_index)`, and a state checksum at a
//! fixed tick interval. Playback restores the baseline and re-injects the
//! commands through the normal action queue, comparing checksums as it goes.
//! Normalisation plays a replay back while recording a fresh copy of it.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};

use crate::action::{ActionEnvelope, ActionOrigin, ActionPacket, CommandFlags};
use crate::checksum::StateChecksum;
use crate::cheats::Cheats;
use crate::context::SimulationContext;
use crate::dispatcher::ActionQueue;
use crate::entity::EntityTable;
use crate::fixed::Ticks;
use crate::park::ParkParameters;
use crate::registry::{ActionDecodeError, ActionRegistry};
use crate::replay_format::{
    self, ChecksumEntry, NETWORK_STREAM_VERSION, REPLAY_MAGIC, REPLAY_VERSION, ReplayPayload,
    SerializedCommand,
};
use crate::serialize::{DeserializeError, SerializeError, decode_park_image, export_park};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("replay manager is busy ({0:?})")]
    Busy(ReplayMode),
    #[error("no recording in progress")]
    NotRecording,
    #[error("replay file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("replay is corrupt: {0}")]
    Corrupt(String),
    #[error("unsupported replay version {found} (this build reads {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },
    #[error("replay encoding failed: {0}")]
    Encode(String),
    #[error("replay command {index} cannot be decoded: {source}")]
    Command {
        index: usize,
        #[source]
        source: ActionDecodeError,
    },
    #[error("baseline park image: {0}")]
    ParkImage(#[from] DeserializeError),
    #[error("park export failed: {0}")]
    Export(#[from] SerializeError),
    #[error("spatial index of the baseline image does not match the recording")]
    SpatialIndexMismatch,
}

// ---------------------------------------------------------------------------
// Recorded data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplayMode {
    #[default]
    None,
    Recording,
    Playing,
    /// Playing one replay while recording its corrected copy.
    Normalisation,
}

#[derive(Debug, Clone)]
pub struct ReplayCommand {
    pub tick: Ticks,
    pub command_index: u32,
    pub packet: ActionPacket,
    /// Executed before its tick's rules ran.
    pub paused: bool,
}

impl ReplayCommand {
    fn key(&self) -> (Ticks, u32) {
        (self.tick, self.command_index)
    }

    fn to_serialized(&self) -> SerializedCommand {
        SerializedCommand {
            tick: self.tick,
            command_index: self.command_index,
            opcode: self.packet.opcode,
            player: self.packet.player,
            flags: self.packet.flags,
            network_id: self.packet.network_id,
            payload: self.packet.payload.clone(),
            paused: self.paused,
        }
    }

    fn from_serialized(command: SerializedCommand) -> Self {
        Self {
            tick: command.tick,
            command_index: command.command_index,
            packet: ActionPacket {
                opcode: command.opcode,
                player: command.player,
                flags: command.flags,
                network_id: command.network_id,
                payload: command.payload,
            },
            paused: command.paused,
        }
    }
}

impl PartialEq for ReplayCommand {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ReplayCommand {}

impl PartialOrd for ReplayCommand {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReplayCommand {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// One recording, in memory.
#[derive(Debug)]
pub struct ReplayRecordData {
    pub magic: u32,
    pub version: u16,
    pub network_version: String,
    pub name: String,
    pub time_recorded: u64,
    pub park_image: Vec<u8>,
    pub parameters: ParkParameters,
    pub cheats: Cheats,
    pub spatial_index: Vec<(u32, Vec<u16>)>,
    pub tick_start: Ticks,
    pub tick_end: Ticks,
    pub commands: BinaryHeap<Reverse<ReplayCommand>>,
    pub checksums: Vec<(Ticks, StateChecksum)>,
    pub file_path: PathBuf,
    next_command_index: u32,
    /// Playback position in `checksums`.
    checksum_cursor: usize,
}

/// Summary of a recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayRecordInfo {
    pub version: u16,
    pub name: String,
    pub time_recorded: u64,
    pub ticks: Ticks,
    pub num_commands: usize,
    pub num_checksums: usize,
    pub file_path: PathBuf,
}

fn flatten_spatial_index(entities: &EntityTable) -> Vec<(u32, Vec<u16>)> {
    entities
        .spatial_index()
        .into_iter()
        .map(|(tile, ids)| (tile, ids.into_iter().map(|id| id.0).collect()))
        .collect()
}

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl ReplayRecordData {
    fn begin(ctx: &SimulationContext, name: &str, max_ticks: Ticks, file_path: PathBuf) -> Result<Self, ReplayError> {
        let tick_start = ctx.current_ticks;
        let tick_end = if max_ticks == 0 {
            Ticks::MAX
        } else {
            tick_start.saturating_add(max_ticks)
        };
        Ok(Self {
            magic: REPLAY_MAGIC,
            version: REPLAY_VERSION,
            network_version: NETWORK_STREAM_VERSION.to_string(),
            name: name.to_string(),
            time_recorded: unix_time(),
            park_image: export_park(ctx)?,
            parameters: ctx.park.parameters(),
            cheats: ctx.cheats,
            spatial_index: flatten_spatial_index(&ctx.entities),
            tick_start,
            tick_end,
            commands: BinaryHeap::new(),
            checksums: Vec::new(),
            file_path,
            next_command_index: 0,
            checksum_cursor: 0,
        })
    }

    fn from_payload(payload: ReplayPayload, file_path: PathBuf) -> Self {
        let next_command_index = payload
            .commands
            .iter()
            .map(|c| c.command_index.wrapping_add(1))
            .max()
            .unwrap_or(0);
        Self {
            magic: payload.magic,
            version: payload.version,
            network_version: payload.network_version,
            name: payload.name,
            time_recorded: payload.time_recorded,
            park_image: payload.park_image,
            parameters: payload.parameters,
            cheats: payload.cheats,
            spatial_index: payload.spatial_index,
            tick_start: payload.tick_start,
            tick_end: payload.tick_end,
            commands: payload
                .commands
                .into_iter()
                .map(|c| Reverse(ReplayCommand::from_serialized(c)))
                .collect(),
            checksums: payload
                .checksums
                .into_iter()
                .map(|c| (c.tick, StateChecksum(c.checksum)))
                .collect(),
            file_path,
            next_command_index,
            checksum_cursor: 0,
        }
    }

    fn to_payload(&self, tick_end: Ticks) -> ReplayPayload {
        let mut commands: Vec<&ReplayCommand> = self.commands.iter().map(|Reverse(c)| c).collect();
        commands.sort();
        ReplayPayload {
            magic: self.magic,
            version: self.version,
            network_version: self.network_version.clone(),
            name: self.name.clone(),
            time_recorded: self.time_recorded,
            park_image: self.park_image.clone(),
            parameters: self.parameters.clone(),
            cheats: self.cheats,
            spatial_index: self.spatial_index.clone(),
            tick_start: self.tick_start,
            tick_end,
            commands: commands.into_iter().map(ReplayCommand::to_serialized).collect(),
            checksums: self
                .checksums
                .iter()
                .map(|(tick, checksum)| ChecksumEntry {
                    tick: *tick,
                    checksum: checksum.0,
                })
                .collect(),
        }
    }

    fn push_command(&mut self, tick: Ticks, packet: ActionPacket, paused: bool) {
        let command_index = self.next_command_index;
        self.next_command_index = self.next_command_index.wrapping_add(1);
        self.commands.push(Reverse(ReplayCommand {
            tick,
            command_index,
            packet,
            paused,
        }));
    }

    /// Push the checksum for the current tick, at most once per tick.
    fn sample_checksum(&mut self, ctx: &SimulationContext, interval: Ticks) {
        let tick = ctx.current_ticks;
        let due = tick.wrapping_sub(self.tick_start) % interval == 0;
        if due && self.checksums.last().map(|(t, _)| *t) != Some(tick) {
            self.checksums.push((tick, ctx.checksum()));
        }
    }

    pub fn info(&self) -> ReplayRecordInfo {
        ReplayRecordInfo {
            version: self.version,
            name: self.name.clone(),
            time_recorded: self.time_recorded,
            ticks: self.tick_end.saturating_sub(self.tick_start),
            num_commands: self.commands.len(),
            num_checksums: self.checksums.len(),
            file_path: self.file_path.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// State-machine transitions worth surfacing to the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayEvent {
    RecordingStarted { name: String },
    RecordingStopped { path: PathBuf },
    PlaybackStarted { name: String },
    PlaybackFinished { mismatched: bool },
    ChecksumMismatch { tick: Ticks },
    NormalisationFinished { path: PathBuf },
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ReplayManager {
    mode: ReplayMode,
    recording: Option<ReplayRecordData>,
    playback: Option<ReplayRecordData>,
    replay_directory: PathBuf,
    checksum_interval: Ticks,
    mismatching: bool,
    first_mismatch: Option<Ticks>,
    /// Last tick whose rules ran while recording.
    rules_ran: Option<Ticks>,
    events: Vec<ReplayEvent>,
}

impl Default for ReplayManager {
    fn default() -> Self {
        Self::new(PathBuf::from("replays"), 1)
    }
}

impl ReplayManager {
    /// `checksum_interval` of 0 is treated as 1.
    pub fn new(replay_directory: PathBuf, checksum_interval: Ticks) -> Self {
        Self {
            mode: ReplayMode::None,
            recording: None,
            playback: None,
            replay_directory,
            checksum_interval: checksum_interval.max(1),
            mismatching: false,
            first_mismatch: None,
            rules_ran: None,
            events: Vec::new(),
        }
    }

    pub fn mode(&self) -> ReplayMode {
        self.mode
    }

    pub fn is_recording(&self) -> bool {
        self.mode == ReplayMode::Recording
    }

    pub fn is_playing(&self) -> bool {
        self.mode == ReplayMode::Playing
    }

    pub fn is_normalising(&self) -> bool {
        self.mode == ReplayMode::Normalisation
    }

    /// True when executed actions should be captured.
    pub fn wants_actions(&self) -> bool {
        self.recording.is_some()
    }

    /// Sticky for the whole playback; cleared by the next `start_playback`.
    pub fn is_playback_state_mismatching(&self) -> bool {
        self.mismatching
    }

    pub fn first_mismatch_tick(&self) -> Option<Ticks> {
        self.first_mismatch
    }

    pub fn replay_directory(&self) -> &Path {
        &self.replay_directory
    }

    /// Info about the active recording, or else the active playback.
    pub fn current_record_info(&self) -> Option<ReplayRecordInfo> {
        self.recording
            .as_ref()
            .or(self.playback.as_ref())
            .map(ReplayRecordData::info)
    }

    pub fn drain_events(&mut self) -> Vec<ReplayEvent> {
        std::mem::take(&mut self.events)
    }

    // -- recording ----------------------------------------------------------

    /// Begin recording from the current state. `max_ticks` of 0 records until
    /// stopped. Without `path` the file goes to `<replay_directory>/<name>.sv6r`.
    pub fn start_recording(
        &mut self,
        ctx: &SimulationContext,
        name: &str,
        max_ticks: Ticks,
        path: Option<&Path>,
    ) -> Result<(), ReplayError> {
        if self.mode != ReplayMode::None {
            return Err(ReplayError::Busy(self.mode));
        }
        self.begin_recording(ctx, name, max_ticks, path)?;
        self.mode = ReplayMode::Recording;
        Ok(())
    }

    fn begin_recording(
        &mut self,
        ctx: &SimulationContext,
        name: &str,
        max_ticks: Ticks,
        path: Option<&Path>,
    ) -> Result<(), ReplayError> {
        let file_path = match path {
            Some(p) => p.to_path_buf(),
            None => replay_format::replay_path(&self.replay_directory, name),
        };
        let data = ReplayRecordData::begin(ctx, name, max_ticks, file_path)?;
        info!(
            tick = data.tick_start,
            name,
            path = %data.file_path.display(),
            "replay recording started"
        );
        self.events.push(ReplayEvent::RecordingStarted {
            name: name.to_string(),
        });
        self.recording = Some(data);
        self.rules_ran = None;
        Ok(())
    }

    /// The tick's rules have run. Actions recorded at `tick` from now on
    /// replay after them.
    pub fn note_rules_ran(&mut self, tick: Ticks) {
        self.rules_ran = Some(tick);
    }

    /// Capture an executed top-level action at `tick`.
    pub fn add_game_action(&mut self, tick: Ticks, envelope: &ActionEnvelope) -> Result<(), ReplayError> {
        let paused = self.rules_ran != Some(tick);
        let recording = self.recording.as_mut().ok_or(ReplayError::NotRecording)?;
        let mut packet = envelope
            .to_packet()
            .map_err(|e| ReplayError::Encode(e.to_string()))?;
        packet.flags = packet.flags.without(CommandFlags::REPLAY);
        recording.push_command(tick, packet, paused);
        Ok(())
    }

    /// Finish the recording at the current tick and write it. On failure the
    /// recording stays active.
    pub fn stop_recording(&mut self, ctx: &SimulationContext) -> Result<PathBuf, ReplayError> {
        let recording = self.recording.as_ref().ok_or(ReplayError::NotRecording)?;
        let tick_end = ctx.current_ticks;
        let payload = recording.to_payload(tick_end);
        if let Err(e) = replay_format::write_replay_file(&recording.file_path, &payload) {
            error!(tick = tick_end, error = %e, "failed to write replay");
            return Err(e);
        }

        let path = recording.file_path.clone();
        info!(
            tick = tick_end,
            commands = payload.commands.len(),
            checksums = payload.checksums.len(),
            path = %path.display(),
            "replay recording stopped"
        );
        self.recording = None;
        if self.mode == ReplayMode::Recording {
            self.mode = ReplayMode::None;
        }
        self.events.push(ReplayEvent::RecordingStopped { path: path.clone() });
        Ok(path)
    }

    // -- playback -----------------------------------------------------------

    /// Load a replay and restore its baseline into `ctx`. Every command is
    /// decoded and the baseline validated before `ctx` is replaced.
    pub fn start_playback(
        &mut self,
        ctx: &mut SimulationContext,
        registry: &ActionRegistry,
        path: &Path,
    ) -> Result<(), ReplayError> {
        if self.mode != ReplayMode::None {
            return Err(ReplayError::Busy(self.mode));
        }
        let data = self.load_playback(ctx, registry, path).inspect_err(|e| {
            error!(path = %path.display(), error = %e, "replay playback failed to start");
        })?;
        self.mode = ReplayMode::Playing;
        info!(
            tick = data.tick_start,
            name = %data.name,
            commands = data.commands.len(),
            "replay playback started"
        );
        self.events.push(ReplayEvent::PlaybackStarted {
            name: data.name.clone(),
        });
        self.playback = Some(data);
        Ok(())
    }

    fn load_playback(
        &mut self,
        ctx: &mut SimulationContext,
        registry: &ActionRegistry,
        path: &Path,
    ) -> Result<ReplayRecordData, ReplayError> {
        let payload = replay_format::read_replay_file(path)?;
        for (index, command) in payload.commands.iter().enumerate() {
            registry
                .decode(command.opcode, &command.payload)
                .map_err(|source| ReplayError::Command { index, source })?;
        }
        let image = decode_park_image(&payload.park_image)?;
        if flatten_spatial_index(image.entities()) != payload.spatial_index {
            return Err(ReplayError::SpatialIndexMismatch);
        }

        let mut restored = image.into_context();
        restored.cheats = payload.cheats;
        payload.parameters.apply(&mut restored.park);
        restored.current_ticks = payload.tick_start;
        *ctx = restored;

        self.mismatching = false;
        self.first_mismatch = None;
        Ok(ReplayRecordData::from_payload(payload, path.to_path_buf()))
    }

    /// End playback. Pending commands are discarded.
    pub fn stop_playback(&mut self) {
        let Some(playback) = self.playback.take() else {
            return;
        };
        info!(
            name = %playback.name,
            mismatched = self.mismatching,
            first_mismatch = ?self.first_mismatch,
            "replay playback finished"
        );
        self.events.push(ReplayEvent::PlaybackFinished {
            mismatched: self.mismatching,
        });
        if self.mode == ReplayMode::Playing {
            self.mode = ReplayMode::None;
        }
    }

    /// Play `input` back while recording to `output`. The game loop drives
    /// both; the output is written once the input's commands run out.
    pub fn normalise_replay(
        &mut self,
        ctx: &mut SimulationContext,
        registry: &ActionRegistry,
        input: &Path,
        output: &Path,
    ) -> Result<(), ReplayError> {
        self.start_playback(ctx, registry, input)?;
        let name = self
            .playback
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_default();
        if let Err(e) = self.begin_recording(ctx, &name, 0, Some(output)) {
            self.stop_playback();
            return Err(e);
        }
        self.mode = ReplayMode::Normalisation;
        Ok(())
    }

    // -- per tick -----------------------------------------------------------

    /// Run at the start of every tick, before actions are processed.
    pub fn update(&mut self, ctx: &SimulationContext, queue: &mut ActionQueue, registry: &ActionRegistry) {
        match self.mode {
            ReplayMode::None => {}
            ReplayMode::Recording => self.update_recording(ctx),
            ReplayMode::Playing => self.update_playback(ctx, queue, registry),
            ReplayMode::Normalisation => {
                self.update_recording(ctx);
                self.update_normalisation(ctx, queue, registry);
            }
        }
    }

    fn update_recording(&mut self, ctx: &SimulationContext) {
        let tick = ctx.current_ticks;
        let Some(recording) = self.recording.as_mut() else {
            return;
        };
        if self.mode == ReplayMode::Recording && tick >= recording.tick_end {
            if let Err(e) = self.stop_recording(ctx) {
                warn!(tick, error = %e, "automatic replay stop failed");
            }
            return;
        }
        recording.sample_checksum(ctx, self.checksum_interval);
    }

    /// Take the current tick's checksum sample now if it is due and not yet
    /// taken. Call before executing an action outside the tick loop, so the
    /// sample holds the state playback sees when it compares that tick.
    pub fn sample_checksum(&mut self, ctx: &SimulationContext) {
        let interval = self.checksum_interval;
        if let Some(recording) = self.recording.as_mut()
            && ctx.current_ticks < recording.tick_end
        {
            recording.sample_checksum(ctx, interval);
        }
    }

    /// Whether a paused game has to step one tick to follow the playback:
    /// the recording went on past the current tick and every command it ran
    /// here while paused has been queued.
    pub fn needs_step(&self, ctx: &SimulationContext) -> bool {
        let Some(playback) = self.playback.as_ref() else {
            return false;
        };
        let tick = ctx.current_ticks;
        ctx.is_paused()
            && tick < playback.tick_end
            && !playback.commands.peek().is_some_and(|Reverse(c)| c.tick <= tick && c.paused)
    }

    fn update_playback(&mut self, ctx: &SimulationContext, queue: &mut ActionQueue, registry: &ActionRegistry) {
        self.check_playback_checksum(ctx);
        self.enqueue_due_commands(ctx, queue, registry);
        if self
            .playback
            .as_ref()
            .is_some_and(|p| ctx.current_ticks >= p.tick_end)
        {
            self.stop_playback();
        }
    }

    fn update_normalisation(&mut self, ctx: &SimulationContext, queue: &mut ActionQueue, registry: &ActionRegistry) {
        self.check_playback_checksum(ctx);
        let exhausted = self.playback.as_ref().is_none_or(|p| p.commands.is_empty());
        if !exhausted {
            self.enqueue_due_commands(ctx, queue, registry);
            return;
        }

        match self.stop_recording(ctx) {
            Ok(path) => {
                info!(tick = ctx.current_ticks, path = %path.display(), "replay normalised");
                self.events.push(ReplayEvent::NormalisationFinished { path });
            }
            Err(e) => {
                error!(tick = ctx.current_ticks, error = %e, "normalised replay could not be written");
                self.recording = None;
            }
        }
        self.stop_playback();
        self.mode = ReplayMode::None;
    }

    fn check_playback_checksum(&mut self, ctx: &SimulationContext) {
        let tick = ctx.current_ticks;
        let Some(playback) = self.playback.as_mut() else {
            return;
        };
        while playback
            .checksums
            .get(playback.checksum_cursor)
            .is_some_and(|(t, _)| *t < tick)
        {
            playback.checksum_cursor += 1;
        }
        let Some(&(recorded_tick, recorded)) = playback.checksums.get(playback.checksum_cursor) else {
            return;
        };
        if recorded_tick != tick {
            return;
        }
        playback.checksum_cursor += 1;

        let actual = ctx.checksum();
        if actual == recorded {
            return;
        }
        if self.first_mismatch.is_none() {
            warn!(tick, expected = %recorded, actual = %actual, "replay checksum mismatch");
            self.first_mismatch = Some(tick);
            self.events.push(ReplayEvent::ChecksumMismatch { tick });
        } else {
            debug!(tick, "replay still diverged");
        }
        self.mismatching = true;
    }

    /// Queue the commands due at the current tick. A paused cycle only takes
    /// those the recording ran before the tick's rules; the rest wait for the
    /// cycle that advances.
    fn enqueue_due_commands(&mut self, ctx: &SimulationContext, queue: &mut ActionQueue, registry: &ActionRegistry) {
        let tick = ctx.current_ticks;
        let paused = ctx.is_paused();
        let Some(playback) = self.playback.as_mut() else {
            return;
        };
        while playback
            .commands
            .peek()
            .is_some_and(|Reverse(c)| c.tick < tick || (c.tick == tick && (c.paused || !paused)))
        {
            let Some(Reverse(command)) = playback.commands.pop() else {
                break;
            };
            if command.tick < tick {
                warn!(tick, scheduled = command.tick, "dropping stale replay command");
                continue;
            }
            match registry.envelope_from_packet(&command.packet, ActionOrigin::Replay) {
                Ok(envelope) => {
                    let flags = envelope.flags.with(CommandFlags::REPLAY);
                    queue.enqueue(envelope.with_flags(flags), tick);
                }
                Err(e) => {
                    warn!(tick, index = command.command_index, error = %e, "skipping undecodable replay command");
                }
            }
        }
    }
}

/// Read only the summary of a replay file.
pub fn read_replay_info(path: &Path) -> Result<ReplayRecordInfo, ReplayError> {
    let payload = replay_format::read_replay_file(path)?;
    Ok(ReplayRecordData::from_payload(payload, path.to_path_buf()).info())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::GameActionResult;
    use crate::fixed::money;
    use crate::id::EntityId;
    use crate::registry::ActionRegistryBuilder;
    use crate::simulation::run_tick;
    use crate::test_utils::{MoveEntity, SpendMoney, test_context, test_registry};

    /// Minimal tick driver: replay update, scripted input, rules, queue.
    fn run(
        manager: &mut ReplayManager,
        ctx: &mut SimulationContext,
        queue: &mut ActionQueue,
        registry: &ActionRegistry,
        ticks: Ticks,
        script: &mut Vec<(Ticks, ActionEnvelope)>,
    ) {
        for _ in 0..ticks {
            manager.update(ctx, queue, registry);
            let now = ctx.current_ticks;
            let (due, rest): (Vec<_>, Vec<_>) = std::mem::take(script).into_iter().partition(|(t, _)| *t == now);
            *script = rest;
            for (_, env) in due {
                queue.enqueue(env, now);
            }
            let advancing = !ctx.is_paused();
            if advancing {
                run_tick(ctx);
                manager.note_rules_ran(now);
            }
            let mut sink = |tick: Ticks, env: &ActionEnvelope, _: &GameActionResult| {
                if manager.wants_actions() {
                    manager.add_game_action(tick, env).unwrap();
                }
            };
            queue.process_queue(ctx, &mut sink);
            if advancing {
                ctx.current_ticks += 1;
            }
        }
    }

    fn script() -> Vec<(Ticks, ActionEnvelope)> {
        vec![
            (3, ActionEnvelope::of(MoveEntity { entity: EntityId(0), x: 128, y: 64, z: 16 })),
            (5, ActionEnvelope::of(SpendMoney { amount: money(40) })),
        ]
    }

    /// Record `ticks` ticks of `script()` into `path`; returns the final checksum.
    fn record_session(path: &Path, ticks: Ticks) -> StateChecksum {
        let registry = test_registry();
        let mut ctx = test_context();
        let mut queue = ActionQueue::new();
        let mut manager = ReplayManager::default();
        manager.start_recording(&ctx, "session", 0, Some(path)).unwrap();
        run(&mut manager, &mut ctx, &mut queue, &registry, ticks, &mut script());
        manager.stop_recording(&ctx).unwrap();
        ctx.checksum()
    }

    #[test]
    fn recording_captures_actions_and_checksums() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.sv6r");
        record_session(&path, 10);

        let info = read_replay_info(&path).unwrap();
        assert_eq!(info.name, "session");
        assert_eq!(info.version, REPLAY_VERSION);
        assert_eq!(info.ticks, 10);
        assert_eq!(info.num_commands, 2);
        assert_eq!(info.num_checksums, 10);
    }

    #[test]
    fn second_start_is_busy() {
        let ctx = test_context();
        let mut manager = ReplayManager::default();
        let dir = tempfile::tempdir().unwrap();
        manager
            .start_recording(&ctx, "a", 0, Some(&dir.path().join("a.sv6r")))
            .unwrap();
        let err = manager.start_recording(&ctx, "b", 0, None).unwrap_err();
        assert!(matches!(err, ReplayError::Busy(ReplayMode::Recording)));
        assert!(manager.is_recording());
    }

    #[test]
    fn stop_without_recording() {
        let ctx = test_context();
        let mut manager = ReplayManager::default();
        assert!(matches!(manager.stop_recording(&ctx), Err(ReplayError::NotRecording)));
    }

    #[test]
    fn max_ticks_stops_automatically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.sv6r");
        let registry = test_registry();
        let mut ctx = test_context();
        let mut queue = ActionQueue::new();
        let mut manager = ReplayManager::default();
        manager.start_recording(&ctx, "short", 5, Some(&path)).unwrap();

        run(&mut manager, &mut ctx, &mut queue, &registry, 6, &mut Vec::new());
        assert_eq!(manager.mode(), ReplayMode::None);
        assert_eq!(read_replay_info(&path).unwrap().ticks, 5);
        assert_eq!(
            manager.drain_events().last(),
            Some(&ReplayEvent::RecordingStopped { path })
        );
    }

    #[test]
    fn failed_write_keeps_recording() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let ctx = test_context();
        let mut manager = ReplayManager::default();
        manager
            .start_recording(&ctx, "blocked", 0, Some(&blocker.join("out.sv6r")))
            .unwrap();

        assert!(matches!(manager.stop_recording(&ctx), Err(ReplayError::Io { .. })));
        assert!(manager.is_recording());
        assert!(manager.current_record_info().is_some());
    }

    #[test]
    fn playback_reproduces_recorded_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.sv6r");
        let expected = record_session(&path, 20);

        let registry = test_registry();
        let mut ctx = SimulationContext::new(999, 8);
        let mut queue = ActionQueue::new();
        let mut manager = ReplayManager::default();
        manager.start_playback(&mut ctx, &registry, &path).unwrap();
        assert!(manager.is_playing());
        assert_eq!(ctx.current_ticks, 0);

        run(&mut manager, &mut ctx, &mut queue, &registry, 20, &mut Vec::new());
        assert_eq!(ctx.checksum(), expected);
        assert!(!manager.is_playback_state_mismatching());

        manager.update(&ctx, &mut queue, &registry);
        assert_eq!(manager.mode(), ReplayMode::None);
    }

    #[test]
    fn divergence_is_sticky() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.sv6r");
        record_session(&path, 12);

        let registry = test_registry();
        let mut ctx = test_context();
        let mut queue = ActionQueue::new();
        let mut manager = ReplayManager::default();
        manager.start_playback(&mut ctx, &registry, &path).unwrap();
        run(&mut manager, &mut ctx, &mut queue, &registry, 5, &mut Vec::new());
        assert!(!manager.is_playback_state_mismatching());

        ctx.park.cash += 1;
        run(&mut manager, &mut ctx, &mut queue, &registry, 1, &mut Vec::new());
        assert!(manager.is_playback_state_mismatching());
        assert_eq!(manager.first_mismatch_tick(), Some(5));

        run(&mut manager, &mut ctx, &mut queue, &registry, 3, &mut Vec::new());
        assert_eq!(manager.first_mismatch_tick(), Some(5));
        assert!(manager.is_playback_state_mismatching());
    }

    #[test]
    fn corrupt_file_leaves_context_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.sv6r");
        std::fs::write(&path, [0u8; 32]).unwrap();

        let registry = test_registry();
        let mut ctx = test_context();
        ctx.current_ticks = 77;
        let before = ctx.checksum();
        let mut manager = ReplayManager::default();
        assert!(manager.start_playback(&mut ctx, &registry, &path).is_err());
        assert_eq!(ctx.checksum(), before);
        assert_eq!(manager.mode(), ReplayMode::None);
    }

    #[test]
    fn unknown_opcode_rejects_whole_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.sv6r");
        record_session(&path, 8);

        let empty = ActionRegistryBuilder::new().build();
        let mut ctx = test_context();
        ctx.current_ticks = 40;
        let before = ctx.checksum();
        let mut manager = ReplayManager::default();
        let err = manager.start_playback(&mut ctx, &empty, &path).unwrap_err();
        assert!(matches!(err, ReplayError::Command { index: 0, .. }));
        assert_eq!(ctx.checksum(), before);
    }

    #[test]
    fn normalisation_rewrites_until_commands_run_out() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.sv6r");
        let output = dir.path().join("out.sv6r");
        record_session(&input, 30);

        let registry = test_registry();
        let mut ctx = test_context();
        let mut queue = ActionQueue::new();
        let mut manager = ReplayManager::default();
        manager.normalise_replay(&mut ctx, &registry, &input, &output).unwrap();
        assert!(manager.is_normalising());

        run(&mut manager, &mut ctx, &mut queue, &registry, 10, &mut Vec::new());
        assert_eq!(manager.mode(), ReplayMode::None);

        let info = read_replay_info(&output).unwrap();
        assert_eq!(info.num_commands, 2);
        // Commands end at tick 5; the stream is seen empty at tick 6.
        assert_eq!(info.ticks, 6);
        assert!(manager
            .drain_events()
            .contains(&ReplayEvent::NormalisationFinished { path: output }));
    }

    #[test]
    fn replay_commands_order_by_tick_then_index() {
        let packet = SpendMoney { amount: 1 };
        let packet = ActionEnvelope::of(packet).to_packet().unwrap();
        let mut heap = BinaryHeap::new();
        for (tick, index) in [(5, 0), (2, 3), (2, 1), (9, 2)] {
            heap.push(Reverse(ReplayCommand {
                tick,
                command_index: index,
                packet: packet.clone(),
                paused: false,
            }));
        }
        let order: Vec<_> = std::iter::from_fn(|| heap.pop().map(|Reverse(c)| c.key())).collect();
        assert_eq!(order, vec![(2, 1), (2, 3), (5, 0), (9, 2)]);
    }
}
