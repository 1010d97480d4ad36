//! Tycoon Core -- the deterministic simulation core of a park-management game.
//!
//! Every change to game state is expressed as a [`action::GameAction`]
//! wrapped in an [`action::ActionEnvelope`]. Actions are decoded through the
//! frozen [`registry::ActionRegistry`], ordered and executed by the
//! [`dispatcher::ActionQueue`], recorded and replayed by the
//! [`replay::ReplayManager`], and diagnosed through the
//! [`snapshot::SnapshotStore`] when peers disagree.
//!
//! # Tick Pipeline
//!
//! [`game::Game::update_logic`] advances the game by one cycle:
//!
//! 1. **Gate** -- network clients wait for the server's declared tick.
//! 2. **Replay** -- record checksums, or inject and verify recorded commands.
//! 3. **Network in** -- queue actions received from peers.
//! 4. **Rules** -- [`simulation::run_tick`] advances date, weather and entities.
//! 5. **Actions** -- run every queued action due at the current tick.
//! 6. **Server** -- snapshot and declare the tick with its checksum.
//! 7. **Client** -- compare against the server's checksum.
//! 8. **Bookkeeping** -- increment the tick counter and flush the network.
//!
//! # Determinism
//!
//! All simulation state lives in [`context::SimulationContext`]. Arithmetic
//! uses [`fixed::Fixed64`] and randomness comes from the seeded
//! [`rng::SimRng`], so two contexts fed the same actions at the same ticks
//! produce identical [`checksum::StateChecksum`]s.
//!
//! ```rust,ignore
//! let mut game = Game::new(SimulationConfig::default(), Arc::new(registry))?;
//! game.start_recording("session")?;
//! game.execute_action(ActionEnvelope::of(action));
//! game.update(elapsed_ms);
//! let path = game.stop_recording()?;
//! ```

pub mod action;
pub mod cheats;
pub mod checksum;
pub mod config;
pub mod context;
pub mod date;
pub mod dispatcher;
pub mod entity;
pub mod fixed;
pub mod game;
pub mod id;
pub mod network;
pub mod news;
pub mod park;
pub mod player;
pub mod registry;
pub mod replay;
pub mod replay_format;
pub mod rng;
pub mod serialize;
pub mod simulation;
pub mod snapshot;
pub mod weather;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
