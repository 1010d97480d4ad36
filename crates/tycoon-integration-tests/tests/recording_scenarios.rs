//! Integration test: recording and playback with the real game actions.
//!
//! A session builds a ride, opens it, admits guests and demolishes a second
//! ride. The file written by the recorder is inspected directly, played
//! back into a fresh game, and normalised.

use std::path::Path;
use std::sync::Arc;

use tycoon_actions::{
    CreateRide, DemolishRide, PauseToggle, PlaceTrack, SetParkEntranceFee, SetRideStatus, SpawnGuest,
};
use tycoon_core::action::{ActionEnvelope, CommandFlags};
use tycoon_core::checksum::StateChecksum;
use tycoon_core::config::SimulationConfig;
use tycoon_core::fixed::money;
use tycoon_core::game::Game;
use tycoon_core::id::RideId;
use tycoon_core::park::{Ride, RideKind, RideStatus};
use tycoon_core::replay::{ReplayError, ReplayMode, read_replay_info};
use tycoon_core::replay_format::{REPLAY_VERSION, ReplayPayload, read_replay_file};

fn new_game(seed: u64) -> Game {
    let config = SimulationConfig {
        seed,
        entity_capacity: 256,
        ..SimulationConfig::default()
    };
    Game::new(config, Arc::new(tycoon_actions::registry().unwrap())).unwrap()
}

fn run_until(game: &mut Game, tick: u32) {
    while game.context().current_ticks < tick {
        assert!(game.update_logic());
    }
}

fn place(ride: RideId, i: i32) -> ActionEnvelope {
    ActionEnvelope::of(PlaceTrack {
        ride,
        x: 320 + 32 * i,
        y: 320,
        z: 0,
        piece_type: 0,
        direction: 0,
    })
}

/// A session exercising every kind of park change. Returns the final checksum.
fn record_full_session(path: &Path) -> StateChecksum {
    let mut game = new_game(7);
    let doomed = game
        .context_mut()
        .park
        .rides
        .insert(Ride::new("Old Carousel", RideKind::FlatRide));
    game.start_recording_to("full", 0, Some(path)).unwrap();

    game.execute_action(ActionEnvelope::of(CreateRide {
        name: String::from("Wooden Wave"),
        kind: RideKind::Coaster,
    }));
    run_until(&mut game, 2);
    let ride = game
        .context()
        .park
        .rides
        .iter()
        .find(|(_, r)| r.name == "Wooden Wave")
        .map(|(id, _)| id)
        .unwrap();

    for i in 0..5 {
        assert!(game.execute_action(place(ride, i)).is_ok());
    }
    run_until(&mut game, 5);
    game.execute_action(ActionEnvelope::of(SetRideStatus {
        ride,
        status: RideStatus::Open,
    }));
    game.execute_action(ActionEnvelope::of(SetParkEntranceFee { fee: money(12) }));
    for i in 0..10 {
        game.execute_action(ActionEnvelope::of(SpawnGuest {
            x: 100 + 16 * i,
            y: 200,
            z: 16,
        }));
    }
    run_until(&mut game, 40);
    game.execute_action(ActionEnvelope::of(DemolishRide { ride: doomed }));
    run_until(&mut game, 150);

    game.stop_recording().unwrap();
    game.context().checksum()
}

#[test]
fn max_ticks_session_records_two_commands() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.sv6r");

    let mut game = new_game(1);
    let ride = game
        .context_mut()
        .park
        .rides
        .insert(Ride::new("Mini Coaster", RideKind::Coaster));
    game.start_recording_to("scenario", 100, Some(&path)).unwrap();

    run_until(&mut game, 10);
    assert!(game.execute_action(place(ride, 0)).is_ok());
    run_until(&mut game, 50);
    assert!(game.execute_action(ActionEnvelope::of(DemolishRide { ride })).is_ok());
    run_until(&mut game, 100);
    game.stop_recording().unwrap();

    let payload = read_replay_file(&path).unwrap();
    let ticks: Vec<_> = payload.commands.iter().map(|c| c.tick).collect();
    assert_eq!(ticks, vec![10, 50]);
    assert_eq!(payload.tick_start, 0);
    assert_eq!(payload.tick_end, 100);
    assert!(game.context().park.rides.get(ride).is_none());
}

#[test]
fn corrupted_version_is_rejected_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.sv6r");
    record_full_session(&path);

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[4..6].copy_from_slice(&0xBEEFu16.to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    let mut game = new_game(99);
    run_until(&mut game, 25);
    let before = game.context().checksum();
    let cash = game.context().park.cash;

    let err = game.start_playback(&path).unwrap_err();
    assert!(matches!(
        err,
        ReplayError::UnsupportedVersion { found: 0xBEEF, expected } if expected == REPLAY_VERSION
    ));
    assert_eq!(game.replay().mode(), ReplayMode::None);
    assert_eq!(game.context().current_ticks, 25);
    assert_eq!(game.context().park.cash, cash);
    assert_eq!(game.context().checksum(), before);
}

#[test]
fn playback_matches_recording() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("full.sv6r");
    let expected = record_full_session(&path);

    let info = read_replay_info(&path).unwrap();
    assert_eq!(info.ticks, 150);
    assert_eq!(info.num_commands, 19);

    let mut game = new_game(12345);
    game.start_playback(&path).unwrap();
    run_until(&mut game, 150);
    assert!(!game.replay().is_playback_state_mismatching());
    assert_eq!(game.context().checksum(), expected);
    assert_eq!(game.context().park.rides.len(), 1);
    assert_eq!(game.context().park.entrance_fee, money(12));
}

#[test]
fn normalised_replay_plays_back_to_the_same_state() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("raw.sv6r");
    let output = dir.path().join("normalised.sv6r");
    record_full_session(&input);

    let mut game = new_game(3);
    game.normalise_replay(&input, &output).unwrap();
    assert_eq!(game.replay().mode(), ReplayMode::Normalisation);
    let mut guard = 0;
    while game.replay().mode() != ReplayMode::None {
        assert!(game.update_logic());
        guard += 1;
        assert!(guard < 1000, "normalisation never finished");
    }

    let original = read_replay_file(&input).unwrap();
    let normalised = read_replay_file(&output).unwrap();
    assert_eq!(normalised.commands.len(), original.commands.len());
    let last_command = original.commands.last().unwrap().tick;
    assert_eq!(normalised.tick_end, last_command + 1);
    for (a, b) in original.commands.iter().zip(&normalised.commands) {
        assert_eq!((a.tick, a.opcode, &a.payload), (b.tick, b.opcode, &b.payload));
    }

    // The normalised file is a valid replay of the same commands.
    let mut replay = new_game(4);
    replay.start_playback(&output).unwrap();
    run_until(&mut replay, normalised.tick_end);
    assert!(!replay.replay().is_playback_state_mismatching());
}

/// `session` starts recording to the given path. The file is then played
/// back into a fresh game up to the recorded end, and both runs must agree.
fn assert_replays_in_sync(seed: u64, session: impl FnOnce(&mut Game, &Path)) -> (Game, ReplayPayload) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.sv6r");
    let mut game = new_game(seed);
    session(&mut game, &path);
    game.stop_recording().unwrap();
    let expected = game.context().checksum();
    let payload = read_replay_file(&path).unwrap();

    let mut replay = new_game(seed + 1);
    replay.start_playback(&path).unwrap();
    run_until(&mut replay, payload.tick_end);
    assert!(!replay.replay().is_playback_state_mismatching());
    assert_eq!(replay.replay().first_mismatch_tick(), None);
    assert_eq!(replay.context().checksum(), expected);
    (replay, payload)
}

#[test]
fn ghost_placement_is_neither_built_nor_recorded() {
    let (replay, payload) = assert_replays_in_sync(5, |game, path| {
        let ride = game
            .context_mut()
            .park
            .rides
            .insert(Ride::new("Ghost Train", RideKind::Coaster));
        game.start_recording_to("ghost", 0, Some(path)).unwrap();
        run_until(game, 3);

        let ghost = place(ride, 0).with_flags(CommandFlags::APPLY | CommandFlags::GHOST);
        assert!(game.execute_action(ghost).is_ok());
        assert!(game.context().park.rides[ride].track.is_empty());
        assert!(game.execute_action(place(ride, 1)).is_ok());
        run_until(game, 10);
    });
    assert_eq!(payload.commands.len(), 1);
    let built: usize = replay.context().park.rides.values().map(|r| r.track.len()).sum();
    assert_eq!(built, 1);
}

#[test]
fn fee_changed_while_paused_replays_in_sync() {
    let (replay, _) = assert_replays_in_sync(8, |game, path| {
        run_until(game, 3);
        game.start_recording_to("paused", 0, Some(path)).unwrap();
        assert!(game.execute_action(ActionEnvelope::of(PauseToggle)).is_ok());
        game.update_logic();
        assert!(game.context().is_paused());

        // First thing at the new tick, before any cycle has run there.
        assert!(game.execute_action(ActionEnvelope::of(SetParkEntranceFee { fee: money(15) })).is_ok());
        assert_eq!(game.context().park.entrance_fee, money(15));
        game.update_logic();
        assert!(game.execute_action(ActionEnvelope::of(PauseToggle)).is_ok());
        for _ in 0..4 {
            game.update_logic();
        }
        assert_eq!(game.context().current_ticks, 8);
    });
    assert_eq!(replay.context().park.entrance_fee, money(15));
}

#[test]
fn unpausing_splits_a_tick_around_its_rules() {
    let (replay, payload) = assert_replays_in_sync(11, |game, path| {
        game.start_recording_to("unpause", 0, Some(path)).unwrap();
        run_until(game, 2);
        assert!(game.execute_action(ActionEnvelope::of(PauseToggle)).is_ok());
        game.update_logic();
        assert!(game.context().is_paused());

        // Fee and unpause run at once; the guest waits for tick 3's rules.
        assert!(game.execute_action(ActionEnvelope::of(SetParkEntranceFee { fee: money(4) })).is_ok());
        assert!(game.execute_action(ActionEnvelope::of(PauseToggle)).is_ok());
        assert!(game.execute_action(ActionEnvelope::of(SpawnGuest { x: 400, y: 400, z: 16 })).is_ok());
        run_until(game, 7);
    });

    let at_three: Vec<bool> = payload.commands.iter().filter(|c| c.tick == 3).map(|c| c.paused).collect();
    assert_eq!(at_three, vec![true, true, false]);
    assert_eq!(replay.context().park.entrance_fee, money(4));
    assert!(!replay.context().is_paused());
}

#[test]
fn ride_ids_survive_freed_slots_in_the_baseline() {
    let (replay, _) = assert_replays_in_sync(9, |game, path| {
        let rides = &mut game.context_mut().park.rides;
        let a = rides.insert(Ride::new("A", RideKind::Coaster));
        let b = rides.insert(Ride::new("B", RideKind::FlatRide));
        rides.insert(Ride::new("C", RideKind::Shop));
        rides.remove(b);
        rides.remove(a);

        game.start_recording_to("slots", 0, Some(path)).unwrap();
        assert!(game
            .execute_action(ActionEnvelope::of(CreateRide {
                name: String::from("Hyper"),
                kind: RideKind::Coaster,
            }))
            .is_ok());
        run_until(game, 1);
        let hyper = game
            .context()
            .park
            .rides
            .iter()
            .find(|(_, r)| r.name == "Hyper")
            .map(|(id, _)| id)
            .unwrap();
        assert!(game.execute_action(place(hyper, 0)).is_ok());
        run_until(game, 4);
    });

    let hyper = replay.context().park.rides.iter().find(|(_, r)| r.name == "Hyper").unwrap().1;
    assert_eq!(hyper.track.len(), 1);
    assert_eq!(replay.context().park.rides.len(), 2);
}
