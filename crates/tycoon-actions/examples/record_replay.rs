//! Record a short session, play it back and verify the final checksum.
//!
//! Run with: `RUST_LOG=debug cargo run --package tycoon-actions --example record_replay`

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tycoon_actions::{CreateRide, PlaceTrack, SetParkEntranceFee, SetRideStatus, SpawnGuest};
use tycoon_core::action::ActionEnvelope;
use tycoon_core::config::SimulationConfig;
use tycoon_core::fixed::money;
use tycoon_core::game::Game;
use tycoon_core::park::{RideKind, RideStatus};
use tycoon_core::replay::read_replay_info;

const TICKS: u32 = 400;

fn run(game: &mut Game, ticks: u32) {
    for _ in 0..ticks {
        game.update_logic();
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SimulationConfig {
        seed: 42,
        replay_directory: std::env::temp_dir().join("tycoon-replays"),
        ..SimulationConfig::default()
    };
    let registry = Arc::new(tycoon_actions::registry().expect("action registry"));

    // Record
    let mut game = Game::new(config.clone(), Arc::clone(&registry)).expect("valid config");
    game.start_recording("demo").expect("start recording");

    // The preview result carries no id; the ride exists once its tick has run.
    game.execute_action(ActionEnvelope::of(CreateRide {
        name: String::from("Steel Twister"),
        kind: RideKind::Coaster,
    }));
    run(&mut game, 1);
    let ride = game.context().park.rides.keys().next().expect("ride created");

    for i in 0..6 {
        game.execute_action(ActionEnvelope::of(PlaceTrack {
            ride,
            x: 320 + 32 * i,
            y: 320,
            z: 0,
            piece_type: 0,
            direction: 0,
        }));
    }
    run(&mut game, 10);
    game.execute_action(ActionEnvelope::of(SetRideStatus {
        ride,
        status: RideStatus::Open,
    }));
    game.execute_action(ActionEnvelope::of(SetParkEntranceFee { fee: money(15) }));
    for i in 0..20 {
        game.execute_action(ActionEnvelope::of(SpawnGuest {
            x: 64 + 8 * i,
            y: 64,
            z: 16,
        }));
    }
    run(&mut game, TICKS);

    let path = game.stop_recording().expect("stop recording");
    let expected = game.context().checksum();
    let info = read_replay_info(&path).expect("replay info");
    println!(
        "Recorded '{}': {} ticks, {} commands, {} checksums -> {}",
        info.name,
        info.ticks,
        info.num_commands,
        info.num_checksums,
        path.display()
    );
    println!("    final checksum = {expected}");

    // Play back
    let mut replay = Game::new(config, registry).expect("valid config");
    replay.start_playback(&path).expect("start playback");
    run(&mut replay, info.ticks);
    let actual = replay.context().checksum();
    println!("    replayed checksum = {actual}");

    if actual == expected && !replay.replay().is_playback_state_mismatching() {
        println!("Determinism verified.");
    } else {
        println!("DESYNC at tick {:?}", replay.replay().first_mismatch_tick());
        std::process::exit(1);
    }
}
