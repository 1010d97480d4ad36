//! Integration test: a server and two clients over the loopback link.
//!
//! Clients send their actions to the server, which runs them and
//! broadcasts them with the tick they ran on. Every peer must end each tick
//! with the server's checksum.

use std::sync::Arc;

use tycoon_actions::{CreateRide, PauseToggle, PlaceTrack, RenameGuest, SetCheat};
use tycoon_core::action::{ActionEnvelope, ActionError};
use tycoon_core::cheats::CheatKind;
use tycoon_core::config::SimulationConfig;
use tycoon_core::game::Game;
use tycoon_core::id::{EntityId, PlayerId};
use tycoon_core::network::LoopbackHub;
use tycoon_core::news::NewsKind;
use tycoon_core::park::RideKind;
use tycoon_core::player::{Permissions, Player};
use tycoon_core::test_utils::test_context;

struct Session {
    hub: LoopbackHub,
    server: Game,
    clients: Vec<Game>,
}

impl Session {
    fn new(clients: usize) -> Self {
        let hub = LoopbackHub::new();
        let registry = Arc::new(tycoon_actions::registry().unwrap());
        let config = SimulationConfig {
            desync_debugging: true,
            ..SimulationConfig::default()
        };
        let mut base = test_context();
        base.players.insert(PlayerId(1), Player::new("builder", Permissions::BUILD));
        let server = Game::from_context(config.clone(), Arc::clone(&registry), base.clone())
            .unwrap()
            .with_network(Box::new(hub.server()));
        let clients = (0..clients)
            .map(|_| {
                Game::from_context(config.clone(), Arc::clone(&registry), base.clone())
                    .unwrap()
                    .with_network(Box::new(hub.client()))
            })
            .collect();
        Self { hub, server, clients }
    }

    /// Run the server `ticks` times, then let every client catch up.
    fn advance(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.server.update_logic();
        }
        for client in &mut self.clients {
            while client.update_logic() {}
        }
    }

    fn assert_in_sync(&self) {
        let expected = self.server.context().checksum();
        for client in &self.clients {
            assert_eq!(client.context().current_ticks, self.server.context().current_ticks);
            assert_eq!(client.context().checksum(), expected);
            assert!(!client.is_desynchronised());
        }
    }
}

#[test]
fn client_built_ride_reaches_every_peer() {
    let mut session = Session::new(2);
    session.advance(3);

    let create = ActionEnvelope::of(CreateRide {
        name: String::from("Shared Coaster"),
        kind: RideKind::Coaster,
    })
    .with_player(PlayerId(1));
    assert!(session.clients[0].execute_action(create).is_ok());
    assert!(session.clients[0].context().park.rides.is_empty());

    session.advance(2);
    session.assert_in_sync();
    let ride = session.server.context().park.rides.keys().next().unwrap();
    for client in &session.clients {
        assert!(client.context().park.rides.contains_key(ride));
    }

    let place = ActionEnvelope::of(PlaceTrack {
        ride,
        x: 64,
        y: 64,
        z: 0,
        piece_type: 1,
        direction: 2,
    })
    .with_player(PlayerId(1));
    session.clients[1].execute_action(place);
    session.advance(20);
    session.assert_in_sync();
    assert_eq!(session.clients[0].context().park.rides[ride].track.len(), 1);
}

#[test]
fn permissions_are_enforced_by_the_server() {
    let mut session = Session::new(1);
    let cheat = ActionEnvelope::of(SetCheat {
        cheat: CheatKind::NoMoney as u8,
        enabled: true,
    })
    .with_player(PlayerId(1));
    // The builder lacks the cheat permission; the client preview already says so.
    let preview = session.clients[0].execute_action(cheat);
    assert_eq!(preview.error, ActionError::Disallowed);

    session.advance(3);
    assert!(!session.server.context().cheats.no_money);
    session.assert_in_sync();
}

#[test]
fn pause_holds_every_peer() {
    let mut session = Session::new(1);
    session.advance(4);
    session.server.execute_action(ActionEnvelope::of(PauseToggle));
    session.advance(1);
    assert!(session.server.context().is_paused());
    let paused_at = session.server.context().current_ticks;

    // Paused cycles declare nothing, so the client stays put.
    session.advance(10);
    assert_eq!(session.server.context().current_ticks, paused_at);
    session.assert_in_sync();

    // Only pausable actions get through while paused.
    let rename = ActionEnvelope::of(RenameGuest {
        guest: EntityId(0),
        name: String::from("Sam"),
    });
    assert_eq!(session.server.execute_action(rename).error, ActionError::GamePaused);

    session.server.execute_action(ActionEnvelope::of(PauseToggle));
    session.advance(5);
    assert!(!session.server.context().is_paused());
    session.assert_in_sync();
}

#[test]
fn tampered_checksum_is_reported_once() {
    let mut session = Session::new(1);
    session.advance(6);
    session.assert_in_sync();

    session.server.update_logic();
    let tick = session.server.context().current_ticks - 1;
    session.hub.corrupt_checksum(tick);
    session.advance(5);

    let client = &session.clients[0];
    assert_eq!(client.desync_tick(), Some(tick));
    assert_eq!(client.news().items().filter(|n| n.kind == NewsKind::Desync).count(), 1);
    assert!(client.snapshots().get_linked_snapshot(tick).is_some());
}
