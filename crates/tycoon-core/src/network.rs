//! The network seam between the tick loop and whatever transport carries
//! actions and tick declarations between participants.
//!
//! The server owns tick assignment: it executes actions, broadcasts each
//! executed action with the tick it ran on, then declares the tick complete
//! together with the state checksum taken once the tick's actions have run.
//! A client never runs a tick the server has not declared.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::action::ActionPacket;
use crate::checksum::StateChecksum;
use crate::fixed::Ticks;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NetworkMode {
    #[default]
    None,
    Server,
    Client,
}

pub trait NetworkLink {
    fn mode(&self) -> NetworkMode;

    /// Ticks below this value have been declared by the server.
    fn server_tick(&self) -> Ticks;

    /// Checksum the server took at the end of `tick`, if declared.
    fn server_checksum(&self, tick: Ticks) -> Option<StateChecksum>;

    /// Client: submit an action to the server. Server: broadcast an action
    /// executed on `tick`.
    fn send_action(&mut self, packet: ActionPacket, tick: Ticks);

    /// Server: actions submitted by clients. Client: actions executed by the
    /// server, each with its tick.
    fn receive_actions(&mut self) -> Vec<(Ticks, ActionPacket)>;

    /// Server: declare `tick` complete with its end-of-tick checksum.
    fn broadcast_tick(&mut self, tick: Ticks, checksum: StateChecksum);

    fn flush(&mut self);
}

// ---------------------------------------------------------------------------
// Offline
// ---------------------------------------------------------------------------

/// Single-player link. Nothing is sent or received.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineLink;

impl NetworkLink for OfflineLink {
    fn mode(&self) -> NetworkMode {
        NetworkMode::None
    }

    fn server_tick(&self) -> Ticks {
        Ticks::MAX
    }

    fn server_checksum(&self, _tick: Ticks) -> Option<StateChecksum> {
        None
    }

    fn send_action(&mut self, _packet: ActionPacket, _tick: Ticks) {}

    fn receive_actions(&mut self) -> Vec<(Ticks, ActionPacket)> {
        Vec::new()
    }

    fn broadcast_tick(&mut self, _tick: Ticks, _checksum: StateChecksum) {}

    fn flush(&mut self) {}
}

// ---------------------------------------------------------------------------
// Loopback
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct HubState {
    submitted: Vec<ActionPacket>,
    outgoing: Vec<(Ticks, ActionPacket)>,
    outgoing_ticks: Vec<(Ticks, StateChecksum)>,
    inboxes: Vec<Vec<(Ticks, ActionPacket)>>,
    declared: Ticks,
    checksums: BTreeMap<Ticks, StateChecksum>,
}

/// In-process, single-threaded server/client exchange. Broadcasts become
/// visible to clients on the server's `flush`.
#[derive(Debug, Default, Clone)]
pub struct LoopbackHub {
    state: Rc<RefCell<HubState>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Server,
    Client(usize),
}

#[derive(Debug)]
pub struct LoopbackLink {
    state: Rc<RefCell<HubState>>,
    role: Role,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(&self) -> LoopbackLink {
        LoopbackLink {
            state: Rc::clone(&self.state),
            role: Role::Server,
        }
    }

    pub fn client(&self) -> LoopbackLink {
        let mut state = self.state.borrow_mut();
        state.inboxes.push(Vec::new());
        LoopbackLink {
            state: Rc::clone(&self.state),
            role: Role::Client(state.inboxes.len() - 1),
        }
    }

    /// Tamper with a declared checksum. Lets tests provoke a desync.
    pub fn corrupt_checksum(&self, tick: Ticks) {
        if let Some(checksum) = self.state.borrow_mut().checksums.get_mut(&tick) {
            checksum.0[0] ^= 0xFF;
        }
    }
}

impl NetworkLink for LoopbackLink {
    fn mode(&self) -> NetworkMode {
        match self.role {
            Role::Server => NetworkMode::Server,
            Role::Client(_) => NetworkMode::Client,
        }
    }

    fn server_tick(&self) -> Ticks {
        self.state.borrow().declared
    }

    fn server_checksum(&self, tick: Ticks) -> Option<StateChecksum> {
        self.state.borrow().checksums.get(&tick).copied()
    }

    fn send_action(&mut self, packet: ActionPacket, tick: Ticks) {
        let mut state = self.state.borrow_mut();
        match self.role {
            Role::Server => state.outgoing.push((tick, packet)),
            Role::Client(_) => state.submitted.push(packet),
        }
    }

    fn receive_actions(&mut self) -> Vec<(Ticks, ActionPacket)> {
        let mut state = self.state.borrow_mut();
        match self.role {
            Role::Server => {
                let declared = state.declared;
                state.submitted.drain(..).map(|p| (declared, p)).collect()
            }
            Role::Client(index) => state
                .inboxes
                .get_mut(index)
                .map(std::mem::take)
                .unwrap_or_default(),
        }
    }

    fn broadcast_tick(&mut self, tick: Ticks, checksum: StateChecksum) {
        if self.role == Role::Server {
            self.state.borrow_mut().outgoing_ticks.push((tick, checksum));
        }
    }

    fn flush(&mut self) {
        if self.role != Role::Server {
            return;
        }
        let mut state = self.state.borrow_mut();
        let outgoing = std::mem::take(&mut state.outgoing);
        for inbox in state.inboxes.iter_mut() {
            inbox.extend(outgoing.iter().cloned());
        }
        let ticks = std::mem::take(&mut state.outgoing_ticks);
        for (tick, checksum) in ticks {
            state.checksums.insert(tick, checksum);
            state.declared = state.declared.max(tick + 1);
        }
    }
}
