//! Opcode to action-factory registry.
//!
//! Built once at startup through [`ActionRegistryBuilder`], then frozen into
//! an immutable [`ActionRegistry`] shared by the dispatcher, the replay
//! manager and the network layer.

use std::collections::BTreeMap;
use std::fmt;

use crate::action::{
    ActionEnvelope, ActionError, ActionOrigin, ActionPacket, GameAction, GameActionResult,
    PayloadError, strings,
};
use crate::id::ActionType;

type ActionFactory = fn() -> Box<dyn GameAction>;

fn make<T: GameAction + Default + 'static>() -> Box<dyn GameAction> {
    Box::new(T::default())
}

struct ActionEntry {
    name: &'static str,
    factory: ActionFactory,
}

impl fmt::Debug for ActionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("opcode {opcode} registered twice ({existing} and {incoming})")]
    DuplicateOpcode {
        opcode: ActionType,
        existing: &'static str,
        incoming: &'static str,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ActionDecodeError {
    #[error("unknown opcode {0}")]
    UnknownOpcode(ActionType),
    #[error("payload for opcode {opcode} is malformed: {source}")]
    Payload {
        opcode: ActionType,
        #[source]
        source: PayloadError,
    },
}

impl ActionDecodeError {
    /// The game-rule result reported when a decode failure must be surfaced
    /// to a player.
    pub fn to_result(&self) -> GameActionResult {
        match self {
            ActionDecodeError::UnknownOpcode(_) => {
                GameActionResult::error(ActionError::Unknown, strings::CANT_DO_THIS, strings::UNKNOWN_ACTION)
            }
            ActionDecodeError::Payload { .. } => GameActionResult::error(
                ActionError::InvalidParameters,
                strings::CANT_DO_THIS,
                strings::INVALID_PARAMETERS,
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ActionRegistryBuilder {
    entries: BTreeMap<ActionType, ActionEntry>,
}

impl ActionRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under its opcode.
    pub fn register<T: GameAction + Default + 'static>(&mut self) -> Result<ActionType, RegistryError> {
        let prototype = T::default();
        let opcode = prototype.opcode();
        let name = prototype.name();
        if let Some(existing) = self.entries.get(&opcode) {
            return Err(RegistryError::DuplicateOpcode {
                opcode,
                existing: existing.name,
                incoming: name,
            });
        }
        self.entries.insert(
            opcode,
            ActionEntry {
                name,
                factory: make::<T>,
            },
        );
        Ok(opcode)
    }

    pub fn build(self) -> ActionRegistry {
        ActionRegistry {
            entries: self.entries,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Immutable opcode table. Thread-safe to share.
#[derive(Debug)]
pub struct ActionRegistry {
    entries: BTreeMap<ActionType, ActionEntry>,
}

impl ActionRegistry {
    /// A default-constructed action for `opcode`.
    pub fn create(&self, opcode: ActionType) -> Option<Box<dyn GameAction>> {
        self.entries.get(&opcode).map(|e| (e.factory)())
    }

    pub fn decode(&self, opcode: ActionType, payload: &[u8]) -> Result<Box<dyn GameAction>, ActionDecodeError> {
        let mut action = self
            .create(opcode)
            .ok_or(ActionDecodeError::UnknownOpcode(opcode))?;
        action
            .decode_payload(payload)
            .map_err(|source| ActionDecodeError::Payload { opcode, source })?;
        Ok(action)
    }

    /// Deep copy through the payload codec.
    pub fn clone_action(&self, action: &dyn GameAction) -> Result<Box<dyn GameAction>, ActionDecodeError> {
        let opcode = action.opcode();
        let payload = action
            .encode_payload()
            .map_err(|source| ActionDecodeError::Payload { opcode, source })?;
        self.decode(opcode, &payload)
    }

    /// Copy of an envelope's action and attributes. The callback stays with
    /// the original.
    pub fn clone_envelope(&self, envelope: &ActionEnvelope) -> Result<ActionEnvelope, ActionDecodeError> {
        let action = self.clone_action(envelope.action.as_ref())?;
        let mut copy = ActionEnvelope::new(action)
            .with_player(envelope.player)
            .with_flags(envelope.flags)
            .with_origin(envelope.origin);
        copy.network_id = envelope.network_id;
        Ok(copy)
    }

    pub fn envelope_from_packet(
        &self,
        packet: &ActionPacket,
        origin: ActionOrigin,
    ) -> Result<ActionEnvelope, ActionDecodeError> {
        let action = self.decode(packet.opcode, &packet.payload)?;
        let mut envelope = ActionEnvelope::new(action)
            .with_player(packet.player)
            .with_flags(packet.flags)
            .with_origin(origin);
        envelope.network_id = packet.network_id;
        Ok(envelope)
    }

    pub fn name_of(&self, opcode: ActionType) -> Option<&'static str> {
        self.entries.get(&opcode).map(|e| e.name)
    }

    pub fn contains(&self, opcode: ActionType) -> bool {
        self.entries.contains_key(&opcode)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered opcodes in ascending order.
    pub fn opcodes(&self) -> impl Iterator<Item = ActionType> + '_ {
        self.entries.keys().copied()
    }
}
