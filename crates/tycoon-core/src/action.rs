//! The game action mutation envelope.
//!
//! Every change to simulation state that originates outside the tick loop
//! (the local player, a network peer, a replay) is a [`GameAction`]: a
//! serializable parameter block with a side-effect-free `query` and a
//! mutating `execute`. Actions travel inside an [`ActionEnvelope`] that
//! carries the runtime attributes (player, command flags, network id,
//! origin, completion callback), and cross process boundaries as an
//! [`ActionPacket`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::ops::BitOr;

use crate::context::SimulationContext;
use crate::fixed::{Money, Ticks};
use crate::id::{ActionType, Coords3, EntityId, PlayerId, RideId, StringId};
use crate::park::ExpenditureType;
use crate::player::Permissions;

// ---------------------------------------------------------------------------
// Payload codec
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload encoding failed: {0}")]
    Encode(String),
    #[error("payload decoding failed: {0}")]
    Decode(String),
}

/// Symmetric parameter serialization for an action.
///
/// Implemented for every serde type; action types only derive
/// `Serialize`/`Deserialize`.
pub trait PayloadCodec {
    fn encode_payload(&self) -> Result<Vec<u8>, PayloadError>;

    /// Overwrite every parameter of `self` from `bytes`.
    fn decode_payload(&mut self, bytes: &[u8]) -> Result<(), PayloadError>;

    fn as_any(&self) -> &dyn Any;
}

impl<T: Serialize + DeserializeOwned + 'static> PayloadCodec for T {
    fn encode_payload(&self) -> Result<Vec<u8>, PayloadError> {
        bitcode::serialize(self).map_err(|e| PayloadError::Encode(e.to_string()))
    }

    fn decode_payload(&mut self, bytes: &[u8]) -> Result<(), PayloadError> {
        *self = bitcode::deserialize(bytes).map_err(|e| PayloadError::Decode(e.to_string()))?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// Static capabilities of an action type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionFlags(pub u32);

impl ActionFlags {
    pub const NONE: ActionFlags = ActionFlags(0);
    /// May run while the game is paused.
    pub const ALLOW_WHILE_PAUSED: ActionFlags = ActionFlags(1 << 0);
    /// Affects only the issuing client; never sent to the server.
    pub const CLIENT_ONLY: ActionFlags = ActionFlags(1 << 1);
    /// Only valid in the scenario editor.
    pub const EDITOR_ONLY: ActionFlags = ActionFlags(1 << 2);

    pub fn contains(self, other: ActionFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ActionFlags {
    type Output = ActionFlags;

    fn bitor(self, rhs: Self) -> Self {
        ActionFlags(self.0 | rhs.0)
    }
}

/// Runtime bits attached to one dispatch of an action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandFlags(pub u32);

impl CommandFlags {
    pub const NONE: CommandFlags = CommandFlags(0);
    /// Mutate state. Without it only the cost preview is computed.
    pub const APPLY: CommandFlags = CommandFlags(1 << 0);
    /// Originates from replay playback.
    pub const REPLAY: CommandFlags = CommandFlags(1 << 1);
    /// Preview placement; no lasting mutation.
    pub const GHOST: CommandFlags = CommandFlags(1 << 2);
    /// Do not charge the park.
    pub const NO_SPEND: CommandFlags = CommandFlags(1 << 3);
    pub const ALLOW_DURING_PAUSED: CommandFlags = CommandFlags(1 << 4);
    /// Received from a network peer.
    pub const NETWORKED: CommandFlags = CommandFlags(1 << 5);
    /// Skip the expenditure ledger.
    pub const NO_FINANCE_EFFECT: CommandFlags = CommandFlags(1 << 6);

    pub fn contains(self, other: CommandFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: CommandFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn with(self, other: CommandFlags) -> CommandFlags {
        CommandFlags(self.0 | other.0)
    }

    pub fn without(self, other: CommandFlags) -> CommandFlags {
        CommandFlags(self.0 & !other.0)
    }
}

impl BitOr for CommandFlags {
    type Output = CommandFlags;

    fn bitor(self, rhs: Self) -> Self {
        CommandFlags(self.0 | rhs.0)
    }
}

/// Command flags that grant action capabilities for a single dispatch.
pub const COMMAND_FLAG_IMPLICATIONS: [(CommandFlags, ActionFlags); 3] = [
    (CommandFlags::GHOST, ActionFlags::CLIENT_ONLY),
    (CommandFlags::NO_SPEND, ActionFlags::CLIENT_ONLY),
    (CommandFlags::ALLOW_DURING_PAUSED, ActionFlags::ALLOW_WHILE_PAUSED),
];

/// The action's static flags plus whatever the command flags imply.
pub fn effective_flags(action: &dyn GameAction, flags: CommandFlags) -> ActionFlags {
    COMMAND_FLAG_IMPLICATIONS
        .iter()
        .filter(|(cmd, _)| flags.contains(*cmd))
        .fold(action.action_flags(), |acc, (_, implied)| acc | *implied)
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Game-rule outcome of a query or execute. Never an `Err`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ActionError {
    #[default]
    Ok = 0,
    InvalidParameters = 1,
    Disallowed = 2,
    GamePaused = 3,
    InsufficientFunds = 4,
    NotInEditorMode = 5,
    NotOwned = 6,
    TooLow = 7,
    TooHigh = 8,
    NoClearance = 9,
    ItemAlreadyPlaced = 10,
    NotClosed = 11,
    Broken = 12,
    NoFreeElements = 13,
    Unknown = 0xFFFF,
}

/// Action-specific data returned alongside the common result fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultExtra {
    #[default]
    None,
    Placement {
        ground_flags: u8,
    },
    Ride(RideId),
    Entity(EntityId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameActionResult {
    pub error: ActionError,
    pub error_title: StringId,
    pub error_message: StringId,
    pub error_args: Vec<u8>,
    /// Meaningful only when `error` is `Ok`.
    pub position: Option<Coords3>,
    /// Meaningful only when `error` is `Ok`.
    pub cost: Money,
    pub expenditure: ExpenditureType,
    pub extra: ResultExtra,
}

impl GameActionResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(error: ActionError, title: StringId, message: StringId) -> Self {
        Self {
            error,
            error_title: title,
            error_message: message,
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error == ActionError::Ok
    }

    pub fn with_cost(mut self, cost: Money, expenditure: ExpenditureType) -> Self {
        self.cost = cost;
        self.expenditure = expenditure;
        self
    }

    pub fn at(mut self, position: Coords3) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_extra(mut self, extra: ResultExtra) -> Self {
        self.extra = extra;
        self
    }

    pub fn with_args(mut self, args: Vec<u8>) -> Self {
        self.error_args = args;
        self
    }
}

/// Identifiers of user-facing error strings.
pub mod strings {
    use crate::id::StringId;

    pub const CANT_DO_THIS: StringId = StringId(1);
    pub const CANT_BUILD_THIS_HERE: StringId = StringId(2);
    pub const CANT_REMOVE_THIS: StringId = StringId(3);
    pub const CANT_CHANGE_THIS: StringId = StringId(4);
    pub const NOT_ALLOWED_WHILE_PAUSED: StringId = StringId(10);
    pub const NOT_ENOUGH_CASH: StringId = StringId(11);
    pub const PERMISSION_DENIED: StringId = StringId(12);
    pub const ONLY_IN_EDITOR: StringId = StringId(13);
    pub const ACTION_COOLING_DOWN: StringId = StringId(14);
    pub const TOO_LOW: StringId = StringId(20);
    pub const TOO_HIGH: StringId = StringId(21);
    pub const NO_CLEARANCE: StringId = StringId(22);
    pub const ALREADY_PLACED: StringId = StringId(23);
    pub const RIDE_MUST_BE_CLOSED: StringId = StringId(24);
    pub const RIDE_IS_BROKEN: StringId = StringId(25);
    pub const TOO_MANY_RIDES: StringId = StringId(26);
    pub const TOO_MANY_ENTITIES: StringId = StringId(27);
    pub const INVALID_PARAMETERS: StringId = StringId(28);
    pub const UNKNOWN_ACTION: StringId = StringId(29);
    pub const FEE_TOO_HIGH: StringId = StringId(30);

    pub fn text(id: StringId) -> &'static str {
        match id {
            CANT_DO_THIS => "Can't do this...",
            CANT_BUILD_THIS_HERE => "Can't build this here...",
            CANT_REMOVE_THIS => "Can't remove this...",
            CANT_CHANGE_THIS => "Can't change this...",
            NOT_ALLOWED_WHILE_PAUSED => "Not allowed while the game is paused",
            NOT_ENOUGH_CASH => "Not enough cash",
            PERMISSION_DENIED => "You do not have permission to do this",
            ONLY_IN_EDITOR => "Only available in the scenario editor",
            ACTION_COOLING_DOWN => "Please wait before doing this again",
            TOO_LOW => "Too low",
            TOO_HIGH => "Too high",
            NO_CLEARANCE => "Not enough clearance",
            ALREADY_PLACED => "Something is already placed here",
            RIDE_MUST_BE_CLOSED => "Ride must be closed first",
            RIDE_IS_BROKEN => "Ride has broken down",
            TOO_MANY_RIDES => "Too many rides in the park",
            TOO_MANY_ENTITIES => "Too many people in the game",
            INVALID_PARAMETERS => "Invalid parameters",
            UNKNOWN_ACTION => "Unknown action",
            FEE_TOO_HIGH => "Entrance fee is too high",
            _ => "",
        }
    }
}

// ---------------------------------------------------------------------------
// GameAction
// ---------------------------------------------------------------------------

/// A deterministic, serializable unit of state mutation.
pub trait GameAction: PayloadCodec + fmt::Debug + Send {
    fn opcode(&self) -> ActionType;

    fn name(&self) -> &'static str;

    fn action_flags(&self) -> ActionFlags {
        ActionFlags::NONE
    }

    /// Permission group a player must hold to issue this action.
    fn required_permission(&self) -> Permissions {
        Permissions::NONE
    }

    /// Minimum ticks between two executions by the same player.
    fn cooldown_ticks(&self) -> Ticks {
        0
    }

    /// Validate and price the action without mutating anything.
    fn query(&self, ctx: &SimulationContext, flags: CommandFlags) -> GameActionResult;

    /// Apply the action. Called only after a successful `query`.
    fn execute(&self, ctx: &mut SimulationContext, flags: CommandFlags) -> GameActionResult;
}

// ---------------------------------------------------------------------------
// Envelope and packet
// ---------------------------------------------------------------------------

/// Where an envelope entered the dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOrigin {
    #[default]
    Local,
    Network,
    Replay,
}

pub type ActionCallback = Box<dyn FnOnce(&GameActionResult) + Send>;

/// An action plus everything the dispatcher needs to run it.
pub struct ActionEnvelope {
    pub action: Box<dyn GameAction>,
    pub player: PlayerId,
    pub flags: CommandFlags,
    /// Assigned by the dispatcher when zero.
    pub network_id: u32,
    pub origin: ActionOrigin,
    callback: Option<ActionCallback>,
}

impl ActionEnvelope {
    /// Wrap an action issued by the host with `APPLY` set.
    pub fn new(action: Box<dyn GameAction>) -> Self {
        Self {
            action,
            player: PlayerId::HOST,
            flags: CommandFlags::APPLY,
            network_id: 0,
            origin: ActionOrigin::Local,
            callback: None,
        }
    }

    pub fn of(action: impl GameAction + 'static) -> Self {
        Self::new(Box::new(action))
    }

    pub fn with_player(mut self, player: PlayerId) -> Self {
        self.player = player;
        self
    }

    pub fn with_flags(mut self, flags: CommandFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_origin(mut self, origin: ActionOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_callback(mut self, callback: impl FnOnce(&GameActionResult) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn take_callback(&mut self) -> Option<ActionCallback> {
        self.callback.take()
    }

    pub fn opcode(&self) -> ActionType {
        self.action.opcode()
    }

    /// Serializable form. The callback is not carried.
    pub fn to_packet(&self) -> Result<ActionPacket, PayloadError> {
        Ok(ActionPacket {
            opcode: self.action.opcode(),
            player: self.player,
            flags: self.flags,
            network_id: self.network_id,
            payload: self.action.encode_payload()?,
        })
    }
}

impl fmt::Debug for ActionEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionEnvelope")
            .field("action", &self.action)
            .field("player", &self.player)
            .field("flags", &self.flags)
            .field("network_id", &self.network_id)
            .field("origin", &self.origin)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Wire and replay form of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPacket {
    pub opcode: ActionType,
    pub player: PlayerId,
    pub flags: CommandFlags,
    pub network_id: u32,
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Rename {
        target: u16,
        name: String,
    }

    impl GameAction for Rename {
        fn opcode(&self) -> ActionType {
            ActionType(900)
        }

        fn name(&self) -> &'static str {
            "rename"
        }

        fn query(&self, _ctx: &SimulationContext, _flags: CommandFlags) -> GameActionResult {
            if self.name.is_empty() {
                return GameActionResult::error(
                    ActionError::InvalidParameters,
                    strings::CANT_DO_THIS,
                    strings::INVALID_PARAMETERS,
                );
            }
            GameActionResult::ok()
        }

        fn execute(&self, ctx: &mut SimulationContext, _flags: CommandFlags) -> GameActionResult {
            ctx.park.name.clone_from(&self.name);
            GameActionResult::ok()
        }
    }

    #[test]
    fn payload_round_trip_through_trait_object() {
        let original = Rename {
            target: 3,
            name: String::from("Mr. Bean"),
        };
        let boxed: Box<dyn GameAction> = Box::new(original.clone());
        let bytes = boxed.encode_payload().unwrap();

        let mut decoded: Box<dyn GameAction> = Box::new(Rename::default());
        decoded.decode_payload(&bytes).unwrap();
        let decoded = decoded.as_any().downcast_ref::<Rename>().unwrap();
        assert_eq!(decoded, &original);
    }

    #[test]
    fn truncated_payload_fails() {
        let bytes = Rename {
            target: 1,
            name: String::from("abcdef"),
        }
        .encode_payload()
        .unwrap();
        let mut target = Rename::default();
        assert!(target.decode_payload(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn command_flags_imply_capabilities() {
        let action = Rename::default();
        assert_eq!(effective_flags(&action, CommandFlags::APPLY), ActionFlags::NONE);
        assert!(effective_flags(&action, CommandFlags::GHOST).contains(ActionFlags::CLIENT_ONLY));
        assert!(effective_flags(&action, CommandFlags::NO_SPEND).contains(ActionFlags::CLIENT_ONLY));
        let paused = effective_flags(&action, CommandFlags::ALLOW_DURING_PAUSED | CommandFlags::APPLY);
        assert!(paused.contains(ActionFlags::ALLOW_WHILE_PAUSED));
        assert!(!paused.contains(ActionFlags::CLIENT_ONLY));
    }

    #[test]
    fn query_does_not_mutate() {
        let ctx = SimulationContext::new(1, 8);
        let before = ctx.checksum();
        let action = Rename {
            target: 0,
            name: String::from("x"),
        };
        assert!(action.query(&ctx, CommandFlags::APPLY).is_ok());
        assert!(action.query(&ctx, CommandFlags::APPLY).is_ok());
        assert_eq!(ctx.checksum(), before);
    }

    #[test]
    fn envelope_packet_carries_attributes() {
        let env = ActionEnvelope::of(Rename {
            target: 2,
            name: String::from("Park"),
        })
        .with_player(PlayerId(4))
        .with_flags(CommandFlags::APPLY | CommandFlags::NETWORKED)
        .with_callback(|_| {});
        let packet = env.to_packet().unwrap();
        assert_eq!(packet.opcode, ActionType(900));
        assert_eq!(packet.player, PlayerId(4));
        assert!(packet.flags.contains(CommandFlags::NETWORKED));
        assert!(format!("{env:?}").contains("callback: true"));
    }

    #[test]
    fn error_results_have_no_cost() {
        let r = GameActionResult::error(ActionError::TooHigh, strings::CANT_BUILD_THIS_HERE, strings::TOO_HIGH);
        assert!(!r.is_ok());
        assert_eq!(r.cost, 0);
        assert_eq!(strings::text(r.error_message), "Too high");
    }
}
