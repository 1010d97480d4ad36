//! Park images: the complete simulation context as a versioned bitcode blob.
//!
//! Images are the baseline of every replay and the payload of the
//! "load save" path. Importing decodes and validates the whole image before
//! any live state is replaced.

use serde::{Deserialize, Serialize};

use crate::cheats::Cheats;
use crate::context::SimulationContext;
use crate::date::GameDate;
use crate::entity::EntityTable;
use crate::fixed::Ticks;
use crate::park::Park;
use crate::player::PlayerTable;
use crate::rng::SimRng;
use crate::weather::Weather;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a park image.
pub const PARK_IMAGE_MAGIC: u32 = 0x5459_4B01;

/// Current image version. Increment when breaking the layout.
pub const PARK_IMAGE_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", PARK_IMAGE_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported image version: expected {}, got {}", PARK_IMAGE_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("image from future version {0} (this build supports up to {PARK_IMAGE_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("entity table is inconsistent: {0}")]
    Inconsistent(String),
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkImageHeader {
    pub magic: u32,
    pub version: u32,
    /// Tick at which the image was taken.
    pub tick: Ticks,
}

impl ParkImageHeader {
    pub fn new(tick: Ticks) -> Self {
        Self {
            magic: PARK_IMAGE_MAGIC,
            version: PARK_IMAGE_VERSION,
            tick,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != PARK_IMAGE_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > PARK_IMAGE_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < PARK_IMAGE_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Image
// ---------------------------------------------------------------------------

/// A decoded, validated park image not yet applied to a live context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParkImage {
    pub header: ParkImageHeader,
    current_ticks: Ticks,
    paused: bool,
    rng: SimRng,
    date: GameDate,
    weather: Weather,
    park: Park,
    cheats: Cheats,
    entities: EntityTable,
    players: PlayerTable,
    editor_mode: bool,
}

impl ParkImage {
    pub fn capture(ctx: &SimulationContext) -> Self {
        Self {
            header: ParkImageHeader::new(ctx.current_ticks),
            current_ticks: ctx.current_ticks,
            paused: ctx.paused,
            rng: ctx.rng.clone(),
            date: ctx.date.clone(),
            weather: ctx.weather.clone(),
            park: ctx.park.clone(),
            cheats: ctx.cheats,
            entities: ctx.entities.clone(),
            players: ctx.players.clone(),
            editor_mode: ctx.editor_mode,
        }
    }

    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    pub fn cheats(&self) -> &Cheats {
        &self.cheats
    }

    pub fn park(&self) -> &Park {
        &self.park
    }

    pub fn into_context(self) -> SimulationContext {
        SimulationContext {
            current_ticks: self.current_ticks,
            paused: self.paused,
            rng: self.rng,
            date: self.date,
            weather: self.weather,
            park: self.park,
            cheats: self.cheats,
            entities: self.entities,
            players: self.players,
            editor_mode: self.editor_mode,
        }
    }
}

/// Encode the complete context.
pub fn export_park(ctx: &SimulationContext) -> Result<Vec<u8>, SerializeError> {
    bitcode::serialize(&ParkImage::capture(ctx)).map_err(|e| SerializeError::Encode(e.to_string()))
}

/// Decode and validate an image without touching any live state.
pub fn decode_park_image(data: &[u8]) -> Result<ParkImage, DeserializeError> {
    let image: ParkImage =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    image.header.validate()?;
    if image.entities.iter().count() != image.entities.len() {
        return Err(DeserializeError::Inconsistent(format!(
            "live count {} disagrees with occupied slots",
            image.entities.len()
        )));
    }
    Ok(image)
}

/// Replace `ctx` with the decoded image. On error `ctx` is left untouched.
pub fn import_park(ctx: &mut SimulationContext, data: &[u8]) -> Result<(), DeserializeError> {
    let image = decode_park_image(data)?;
    *ctx = image.into_context();
    Ok(())
}
