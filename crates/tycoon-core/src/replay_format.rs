//! The `.sv6r` replay file format.
//!
//! Outer layout, little-endian:
//!
//! | field              | type  |
//! |--------------------|-------|
//! | magic              | u32   |
//! | version            | u16   |
//! | uncompressed size  | u64   |
//! | payload            | zlib  |
//!
//! The decompressed payload is the bitcode encoding of [`ReplayPayload`].
//! Only an exact version match is accepted.

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::action::CommandFlags;
use crate::cheats::Cheats;
use crate::fixed::Ticks;
use crate::id::{ActionType, PlayerId};
use crate::park::ParkParameters;
use crate::replay::ReplayError;

/// File extension of replay files.
pub const REPLAY_EXTENSION: &str = "sv6r";

/// "SV6R".
pub const REPLAY_MAGIC: u32 = 0x5236_5653;

pub const REPLAY_VERSION: u16 = 2;

/// Identifies the action wire protocol a replay was recorded with.
pub const NETWORK_STREAM_VERSION: &str = "tycoon-net-1";

const HEADER_LEN: usize = 4 + 2 + 8;

/// Upper bound on the declared uncompressed size.
const MAX_UNCOMPRESSED_SIZE: u64 = 1 << 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedCommand {
    pub tick: Ticks,
    pub command_index: u32,
    pub opcode: ActionType,
    pub player: PlayerId,
    pub flags: CommandFlags,
    pub network_id: u32,
    pub payload: Vec<u8>,
    /// Ran before the tick's rules, while the game was paused.
    pub paused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumEntry {
    pub tick: Ticks,
    pub checksum: [u8; 8],
}

/// Decompressed replay contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayPayload {
    pub magic: u32,
    pub version: u16,
    pub network_version: String,
    pub name: String,
    /// Seconds since the Unix epoch.
    pub time_recorded: u64,
    pub park_image: Vec<u8>,
    pub parameters: ParkParameters,
    pub cheats: Cheats,
    /// Tile key to entity indices.
    pub spatial_index: Vec<(u32, Vec<u16>)>,
    pub tick_start: Ticks,
    pub tick_end: Ticks,
    /// Ascending `(tick, command_index)`.
    pub commands: Vec<SerializedCommand>,
    pub checksums: Vec<ChecksumEntry>,
}

/// `<directory>/<name>.sv6r`
pub fn replay_path(directory: &Path, name: &str) -> PathBuf {
    directory.join(name).with_extension(REPLAY_EXTENSION)
}

/// Header, size and compressed payload.
pub fn encode_replay(payload: &ReplayPayload) -> Result<Vec<u8>, ReplayError> {
    let raw = bitcode::serialize(payload).map_err(|e| ReplayError::Encode(e.to_string()))?;

    let mut out = Vec::with_capacity(HEADER_LEN + raw.len() / 2);
    out.extend_from_slice(&REPLAY_MAGIC.to_le_bytes());
    out.extend_from_slice(&REPLAY_VERSION.to_le_bytes());
    out.extend_from_slice(&(raw.len() as u64).to_le_bytes());

    let mut encoder = ZlibEncoder::new(out, Compression::default());
    encoder
        .write_all(&raw)
        .map_err(|e| ReplayError::Encode(e.to_string()))?;
    encoder.finish().map_err(|e| ReplayError::Encode(e.to_string()))
}

fn read_header(data: &[u8]) -> Result<(u32, u16, u64), ReplayError> {
    if data.len() < HEADER_LEN {
        return Err(ReplayError::Corrupt(format!(
            "file is {} bytes, shorter than the {HEADER_LEN}-byte header",
            data.len()
        )));
    }
    let mut magic = [0u8; 4];
    let mut version = [0u8; 2];
    let mut size = [0u8; 8];
    magic.copy_from_slice(&data[0..4]);
    version.copy_from_slice(&data[4..6]);
    size.copy_from_slice(&data[6..HEADER_LEN]);
    Ok((
        u32::from_le_bytes(magic),
        u16::from_le_bytes(version),
        u64::from_le_bytes(size),
    ))
}

pub fn decode_replay(data: &[u8]) -> Result<ReplayPayload, ReplayError> {
    let (magic, version, size) = read_header(data)?;
    if magic != REPLAY_MAGIC {
        return Err(ReplayError::Corrupt(format!("bad magic 0x{magic:08X}")));
    }
    if version != REPLAY_VERSION {
        return Err(ReplayError::UnsupportedVersion {
            found: version,
            expected: REPLAY_VERSION,
        });
    }
    if size > MAX_UNCOMPRESSED_SIZE {
        return Err(ReplayError::Corrupt(format!("declared size {size} is implausible")));
    }

    let mut raw = Vec::with_capacity(size as usize);
    ZlibDecoder::new(&data[HEADER_LEN..])
        .take(size + 1)
        .read_to_end(&mut raw)
        .map_err(|e| ReplayError::Corrupt(format!("decompression failed: {e}")))?;
    if raw.len() as u64 != size {
        return Err(ReplayError::Corrupt(format!(
            "payload is {} bytes, header declares {size}",
            raw.len()
        )));
    }

    let payload: ReplayPayload =
        bitcode::deserialize(&raw).map_err(|e| ReplayError::Corrupt(format!("payload decode failed: {e}")))?;
    if payload.magic != REPLAY_MAGIC {
        return Err(ReplayError::Corrupt(format!("bad inner magic 0x{:08X}", payload.magic)));
    }
    if payload.version != REPLAY_VERSION {
        return Err(ReplayError::UnsupportedVersion {
            found: payload.version,
            expected: REPLAY_VERSION,
        });
    }
    Ok(payload)
}

/// Encode fully in memory, then write through a temporary file in the
/// destination directory and rename it into place.
pub fn write_replay_file(path: &Path, payload: &ReplayPayload) -> Result<(), ReplayError> {
    let bytes = encode_replay(payload)?;
    let io_error = |source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_error)?;
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
    temp.write_all(&bytes).map_err(io_error)?;
    temp.as_file().sync_all().map_err(io_error)?;
    temp.persist(path).map_err(|e| io_error(e.error))?;
    Ok(())
}

pub fn read_replay_file(path: &Path) -> Result<ReplayPayload, ReplayError> {
    let data = fs::read(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_replay(&data)
}
