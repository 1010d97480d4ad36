//! Simulation configuration, loadable from RON, TOML or JSON.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::context::DEFAULT_ENTITY_CAPACITY;
use crate::fixed::Ticks;
use crate::snapshot::DEFAULT_SNAPSHOT_CAPACITY;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported config format: {file}")]
    UnsupportedFormat { file: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a config file from its extension.
pub fn detect_format(path: &Path) -> Result<ConfigFormat, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(ConfigFormat::Ron),
        Some("toml") => Ok(ConfigFormat::Toml),
        Some("json") => Ok(ConfigFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Snapshots retained by the ring buffer.
    pub snapshot_capacity: usize,
    /// Capture and link a snapshot every tick on the server, and on a client
    /// when it detects a desync.
    pub desync_debugging: bool,
    /// Ticks `Game::update` may run per call; any further backlog is dropped.
    pub max_catchup_ticks: u32,
    pub tick_duration_ms: u32,
    /// Ticks between recorded replay checksums.
    pub checksum_interval: Ticks,
    pub entity_capacity: usize,
    pub replay_directory: PathBuf,
    /// 0 records until stopped.
    pub max_replay_ticks: Ticks,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            snapshot_capacity: DEFAULT_SNAPSHOT_CAPACITY,
            desync_debugging: false,
            max_catchup_ticks: 3,
            tick_duration_ms: 25,
            checksum_interval: 1,
            entity_capacity: DEFAULT_ENTITY_CAPACITY,
            replay_directory: PathBuf::from("replays"),
            max_replay_ticks: 0,
            seed: 0,
        }
    }
}

impl SimulationConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content, format).map_err(|detail| ConfigError::Parse {
            file: path.to_path_buf(),
            detail,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str, format: ConfigFormat) -> Result<Self, String> {
        match format {
            ConfigFormat::Ron => ron::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = [
            ("snapshot_capacity", self.snapshot_capacity == 0),
            ("tick_duration_ms", self.tick_duration_ms == 0),
            ("checksum_interval", self.checksum_interval == 0),
            ("entity_capacity", self.entity_capacity == 0),
        ];
        if let Some((name, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }
        if self.entity_capacity > usize::from(u16::MAX) {
            return Err(ConfigError::Invalid(format!(
                "entity_capacity {} exceeds {}",
                self.entity_capacity,
                u16::MAX
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn defaults_are_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.snapshot_capacity, 32);
        assert_eq!(config.max_catchup_ticks, 3);
    }

    #[test]
    fn loads_each_format_with_defaults_filled() {
        let dir = tempfile::tempdir().unwrap();
        let toml = write(dir.path(), "sim.toml", "tick_duration_ms = 40\ndesync_debugging = true\n");
        let ron = write(dir.path(), "sim.ron", "(snapshot_capacity: 8)");
        let json = write(dir.path(), "sim.json", r#"{"checksum_interval": 16}"#);

        let t = SimulationConfig::load(&toml).unwrap();
        assert_eq!(t.tick_duration_ms, 40);
        assert!(t.desync_debugging);
        assert_eq!(t.snapshot_capacity, 32);

        assert_eq!(SimulationConfig::load(&ron).unwrap().snapshot_capacity, 8);
        assert_eq!(SimulationConfig::load(&json).unwrap().checksum_interval, 16);
    }

    #[test]
    fn unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "sim.yaml", "seed: 1");
        assert!(matches!(
            SimulationConfig::load(&path),
            Err(ConfigError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "sim.json", "{ not json");
        let err = SimulationConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("sim.json"));
    }

    #[test]
    fn zero_values_rejected() {
        let config = SimulationConfig {
            checksum_interval: 0,
            ..SimulationConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("checksum_interval"));
    }
}
