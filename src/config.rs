//! # Configuration Management Module
//!
//! Persistent settings stored in platform-appropriate locations.
//! Handles loading, saving, and providing defaults for configuration options.
//!
//! ## Settings
//! - `buffer_capacity`: Samples kept per device for charting
//! - `recordings_dir`: Where finished recordings are written (relative to the working directory)
//! - `replay_tick_micros`: Sleep between replay rounds
//! - `auto_stop_replay`: Return to idle automatically once a replay is exhausted
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/shoepad-telemetry/config.toml
//! - Linux: ~/.config/shoepad-telemetry/config.toml
//! - Windows: %APPDATA%\shoepad-telemetry\config.toml
//!
//! Values are handed to the recorder and replay engine when the session
//! controller is built; nothing here is read globally.

use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::ConfigError;

const DEFAULT_BUFFER_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub buffer_capacity: usize,
    pub recordings_dir: PathBuf,
    pub replay_tick_micros: u64,
    pub auto_stop_replay: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            recordings_dir: PathBuf::from("recordings"),
            replay_tick_micros: 100,
            auto_stop_replay: false,
        }
    }
}

impl Config {
    /// Get the path to the config file
    fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("shoepad-telemetry").join("config.toml")
    }

    /// Load config from the platform location, or create default if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path())
    }

    /// Load config from `path`, writing the defaults there if the file is missing
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(contents) => {
                let config = toml::from_str(&contents)
                    .map_err(ConfigError::ParseFailed)?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save_to(path)?;
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    /// Save config to the platform location
    #[allow(dead_code)]
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::config_path())
    }

    /// Save config to `path`
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string)
            .map_err(ConfigError::WriteFailed)?;

        Ok(())
    }

    /// Ring capacity per device; a zero in the file falls back to the default
    pub fn buffer_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.buffer_capacity)
            .or_else(|| NonZeroUsize::new(DEFAULT_BUFFER_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN)
    }

    pub fn replay_tick(&self) -> Duration {
        Duration::from_micros(self.replay_tick_micros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.buffer_capacity, 1000);
        assert_eq!(config.recordings_dir, PathBuf::from("recordings"));
        assert_eq!(config.auto_stop_replay, false);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config {
            buffer_capacity: 250,
            recordings_dir: PathBuf::from("captures"),
            replay_tick_micros: 10,
            auto_stop_replay: true,
        };

        let toml_str = toml::to_string(&config).expect("Failed to serialize");
        assert!(toml_str.contains("buffer_capacity = 250"));
        assert!(toml_str.contains("recordings_dir = \"captures\""));
        assert!(toml_str.contains("auto_stop_replay = true"));
    }

    #[test]
    fn test_config_deserialization_fills_missing_fields() {
        let toml_str = r#"
            buffer_capacity = 64
        "#;

        let config: Config = toml::from_str(toml_str).expect("Failed to deserialize");
        assert_eq!(config.buffer_capacity, 64);
        assert_eq!(config.replay_tick_micros, 100);
        assert_eq!(config.recordings_dir, PathBuf::from("recordings"));
    }

    #[test]
    fn test_config_load_creates_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).expect("Failed to load config");
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn test_config_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config {
            auto_stop_replay: true,
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_config_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "buffer_capacity = \"lots\"").unwrap();

        assert!(matches!(Config::load_from(&path), Err(ConfigError::ParseFailed(_))));
    }

    #[test]
    fn test_zero_capacity_falls_back() {
        let config = Config {
            buffer_capacity: 0,
            ..Config::default()
        };
        assert_eq!(config.buffer_capacity().get(), 1000);
        assert_eq!(config.replay_tick(), Duration::from_micros(100));
    }
}
