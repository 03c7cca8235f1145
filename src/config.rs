//! Application configuration, stored as TOML under the user config directory
//!
//! A missing file is created with defaults. Every section falls back to its
//! defaults field by field, so partial files are fine. Numeric values are
//! clamped into range when the engine reads them.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::input::{queue::DEFAULT_QUEUE_CAPACITY, vk};
use crate::recoil::AntiRecoilSettings;

pub const APP_DIR: &str = "padbridge";
pub const CONFIG_FILE: &str = "padbridge.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// `<config dir>/padbridge`, or `./padbridge` when the platform has none
pub fn default_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        })
        .join(APP_DIR)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub tick_period_us: u64,
    pub queue_capacity: usize,
    /// Fraction of accumulated mouse motion kept after each tick
    pub mouse_decay: f64,
    pub idle_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub wheel_pulse_ticks: u32,
    pub reconnect_interval_ms: u64,
    pub stats_interval_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_period_us: 2_000,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            mouse_decay: 0.95,
            idle_timeout_ms: 18,
            shutdown_timeout_ms: 500,
            wheel_pulse_ticks: 8,
            reconnect_interval_ms: 1_000,
            stats_interval_secs: 30,
        }
    }
}

impl EngineSettings {
    pub fn clamped(&self) -> Self {
        let mouse_decay = if self.mouse_decay.is_finite() {
            self.mouse_decay.clamp(0.0, 1.0)
        } else {
            Self::default().mouse_decay
        };
        let clamped = Self {
            tick_period_us: self.tick_period_us.clamp(250, 100_000),
            queue_capacity: self.queue_capacity.clamp(1, 1_000_000),
            mouse_decay,
            idle_timeout_ms: self.idle_timeout_ms.clamp(1, 10_000),
            shutdown_timeout_ms: self.shutdown_timeout_ms.clamp(10, 60_000),
            wheel_pulse_ticks: self.wheel_pulse_ticks.clamp(1, 1_000),
            reconnect_interval_ms: self.reconnect_interval_ms.clamp(10, 600_000),
            stats_interval_secs: self.stats_interval_secs.clamp(1, 86_400),
        };
        if clamped != *self {
            debug!("Engine settings clamped to {:?}", clamped);
        }
        clamped
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_micros(self.tick_period_us)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

/// Virtual-key codes handled on the capture thread and never enqueued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeySettings {
    pub cycle_mode: u16,
    pub panic: u16,
}

impl Default for HotkeySettings {
    fn default() -> Self {
        Self {
            cycle_mode: vk::F8,
            panic: vk::F12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub mode_file: PathBuf,
    pub pattern_dir: PathBuf,
    /// Profile JSON to bind at startup; the built-in default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self::under(&default_dir())
    }
}

impl PathSettings {
    pub fn under(dir: &Path) -> Self {
        Self {
            mode_file: dir.join("mode.json"),
            pattern_dir: dir.join("patterns"),
            profile: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineSettings,
    pub hotkeys: HotkeySettings,
    pub paths: PathSettings,
    pub anti_recoil: AntiRecoilSettings,
}

impl AppConfig {
    pub fn default_path() -> PathBuf {
        default_dir().join(CONFIG_FILE)
    }

    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content, path)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Loads the file, writing defaults first when it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::load(path);
        }
        info!("Creating default configuration at {}", path.display());
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(io_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = AppConfig::from_toml(
            "[engine]\ntick_period_us = 4000\n\n[anti_recoil]\nenabled = true\n",
            Path::new("inline.toml"),
        )
        .unwrap();
        assert_eq!(config.engine.tick_period_us, 4_000);
        assert_eq!(config.engine.queue_capacity, 1_000);
        assert!(config.anti_recoil.enabled);
        assert_eq!(config.hotkeys, HotkeySettings::default());
    }

    #[test]
    fn invalid_values_clamp() {
        let engine = EngineSettings {
            tick_period_us: 0,
            queue_capacity: 0,
            mouse_decay: 3.0,
            wheel_pulse_ticks: 0,
            stats_interval_secs: u64::MAX,
            ..EngineSettings::default()
        }
        .clamped();
        assert_eq!(engine.tick_period_us, 250);
        assert_eq!(engine.queue_capacity, 1);
        assert_eq!(engine.mouse_decay, 1.0);
        assert_eq!(engine.wheel_pulse_ticks, 1);
        assert_eq!(engine.stats_interval_secs, 86_400);
        assert!(std::time::Instant::now()
            .checked_add(engine.stats_interval())
            .is_some());
    }

    #[test]
    fn load_or_create_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = AppConfig::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, AppConfig::default());

        config.hotkeys.panic = vk::ESCAPE;
        config.paths = PathSettings::under(dir.path());
        config.save(&path).unwrap();
        assert_eq!(AppConfig::load_or_create(&path).unwrap(), config);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[engine\n").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Parse { .. })));
    }
}
