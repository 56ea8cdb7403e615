use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::ConfigError;
use crate::models::{LoopMode, ShuffleMode};

const APP_DIR: &str = "chipdeck";

/// Length heuristics for engines whose embedded metadata is missing or a stub
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DurationConfig {
    /// Reported lengths shorter than this are treated as stubs
    pub min_plausible_secs: u64,
    pub fallback_secs: u64,
    /// Loop passes added to the intro when no usable length exists
    pub loop_repeats: u32,
    /// Loop passes added for curated sidecar entries with the repeat flag
    pub sidecar_loop_repeats: u32,
}

impl Default for DurationConfig {
    fn default() -> Self {
        Self {
            min_plausible_secs: 30,
            fallback_secs: 180,
            loop_repeats: 2,
            sidecar_loop_repeats: 3,
        }
    }
}

/// Player configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    pub sample_rate: u32,
    /// Frames requested from the engine per render iteration
    pub buffer_frames: usize,
    /// End-of-track fade window
    pub fade_out_ms: u64,
    /// Fade window used when skipping manually
    pub skip_fade_ms: u64,
    pub snapshot_interval_ms: u64,
    pub pause_poll_ms: u64,
    pub loop_mode: LoopMode,
    pub shuffle_mode: ShuffleMode,
    pub favorites_only: bool,
    /// Extracted archives live here, one folder per archive
    pub library_dir: PathBuf,
    pub database_path: PathBuf,
    /// Second place the VGM engine looks for referenced ROM files
    pub rom_dir: Option<PathBuf>,
    pub spectrum_size: usize,
    pub duration: DurationConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        Self {
            sample_rate: 44100,
            buffer_frames: 1024,
            fade_out_ms: 8000,
            skip_fade_ms: 300,
            snapshot_interval_ms: 250,
            pause_poll_ms: 20,
            loop_mode: LoopMode::Off,
            shuffle_mode: ShuffleMode::Off,
            favorites_only: false,
            library_dir: data_dir.join("library"),
            database_path: data_dir.join("library.db"),
            rom_dir: None,
            spectrum_size: 1024,
            duration: DurationConfig::default(),
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: PlayerConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Ok(Self::with_path(config_path))
    }

    /// Manager backed by an explicit file; a missing or corrupt file yields defaults
    pub fn with_path(config_path: PathBuf) -> Self {
        let config = match Self::load_config(&config_path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring configuration at {}: {}", config_path.display(), e);
                PlayerConfig::default()
            }
        };

        Self {
            config,
            config_path,
        }
    }

    pub fn get_config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut PlayerConfig),
    {
        updater(&mut self.config);
        self.save_config()
    }

    pub fn set_modes(
        &mut self,
        loop_mode: LoopMode,
        shuffle_mode: ShuffleMode,
        favorites_only: bool,
    ) -> Result<(), ConfigError> {
        self.config.loop_mode = loop_mode;
        self.config.shuffle_mode = shuffle_mode;
        self.config.favorites_only = favorites_only;
        self.save_config()
    }

    pub fn set_rom_dir(&mut self, rom_dir: Option<PathBuf>) -> Result<(), ConfigError> {
        self.config.rom_dir = rom_dir;
        self.save_config()
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = PlayerConfig::default();
        self.save_config()
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(APP_DIR);

        std::fs::create_dir_all(&config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<PlayerConfig, ConfigError> {
        if !path.exists() {
            return Ok(PlayerConfig::default());
        }

        let config_content = std::fs::read_to_string(path)?;
        let config: PlayerConfig = toml::from_str(&config_content)?;

        Ok(config)
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let config_content = toml::to_string_pretty(&self.config)?;
        std::fs::write(&self.config_path, config_content)?;

        Ok(())
    }
}
