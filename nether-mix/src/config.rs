//! Mixer configuration (`mixer.toml`)
//!
//! Settings are stored as TOML in the platform-specific config directory.
//! Every field has a serde default, so a partial or empty file is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MixerError, Result};
use crate::sync::DEFAULT_QUEUE_CAPACITY;
use crate::voice::Interpolation;
use crate::{MAX_AUDIO_FREQ, MIN_AUDIO_FREQ};

/// File name inside [`config_dir`]
pub const CONFIG_FILE: &str = "mixer.toml";

/// Mixer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MixerConfig {
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Device sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Int16,
    #[default]
    Float,
}

/// Output and mixing quality settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Output frequency in Hz (default: 48000, range: 44100-96000)
    #[serde(default = "default_frequency")]
    pub frequency: u32,
    /// Device buffer size in frames (default: 1024)
    #[serde(default = "default_buffer_frames")]
    pub buffer_frames: u32,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub interpolation: Interpolation,
    /// Click-free volume changes and note cuts (default: true)
    #[serde(default = "default_true")]
    pub volume_ramping: bool,
    /// Pre-clip boost (default: 8, range: 1-32)
    #[serde(default = "default_amplification")]
    pub amplification: u8,
    /// Master volume (default: 256, range: 0-256)
    #[serde(default = "default_master_volume")]
    pub master_volume: u16,
    /// Triangular dither on 16-bit output (default: false)
    #[serde(default)]
    pub dither: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Entries per snapshot queue; one less than a power of two (default: 255)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_frequency() -> u32 {
    48_000
}
fn default_buffer_frames() -> u32 {
    1024
}
fn default_true() -> bool {
    true
}
fn default_amplification() -> u8 {
    8
}
fn default_master_volume() -> u16 {
    256
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            frequency: default_frequency(),
            buffer_frames: default_buffer_frames(),
            output_format: OutputFormat::default(),
            interpolation: Interpolation::default(),
            volume_ramping: default_true(),
            amplification: default_amplification(),
            master_volume: default_master_volume(),
            dither: false,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl MixerConfig {
    /// Check every range the engine relies on.
    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;
        if !(MIN_AUDIO_FREQ..=MAX_AUDIO_FREQ).contains(&audio.frequency) {
            return Err(MixerError::FrequencyOutOfRange(audio.frequency));
        }
        if audio.buffer_frames == 0 {
            return Err(MixerError::Config("audio.buffer_frames must be at least 1".into()));
        }
        if !(1..=32).contains(&audio.amplification) {
            return Err(MixerError::AmplificationOutOfRange(audio.amplification));
        }
        if audio.master_volume > 256 {
            return Err(MixerError::MasterVolumeOutOfRange(audio.master_volume));
        }
        let slots = self.sync.queue_capacity.checked_add(1);
        if !slots.is_some_and(|n| n.is_power_of_two() && n > 1) {
            return Err(MixerError::InvalidQueueCapacity(self.sync.queue_capacity));
        }
        Ok(())
    }

    /// Read a config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write a config file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load `mixer.toml` from the config directory.
    ///
    /// Returns defaults if the file is missing, unreadable or invalid.
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            return Self::default();
        };
        if !path.exists() {
            debug!("No mixer config at {}, using defaults", path.display());
            return Self::default();
        }
        Self::load_from(&path).unwrap_or_else(|e| {
            warn!("Ignoring mixer config {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Save `mixer.toml` to the config directory.
    pub fn save(&self) -> Result<()> {
        match config_path() {
            Some(path) => self.save_to(&path),
            None => Err(MixerError::Config("no home directory for config".into())),
        }
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Linux: `~/.config/nether-mix`
/// On macOS: `~/Library/Application Support/io.nethercore.nether-mix`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io", "nethercore", "nether-mix")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = MixerConfig::default();
        assert_eq!(config.audio.frequency, 48_000);
        assert_eq!(config.audio.output_format, OutputFormat::Float);
        assert_eq!(config.audio.interpolation, Interpolation::Sinc8);
        assert!(config.audio.volume_ramping);
        assert_eq!(config.sync.queue_capacity, 255);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: MixerConfig = toml::from_str(
            r#"
            [audio]
            frequency = 44100
            interpolation = "cubic"
            output_format = "int16"
            "#,
        )
        .unwrap();
        assert_eq!(config.audio.frequency, 44_100);
        assert_eq!(config.audio.interpolation, Interpolation::Cubic);
        assert_eq!(config.audio.output_format, OutputFormat::Int16);
        assert_eq!(config.audio.master_volume, 256);
        assert_eq!(config.sync, SyncSettings::default());
    }

    #[test]
    fn test_empty_toml() {
        let config: MixerConfig = toml::from_str("").unwrap();
        assert_eq!(config, MixerConfig::default());
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = MixerConfig::default();
        config.audio.frequency = 22_050;
        assert!(matches!(config.validate(), Err(MixerError::FrequencyOutOfRange(22_050))));

        let mut config = MixerConfig::default();
        config.audio.amplification = 0;
        assert!(matches!(config.validate(), Err(MixerError::AmplificationOutOfRange(0))));

        let mut config = MixerConfig::default();
        config.audio.master_volume = 300;
        assert!(config.validate().is_err());

        let mut config = MixerConfig::default();
        config.audio.buffer_frames = 0;
        assert!(matches!(config.validate(), Err(MixerError::Config(_))));

        let mut config = MixerConfig::default();
        config.sync.queue_capacity = 256;
        assert!(matches!(config.validate(), Err(MixerError::InvalidQueueCapacity(256))));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = MixerConfig::default();
        config.audio.interpolation = Interpolation::Sinc16;
        config.audio.dither = true;
        config.sync.queue_capacity = 63;
        config.save_to(&path).unwrap();

        assert_eq!(MixerConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_load_rejects_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        std::fs::write(&path, "[audio]\nfrequency = \"fast\"\n").unwrap();
        assert!(matches!(MixerConfig::load_from(&path), Err(MixerError::ConfigParse(_))));

        std::fs::write(&path, "[audio]\nfrequency = 8000\n").unwrap();
        assert!(matches!(
            MixerConfig::load_from(&path),
            Err(MixerError::FrequencyOutOfRange(8000))
        ));

        assert!(matches!(
            MixerConfig::load_from(&dir.path().join("missing.toml")),
            Err(MixerError::Io(_))
        ));
    }
}
