//! Versioned audio device configuration.
//!
//! The record is small and flat so it survives format changes:
//!
//! ```toml
//! version = 2
//! input_device = "USB Audio"
//! output_device = "USB Audio"
//! sample_rate = 48000
//! block_size = 256
//! input_channels = 2
//! output_channels = 2
//! input_mask = 3
//! output_mask = 3
//! ```
//!
//! Version 1 files named the block size `buffer_size`; both spellings load.
//! Unknown keys are ignored and missing keys take their defaults.

use crate::ConfigError;
use rackhost_core::PlaybackSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current [`DeviceConfig::version`].
pub const DEVICE_CONFIG_VERSION: u32 = 2;

/// Sample rate used when nothing better is known.
pub const FALLBACK_SAMPLE_RATE: u32 = 44_100;

/// Block size used when nothing better is known.
pub const FALLBACK_BLOCK_SIZE: u32 = 512;

/// Selected devices and stream settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Format version the record was written with.
    pub version: u32,
    /// Input device name; `None` means the backend default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_device: Option<String>,
    /// Output device name; `None` means the backend default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_device: Option<String>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per device callback.
    #[serde(alias = "buffer_size")]
    pub block_size: u32,
    /// Input channels opened on the device.
    pub input_channels: u16,
    /// Output channels opened on the device.
    pub output_channels: u16,
    /// Enabled input channels, bit `i` for channel `i`.
    pub input_mask: u64,
    /// Enabled output channels, bit `i` for channel `i`.
    pub output_mask: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            version: DEVICE_CONFIG_VERSION,
            input_device: None,
            output_device: None,
            sample_rate: FALLBACK_SAMPLE_RATE,
            block_size: FALLBACK_BLOCK_SIZE,
            input_channels: 2,
            output_channels: 2,
            input_mask: 0b11,
            output_mask: 0b11,
        }
    }
}

impl DeviceConfig {
    /// Parses a record of any known version.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(text)?;
        if config.version > DEVICE_CONFIG_VERSION {
            tracing::warn!(
                version = config.version,
                "device config from a newer version, unknown keys ignored"
            );
        }
        config.version = DEVICE_CONFIG_VERSION;
        Ok(config)
    }

    /// Serializes at the current version.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let mut current = self.clone();
        current.version = DEVICE_CONFIG_VERSION;
        Ok(toml::to_string_pretty(&current)?)
    }

    /// Loads a record from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&contents)
    }

    /// Saves the record, replacing the file atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        crate::store::write_atomic(path.as_ref(), self.to_toml()?.as_bytes())
    }

    /// The defaults every backend is expected to open.
    pub fn fallback(&self) -> Self {
        Self {
            sample_rate: FALLBACK_SAMPLE_RATE,
            block_size: FALLBACK_BLOCK_SIZE,
            ..self.clone()
        }
    }

    /// Returns `true` if input and output name the same physical device.
    ///
    /// Two unset names both mean "the default device" and count as the same.
    pub fn same_device(&self) -> bool {
        self.input_channels > 0 && self.input_device == self.output_device
    }

    /// Returns `true` if `other` names the same input and output devices.
    pub fn same_pairing(&self, other: &Self) -> bool {
        self.input_device == other.input_device && self.output_device == other.output_device
    }

    /// Enabled input channels that are also enabled outputs.
    pub fn overlapping_channels(&self) -> u64 {
        let inputs = self.input_mask & channel_bits(self.input_channels);
        let outputs = self.output_mask & channel_bits(self.output_channels);
        inputs & outputs
    }

    /// Stream settings the rack prepares for: it processes the output
    /// channel layout.
    pub fn playback_settings(&self) -> PlaybackSettings {
        PlaybackSettings::new(
            f64::from(self.sample_rate),
            self.block_size as usize,
            usize::from(self.output_channels.max(1)),
        )
    }
}

fn channel_bits(channels: u16) -> u64 {
    if channels >= 64 {
        u64::MAX
    } else {
        (1u64 << channels) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_1_buffer_size_is_accepted() {
        let text = r#"
            version = 1
            output_device = "Built-in Output"
            sample_rate = 48000
            buffer_size = 256
        "#;
        let config = DeviceConfig::from_toml(text).unwrap();
        assert_eq!(config.block_size, 256);
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.version, DEVICE_CONFIG_VERSION);
        assert_eq!(config.input_channels, 2);
        assert_eq!(config.output_device.as_deref(), Some("Built-in Output"));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let text = r#"
            version = 7
            sample_rate = 96000
            surround_mode = "atmos"

            [future]
            x = 1
        "#;
        let config = DeviceConfig::from_toml(text).unwrap();
        assert_eq!(config.sample_rate, 96_000);
        assert_eq!(config.block_size, FALLBACK_BLOCK_SIZE);
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(DeviceConfig::from_toml("").unwrap(), DeviceConfig::default());
    }

    #[test]
    fn toml_round_trip() {
        let config = DeviceConfig {
            input_device: Some("Interface".into()),
            output_device: Some("Interface".into()),
            sample_rate: 48_000,
            block_size: 128,
            input_mask: 0b01,
            ..DeviceConfig::default()
        };
        let text = config.to_toml().unwrap();
        assert!(text.contains("block_size = 128"));
        assert!(!text.contains("buffer_size"));
        assert_eq!(DeviceConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn save_and_load_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("device.toml");
        let config = DeviceConfig {
            sample_rate: 88_200,
            ..DeviceConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(DeviceConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn load_missing_file_fails() {
        let err = DeviceConfig::load("/nonexistent/device.toml").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn overlap_and_same_device() {
        let mut config = DeviceConfig::default();
        assert!(config.same_device());
        assert_eq!(config.overlapping_channels(), 0b11);

        config.input_mask = 0b01;
        config.output_mask = 0b10;
        assert_eq!(config.overlapping_channels(), 0);

        config.output_device = Some("Speakers".into());
        assert!(!config.same_device());

        config.input_channels = 0;
        config.output_device = None;
        assert!(!config.same_device());
    }

    #[test]
    fn fallback_keeps_devices() {
        let config = DeviceConfig {
            output_device: Some("Speakers".into()),
            sample_rate: 48_000,
            block_size: 256,
            ..DeviceConfig::default()
        };
        let fallback = config.fallback();
        assert_eq!(fallback.sample_rate, FALLBACK_SAMPLE_RATE);
        assert_eq!(fallback.block_size, FALLBACK_BLOCK_SIZE);
        assert_eq!(fallback.output_device, config.output_device);
        assert!(fallback.same_pairing(&config));
        assert!(!DeviceConfig::default().same_pairing(&config));
    }

    #[test]
    fn playback_settings_follow_output() {
        let config = DeviceConfig {
            output_channels: 4,
            block_size: 64,
            ..DeviceConfig::default()
        };
        let settings = config.playback_settings();
        assert_eq!(settings.channels, 4);
        assert_eq!(settings.block_size, 64);
        assert_eq!(settings.sample_rate, 44_100.0);
    }
}
