//! Pluggable audio backend abstraction.
//!
//! The host never talks to a platform audio API directly. It asks an
//! [`AudioBackend`] for a duplex stream and hands it one boxed callback that
//! receives the captured input and fills the output for the same period.
//!
//! ```text
//! ┌──────────────────────┐
//! │    StandaloneHost    │
//! └──────────┬───────────┘
//!            │ open_duplex(config, callback)
//!            ▼
//! ┌──────────────────────┐
//! │  AudioBackend trait  │
//! └──────────┬───────────┘
//!     ┌──────┴───────┐
//!     ▼              ▼
//! CpalBackend    MockBackend
//! ```
//!
//! Callbacks are boxed so the trait stays object-safe, and streams come back
//! as a type-erased [`StreamHandle`] that stops the device when dropped.

use crate::Result;
use rackhost_config::DeviceConfig;
use std::sync::Arc;

/// One audio device as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Human-readable device name, also its identifier.
    pub name: String,
    /// Input channels offered by the default input configuration.
    pub input_channels: u16,
    /// Output channels offered by the default output configuration.
    pub output_channels: u16,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
}

impl DeviceInfo {
    /// Whether the device can capture.
    pub fn is_input(&self) -> bool {
        self.input_channels > 0
    }

    /// Whether the device can play.
    pub fn is_output(&self) -> bool {
        self.output_channels > 0
    }
}

/// Everything needed to open a duplex stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Input device name; `None` for the default.
    pub input_device: Option<String>,
    /// Output device name; `None` for the default.
    pub output_device: Option<String>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per callback. Callbacks never receive more.
    pub block_size: u32,
    /// Input channels; `0` opens output only.
    pub input_channels: u16,
    /// Output channels.
    pub output_channels: u16,
}

impl From<&DeviceConfig> for StreamConfig {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            input_device: config.input_device.clone(),
            output_device: config.output_device.clone(),
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            input_channels: config.input_channels,
            output_channels: config.output_channels.max(1),
        }
    }
}

/// Type-erased audio stream handle.
///
/// The stream runs while this handle exists; dropping it stops the device.
pub struct StreamHandle {
    _inner: Box<dyn Send>,
}

impl StreamHandle {
    /// Wraps a backend-specific stream object, kept alive until drop.
    pub fn new<T: Send + 'static>(stream: T) -> Self {
        Self {
            _inner: Box::new(stream),
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle").finish_non_exhaustive()
    }
}

/// Duplex callback, called on the realtime thread.
///
/// Receives interleaved input (`frames * input_channels` samples, empty when
/// no input is open) and must fill interleaved output (`frames *
/// output_channels`). Must not allocate, block or perform I/O.
pub type DuplexCallback = Box<dyn FnMut(&[f32], &mut [f32]) + Send>;

/// Stream error callback, shared by the input and output streams.
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// A source of audio devices and duplex streams.
pub trait AudioBackend: Send {
    /// Human-readable name of this backend (e.g. "cpal", "mock").
    fn name(&self) -> &str;

    /// Lists every device the backend can open.
    fn list_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Opens and starts a duplex stream.
    ///
    /// # Errors
    ///
    /// [`Error::DeviceNotFound`](crate::Error::DeviceNotFound) for an unknown
    /// device name, [`Error::UnsupportedConfig`](crate::Error::UnsupportedConfig)
    /// if the device refuses the settings, [`Error::Stream`](crate::Error::Stream)
    /// for anything else.
    fn open_duplex(
        &self,
        config: &StreamConfig,
        callback: DuplexCallback,
        error_callback: ErrorCallback,
    ) -> Result<StreamHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_config_from_device_config() {
        let device = DeviceConfig {
            output_device: Some("Speakers".into()),
            sample_rate: 48_000,
            block_size: 128,
            input_channels: 0,
            output_channels: 0,
            ..DeviceConfig::default()
        };
        let config = StreamConfig::from(&device);
        assert_eq!(config.output_device.as_deref(), Some("Speakers"));
        assert_eq!(config.block_size, 128);
        assert_eq!(config.input_channels, 0);
        assert_eq!(config.output_channels, 1);
    }

    #[test]
    fn device_info_directions() {
        let info = DeviceInfo {
            name: "Mic".into(),
            input_channels: 1,
            output_channels: 0,
            default_sample_rate: 48_000,
        };
        assert!(info.is_input());
        assert!(!info.is_output());
    }

    #[test]
    fn stream_handle_debug() {
        let handle = StreamHandle::new(42u32);
        assert!(format!("{handle:?}").contains("StreamHandle"));
    }
}
