//! Deterministic in-process backend.
//!
//! [`MockBackend`] opens "streams" without touching hardware. The test (or a
//! headless tool) drives the callback itself with [`MockBackend::run_block`],
//! so every block is reproducible. Configurations can be marked as refused to
//! exercise fallback paths.

use crate::backend::{
    AudioBackend, DeviceInfo, DuplexCallback, ErrorCallback, StreamConfig, StreamHandle,
};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

struct MockState {
    devices: Vec<DeviceInfo>,
    /// `(sample_rate, block_size)` pairs every device refuses.
    refused: Vec<(u32, u32)>,
    callback: Option<DuplexCallback>,
    error_callback: Option<ErrorCallback>,
    opened: Vec<StreamConfig>,
    current: Option<StreamConfig>,
    /// Bumped per open so a stale handle cannot close a newer stream.
    generation: u64,
}

/// A backend whose streams are driven by hand.
///
/// Clones share the same devices and stream.
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Name of the single default device.
    pub const DEFAULT_DEVICE: &'static str = "Mock Duplex";

    /// A backend with one stereo duplex device.
    pub fn new() -> Self {
        Self::with_devices(vec![DeviceInfo {
            name: Self::DEFAULT_DEVICE.to_owned(),
            input_channels: 2,
            output_channels: 2,
            default_sample_rate: 48_000,
        }])
    }

    /// A backend offering exactly `devices`.
    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                devices,
                refused: Vec::new(),
                callback: None,
                error_callback: None,
                opened: Vec::new(),
                current: None,
                generation: 0,
            })),
        }
    }

    /// Makes every device refuse `sample_rate` at `block_size`.
    pub fn refuse(&self, sample_rate: u32, block_size: u32) {
        self.state.lock().refused.push((sample_rate, block_size));
    }

    /// Runs one period through the open stream.
    ///
    /// Returns `false`, leaving `output` untouched, if no stream is open.
    pub fn run_block(&self, input: &[f32], output: &mut [f32]) -> bool {
        let mut state = self.state.lock();
        match state.callback.as_mut() {
            Some(callback) => {
                callback(input, output);
                true
            }
            None => false,
        }
    }

    /// Reports a stream error as the device would.
    pub fn raise_error(&self, message: &str) {
        let errors = self.state.lock().error_callback.clone();
        if let Some(errors) = errors {
            errors(message);
        }
    }

    /// Returns `true` while a stream is open.
    pub fn is_running(&self) -> bool {
        self.state.lock().callback.is_some()
    }

    /// Configuration of the open stream.
    pub fn current_config(&self) -> Option<StreamConfig> {
        self.state.lock().current.clone()
    }

    /// Every configuration successfully opened, oldest first.
    pub fn opened(&self) -> Vec<StreamConfig> {
        self.state.lock().opened.clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockBackend")
            .field("devices", &state.devices)
            .field("current", &state.current)
            .finish_non_exhaustive()
    }
}

struct MockStream {
    state: Arc<Mutex<MockState>>,
    generation: u64,
}

impl Drop for MockStream {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.generation == self.generation {
            state.callback = None;
            state.error_callback = None;
            state.current = None;
        }
    }
}

impl AudioBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.state.lock().devices.clone())
    }

    fn open_duplex(
        &self,
        config: &StreamConfig,
        callback: DuplexCallback,
        error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let mut state = self.state.lock();
        let find = |name: &Option<String>| match name {
            Some(name) => state
                .devices
                .iter()
                .any(|d| &d.name == name)
                .then_some(())
                .ok_or_else(|| Error::DeviceNotFound(name.clone())),
            None if state.devices.is_empty() => Err(Error::NoDevice),
            None => Ok(()),
        };
        find(&config.output_device)?;
        if config.input_channels > 0 {
            find(&config.input_device)?;
        }
        if state
            .refused
            .contains(&(config.sample_rate, config.block_size))
        {
            return Err(Error::UnsupportedConfig(format!(
                "{} Hz / {} frames",
                config.sample_rate, config.block_size
            )));
        }

        state.generation += 1;
        state.callback = Some(callback);
        state.error_callback = Some(error_callback);
        state.current = Some(config.clone());
        state.opened.push(config.clone());
        Ok(StreamHandle::new(MockStream {
            state: Arc::clone(&self.state),
            generation: state.generation,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(sample_rate: u32, block_size: u32) -> StreamConfig {
        StreamConfig {
            input_device: None,
            output_device: None,
            sample_rate,
            block_size,
            input_channels: 2,
            output_channels: 2,
        }
    }

    fn silent() -> DuplexCallback {
        Box::new(|_: &[f32], _: &mut [f32]| {})
    }

    fn noop_errors() -> ErrorCallback {
        Arc::new(|_: &str| {})
    }

    #[test]
    fn drives_callback_until_dropped() {
        let backend = MockBackend::new();
        let handle = backend
            .open_duplex(
                &config(48_000, 4),
                Box::new(|input: &[f32], output: &mut [f32]| output.copy_from_slice(input)),
                noop_errors(),
            )
            .unwrap();
        let mut out = [0.0f32; 8];
        assert!(backend.run_block(&[0.5; 8], &mut out));
        assert_eq!(out, [0.5; 8]);
        drop(handle);
        assert!(!backend.is_running());
        assert!(!backend.run_block(&[0.5; 8], &mut out));
    }

    #[test]
    fn refused_config_fails() {
        let backend = MockBackend::new();
        backend.refuse(48_000, 256);
        let err = backend
            .open_duplex(&config(48_000, 256), silent(), noop_errors())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedConfig(_)));
        assert!(backend.opened().is_empty());
    }

    #[test]
    fn unknown_device_fails() {
        let backend = MockBackend::new();
        let mut cfg = config(44_100, 512);
        cfg.output_device = Some("Nope".into());
        assert!(matches!(
            backend.open_duplex(&cfg, silent(), noop_errors()),
            Err(Error::DeviceNotFound(_))
        ));
    }

    #[test]
    fn stale_handle_does_not_close_new_stream() {
        let backend = MockBackend::new();
        let first = backend
            .open_duplex(&config(44_100, 512), silent(), noop_errors())
            .unwrap();
        let _second = backend
            .open_duplex(&config(48_000, 512), silent(), noop_errors())
            .unwrap();
        drop(first);
        assert!(backend.is_running());
        assert_eq!(backend.current_config().unwrap().sample_rate, 48_000);
        assert_eq!(backend.opened().len(), 2);
    }
}
