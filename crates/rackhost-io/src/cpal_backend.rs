//! cpal-based audio backend.
//!
//! cpal delivers input and output on separate callbacks. [`CpalBackend`]
//! joins them into one duplex callback: the input stream pushes samples into
//! a bounded lock-free channel and the output stream pulls exactly one
//! period's worth into a preallocated buffer before calling the host. Missing
//! input reads as silence; surplus input is dropped.

use crate::backend::{
    AudioBackend, DeviceInfo, DuplexCallback, ErrorCallback, StreamConfig, StreamHandle,
};
use crate::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host};

/// Periods of input that may queue up before samples are dropped.
const INPUT_PERIODS: usize = 4;

fn device_name(device: &Device) -> std::result::Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

fn build_error(err: cpal::BuildStreamError) -> Error {
    match err {
        cpal::BuildStreamError::StreamConfigNotSupported => {
            Error::UnsupportedConfig("device rejected the stream configuration".into())
        }
        cpal::BuildStreamError::DeviceNotAvailable => Error::NoDevice,
        other => Error::Stream(other.to_string()),
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Input,
    Output,
}

/// cpal-based audio backend on the platform's default host
/// (ALSA, CoreAudio or WASAPI).
pub struct CpalBackend {
    host: Host,
}

impl CpalBackend {
    /// Creates a backend on the default audio host.
    pub fn new() -> Self {
        let host = cpal::default_host();
        tracing::info!(host = host.id().name(), "cpal backend initialized");
        Self { host }
    }

    fn find_device(&self, name: Option<&str>, direction: Direction) -> Result<Device> {
        let Some(search) = name else {
            let device = match direction {
                Direction::Input => self.host.default_input_device(),
                Direction::Output => self.host.default_output_device(),
            };
            return device.ok_or(Error::NoDevice);
        };
        let devices = match direction {
            Direction::Input => self.host.input_devices(),
            Direction::Output => self.host.output_devices(),
        }
        .map_err(|e| Error::Stream(e.to_string()))?;

        let search_lower = search.to_lowercase();
        let mut fuzzy = None;
        for device in devices {
            let Ok(found) = device_name(&device) else {
                continue;
            };
            if found == search {
                return Ok(device);
            }
            if fuzzy.is_none() && found.to_lowercase().contains(&search_lower) {
                fuzzy = Some(device);
            }
        }
        fuzzy.ok_or_else(|| Error::DeviceNotFound(search.to_owned()))
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        let devices = self
            .host
            .devices()
            .map_err(|e| Error::Stream(e.to_string()))?;
        let mut infos: Vec<DeviceInfo> = Vec::new();
        for device in devices {
            let Ok(name) = device_name(&device) else {
                continue;
            };
            if infos.iter().any(|d| d.name == name) {
                continue;
            }
            let input = device.default_input_config().ok();
            let output = device.default_output_config().ok();
            let default_sample_rate = output
                .as_ref()
                .or(input.as_ref())
                .map_or(48_000, |c| c.sample_rate());
            infos.push(DeviceInfo {
                name,
                input_channels: input.map_or(0, |c| c.channels()),
                output_channels: output.map_or(0, |c| c.channels()),
                default_sample_rate,
            });
        }
        Ok(infos)
    }

    fn open_duplex(
        &self,
        config: &StreamConfig,
        mut callback: DuplexCallback,
        error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let block = config.block_size.max(1) as usize;
        let in_ch = usize::from(config.input_channels);
        let out_ch = usize::from(config.output_channels.max(1));

        let output_device = self.find_device(config.output_device.as_deref(), Direction::Output)?;
        let (tx, rx) = crossbeam_channel::bounded::<f32>(block * in_ch.max(1) * INPUT_PERIODS);

        let input_stream = if in_ch > 0 {
            let device = self.find_device(config.input_device.as_deref(), Direction::Input)?;
            let stream_config = cpal::StreamConfig {
                channels: config.input_channels,
                sample_rate: config.sample_rate,
                buffer_size: cpal::BufferSize::Fixed(config.block_size),
            };
            let errors = std::sync::Arc::clone(&error_callback);
            let stream = device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        for &sample in data {
                            if tx.try_send(sample).is_err() {
                                break;
                            }
                        }
                    },
                    move |err| errors(&err.to_string()),
                    None,
                )
                .map_err(build_error)?;
            Some(stream)
        } else {
            None
        };

        let stream_config = cpal::StreamConfig {
            channels: out_ch as u16,
            sample_rate: config.sample_rate,
            buffer_size: cpal::BufferSize::Fixed(config.block_size),
        };
        let mut input = vec![0.0f32; block * in_ch];
        let output_stream = output_device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for period in data.chunks_mut(block * out_ch) {
                        let needed = (period.len() / out_ch) * in_ch;
                        for sample in &mut input[..needed] {
                            *sample = rx.try_recv().unwrap_or(0.0);
                        }
                        callback(&input[..needed], period);
                    }
                },
                move |err| error_callback(&err.to_string()),
                None,
            )
            .map_err(build_error)?;

        if let Some(stream) = &input_stream {
            stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        }
        output_stream
            .play()
            .map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            input_channels = config.input_channels,
            output_channels = out_ch,
            "duplex stream started"
        );

        Ok(StreamHandle::new((input_stream, output_stream)))
    }
}
