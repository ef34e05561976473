//! Feedback-loop detection.
//!
//! Capturing from the same device the rack plays into, on overlapping
//! channels, can re-record the output and run away. The host checks the
//! configured pairing before the stream starts and forces input mute until
//! the user acknowledges the risk.

use rackhost_config::DeviceConfig;

/// A device pairing that may feed its own output back into its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackRisk {
    /// The shared device; `None` is the backend default device.
    pub device: Option<String>,
    /// Channels enabled as both input and output, bit `i` for channel `i`.
    pub channels: u64,
}

impl FeedbackRisk {
    /// Inspects a configuration; `None` if it is safe.
    pub fn assess(config: &DeviceConfig) -> Option<Self> {
        if !config.same_device() {
            return None;
        }
        let channels = config.overlapping_channels();
        (channels != 0).then(|| Self {
            device: config.output_device.clone(),
            channels,
        })
    }

    /// Number of overlapping channels.
    pub fn channel_count(&self) -> u32 {
        self.channels.count_ones()
    }
}
