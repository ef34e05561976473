//! The contract every DSP module type implements.
//!
//! A module type ([`EffectModule`]) is a stateless descriptor registered once.
//! Each occurrence in the rack gets its own [`ModuleContext`] from
//! [`EffectModule::create_context`], and every context call carries the
//! instance index so one type can serve several instances with independent
//! state.
//!
//! # Lifecycle of a context
//!
//! ```text
//! create_context ─► begin_playback ─► process_* … process_* ─► finish_playback
//!   (control)         (control,          (realtime, no alloc,      (control)
//!                      allocates)         no locks, bounded)
//! ```
//!
//! `begin_playback` may be called again after `finish_playback` with new
//! settings. If it fails, the context must be left in a state where
//! `begin_playback` can be retried.

use crate::buffer::{AudioBlock, EventBuffer};
use crate::param::ParamBinding;
use crate::param_info::ParamDescriptor;

/// Valid sample rates for [`PlaybackSettings::validate`].
pub const SAMPLE_RATE_RANGE: core::ops::RangeInclusive<f64> = 8_000.0..=384_000.0;

/// Largest block size a module is expected to prepare for.
pub const MAX_BLOCK_SIZE: usize = 8192;

/// Static capabilities of a module type. Pure metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Stable type identity, persisted in state trees.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Maximum number of simultaneous instances.
    pub max_instances: usize,
    /// Whether the type supplies a visual editor.
    pub has_editor: bool,
    /// Whether [`ModuleContext::process_f64`] is implemented.
    pub supports_double: bool,
}

/// Stream settings a context prepares for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSettings {
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// Maximum frames per processing call.
    pub block_size: usize,
    /// Interleaved channel count.
    pub channels: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            block_size: 512,
            channels: 2,
        }
    }
}

impl PlaybackSettings {
    /// Creates settings from the three stream parameters.
    pub fn new(sample_rate: f64, block_size: usize, channels: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            channels,
        }
    }

    /// Generic sanity check shared by all modules.
    pub fn validate(&self) -> Result<(), SetupError> {
        if !SAMPLE_RATE_RANGE.contains(&self.sample_rate) {
            return Err(SetupError::SampleRate(self.sample_rate));
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(SetupError::BlockSize(self.block_size));
        }
        if self.channels == 0 {
            return Err(SetupError::Channels(self.channels));
        }
        Ok(())
    }
}

/// A context could not prepare for the requested settings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SetupError {
    /// Sample rate outside what the module supports.
    #[error("unsupported sample rate: {0} Hz")]
    SampleRate(f64),

    /// Block size outside what the module supports.
    #[error("unsupported block size: {0} frames")]
    BlockSize(usize),

    /// Channel layout the module cannot handle.
    #[error("unsupported channel count: {0}")]
    Channels(usize),

    /// Any other preparation failure.
    #[error("module setup failed: {0}")]
    Resource(String),
}

/// Per-instance mutable DSP state.
///
/// Owned by exactly one instance. Once handed to the rack it lives on the
/// realtime thread until removal.
pub trait ModuleContext: Send {
    /// Prepares for playback. All buffer allocation happens here.
    fn begin_playback(
        &mut self,
        index: usize,
        settings: &PlaybackSettings,
    ) -> Result<(), SetupError>;

    /// Ends playback and releases per-stream resources.
    fn finish_playback(&mut self, index: usize);

    /// Processes one single-precision block in place.
    ///
    /// Must not allocate, lock or block. `block.frames()` never exceeds the
    /// prepared `block_size`.
    fn process_f32(
        &mut self,
        index: usize,
        block: &mut AudioBlock<'_, f32>,
        sidechain: Option<&[f32]>,
        params: &ParamBinding,
        events: &EventBuffer,
    );

    /// Processes one double-precision block in place.
    ///
    /// Only called when [`ModuleInfo::supports_double`] is set; the rack
    /// converts through `f32` otherwise. The default does nothing.
    fn process_f64(
        &mut self,
        index: usize,
        block: &mut AudioBlock<'_, f64>,
        sidechain: Option<&[f64]>,
        params: &ParamBinding,
        events: &EventBuffer,
    ) {
        let _ = (index, block, sidechain, params, events);
    }

    /// Processing latency in samples at the prepared settings.
    fn latency_samples(&self) -> usize {
        0
    }
}

/// A registrable DSP algorithm type.
pub trait EffectModule: Send + Sync {
    /// Capability metadata.
    fn info(&self) -> ModuleInfo;

    /// The full parameter list, called once at registration.
    fn create_parameters(&self) -> Vec<ParamDescriptor>;

    /// A fresh, unprepared context.
    fn create_context(&self) -> Box<dyn ModuleContext>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        assert!(PlaybackSettings::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range() {
        assert_eq!(
            PlaybackSettings::new(1_000.0, 512, 2).validate(),
            Err(SetupError::SampleRate(1_000.0))
        );
        assert_eq!(
            PlaybackSettings::new(48_000.0, 0, 2).validate(),
            Err(SetupError::BlockSize(0))
        );
        assert_eq!(
            PlaybackSettings::new(48_000.0, 64, 0).validate(),
            Err(SetupError::Channels(0))
        );
    }

    #[test]
    fn setup_error_display() {
        assert_eq!(
            SetupError::SampleRate(96_000.0).to_string(),
            "unsupported sample rate: 96000 Hz"
        );
    }
}
