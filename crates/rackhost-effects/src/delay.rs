//! Feedback delay.
//!
//! The delay line is sized for [`MAX_DELAY_MS`] at the prepared sample rate
//! and allocated in `begin_playback`; processing only indexes into it.

use rackhost_core::{
    AudioBlock, EffectModule, EventBuffer, ModuleContext, ModuleInfo, ParamBinding,
    ParamDescriptor, PlaybackSettings, SetupError, flush_denormal, math,
};

/// Longest delay time, in milliseconds.
pub const MAX_DELAY_MS: f64 = 1000.0;

/// Feedback delay module type.
///
/// ## Parameter Indices
///
/// | Index | Name | Range | Default |
/// |-------|------|-------|---------|
/// | 0 | Time | 1.0–1000.0 ms | 250.0 |
/// | 1 | Feedback | 0–90% | 35.0 |
/// | 2 | Mix | 0–100% | 30.0 |
#[derive(Debug, Clone, Copy, Default)]
pub struct Delay;

impl Delay {
    /// Registry identity.
    pub const ID: &'static str = "delay";
    /// Simultaneous instance limit.
    pub const MAX_INSTANCES: usize = 4;
}

impl EffectModule for Delay {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            id: Self::ID,
            name: "Delay",
            max_instances: Self::MAX_INSTANCES,
            has_editor: true,
            supports_double: false,
        }
    }

    fn create_parameters(&self) -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::time_ms("Time", "time", 1.0, MAX_DELAY_MS as f32, 250.0),
            ParamDescriptor::new("Feedback", "feedback", 0.0, 90.0, 35.0)
                .with_unit(rackhost_core::ParamUnit::Percent),
            ParamDescriptor::percent("Mix", "mix", 30.0),
        ]
    }

    fn create_context(&self) -> Box<dyn ModuleContext> {
        Box::new(DelayContext::default())
    }
}

/// Per-instance delay lines.
#[derive(Debug, Default)]
pub struct DelayContext {
    lines: Vec<Vec<f64>>,
    write: usize,
    sample_rate: f64,
}

impl DelayContext {
    /// Length of each channel's line in samples; zero before playback.
    pub fn line_len(&self) -> usize {
        self.lines.first().map_or(0, Vec::len)
    }
}

impl ModuleContext for DelayContext {
    fn begin_playback(
        &mut self,
        _index: usize,
        settings: &PlaybackSettings,
    ) -> Result<(), SetupError> {
        settings.validate()?;
        let len = libm::ceil(settings.sample_rate * MAX_DELAY_MS / 1000.0) as usize + 1;
        self.lines = vec![vec![0.0; len]; settings.channels];
        self.write = 0;
        self.sample_rate = settings.sample_rate;
        Ok(())
    }

    fn finish_playback(&mut self, _index: usize) {
        self.lines = Vec::new();
        self.write = 0;
    }

    fn process_f32(
        &mut self,
        _index: usize,
        block: &mut AudioBlock<'_, f32>,
        _sidechain: Option<&[f32]>,
        params: &ParamBinding,
        _events: &EventBuffer,
    ) {
        let len = self.line_len();
        if len < 2 {
            return;
        }
        let delay = (f64::from(params.get(0)) * self.sample_rate / 1000.0)
            .round()
            .clamp(1.0, (len - 1) as f64) as usize;
        let feedback = f64::from(params.get(1)) / 100.0;
        let wet = f64::from(params.get(2)) / 100.0;
        let channels = self.lines.len().min(block.channels());

        for frame in block.frames_mut() {
            let read = (self.write + len - delay) % len;
            for (sample, line) in frame[..channels].iter_mut().zip(self.lines.iter_mut()) {
                let dry = f64::from(*sample);
                let delayed = line[read];
                line[self.write] = flush_denormal(dry + delayed * feedback);
                *sample = math::mix(dry, delayed, wet) as f32;
            }
            self.write = (self.write + 1) % len;
        }
    }
}
