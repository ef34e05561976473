//! 3-band parametric equalizer.
//!
//! Uses RBJ cookbook peaking filters, cascaded low → mid → high, one cascade
//! per channel.

use rackhost_core::{
    AudioBlock, Biquad, Coefficients, EffectModule, EventBuffer, ModuleContext, ModuleInfo,
    ParamBinding, ParamDescriptor, PlaybackSettings, Sample, SetupError,
};

/// Sample rates the equalizer accepts. The high band reaches 15 kHz, which
/// needs a Nyquist frequency above it.
pub const SUPPORTED_SAMPLE_RATES: core::ops::RangeInclusive<f64> = 32_000.0..=192_000.0;

const PARAM_COUNT: usize = 9;

/// 3-band parametric equalizer module type.
///
/// ## Parameter Indices
///
/// | Index | Name | Range | Default |
/// |-------|------|-------|---------|
/// | 0 | Low Frequency | 20.0–500.0 Hz | 100.0 |
/// | 1 | Low Gain | -12.0–12.0 dB | 0.0 |
/// | 2 | Low Q | 0.5–5.0 | 1.0 |
/// | 3 | Mid Frequency | 200.0–5000.0 Hz | 1000.0 |
/// | 4 | Mid Gain | -12.0–12.0 dB | 0.0 |
/// | 5 | Mid Q | 0.5–5.0 | 1.0 |
/// | 6 | High Frequency | 1000.0–15000.0 Hz | 5000.0 |
/// | 7 | High Gain | -12.0–12.0 dB | 0.0 |
/// | 8 | High Q | 0.5–5.0 | 1.0 |
#[derive(Debug, Clone, Copy, Default)]
pub struct Equalizer;

impl Equalizer {
    /// Registry identity.
    pub const ID: &'static str = "equalizer";
    /// Simultaneous instance limit.
    pub const MAX_INSTANCES: usize = 5;
}

impl EffectModule for Equalizer {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            id: Self::ID,
            name: "Equalizer",
            max_instances: Self::MAX_INSTANCES,
            has_editor: true,
            supports_double: true,
        }
    }

    fn create_parameters(&self) -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::frequency("Low Frequency", "low_freq", 20.0, 500.0, 100.0),
            ParamDescriptor::gain_db("Low Gain", "low_gain", -12.0, 12.0, 0.0),
            ParamDescriptor::new("Low Q", "low_q", 0.5, 5.0, 1.0),
            ParamDescriptor::frequency("Mid Frequency", "mid_freq", 200.0, 5000.0, 1000.0),
            ParamDescriptor::gain_db("Mid Gain", "mid_gain", -12.0, 12.0, 0.0),
            ParamDescriptor::new("Mid Q", "mid_q", 0.5, 5.0, 1.0),
            ParamDescriptor::frequency("High Frequency", "high_freq", 1000.0, 15000.0, 5000.0),
            ParamDescriptor::gain_db("High Gain", "high_gain", -12.0, 12.0, 0.0),
            ParamDescriptor::new("High Q", "high_q", 0.5, 5.0, 1.0),
        ]
    }

    fn create_context(&self) -> Box<dyn ModuleContext> {
        Box::new(EqualizerContext::default())
    }
}

/// Per-instance equalizer state.
#[derive(Debug, Default)]
pub struct EqualizerContext {
    /// One low/mid/high cascade per channel.
    bands: Vec<[Biquad; 3]>,
    sample_rate: f64,
    /// Parameter values the current coefficients were computed from.
    last: [f32; PARAM_COUNT],
}

impl EqualizerContext {
    /// Number of channels prepared for.
    pub fn channels(&self) -> usize {
        self.bands.len()
    }

    fn update_coefficients(&mut self, params: &ParamBinding) {
        let mut values = [0.0f32; PARAM_COUNT];
        for (i, v) in values.iter_mut().enumerate() {
            *v = params.get(i);
        }
        if values == self.last {
            return;
        }
        self.last = values;

        let coeffs: [Coefficients; 3] = core::array::from_fn(|band| {
            let base = band * 3;
            Coefficients::peaking(
                f64::from(values[base]),
                f64::from(values[base + 2]),
                f64::from(values[base + 1]),
                self.sample_rate,
            )
        });
        for cascade in &mut self.bands {
            for (filter, c) in cascade.iter_mut().zip(coeffs) {
                filter.set_coefficients(c);
            }
        }
    }

    fn run<T: Sample>(&mut self, block: &mut AudioBlock<'_, T>, params: &ParamBinding) {
        self.update_coefficients(params);
        let channels = self.bands.len().min(block.channels());
        for frame in block.frames_mut() {
            for (sample, cascade) in frame[..channels].iter_mut().zip(self.bands.iter_mut()) {
                let mut x = sample.to_f64();
                for filter in cascade.iter_mut() {
                    x = filter.process(x);
                }
                *sample = T::from_f64(x);
            }
        }
    }
}

impl ModuleContext for EqualizerContext {
    fn begin_playback(
        &mut self,
        _index: usize,
        settings: &PlaybackSettings,
    ) -> Result<(), SetupError> {
        settings.validate()?;
        if !SUPPORTED_SAMPLE_RATES.contains(&settings.sample_rate) {
            return Err(SetupError::SampleRate(settings.sample_rate));
        }
        self.sample_rate = settings.sample_rate;
        self.bands = vec![core::array::from_fn(|_| Biquad::new()); settings.channels];
        // Force a coefficient refresh on the first block.
        self.last = [f32::NAN; PARAM_COUNT];
        Ok(())
    }

    fn finish_playback(&mut self, _index: usize) {
        self.bands = Vec::new();
    }

    fn process_f32(
        &mut self,
        _index: usize,
        block: &mut AudioBlock<'_, f32>,
        _sidechain: Option<&[f32]>,
        params: &ParamBinding,
        _events: &EventBuffer,
    ) {
        self.run(block, params);
    }

    fn process_f64(
        &mut self,
        _index: usize,
        block: &mut AudioBlock<'_, f64>,
        _sidechain: Option<&[f64]>,
        params: &ParamBinding,
        _events: &EventBuffer,
    ) {
        self.run(block, params);
    }
}
