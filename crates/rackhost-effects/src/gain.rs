//! Output gain stage.
//!
//! Single precision only and without an editor: the rack converts double
//! blocks through `f32` before they reach it.

use rackhost_core::{
    AudioBlock, EffectModule, EventBuffer, ModuleContext, ModuleInfo, ParamBinding,
    ParamDescriptor, PlaybackSettings, SetupError, db_to_linear,
};

/// Gain module type.
///
/// ## Parameter Indices
///
/// | Index | Name | Range | Default |
/// |-------|------|-------|---------|
/// | 0 | Gain | -60.0–24.0 dB | 0.0 |
#[derive(Debug, Clone, Copy, Default)]
pub struct Gain;

impl Gain {
    /// Registry identity.
    pub const ID: &'static str = "gain";
    /// Simultaneous instance limit.
    pub const MAX_INSTANCES: usize = 8;
}

impl EffectModule for Gain {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            id: Self::ID,
            name: "Gain",
            max_instances: Self::MAX_INSTANCES,
            has_editor: false,
            supports_double: false,
        }
    }

    fn create_parameters(&self) -> Vec<ParamDescriptor> {
        vec![ParamDescriptor::gain_db("Gain", "gain", -60.0, 24.0, 0.0)]
    }

    fn create_context(&self) -> Box<dyn ModuleContext> {
        Box::new(GainContext::default())
    }
}

/// Per-instance gain state.
#[derive(Debug)]
pub struct GainContext {
    /// Linear gain reached at the end of the previous block.
    current: f32,
}

impl Default for GainContext {
    fn default() -> Self {
        Self { current: 1.0 }
    }
}

impl ModuleContext for GainContext {
    fn begin_playback(
        &mut self,
        _index: usize,
        settings: &PlaybackSettings,
    ) -> Result<(), SetupError> {
        settings.validate()?;
        self.current = 1.0;
        Ok(())
    }

    fn finish_playback(&mut self, _index: usize) {}

    fn process_f32(
        &mut self,
        _index: usize,
        block: &mut AudioBlock<'_, f32>,
        _sidechain: Option<&[f32]>,
        params: &ParamBinding,
        _events: &EventBuffer,
    ) {
        let target = db_to_linear(f64::from(params.get(0))) as f32;
        let frames = block.frames();
        if frames == 0 {
            return;
        }
        // Linear ramp across the block avoids zipper noise on jumps.
        let step = (target - self.current) / frames as f32;
        let mut g = self.current;
        for frame in block.frames_mut() {
            g += step;
            for s in frame {
                *s *= g;
            }
        }
        self.current = target;
    }
}
