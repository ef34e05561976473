//! Contract checks that every built-in module type must pass.

use proptest::prelude::*;
use rackhost_core::{AudioBlock, EventBuffer, ParameterSet, PlaybackSettings};
use rackhost_effects::builtin_modules;

#[test]
fn ids_are_unique_and_limits_positive() {
    let modules = builtin_modules();
    let mut ids: Vec<_> = modules.iter().map(|m| m.info().id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), modules.len());
    assert!(modules.iter().all(|m| m.info().max_instances > 0));
}

#[test]
fn string_ids_are_unique_per_module() {
    for module in builtin_modules() {
        let params = module.create_parameters();
        let mut ids: Vec<_> = params.iter().map(|p| p.string_id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), params.len(), "{}", module.info().id);
    }
}

#[test]
fn silence_in_silence_out() {
    let settings = PlaybackSettings::new(48_000.0, 256, 2);
    for module in builtin_modules() {
        let set = ParameterSet::new(&module.create_parameters(), 1);
        let params = set.bind(0).unwrap();
        let mut ctx = module.create_context();
        ctx.begin_playback(0, &settings).unwrap();
        let mut data = vec![0.0f32; 512];
        ctx.process_f32(0, &mut AudioBlock::new(&mut data, 2), None, &params, &EventBuffer::EMPTY);
        assert!(data.iter().all(|&s| s == 0.0), "{}", module.info().id);
        ctx.finish_playback(0);
    }
}

#[test]
fn begin_playback_can_be_repeated() {
    for module in builtin_modules() {
        let mut ctx = module.create_context();
        ctx.begin_playback(0, &PlaybackSettings::new(44_100.0, 512, 2))
            .unwrap();
        ctx.finish_playback(0);
        ctx.begin_playback(0, &PlaybackSettings::new(96_000.0, 64, 1))
            .unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Random parameter values and bounded input never produce NaN or infinity.
    #[test]
    fn output_stays_finite(
        normalized in prop::collection::vec(0.0f32..=1.0, 9),
        input in prop::collection::vec(-1.0f32..=1.0, 256),
    ) {
        for module in builtin_modules() {
            let descriptors = module.create_parameters();
            let set = ParameterSet::new(&descriptors, 1);
            let params = set.bind(0).unwrap();
            for (i, d) in descriptors.iter().enumerate() {
                params.set(i, d.denormalize(normalized[i % normalized.len()]));
            }
            let mut ctx = module.create_context();
            ctx.begin_playback(0, &PlaybackSettings::new(48_000.0, 128, 2)).unwrap();
            let mut data = input.clone();
            ctx.process_f32(0, &mut AudioBlock::new(&mut data, 2), None, &params, &EventBuffer::EMPTY);
            prop_assert!(data.iter().all(|s| s.is_finite()), "{}", module.info().id);
        }
    }
}
