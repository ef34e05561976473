//! Rack lifecycle tests against the built-in modules.
//!
//! Covers instance limits, removal ordering, setup failure parking,
//! cancellation, reordering, bypass and state restore.

use rackhost_core::{AudioBlock, AutomationHistory, EventBuffer, PlaybackSettings, SetupError};
use rackhost_rack::{
    InstanceId, InstanceNode, InstanceState, ParamValue, RackController, RackError, RackEvent,
    RackProcessor, RestoreWarning, StateTree, rack,
};
use rackhost_registry::ModuleRegistry;
use std::sync::Arc;

fn setup(sample_rate: f64) -> (RackController, RackProcessor) {
    let registry = Arc::new(ModuleRegistry::with_builtins());
    rack(registry, PlaybackSettings::new(sample_rate, 512, 2))
}

fn tone(frames: usize) -> Vec<f32> {
    (0..frames * 2)
        .map(|i| (2.0 * std::f32::consts::PI * 1000.0 * (i / 2) as f32 / 48_000.0).sin() * 0.5)
        .collect()
}

fn run(processor: &mut RackProcessor, buffer: &mut [f32]) {
    processor.process_f32(&mut AudioBlock::new(buffer, 2), None, &EventBuffer::EMPTY);
}

#[test]
fn equalizer_limit_and_removal() {
    let (mut controller, mut processor) = setup(48_000.0);
    let ids: Vec<InstanceId> = (0..5)
        .map(|_| controller.add_instance("equalizer").unwrap())
        .collect();

    let err = controller.add_instance("equalizer").unwrap_err();
    assert!(matches!(err, RackError::Capacity { max: 5, .. }), "{err}");
    assert_eq!(controller.order(), ids);

    let removed = controller.status(ids[2]).unwrap();
    controller.remove_instance(ids[2]).unwrap();
    controller.params(ids[0]).unwrap().set(4, 12.0);

    let mut buffer = tone(512);
    let original = buffer.clone();
    run(&mut processor, &mut buffer);

    let expected = vec![ids[0], ids[1], ids[3], ids[4]];
    assert_eq!(processor.active_ids(), expected);
    assert_eq!(controller.active_order(), expected);
    assert_ne!(buffer, original, "buffer should be modified in place");
    assert!(buffer.iter().all(|s| s.is_finite()));

    controller.collect_garbage();
    assert_eq!(removed.state(), InstanceState::Destroyed);
    assert!(controller.status(ids[2]).is_none());
}

#[test]
fn draining_instance_holds_its_index() {
    let (mut controller, mut processor) = setup(48_000.0);
    let ids: Vec<InstanceId> = (0..5)
        .map(|_| controller.add_instance("equalizer").unwrap())
        .collect();
    processor.sync();

    controller.remove_instance(ids[2]).unwrap();
    assert_eq!(
        controller.status(ids[2]).unwrap().state(),
        InstanceState::Draining
    );
    assert!(matches!(
        controller.add_instance("equalizer"),
        Err(RackError::Capacity { .. })
    ));

    processor.sync();
    let again = controller.add_instance("equalizer").unwrap();
    assert_ne!(again, ids[2], "ids are never reused");
    assert_eq!(controller.status(again).unwrap().index(), 2);
}

#[test]
fn undo_does_not_reach_an_instance_that_reused_the_index() {
    let (mut controller, mut processor) = setup(48_000.0);
    let mut history = AutomationHistory::default();
    let first = controller.add_instance("gain").unwrap();
    history.set(&controller.params(first).unwrap(), 0, -12.0);

    controller.remove_instance(first).unwrap();
    processor.sync();
    controller.collect_garbage();

    let second = controller.add_instance("gain").unwrap();
    assert_eq!(controller.status(second).unwrap().index(), 0);
    let params = controller.params(second).unwrap();
    assert_eq!(params.get(0), 0.0);
    history.set(&params, 0, 6.0);

    assert!(history.undo());
    assert_eq!(params.get(0), 0.0);
    assert!(!history.undo(), "the removed instance's edit is gone");
    assert_eq!(params.get(0), 0.0);

    assert!(history.redo());
    assert_eq!(params.get(0), 6.0);
}

#[test]
fn capacity_error_leaves_order_unchanged() {
    let (mut controller, _processor) = setup(48_000.0);
    let ids: Vec<InstanceId> = (0..4)
        .map(|_| controller.add_instance("delay").unwrap())
        .collect();
    let before = controller.order();
    assert!(controller.add_instance("delay").is_err());
    assert_eq!(controller.order(), before);
    assert_eq!(before, ids);
}

#[test]
fn unknown_module_is_rejected() {
    let (mut controller, _processor) = setup(48_000.0);
    assert!(matches!(
        controller.add_instance("reverb"),
        Err(RackError::UnknownModule(_))
    ));
    assert!(controller.is_empty());
}

#[test]
fn setup_failure_parks_instance() {
    let (mut controller, mut processor) = setup(16_000.0);
    let gain = controller.add_instance("gain").unwrap();
    let err = controller.add_instance("equalizer").unwrap_err();
    let RackError::Setup { id: eq, source } = err else {
        panic!("expected setup error, got {err}");
    };
    assert_eq!(source, SetupError::SampleRate(16_000.0));

    let mut buffer = tone(512);
    run(&mut processor, &mut buffer);
    assert_eq!(processor.active_ids(), vec![gain]);
    assert_eq!(controller.active_order(), vec![gain]);
    assert_eq!(controller.order(), vec![gain, eq]);

    let status = controller.status(eq).unwrap();
    assert!(status.setup_failed());
    assert_eq!(status.state(), InstanceState::Preparing);

    let tree = controller.serialize();
    assert_eq!(tree.instances.len(), 2);
    assert_eq!(tree.instances[1].type_id, "equalizer");

    let parked = controller.reconfigure(&mut processor, PlaybackSettings::new(48_000.0, 256, 2));
    assert!(parked.is_empty());
    assert_eq!(processor.active_ids(), vec![gain, eq]);
    assert!(!status.setup_failed());
    assert_eq!(status.state(), InstanceState::Active);
}

#[test]
fn reconfigure_parks_instances_that_fail() {
    let (mut controller, mut processor) = setup(48_000.0);
    let eq = controller.add_instance("equalizer").unwrap();
    let gain = controller.add_instance("gain").unwrap();
    processor.sync();

    let parked = controller.reconfigure(&mut processor, PlaybackSettings::new(16_000.0, 512, 2));
    assert_eq!(parked, vec![(eq, SetupError::SampleRate(16_000.0))]);
    assert_eq!(processor.active_ids(), vec![gain]);
    assert_eq!(controller.order(), vec![eq, gain]);

    controller.reconfigure(&mut processor, PlaybackSettings::new(44_100.0, 512, 2));
    assert_eq!(processor.active_ids(), vec![eq, gain]);
}

#[test]
fn only_parked_instances_can_be_cancelled() {
    let (mut controller, mut processor) = setup(16_000.0);
    let gain = controller.add_instance("gain").unwrap();
    let Err(RackError::Setup { id: eq, .. }) = controller.add_instance("equalizer") else {
        panic!("equalizer should fail at 16 kHz");
    };
    let status = controller.status(eq).unwrap();

    assert!(matches!(
        controller.cancel_pending(gain),
        Err(RackError::NotCancellable(_))
    ));
    controller.cancel_pending(eq).unwrap();
    assert_eq!(status.state(), InstanceState::Destroyed);
    assert_eq!(controller.order(), vec![gain]);

    controller.remove_instance(gain).unwrap();
    assert!(matches!(
        controller.cancel_pending(gain),
        Err(RackError::NotCancellable(_))
    ));
    processor.sync();
    controller.collect_garbage();
    assert!(matches!(
        controller.cancel_pending(gain),
        Err(RackError::UnknownInstance(_))
    ));
}

#[test]
fn reorder_applies_at_block_boundary() {
    let (mut controller, mut processor) = setup(48_000.0);
    let gain = controller.add_instance("gain").unwrap();
    let delay = controller.add_instance("delay").unwrap();
    let eq = controller.add_instance("equalizer").unwrap();
    processor.sync();

    controller.reorder(&[eq, gain, delay]).unwrap();
    assert_eq!(processor.active_ids(), vec![gain, delay, eq]);
    processor.sync();
    assert_eq!(processor.active_ids(), vec![eq, gain, delay]);
    assert_eq!(controller.order(), vec![eq, gain, delay]);

    assert!(matches!(
        controller.reorder(&[eq, gain]),
        Err(RackError::InvalidOrder(_))
    ));
    assert!(matches!(
        controller.reorder(&[eq, eq, gain]),
        Err(RackError::InvalidOrder(_))
    ));
    assert_eq!(controller.order(), vec![eq, gain, delay]);
}

#[test]
fn bypass_skips_processing() {
    let (mut controller, mut processor) = setup(48_000.0);
    let gain = controller.add_instance("gain").unwrap();
    controller.params(gain).unwrap().set(0, 6.0);
    controller.set_bypassed(gain, true).unwrap();

    let mut buffer = tone(512);
    let original = buffer.clone();
    run(&mut processor, &mut buffer);
    assert_eq!(buffer, original);

    controller.set_bypassed(gain, false).unwrap();
    run(&mut processor, &mut buffer);
    assert_ne!(buffer, original);
    assert!(controller.status(gain).unwrap().peak() > 0.5);
}

#[test]
fn double_precision_converts_for_single_only_modules() {
    let (mut controller, mut processor) = setup(48_000.0);
    let gain = controller.add_instance("gain").unwrap();
    controller.add_instance("equalizer").unwrap();
    controller.params(gain).unwrap().set(0, -6.0);

    let mut buffer = vec![0.5f64; 2 * 512];
    // Settle the gain ramp.
    processor.process_f64(&mut AudioBlock::new(&mut buffer, 2), None, &EventBuffer::EMPTY);
    buffer.fill(0.5);
    processor.process_f64(&mut AudioBlock::new(&mut buffer, 2), None, &EventBuffer::EMPTY);

    let expected = 0.5 * 10f64.powf(-6.0 / 20.0);
    let last = buffer[buffer.len() - 1];
    assert!((last - expected).abs() < 1e-3, "got {last}, expected {expected}");
}

#[test]
fn wide_double_blocks_still_reach_single_only_modules() {
    let (mut controller, mut processor) = setup(48_000.0);
    let gain = controller.add_instance("gain").unwrap();
    controller.params(gain).unwrap().set(0, -60.0);

    // Prepared for 2 channels, fed 4.
    let mut wide = vec![1.0f64; 4 * 512];
    processor.process_f64(&mut AudioBlock::new(&mut wide, 4), None, &EventBuffer::EMPTY);
    wide.fill(1.0);
    processor.process_f64(&mut AudioBlock::new(&mut wide, 4), None, &EventBuffer::EMPTY);

    let mut narrow = vec![1.0f32; 4 * 512];
    processor.process_f32(&mut AudioBlock::new(&mut narrow, 4), None, &EventBuffer::EMPTY);

    for (&d, &s) in wide.iter().zip(&narrow) {
        assert!((d - 0.001).abs() < 1e-4, "double path got {d}");
        assert!((d - f64::from(s)).abs() < 1e-6);
    }
}

#[test]
fn long_blocks_are_split() {
    let (mut controller, mut processor) = setup(48_000.0);
    controller.add_instance("equalizer").unwrap();
    let mut buffer = tone(1500);
    run(&mut processor, &mut buffer);
    assert!(buffer.iter().all(|s| s.is_finite()));
    assert_eq!(processor.blocks_processed(), 1);
}

#[test]
fn state_round_trip() {
    let (mut controller, mut processor) = setup(48_000.0);
    let eq = controller.add_instance("equalizer").unwrap();
    let gain = controller.add_instance("gain").unwrap();
    let delay = controller.add_instance("delay").unwrap();
    controller.params(eq).unwrap().set(1, 3.0);
    controller.params(gain).unwrap().set(0, -12.0);
    controller.params(delay).unwrap().set(0, 120.0);
    controller.set_bypassed(delay, true).unwrap();
    processor.sync();
    let tree = controller.serialize();

    let (mut restored, mut restored_processor) = setup(48_000.0);
    let report = restored.restore(&mut restored_processor, &tree);
    assert!(report.is_clean(), "{:?}", report.warnings);
    assert_eq!(report.instances, 3);
    assert_eq!(restored.serialize(), tree);
    assert_eq!(restored_processor.len(), 3);

    let order = restored.order();
    assert_eq!(restored.params(order[0]).unwrap().get(1), 3.0);
    assert!(restored.status(order[2]).unwrap().is_bypassed());

    let text = toml::to_string(&tree).unwrap();
    let from_toml: StateTree = toml::from_str(&text).unwrap();
    assert_eq!(from_toml, tree);
}

#[test]
fn restore_keeps_unknown_types_as_placeholders() {
    let (mut controller, mut processor) = setup(48_000.0);
    let mut reverb = InstanceNode::new("reverb", 3);
    reverb.params.push(ParamValue {
        id: "size".into(),
        value: 0.7,
    });
    let tree = StateTree {
        instances: vec![InstanceNode::new("gain", 0), reverb.clone()],
        ..StateTree::default()
    };

    let report = controller.restore(&mut processor, &tree);
    assert_eq!(
        report.warnings,
        vec![RestoreWarning::UnknownType {
            type_id: "reverb".into()
        }]
    );
    assert_eq!(controller.len(), 2);
    assert_eq!(processor.len(), 1);

    let placeholder = controller.order()[1];
    assert!(controller.status(placeholder).unwrap().is_placeholder());
    assert!(controller.params(placeholder).is_none());

    let out = controller.serialize();
    assert_eq!(out.instances[1], reverb);
    assert_eq!(out.instances[0].params.len(), 1);
}

#[test]
fn restore_defaults_missing_params_and_ignores_unknown() {
    let (mut controller, mut processor) = setup(48_000.0);
    let mut node = InstanceNode::new("delay", 0);
    node.params.push(ParamValue {
        id: "mix".into(),
        value: 80.0,
    });
    node.params.push(ParamValue {
        id: "shimmer".into(),
        value: 1.0,
    });
    let tree = StateTree {
        instances: vec![node],
        ..StateTree::default()
    };
    let report = controller.restore(&mut processor, &tree);
    assert!(matches!(
        report.warnings.as_slice(),
        [RestoreWarning::UnknownParam { .. }]
    ));
    let params = controller.params(controller.order()[0]).unwrap();
    assert_eq!(params.get(2), 80.0);
    assert_eq!(params.get(0), 250.0);
}

#[test]
fn restore_over_capacity_becomes_placeholder() {
    let (mut controller, mut processor) = setup(48_000.0);
    let tree = StateTree {
        instances: (0..5).map(|i| InstanceNode::new("delay", i)).collect(),
        ..StateTree::default()
    };
    let report = controller.restore(&mut processor, &tree);
    assert_eq!(processor.len(), 4);
    assert_eq!(controller.len(), 5);
    assert!(matches!(
        report.warnings.as_slice(),
        [RestoreWarning::OverCapacity { .. }]
    ));
}

#[test]
fn restore_replaces_previous_contents() {
    let (mut controller, mut processor) = setup(48_000.0);
    let old = controller.add_instance("gain").unwrap();
    let old_status = controller.status(old).unwrap();
    let tree = StateTree {
        instances: vec![InstanceNode::new("equalizer", 0)],
        ..StateTree::default()
    };
    controller.restore(&mut processor, &tree);
    assert_eq!(old_status.state(), InstanceState::Destroyed);
    assert_eq!(controller.len(), 1);
    assert_eq!(processor.len(), 1);
}

#[test]
fn malformed_state_bytes_change_nothing() {
    let (mut controller, mut processor) = setup(48_000.0);
    let gain = controller.add_instance("gain").unwrap();
    let err = controller
        .load_state_bytes(&mut processor, b"{not json")
        .unwrap_err();
    assert!(matches!(err, RackError::State(_)));
    assert_eq!(controller.order(), vec![gain]);

    let bytes = controller.save_state_bytes().unwrap();
    let (mut other, mut other_processor) = setup(48_000.0);
    other.load_state_bytes(&mut other_processor, &bytes).unwrap();
    assert_eq!(other.save_state_bytes().unwrap(), bytes);
}

#[test]
fn listeners_and_view_follow_changes() {
    let (mut controller, mut processor) = setup(48_000.0);
    let events = controller.subscribe();
    let view = controller.view();

    let gain = controller.add_instance("gain").unwrap();
    assert!(matches!(
        events.try_recv(),
        Ok(RackEvent::InstanceAdded { id, .. }) if id == gain
    ));
    assert_eq!(view.load().instances.len(), 1);
    assert!(view.load().active_ids().is_empty());

    processor.sync();
    assert_eq!(view.load().active_ids(), vec![gain]);
    assert_eq!(view.load().instances[0].name, "Gain");

    controller.remove_instance(gain).unwrap();
    assert!(matches!(events.try_recv(), Ok(RackEvent::InstanceRemoved { .. })));
    processor.sync();
    controller.collect_garbage();
    assert!(matches!(
        events.try_recv(),
        Ok(RackEvent::InstanceDestroyed { .. })
    ));
    assert!(view.load().instances.is_empty());
}

#[test]
fn shutdown_destroys_everything() {
    let (mut controller, mut processor) = setup(48_000.0);
    let a = controller.add_instance("delay").unwrap();
    let status = controller.status(a).unwrap();
    processor.sync();
    controller.shutdown(&mut processor);
    assert!(controller.is_empty());
    assert!(processor.is_empty());
    assert_eq!(status.state(), InstanceState::Destroyed);
}
