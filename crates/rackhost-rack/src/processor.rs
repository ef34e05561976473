//! Realtime half of the rack.
//!
//! [`RackProcessor`] owns every active instance and runs them as a serial
//! chain. Structural commands from the [`RackController`](crate::RackController)
//! are drained at the start of each block, so a block always sees one
//! self-consistent order from its first sample to its last.
//!
//! # Signal Flow
//!
//! ```text
//! block ─► chain[0] ─► chain[1] ─► … ─► chain[n-1] ─► block (in place)
//! ```
//!
//! Bypassed instances are skipped. Blocks longer than the prepared block size
//! are split into prepared-size chunks; events go to the first chunk.
//!
//! # Realtime Safety
//!
//! `process_*` and [`sync`](RackProcessor::sync) never allocate, lock or
//! block. The chain vector is allocated for the registry's total instance
//! capacity up front, conversion scratch is sized in
//! [`prepare`](RackProcessor::prepare), and anything leaving the chain is sent
//! back to the control thread over a bounded channel instead of being dropped
//! here.

use crate::command::{Garbage, RackCommand};
use crate::instance::{Instance, InstanceId};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use rackhost_core::{AudioBlock, EventBuffer, PlaybackSettings, Sample, SetupError};

static NO_EVENTS: EventBuffer = EventBuffer::EMPTY;

/// Smallest f32 conversion scratch, in samples. Lets an f64 block carry more
/// channels than the chain was prepared for.
const MIN_SCRATCH: usize = 1024;

fn scratch_len(settings: &PlaybackSettings) -> usize {
    (settings.block_size * settings.channels).max(MIN_SCRATCH)
}

/// The realtime-thread side of a rack.
///
/// Created together with its controller by [`rack`](crate::rack). Move it to
/// (or share it with) whatever drives the audio callback.
pub struct RackProcessor {
    chain: Vec<Box<Instance>>,
    /// Chain length the preallocated storage can hold.
    limit: usize,
    commands: Receiver<RackCommand>,
    garbage: Sender<Garbage>,
    settings: PlaybackSettings,
    /// f32 conversion space for single-precision modules in an f64 chain.
    scratch: Vec<f32>,
    side_scratch: Vec<f32>,
    blocks: u64,
    /// Garbage dropped on this thread because the controller was gone.
    lost: u64,
}

impl RackProcessor {
    pub(crate) fn new(
        limit: usize,
        commands: Receiver<RackCommand>,
        garbage: Sender<Garbage>,
        settings: PlaybackSettings,
    ) -> Self {
        let scratch_len = scratch_len(&settings);
        Self {
            chain: Vec::with_capacity(limit),
            limit,
            commands,
            garbage,
            settings,
            scratch: vec![0.0; scratch_len],
            side_scratch: vec![0.0; scratch_len],
            blocks: 0,
            lost: 0,
        }
    }

    /// Applies pending structural commands without processing audio.
    ///
    /// `process_*` calls this itself; use it directly when no stream is
    /// running (offline rendering, tests).
    pub fn sync(&mut self) {
        // Every command hands back at most one garbage item, so only take a
        // command while there is room to return what it displaces.
        while !self.garbage.is_full() {
            let Ok(command) = self.commands.try_recv() else {
                break;
            };
            match command {
                RackCommand::Insert { instance, position } => {
                    if self.chain.len() >= self.limit {
                        self.discard(Garbage::Rejected(instance));
                        continue;
                    }
                    instance.status.promote();
                    let position = position.min(self.chain.len());
                    self.chain.insert(position, instance);
                }
                RackCommand::Remove(id) => {
                    if let Some(pos) = self.position(id) {
                        let instance = self.chain.remove(pos);
                        self.discard(Garbage::Removed(instance));
                    }
                }
                RackCommand::Reorder(order) => {
                    self.apply_order(&order);
                    self.discard(Garbage::Order(order));
                }
            }
        }
    }

    /// Hands `item` back to the control thread.
    ///
    /// Fails only once the controller is gone; the item is then dropped here
    /// and counted.
    fn discard(&mut self, item: Garbage) {
        if let Err(err) = self.garbage.try_send(item) {
            debug_assert!(
                matches!(err, TrySendError::Disconnected(_)),
                "garbage queue overflow"
            );
            self.lost += 1;
        }
    }

    fn position(&self, id: InstanceId) -> Option<usize> {
        self.chain.iter().position(|i| i.id() == id)
    }

    /// Permutes the chain in place. Ids not present are skipped; instances not
    /// named keep their relative order at the end.
    fn apply_order(&mut self, order: &[InstanceId]) {
        let mut next = 0;
        for &id in order {
            if let Some(offset) = self.chain[next..].iter().position(|i| i.id() == id) {
                self.chain.swap(next, next + offset);
                next += 1;
            }
        }
    }

    /// Processes a single-precision block in place.
    pub fn process_f32(
        &mut self,
        block: &mut AudioBlock<'_, f32>,
        sidechain: Option<&[f32]>,
        events: &EventBuffer,
    ) {
        self.sync();
        let channels = block.channels();
        let step = self.settings.block_size.max(1);
        let frames = block.frames();
        let mut start = 0;
        while start < frames {
            let end = (start + step).min(frames);
            let events = if start == 0 { events } else { &NO_EVENTS };
            let side = sidechain.and_then(|s| s.get(start * channels..(end * channels).min(s.len())));
            let mut chunk = block.slice_frames(start, end);
            for instance in &mut self.chain {
                if instance.status.is_bypassed() {
                    continue;
                }
                let index = instance.index();
                instance
                    .context
                    .process_f32(index, &mut chunk, side, &instance.params, events);
                instance.status.store_peak(chunk.peak());
            }
            start = end;
        }
        self.blocks += 1;
    }

    /// Processes a double-precision block in place.
    ///
    /// Instances without double support run on an f32 copy of each chunk.
    pub fn process_f64(
        &mut self,
        block: &mut AudioBlock<'_, f64>,
        sidechain: Option<&[f64]>,
        events: &EventBuffer,
    ) {
        self.sync();
        let channels = block.channels();
        // Chunks shrink when the block is wider than the prepared layout so
        // every chunk still fits the conversion scratch.
        let step = (self.scratch.len() / channels.max(1)).clamp(1, self.settings.block_size.max(1));
        let frames = block.frames();
        let mut start = 0;
        while start < frames {
            let end = (start + step).min(frames);
            let events = if start == 0 { events } else { &NO_EVENTS };
            let side = sidechain.and_then(|s| s.get(start * channels..(end * channels).min(s.len())));
            let mut chunk = block.slice_frames(start, end);
            for instance in &mut self.chain {
                if instance.status.is_bypassed() {
                    continue;
                }
                let index = instance.index();
                if instance.supports_double {
                    instance
                        .context
                        .process_f64(index, &mut chunk, side, &instance.params, events);
                } else {
                    let n = chunk.samples().len();
                    // Only a frame wider than MIN_SCRATCH channels misses.
                    let Some(buf) = self.scratch.get_mut(..n) else {
                        continue;
                    };
                    narrow(chunk.samples(), buf);
                    let side = match side {
                        Some(s) if s.len() <= self.side_scratch.len() => {
                            let out = &mut self.side_scratch[..s.len()];
                            narrow(s, out);
                            Some(&*out)
                        }
                        _ => None,
                    };
                    let mut narrow_block = AudioBlock::new(&mut *buf, channels);
                    instance
                        .context
                        .process_f32(index, &mut narrow_block, side, &instance.params, events);
                    for (dst, &src) in chunk.samples_mut().iter_mut().zip(buf.iter()) {
                        *dst = f64::from(src);
                    }
                }
                instance.status.store_peak(chunk.peak());
            }
            start = end;
        }
        self.blocks += 1;
    }

    /// Re-prepares every instance for new settings. Control thread only,
    /// with the stream stopped.
    ///
    /// Instances whose `begin_playback` fails are taken out of the chain and
    /// returned so the controller can park them.
    pub(crate) fn prepare(
        &mut self,
        settings: PlaybackSettings,
    ) -> Vec<(Box<Instance>, SetupError)> {
        self.sync();
        self.settings = settings;
        let len = scratch_len(&settings);
        self.scratch.resize(len, 0.0);
        self.side_scratch.resize(len, 0.0);

        let mut failed = Vec::new();
        let mut i = 0;
        while i < self.chain.len() {
            let instance = &mut self.chain[i];
            instance.finish();
            match instance.context.begin_playback(instance.index(), &settings) {
                Ok(()) => {
                    instance.playing = true;
                    i += 1;
                }
                Err(error) => failed.push((self.chain.remove(i), error)),
            }
        }
        failed
    }

    /// Takes a prepared instance straight into the chain. Control thread only,
    /// with the stream stopped or the processor otherwise exclusively held.
    pub(crate) fn adopt(&mut self, instance: Box<Instance>) -> Result<(), Box<Instance>> {
        if self.chain.len() >= self.limit {
            return Err(instance);
        }
        instance.status.promote();
        self.chain.push(instance);
        Ok(())
    }

    /// Empties the chain, handing every instance to the caller.
    pub(crate) fn take_all(&mut self) -> Vec<Box<Instance>> {
        self.sync();
        self.chain.drain(..).collect()
    }

    /// Ends playback on every instance without removing them.
    pub fn release(&mut self) {
        for instance in &mut self.chain {
            instance.finish();
        }
    }

    /// Total reported latency of the non-bypassed chain, in samples.
    pub fn latency_samples(&self) -> usize {
        self.chain
            .iter()
            .filter(|i| !i.status.is_bypassed())
            .map(|i| i.context.latency_samples())
            .sum()
    }

    /// Number of instances in the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Returns `true` if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Ids in processing order. Allocates; not for the audio callback.
    pub fn active_ids(&self) -> Vec<InstanceId> {
        self.chain.iter().map(|i| i.id()).collect()
    }

    /// Blocks processed since creation.
    pub fn blocks_processed(&self) -> u64 {
        self.blocks
    }

    /// Items that could not be handed back to the controller and were
    /// dropped on the processing thread. Stays zero while the controller
    /// exists.
    pub fn garbage_lost(&self) -> u64 {
        self.lost
    }

    /// Settings the chain is prepared for.
    pub fn settings(&self) -> PlaybackSettings {
        self.settings
    }
}

impl std::fmt::Debug for RackProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RackProcessor")
            .field("chain", &self.chain.len())
            .field("settings", &self.settings)
            .field("blocks", &self.blocks)
            .finish_non_exhaustive()
    }
}

#[inline]
fn narrow<T: Sample>(src: &[T], dst: &mut [f32]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = s.to_f32();
    }
}

#[cfg(test)]
mod tests {
    use crate::rack;
    use rackhost_core::{
        AudioBlock, EffectModule, EventBuffer, MidiEvent, ModuleContext, ModuleInfo, ParamBinding,
        ParamDescriptor, PlaybackSettings, SetupError,
    };
    use rackhost_registry::ModuleRegistry;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts chunks and the events seen with them; reports fixed latency.
    struct Tally {
        chunks: Arc<AtomicUsize>,
        events: Arc<AtomicUsize>,
    }

    struct TallyContext {
        chunks: Arc<AtomicUsize>,
        events: Arc<AtomicUsize>,
    }

    impl EffectModule for Tally {
        fn info(&self) -> ModuleInfo {
            ModuleInfo {
                id: "tally",
                name: "Tally",
                max_instances: 2,
                has_editor: false,
                supports_double: false,
            }
        }

        fn create_parameters(&self) -> Vec<ParamDescriptor> {
            Vec::new()
        }

        fn create_context(&self) -> Box<dyn ModuleContext> {
            Box::new(TallyContext {
                chunks: Arc::clone(&self.chunks),
                events: Arc::clone(&self.events),
            })
        }
    }

    impl ModuleContext for TallyContext {
        fn begin_playback(&mut self, _: usize, _: &PlaybackSettings) -> Result<(), SetupError> {
            Ok(())
        }

        fn finish_playback(&mut self, _: usize) {}

        fn process_f32(
            &mut self,
            _: usize,
            block: &mut AudioBlock<'_, f32>,
            _: Option<&[f32]>,
            _: &ParamBinding,
            events: &EventBuffer,
        ) {
            assert!(block.frames() <= 64);
            self.chunks.fetch_add(1, Ordering::Relaxed);
            self.events.fetch_add(events.len(), Ordering::Relaxed);
        }

        fn latency_samples(&self) -> usize {
            32
        }
    }

    #[test]
    fn chunks_get_events_once_and_latency_sums() {
        let chunks = Arc::new(AtomicUsize::new(0));
        let events = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();
        registry
            .register(Arc::new(Tally {
                chunks: Arc::clone(&chunks),
                events: Arc::clone(&events),
            }))
            .unwrap();
        let (mut controller, mut processor) =
            rack(Arc::new(registry), PlaybackSettings::new(48_000.0, 64, 2));
        let a = controller.add_instance("tally").unwrap();
        controller.add_instance("tally").unwrap();

        let mut queue = EventBuffer::with_capacity(2);
        queue.push(MidiEvent {
            frame: 3,
            data: [0x90, 64, 90],
        });
        let mut buffer = vec![0.1f32; 2 * 200];
        processor.process_f32(&mut AudioBlock::new(&mut buffer, 2), None, &queue);

        // 200 frames in 64-frame chunks is 4 chunks, for each of 2 instances.
        assert_eq!(chunks.load(Ordering::Relaxed), 8);
        assert_eq!(events.load(Ordering::Relaxed), 2);
        assert_eq!(processor.latency_samples(), 64);

        controller.set_bypassed(a, true).unwrap();
        assert_eq!(processor.latency_samples(), 32);
    }

    #[test]
    fn full_garbage_queue_defers_commands() {
        let registry = Arc::new(ModuleRegistry::with_builtins());
        let (mut controller, mut processor) = rack(registry, PlaybackSettings::default());
        let a = controller.add_instance("gain").unwrap();
        let b = controller.add_instance("gain").unwrap();
        processor.sync();
        let (tx, rx) = crossbeam_channel::bounded(1);
        processor.garbage = tx;

        controller.remove_instance(a).unwrap();
        controller.remove_instance(b).unwrap();
        processor.sync();
        assert_eq!(processor.len(), 1, "second removal waits for room");

        drop(rx.try_recv().unwrap());
        processor.sync();
        assert!(processor.is_empty());
        assert_eq!(rx.len(), 1);
        assert_eq!(processor.garbage_lost(), 0);
    }

    #[test]
    fn release_is_repeatable() {
        let registry = Arc::new(ModuleRegistry::with_builtins());
        let (mut controller, mut processor) = rack(registry, PlaybackSettings::default());
        controller.add_instance("delay").unwrap();
        processor.sync();
        processor.release();
        processor.release();
        assert_eq!(processor.len(), 1);
    }
}
