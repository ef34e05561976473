//! Atomic parameter storage and per-instance bindings.
//!
//! A [`ParameterSet`] is created once per module type, when the type is
//! registered. It holds `max_instances × stride` parameters: one contiguous
//! window of `stride` parameters per possible instance index. An instance
//! [`claim`](ParameterSet::claim)s its window when it is created and keeps the
//! [`ParamBinding`] for its whole life; bindings share the set through an
//! `Arc`, they never copy values.
//!
//! Windows are reused once an index is released. Each claim bumps the
//! window's generation, so a binding kept past its instance's life can tell
//! it no longer owns the window ([`ParamBinding::is_current`]).
//!
//! # Threading
//!
//! Values are `f32` bit patterns in `AtomicU32`s. The realtime thread reads
//! with a single relaxed load per parameter. The control thread writes
//! (user edits, automation playback, undo/redo) with a release store and then
//! notifies listeners; the realtime thread picks up the most recent value at
//! the start of the next block.
//!
//! ```text
//! ParameterSet ("eq", stride 3, 5 instances)
//! ┌────────┬────────┬────────┬────────┬────────┐
//! │ idx 0  │ idx 1  │ idx 2  │ idx 3  │ idx 4  │   15 Parameters
//! └────────┴────────┴────────┴────────┴────────┘
//!              ▲
//!              └─ ParamBinding { base: 3, count: 3 }
//! ```

use crate::param_info::ParamDescriptor;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// A single automatable value.
#[derive(Debug)]
pub struct Parameter {
    descriptor: ParamDescriptor,
    value: AtomicU32,
    /// Bumped on every committed write.
    version: AtomicU32,
}

impl Parameter {
    /// Creates a parameter at its descriptor default.
    pub fn new(descriptor: ParamDescriptor) -> Self {
        Self {
            value: AtomicU32::new(descriptor.default.to_bits()),
            version: AtomicU32::new(0),
            descriptor,
        }
    }

    /// Current value. Wait-free; safe on the realtime thread.
    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Relaxed))
    }

    /// Stores a clamped value and returns what was stored.
    #[inline]
    pub fn set(&self, value: f32) -> f32 {
        let clamped = self.descriptor.clamp(value);
        self.value.store(clamped.to_bits(), Ordering::Release);
        self.version.fetch_add(1, Ordering::Release);
        clamped
    }

    /// Write counter, for change detection without listeners.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Acquire)
    }

    /// Static metadata.
    pub fn descriptor(&self) -> &ParamDescriptor {
        &self.descriptor
    }
}

/// A committed parameter write, delivered to listeners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamChange {
    /// Instance index the parameter belongs to.
    pub instance: usize,
    /// Parameter index within the instance.
    pub param: usize,
    /// New (clamped) value.
    pub value: f32,
}

/// Every parameter a module type can ever expose, for all instance indices.
#[derive(Debug)]
pub struct ParameterSet {
    params: Box<[Parameter]>,
    stride: usize,
    instances: usize,
    /// Claim counter per window.
    generations: Box<[AtomicU32]>,
    listeners: Mutex<Vec<Sender<ParamChange>>>,
}

impl ParameterSet {
    /// Builds the pool for `instances` windows of `descriptors.len()` parameters.
    pub fn new(descriptors: &[ParamDescriptor], instances: usize) -> Arc<Self> {
        let params = (0..instances)
            .flat_map(|_| descriptors.iter().copied().map(Parameter::new))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Arc::new(Self {
            params,
            stride: descriptors.len(),
            instances,
            generations: (0..instances).map(|_| AtomicU32::new(0)).collect(),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Parameters per instance.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of instance windows.
    pub fn instances(&self) -> usize {
        self.instances
    }

    /// Binds to window `index` under its current owner. `None` if out of range.
    pub fn bind(self: &Arc<Self>, index: usize) -> Option<ParamBinding> {
        let generation = self.generations.get(index)?.load(Ordering::Acquire);
        Some(self.binding(index, generation))
    }

    /// Hands window `index` to a new owner and binds to it.
    ///
    /// Every binding taken before the claim stops being
    /// [current](ParamBinding::is_current). `None` if out of range.
    pub fn claim(self: &Arc<Self>, index: usize) -> Option<ParamBinding> {
        let generation = self
            .generations
            .get(index)?
            .fetch_add(1, Ordering::AcqRel)
            .wrapping_add(1);
        Some(self.binding(index, generation))
    }

    fn binding(self: &Arc<Self>, index: usize, generation: u32) -> ParamBinding {
        ParamBinding {
            set: Arc::clone(self),
            instance: index,
            base: index * self.stride,
            count: self.stride,
            generation,
        }
    }

    /// Registers a listener. Disconnected listeners are pruned on the next write.
    pub fn subscribe(&self) -> Receiver<ParamChange> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.listeners.lock().push(tx);
        rx
    }

    fn notify(&self, change: ParamChange) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|tx| tx.send(change).is_ok());
    }
}

/// An instance's fixed view onto its window of a [`ParameterSet`].
#[derive(Debug, Clone)]
pub struct ParamBinding {
    set: Arc<ParameterSet>,
    instance: usize,
    base: usize,
    count: usize,
    generation: u32,
}

impl ParamBinding {
    /// Instance index this binding was created for.
    pub fn instance(&self) -> usize {
        self.instance
    }

    /// Number of bound parameters.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if the module exposes no parameters.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Current value of parameter `param`; `0.0` if out of range.
    ///
    /// One atomic load. Call from the realtime thread freely.
    #[inline]
    pub fn get(&self, param: usize) -> f32 {
        if param < self.count {
            self.set.params[self.base + param].get()
        } else {
            0.0
        }
    }

    /// Writes a value from the control thread and notifies listeners.
    ///
    /// Returns the clamped value actually stored, or `None` if `param` is out
    /// of range.
    pub fn set(&self, param: usize, value: f32) -> Option<f32> {
        let p = self.parameter(param)?;
        let stored = p.set(value);
        self.set.notify(ParamChange {
            instance: self.instance,
            param,
            value: stored,
        });
        Some(stored)
    }

    /// The underlying parameter.
    pub fn parameter(&self, param: usize) -> Option<&Parameter> {
        (param < self.count).then(|| &self.set.params[self.base + param])
    }

    /// Descriptor of parameter `param`.
    pub fn descriptor(&self, param: usize) -> Option<&ParamDescriptor> {
        self.parameter(param).map(Parameter::descriptor)
    }

    /// Looks up a parameter index by its stable string id.
    pub fn index_of(&self, string_id: &str) -> Option<usize> {
        (0..self.count).find(|&i| self.set.params[self.base + i].descriptor.string_id == string_id)
    }

    /// Snapshot of all bound values in declaration order.
    pub fn values(&self) -> Vec<f32> {
        (0..self.count).map(|i| self.get(i)).collect()
    }

    /// Restores every bound parameter to its default.
    pub fn reset(&self) {
        for i in 0..self.count {
            let default = self.set.params[self.base + i].descriptor.default;
            self.set(i, default);
        }
    }

    /// Returns `true` if both bindings address the same window under the
    /// same owner.
    pub fn same_window(&self, other: &ParamBinding) -> bool {
        Arc::ptr_eq(&self.set, &other.set)
            && self.base == other.base
            && self.generation == other.generation
    }

    /// Returns `false` once the window has been claimed again since this
    /// binding was taken.
    pub fn is_current(&self) -> bool {
        self.set.generations[self.instance].load(Ordering::Acquire) == self.generation
    }
}
