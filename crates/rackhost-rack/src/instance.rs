//! Instance identity and the per-instance lifecycle state machine.
//!
//! ```text
//! Created ──► Preparing ──► Active ──► Draining ──► Destroyed
//!                 │  ▲                                  ▲
//!   setup failed  ▼  │ retry                            │
//!             (parked, setup_failed) ──── cancel ───────┘
//! ```
//!
//! Only the realtime thread promotes `Preparing → Active`, when it takes the
//! instance into its chain at a block boundary. Only the control thread moves
//! an instance to `Draining` or `Destroyed`.

use rackhost_core::{ModuleContext, ParamBinding};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

/// Process-unique identity of one instance.
///
/// Never reused, unlike the per-type instance index: a stale id can never
/// address a newer instance that happens to occupy the same index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub(crate) u64);

impl InstanceId {
    /// The raw counter value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InstanceState {
    /// Context built, no audio calls yet.
    Created = 0,
    /// `begin_playback` requested; not yet taken by the realtime thread.
    Preparing = 1,
    /// In the processing order.
    Active = 2,
    /// Removal requested; the realtime thread will hand it back.
    Draining = 3,
    /// Context released; the index is free again.
    Destroyed = 4,
}

impl InstanceState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Preparing,
            2 => Self::Active,
            3 => Self::Draining,
            _ => Self::Destroyed,
        }
    }
}

/// Shared, lock-free view of one instance.
///
/// Both threads and any number of readers hold it through an `Arc`. Every
/// field is atomic; reads are advisory-consistent.
#[derive(Debug)]
pub struct InstanceStatus {
    id: InstanceId,
    type_id: String,
    index: usize,
    state: AtomicU8,
    setup_failed: AtomicBool,
    bypassed: AtomicBool,
    placeholder: bool,
    /// f32 bits of the last processed block's output peak.
    peak: AtomicU32,
}

impl InstanceStatus {
    pub(crate) fn new(id: InstanceId, type_id: &str, index: usize, placeholder: bool) -> Self {
        Self {
            id,
            type_id: type_id.to_owned(),
            index,
            state: AtomicU8::new(InstanceState::Created as u8),
            setup_failed: AtomicBool::new(false),
            bypassed: AtomicBool::new(false),
            placeholder,
            peak: AtomicU32::new(0),
        }
    }

    /// Instance identity.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Module type id.
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    /// Per-type instance index, stable for the instance's life.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current lifecycle state.
    pub fn state(&self) -> InstanceState {
        InstanceState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: InstanceState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// `Preparing → Active`, performed by the realtime thread on insertion.
    ///
    /// Leaves any other state alone so a removal requested while the insert
    /// was still queued is not overwritten.
    #[inline]
    pub(crate) fn promote(&self) -> bool {
        self.state
            .compare_exchange(
                InstanceState::Preparing as u8,
                InstanceState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// `true` while the instance is parked after a failed `begin_playback`.
    pub fn setup_failed(&self) -> bool {
        self.setup_failed.load(Ordering::Acquire)
    }

    pub(crate) fn set_setup_failed(&self, failed: bool) {
        self.setup_failed.store(failed, Ordering::Release);
    }

    /// Whether processing is skipped for this instance.
    pub fn is_bypassed(&self) -> bool {
        self.bypassed.load(Ordering::Relaxed)
    }

    /// Sets bypass; takes effect on the next block.
    pub fn set_bypassed(&self, bypassed: bool) {
        self.bypassed.store(bypassed, Ordering::Relaxed);
    }

    /// `true` for an inert stand-in created for an unknown module type.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Output peak of the most recent block, for meters.
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn store_peak(&self, peak: f32) {
        self.peak.store(peak.to_bits(), Ordering::Relaxed);
    }
}

/// An instance as owned by whichever thread currently holds it.
pub(crate) struct Instance {
    pub(crate) status: Arc<InstanceStatus>,
    pub(crate) context: Box<dyn ModuleContext>,
    pub(crate) params: ParamBinding,
    pub(crate) supports_double: bool,
    /// `begin_playback` succeeded and `finish_playback` is still owed.
    pub(crate) playing: bool,
}

impl Instance {
    pub(crate) fn id(&self) -> InstanceId {
        self.status.id
    }

    pub(crate) fn index(&self) -> usize {
        self.status.index
    }

    /// Ends playback if it was started. Control thread only.
    pub(crate) fn finish(&mut self) {
        if self.playing {
            self.context.finish_playback(self.status.index);
            self.playing = false;
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("status", &self.status)
            .field("playing", &self.playing)
            .finish_non_exhaustive()
    }
}
