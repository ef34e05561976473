//! Messages between the control and realtime halves of a rack.
//!
//! Both directions are bounded crossbeam channels, allocated when the rack is
//! created. The realtime side only ever calls `try_recv` / `try_send`.
//! Everything it no longer needs (removed instances, spent order vectors)
//! travels back on the garbage channel so deallocation happens on the control
//! thread.

use crate::instance::{Instance, InstanceId};

/// Control → realtime queue depth.
pub const COMMAND_CAPACITY: usize = 64;

/// Realtime → control queue depth.
///
/// Each command yields at most one garbage item and the controller drains
/// garbage before every send, so this never fills.
pub(crate) const GARBAGE_CAPACITY: usize = 2 * COMMAND_CAPACITY;

/// Structural change, applied at the next block boundary.
pub(crate) enum RackCommand {
    /// Take a prepared instance into the chain at `position`.
    Insert {
        instance: Box<Instance>,
        position: usize,
    },
    /// Drop an instance from the chain.
    Remove(InstanceId),
    /// Permute the chain to match.
    Reorder(Vec<InstanceId>),
}

/// Ownership returned from the realtime side.
pub(crate) enum Garbage {
    /// Removed from the chain; ready to be destroyed.
    Removed(Box<Instance>),
    /// Insert refused because the chain was at capacity.
    Rejected(Box<Instance>),
    /// A spent reorder vector.
    Order(Vec<InstanceId>),
}
