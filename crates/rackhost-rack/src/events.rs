//! Notifications for collaborators (editors, meters, host shells).
//!
//! Delivered over unbounded channels from the control thread. Nothing in the
//! rack depends on anyone listening.

use crate::instance::InstanceId;
use rackhost_core::SetupError;

/// A change in the rack's structure.
#[derive(Debug, Clone, PartialEq)]
pub enum RackEvent {
    /// A new instance was created.
    InstanceAdded {
        /// Instance identity.
        id: InstanceId,
        /// Module type id.
        type_id: String,
        /// Per-type index.
        index: usize,
    },
    /// An instance left the rack.
    InstanceRemoved {
        /// Instance identity.
        id: InstanceId,
    },
    /// An instance's context was released and its index freed.
    InstanceDestroyed {
        /// Instance identity.
        id: InstanceId,
    },
    /// The processing order changed.
    Reordered {
        /// New order, all instances.
        order: Vec<InstanceId>,
    },
    /// An instance could not prepare and is parked.
    SetupFailed {
        /// Instance identity.
        id: InstanceId,
        /// What the module reported.
        error: SetupError,
    },
    /// A parked instance prepared successfully on retry.
    SetupRecovered {
        /// Instance identity.
        id: InstanceId,
    },
    /// Restored state referenced something that could not be instantiated.
    PlaceholderCreated {
        /// Instance identity of the placeholder.
        id: InstanceId,
        /// Module type id from the state tree.
        type_id: String,
    },
    /// A whole state tree was applied.
    Restored {
        /// Number of instances now in the rack.
        instances: usize,
    },
}
