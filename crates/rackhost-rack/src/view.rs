//! Read-only snapshot of the rack for collaborators.
//!
//! The controller publishes a fresh [`RackView`] through an `ArcSwap` after
//! every structural change. Readers on any thread load it wait-free; live
//! values (state, peak, bypass) are read through each entry's shared
//! [`InstanceStatus`].

use crate::instance::{InstanceId, InstanceState, InstanceStatus};
use std::sync::Arc;

/// One entry of a [`RackView`].
#[derive(Debug, Clone)]
pub struct InstanceView {
    /// Shared live status.
    pub status: Arc<InstanceStatus>,
    /// Module display name, or the raw type id for placeholders.
    pub name: String,
    /// Whether the module type supplies an editor.
    pub has_editor: bool,
}

impl InstanceView {
    /// Instance identity.
    pub fn id(&self) -> InstanceId {
        self.status.id()
    }
}

/// Rack contents in signal order.
#[derive(Debug, Clone, Default)]
pub struct RackView {
    /// Incremented on every publish.
    pub generation: u64,
    /// Every instance, including parked ones and placeholders.
    pub instances: Vec<InstanceView>,
}

impl RackView {
    /// Ids currently processed by the realtime thread, in order.
    pub fn active_ids(&self) -> Vec<InstanceId> {
        self.instances
            .iter()
            .filter(|v| v.status.state() == InstanceState::Active)
            .map(InstanceView::id)
            .collect()
    }
}
