//! Rack error taxonomy.

use crate::instance::InstanceId;
use rackhost_core::SetupError;

/// Errors returned by [`RackController`](crate::RackController) operations.
///
/// Every variant except [`Setup`](RackError::Setup) means nothing changed.
/// `Setup` means the instance exists but is parked outside the processing
/// order until a retry succeeds or it is cancelled.
#[derive(Debug, thiserror::Error)]
pub enum RackError {
    /// The module type already has its maximum number of instances.
    #[error("module type '{type_id}' is at its instance limit ({max})")]
    Capacity {
        /// Module type id.
        type_id: String,
        /// Declared maximum.
        max: usize,
    },

    /// No module type is registered under this id.
    #[error("unknown module type: {0}")]
    UnknownModule(String),

    /// No live instance has this id.
    #[error("unknown instance: {0}")]
    UnknownInstance(InstanceId),

    /// The realtime command queue is full; retry after the next block.
    #[error("rack command queue is full")]
    QueueFull,

    /// The processor half of the rack has been dropped.
    #[error("rack processor is gone")]
    Disconnected,

    /// A reorder request was not a permutation of the current instances.
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// Only a parked, not-yet-active instance can be cancelled.
    #[error("instance {0} cannot be cancelled in its current state")]
    NotCancellable(InstanceId),

    /// The instance was created but could not prepare for playback.
    #[error("instance {id} failed setup: {source}")]
    Setup {
        /// The parked instance.
        id: InstanceId,
        /// What the module reported.
        #[source]
        source: SetupError,
    },

    /// A serialized state blob could not be parsed or produced.
    #[error("malformed rack state: {0}")]
    State(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn capacity_display() {
        let err = RackError::Capacity {
            type_id: "equalizer".into(),
            max: 5,
        };
        assert_eq!(
            err.to_string(),
            "module type 'equalizer' is at its instance limit (5)"
        );
        assert!(err.source().is_none());
    }

    #[test]
    fn setup_exposes_source() {
        let err = RackError::Setup {
            id: InstanceId(4),
            source: SetupError::BlockSize(0),
        };
        assert!(err.to_string().contains("#4"));
        assert!(err.source().is_some());
    }
}
