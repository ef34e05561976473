//! Rackhost Rack - a realtime-safe chain of effect instances
//!
//! A rack is split in two halves that share nothing but bounded channels and
//! atomics:
//!
//! - [`RackController`] lives on the control thread. It creates and prepares
//!   instances, enforces per-type instance limits, serializes and restores
//!   the rack, and publishes a [`RackView`] for collaborators.
//! - [`RackProcessor`] lives on the realtime thread. It owns the active
//!   instances and runs them as a serial chain, applying structural changes
//!   only between blocks.
//!
//! Each instance moves through `Created → Preparing → Active → Draining →
//! Destroyed` (see [`InstanceState`]). Contexts are prepared and destroyed on
//! the control thread; the realtime thread only ever takes ownership of a
//! prepared instance or hands one back.
//!
//! # Example
//!
//! ```rust
//! use rackhost_core::{AudioBlock, EventBuffer, PlaybackSettings};
//! use rackhost_rack::rack;
//! use rackhost_registry::ModuleRegistry;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(ModuleRegistry::with_builtins());
//! let (mut controller, mut processor) = rack(registry, PlaybackSettings::new(48_000.0, 512, 2));
//!
//! let eq = controller.add_instance("equalizer").unwrap();
//! controller.params(eq).unwrap().set(4, 6.0);
//!
//! let mut buffer = vec![0.0f32; 2 * 512];
//! processor.process_f32(&mut AudioBlock::new(&mut buffer, 2), None, &EventBuffer::EMPTY);
//! assert_eq!(processor.active_ids(), vec![eq]);
//! ```

mod command;
pub mod container;
pub mod controller;
pub mod error;
pub mod events;
pub mod instance;
pub mod processor;
pub mod state;
pub mod view;

pub use command::COMMAND_CAPACITY;
pub use container::{ChannelLayout, EVENT_CAPACITY, ProcessorContainer, Route};
pub use controller::RackController;
pub use error::RackError;
pub use events::RackEvent;
pub use instance::{InstanceId, InstanceState, InstanceStatus};
pub use processor::RackProcessor;
pub use state::{
    InstanceNode, ParamValue, RestoreReport, RestoreWarning, STATE_VERSION, StateTree,
};
pub use view::{InstanceView, RackView};

use command::GARBAGE_CAPACITY;
use rackhost_core::PlaybackSettings;
use rackhost_registry::ModuleRegistry;
use std::sync::Arc;

/// Creates a connected controller / processor pair.
///
/// The processor's chain storage is sized for every instance the registry
/// allows, so inserting never reallocates on the realtime thread.
pub fn rack(
    registry: Arc<ModuleRegistry>,
    settings: PlaybackSettings,
) -> (RackController, RackProcessor) {
    let (command_tx, command_rx) = crossbeam_channel::bounded(COMMAND_CAPACITY);
    let (garbage_tx, garbage_rx) = crossbeam_channel::bounded(GARBAGE_CAPACITY);
    let limit = registry.total_capacity();
    let controller = RackController::new(registry, command_tx, garbage_rx, settings);
    let processor = RackProcessor::new(limit, command_rx, garbage_tx, settings);
    (controller, processor)
}
