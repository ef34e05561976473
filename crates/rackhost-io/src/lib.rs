//! Audio device layer and standalone host for rackhost.
//!
//! This crate provides:
//!
//! - **Backends**: the [`AudioBackend`] trait with a cpal implementation
//!   ([`CpalBackend`]) and a deterministic [`MockBackend`] for tests.
//! - **Standalone host**: [`StandaloneHost`] owns the device stream, the
//!   rack, input mute and feedback protection, and persists device
//!   configuration and plugin state through the shared settings cache.
//! - **Control tasks**: [`TaskQueue`], the explicit schedule of periodic
//!   control-thread work driven by [`StandaloneHost::tick`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rackhost_config::SharedContext;
//! use rackhost_io::{AutoConfirm, CpalBackend, SaveOptions, StandaloneHost};
//! use rackhost_registry::ModuleRegistry;
//! use std::sync::Arc;
//!
//! let context = SharedContext::new();
//! context.initialize()?;
//! let registry = Arc::new(ModuleRegistry::with_builtins());
//! let mut host = StandaloneHost::new(CpalBackend::new(), registry, Arc::clone(&context));
//! let report = host.start()?;
//! if let Some(downgrade) = report.downgrade {
//!     eprintln!("running at fallback settings: {downgrade:?}");
//! }
//! host.controller_mut().add_instance("equalizer")?;
//! host.save_plugin_state(SaveOptions::default(), &mut AutoConfirm)?;
//! host.shutdown()?;
//! ```

pub mod backend;
pub mod cpal_backend;
pub mod feedback;
pub mod host;
pub mod mock;
pub mod scheduler;

pub use backend::{
    AudioBackend, DeviceInfo, DuplexCallback, ErrorCallback, StreamConfig, StreamHandle,
};
pub use cpal_backend::CpalBackend;
pub use feedback::FeedbackRisk;
pub use host::{
    AutoConfirm, Downgrade, DowngradeReason, FailureReason, HostError, HostEvent, Operation,
    Prompt, SaveOptions, StandaloneHost, StartReport, StateChange, UserPrompt,
};
pub use mock::MockBackend;
pub use scheduler::{ControlTask, TaskQueue};

/// Error types for audio device operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Audio stream setup or runtime error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// No audio device available on the system.
    #[error("No audio device available")]
    NoDevice,

    /// The requested audio device was not found.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The device refused the requested sample rate, block size or channels.
    #[error("Unsupported stream configuration: {0}")]
    UnsupportedConfig(String),
}

/// Convenience result type for audio device operations.
pub type Result<T> = std::result::Result<T, Error>;
