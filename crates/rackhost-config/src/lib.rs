//! Rackhost Config - persistence for the standalone host
//!
//! - [`DeviceConfig`]: the versioned device and stream record.
//! - [`SettingsStore`]: the cache directory shared by every running host,
//!   guarded by an [`InterProcessLock`].
//! - [`SharedContext`]: application settings passed explicitly to every
//!   component that needs them.
//!
//! # Example
//!
//! ```rust,no_run
//! use rackhost_config::{DeviceConfig, SettingsStore};
//!
//! let store = SettingsStore::open_default();
//! let config = store.load_device_config()?.unwrap_or_default();
//! store.save_device_config(&DeviceConfig { block_size: 256, ..config })?;
//! # Ok::<(), rackhost_config::ConfigError>(())
//! ```

pub mod context;
pub mod device;
pub mod error;
pub mod lock;
pub mod paths;
pub mod store;

pub use context::{AppSettings, SharedContext};
pub use device::{
    DEVICE_CONFIG_VERSION, DeviceConfig, FALLBACK_BLOCK_SIZE, FALLBACK_SAMPLE_RATE,
};
pub use error::ConfigError;
pub use lock::{InterProcessLock, LockGuard};
pub use paths::{cache_dir, user_config_dir};
pub use store::{
    DEFAULT_LOCK_TIMEOUT, PLUGIN_STATE_VERSION, PluginStateRecord, SettingsStore, export_state,
    import_state,
};
