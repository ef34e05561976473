//! File-backed settings cache shared by every running host.
//!
//! One directory holds the device configuration, the persisted plugin state
//! and the lock file guarding both. Every read and write takes the
//! cross-process lock first; if the lock cannot be had the operation fails
//! and nothing on disk is touched.
//!
//! Writes go to a temporary sibling that is renamed over the target, so a
//! reader (or a crash) never sees half a file. Serialization is
//! deterministic, so saving the same data twice leaves identical bytes.

use crate::device::DeviceConfig;
use crate::lock::{InterProcessLock, LockGuard};
use crate::paths::{self, DEVICE_CONFIG_FILE, LOCK_FILE, PLUGIN_STATE_FILE};
use crate::ConfigError;
use rackhost_rack::StateTree;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current [`PluginStateRecord::version`].
pub const PLUGIN_STATE_VERSION: u32 = 1;

/// How long store operations wait for another process by default.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// The rack state as cached between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginStateRecord {
    /// Format version.
    #[serde(default = "default_record_version")]
    pub version: u32,
    /// File the user last saved the rack to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_save_path: Option<PathBuf>,
    /// The serialized rack.
    #[serde(default)]
    pub rack: StateTree,
}

fn default_record_version() -> u32 {
    PLUGIN_STATE_VERSION
}

impl PluginStateRecord {
    /// A record for `rack` with no save path.
    pub fn new(rack: StateTree) -> Self {
        Self {
            version: PLUGIN_STATE_VERSION,
            last_save_path: None,
            rack,
        }
    }
}

/// The settings cache in one directory.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    dir: PathBuf,
    lock: InterProcessLock,
    lock_timeout: Duration,
}

impl SettingsStore {
    /// A store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            lock: InterProcessLock::new(dir.join(LOCK_FILE)),
            dir,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// The store in the platform cache directory.
    pub fn open_default() -> Self {
        Self::new(paths::cache_dir())
    }

    /// Sets how long operations wait for the lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The lock guarding this store.
    pub fn lock(&self) -> &InterProcessLock {
        &self.lock
    }

    /// Path of the cached device configuration.
    pub fn device_config_path(&self) -> PathBuf {
        self.dir.join(DEVICE_CONFIG_FILE)
    }

    /// Path of the cached plugin state.
    pub fn plugin_state_path(&self) -> PathBuf {
        self.dir.join(PLUGIN_STATE_FILE)
    }

    /// Reads the cached device configuration; `None` if none was saved.
    pub fn load_device_config(&self) -> Result<Option<DeviceConfig>, ConfigError> {
        let _guard = self.guard()?;
        read_optional(&self.device_config_path())?
            .map(|text| DeviceConfig::from_toml(&text))
            .transpose()
    }

    /// Replaces the cached device configuration.
    pub fn save_device_config(&self, config: &DeviceConfig) -> Result<(), ConfigError> {
        let text = config.to_toml()?;
        let _guard = self.guard()?;
        write_atomic(&self.device_config_path(), text.as_bytes())?;
        tracing::debug!(path = %self.device_config_path().display(), "device config cached");
        Ok(())
    }

    /// Reads the cached plugin state; `None` if none was saved.
    pub fn load_plugin_state(&self) -> Result<Option<PluginStateRecord>, ConfigError> {
        let _guard = self.guard()?;
        read_optional(&self.plugin_state_path())?
            .map(|text| toml::from_str(&text).map_err(ConfigError::from))
            .transpose()
    }

    /// Replaces the cached plugin state.
    pub fn save_plugin_state(&self, record: &PluginStateRecord) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(record)?;
        let _guard = self.guard()?;
        write_atomic(&self.plugin_state_path(), text.as_bytes())?;
        tracing::debug!(
            path = %self.plugin_state_path().display(),
            instances = record.rack.instances.len(),
            "plugin state cached"
        );
        Ok(())
    }

    fn guard(&self) -> Result<LockGuard, ConfigError> {
        self.lock.acquire(self.lock_timeout)
    }
}

/// Writes a rack to a user-chosen file.
pub fn export_state(path: impl AsRef<Path>, tree: &StateTree) -> Result<(), ConfigError> {
    let text = toml::to_string_pretty(tree)?;
    write_atomic(path.as_ref(), text.as_bytes())
}

/// Reads a rack from a user-chosen file.
pub fn import_state(path: impl AsRef<Path>) -> Result<StateTree, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    Ok(toml::from_str(&text)?)
}

fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::read_file(path, e)),
    }
}

/// Replaces `path` with `contents` via a temporary sibling and a rename.
///
/// Leaves the file alone if it already holds exactly `contents`.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ConfigError> {
    if std::fs::read(path).is_ok_and(|current| current == contents) {
        return Ok(());
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        paths::ensure_dir(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let written = std::fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(ConfigError::write_file(&tmp, e));
    }
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        ConfigError::write_file(path, e)
    })
}
