//! Platform-specific locations for settings and cached state.
//!
//! # Directory Structure
//!
//! - **User config**: `~/.config/rackhost/` (Linux), `~/Library/Application Support/rackhost/` (macOS), `%APPDATA%\rackhost\` (Windows)
//! - **Cache**: `~/.cache/rackhost/` (Linux), `~/Library/Caches/rackhost/` (macOS), `%LOCALAPPDATA%\rackhost\` (Windows)
//!
//! The settings cache shared by running hosts lives in the cache directory:
//! `device.toml`, `plugin_state.toml` and the `.lock` file guarding both.

use crate::ConfigError;
use std::path::{Path, PathBuf};

/// Application name used for directory paths.
const APP_NAME: &str = "rackhost";

/// Device configuration file name.
pub const DEVICE_CONFIG_FILE: &str = "device.toml";

/// Persisted plugin state file name.
pub const PLUGIN_STATE_FILE: &str = "plugin_state.toml";

/// Application-wide settings file name.
pub const APP_SETTINGS_FILE: &str = "app.toml";

/// Cross-process lock file name.
pub const LOCK_FILE: &str = ".lock";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the directory holding the shared settings cache.
///
/// Falls back to [`user_config_dir`] if no cache directory is defined.
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir().map_or_else(user_config_dir, |d| d.join(APP_NAME))
}

/// Creates `dir` and its parents if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), ConfigError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::create_dir(dir, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirs_end_with_app_name() {
        assert!(user_config_dir().ends_with(APP_NAME));
        assert!(cache_dir().ends_with(APP_NAME));
    }

    #[test]
    fn ensure_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_dir(&nested).unwrap();
    }
}
