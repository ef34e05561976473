//! Process-wide settings handed explicitly to whoever needs them.
//!
//! A [`SharedContext`] is created once, wrapped in an `Arc`, and passed to
//! the host and any editor or window at construction. It holds the
//! application settings (theme name, locale) and the locations of the
//! settings files. [`initialize`](SharedContext::initialize) loads them and
//! [`shutdown`](SharedContext::shutdown) writes them back.

use crate::paths::{self, APP_SETTINGS_FILE};
use crate::store::{SettingsStore, write_atomic};
use crate::ConfigError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Application-wide user preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Name of the visual style collaborators should use.
    pub theme: String,
    /// BCP 47 locale tag.
    pub locale: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: "default".to_owned(),
            locale: "en-US".to_owned(),
        }
    }
}

/// Reference-counted shared settings with an explicit lifecycle.
#[derive(Debug)]
pub struct SharedContext {
    config_dir: PathBuf,
    cache_dir: PathBuf,
    settings: RwLock<AppSettings>,
    initialized: AtomicBool,
}

impl SharedContext {
    /// A context using the platform config and cache directories.
    pub fn new() -> Arc<Self> {
        Self::with_dirs(paths::user_config_dir(), paths::cache_dir())
    }

    /// A context rooted at explicit directories.
    pub fn with_dirs(config_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            config_dir: config_dir.into(),
            cache_dir: cache_dir.into(),
            settings: RwLock::new(AppSettings::default()),
            initialized: AtomicBool::new(false),
        })
    }

    /// Creates the directories and loads saved application settings.
    ///
    /// Calling it again is a no-op.
    pub fn initialize(&self) -> Result<(), ConfigError> {
        if self.is_initialized() {
            return Ok(());
        }
        paths::ensure_dir(&self.config_dir)?;
        paths::ensure_dir(&self.cache_dir)?;
        let path = self.settings_path();
        if path.exists() {
            let text =
                std::fs::read_to_string(&path).map_err(|e| ConfigError::read_file(&path, e))?;
            *self.settings.write() = toml::from_str(&text)?;
        }
        self.initialized.store(true, Ordering::Release);
        tracing::info!(config_dir = %self.config_dir.display(), "shared context initialized");
        Ok(())
    }

    /// Writes application settings back. The context can be initialized again.
    pub fn shutdown(&self) -> Result<(), ConfigError> {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let text = toml::to_string_pretty(&*self.settings.read())?;
        write_atomic(&self.settings_path(), text.as_bytes())?;
        tracing::info!("shared context shut down");
        Ok(())
    }

    /// Returns `true` between `initialize` and `shutdown`.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Directory holding application settings.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Directory holding the shared settings cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// The settings cache in [`cache_dir`](Self::cache_dir).
    pub fn store(&self) -> SettingsStore {
        SettingsStore::new(&self.cache_dir)
    }

    /// Copy of the current application settings.
    pub fn settings(&self) -> AppSettings {
        self.settings.read().clone()
    }

    /// Current theme name.
    pub fn theme(&self) -> String {
        self.settings.read().theme.clone()
    }

    /// Changes the theme name.
    pub fn set_theme(&self, theme: impl Into<String>) {
        self.settings.write().theme = theme.into();
    }

    /// Current locale tag.
    pub fn locale(&self) -> String {
        self.settings.read().locale.clone()
    }

    /// Changes the locale tag.
    pub fn set_locale(&self, locale: impl Into<String>) {
        self.settings.write().locale = locale.into();
    }

    fn settings_path(&self) -> PathBuf {
        self.config_dir.join(APP_SETTINGS_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_survive_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = SharedContext::with_dirs(tmp.path().join("cfg"), tmp.path().join("cache"));
        ctx.initialize().unwrap();
        assert_eq!(ctx.theme(), "default");
        ctx.set_theme("dark");
        ctx.set_locale("de-DE");
        ctx.shutdown().unwrap();
        assert!(!ctx.is_initialized());

        let again = SharedContext::with_dirs(tmp.path().join("cfg"), tmp.path().join("cache"));
        again.initialize().unwrap();
        assert_eq!(again.theme(), "dark");
        assert_eq!(again.locale(), "de-DE");
        assert!(again.cache_dir().is_dir());
    }

    #[test]
    fn shutdown_without_initialize_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = SharedContext::with_dirs(tmp.path().join("cfg"), tmp.path().join("cache"));
        ctx.shutdown().unwrap();
        assert!(!tmp.path().join("cfg").exists());
    }

    #[test]
    fn store_uses_cache_dir() {
        let ctx = SharedContext::with_dirs("/a", "/b");
        assert_eq!(ctx.store().dir(), Path::new("/b"));
        assert_eq!(ctx.settings(), AppSettings::default());
    }
}
