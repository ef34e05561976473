//! Error types for configuration and persistence.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A settings or state file could not be read.
    #[error("cannot read '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A settings or state file could not be written.
    #[error("cannot write '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings directory could not be created.
    #[error("cannot create directory '{path}': {source}")]
    CreateDir {
        /// Path of the directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Stored TOML is malformed.
    #[error("malformed settings: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A record could not be rendered as TOML.
    #[error("cannot serialize settings: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Another process holds the settings lock
    #[error("settings lock '{path}' is held by another process")]
    LockUnavailable {
        /// Path of the lock file.
        path: PathBuf,
    },

    /// The lock file itself could not be opened or locked
    #[error("failed to lock '{path}': {source}")]
    Lock {
        /// Path of the lock file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// [`ConfigError::ReadFile`] for `path`.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// [`ConfigError::WriteFile`] for `path`.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// [`ConfigError::CreateDir`] for `path`.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::CreateDir {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if the error means the cross-process lock was not obtained.
    pub fn is_lock_failure(&self) -> bool {
        matches!(
            self,
            ConfigError::LockUnavailable { .. } | ConfigError::Lock { .. }
        )
    }
}
