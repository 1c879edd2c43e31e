//! Errors raised while loading cloud settings.

use std::path::PathBuf;

use thiserror::Error;

/// Settings could not be loaded, or lack what a session needs.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read cloud settings {}: {source}", path.display())]
    Read {
        /// Settings file that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not JSON, or does not fit the settings schema.
    #[error("cannot parse cloud settings {}: {source}", path.display())]
    Parse {
        /// Settings file that failed.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A session cannot be opened without this value.
    #[error("{field} is not set")]
    MissingIdentity {
        /// Settings key that is missing (`projectId` or `username`).
        field: &'static str,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
