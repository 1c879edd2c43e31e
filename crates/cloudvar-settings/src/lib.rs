//! # cloudvar-settings
//!
//! Layered settings for cloud sessions.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`CloudSettings::default()`]
//! 2. **Settings file**: `~/.cloudvar/settings.json` or an explicit path,
//!    deep-merged over defaults
//! 3. **Environment variables**: `CLOUDVAR_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::CloudSettings;
