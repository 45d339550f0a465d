//! # vecport-settings
//!
//! Configuration for the vecport tools, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`VecportSettings::default()`], which reproduce
//!    the fixed constants every tool was designed around
//! 2. **User file**: `~/.vecport/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `VECPORT_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
