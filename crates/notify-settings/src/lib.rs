//! # notify-settings
//!
//! Layered configuration for the notification relay.
//!
//! Settings come from three layers (in priority order):
//! 1. **Compiled defaults**: [`NotifySettings::default()`]
//! 2. **Settings file**: `<config-dir>/notification.json` (deep-merged over defaults)
//! 3. **Environment variables**: `NOTIFY_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{GeneralSettings, LoggingSettings, NotifySettings, SessionSettings};
