//! # drivrr-settings
//!
//! Configuration management with layered sources for the dispatch server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`DispatchSettings::default()`]
//! 2. **User file**: `~/.drivrr/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `DRIVRR_*` overrides (highest priority)
//!
//! The binary applies its CLI flags on top of the loaded value.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{DispatchSettings, LoggingSettings, ServerSettings, SessionSettings};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = DispatchSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = DispatchSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.server.port, 8081);
        assert_eq!(settings.session.outbound_queue_capacity, 256);
    }
}
