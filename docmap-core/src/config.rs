//! Policy settings carried by a [`Connection`](crate::connection::Connection).
//!
//! Settings can be built in code or deserialized from any serde format:
//!
//! ```ignore
//! use docmap::config::Settings;
//!
//! let settings: Settings = serde_json::from_str(
//!     r#"{ "defaults_handling": "warning", "type_checking": "error" }"#,
//! )?;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::typecheck::AlertLevel;

/// Policy configuration for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// What happens when a write targets a field outside a non-empty schema.
    pub defaults_handling: AlertLevel,
    /// What happens when a written value disagrees with its schema-implied type.
    pub type_checking: AlertLevel,
    /// Redirects every path to the isolated test database.
    pub test_mode: bool,
}

impl Settings {
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }
}

/// Builder for [`Settings`]; unset values keep their defaults.
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn defaults_handling(mut self, level: AlertLevel) -> Self {
        self.settings.defaults_handling = level;
        self
    }

    pub fn type_checking(mut self, level: AlertLevel) -> Self {
        self.settings.type_checking = level;
        self
    }

    pub fn test_mode(mut self, enabled: bool) -> Self {
        self.settings.test_mode = enabled;
        self
    }

    pub fn build(self) -> Settings {
        self.settings
    }
}

/// Lock-free, runtime-mutable copy of [`Settings`].
#[derive(Debug, Default)]
pub(crate) struct LiveSettings {
    defaults_handling: AtomicU8,
    type_checking: AtomicU8,
    test_mode: AtomicBool,
}

impl LiveSettings {
    pub(crate) fn new(settings: Settings) -> Self {
        let live = Self::default();
        live.store(settings);
        live
    }

    pub(crate) fn load(&self) -> Settings {
        Settings {
            defaults_handling: decode_level(self.defaults_handling.load(Ordering::Acquire)),
            type_checking: decode_level(self.type_checking.load(Ordering::Acquire)),
            test_mode: self.test_mode.load(Ordering::Acquire),
        }
    }

    pub(crate) fn store(&self, settings: Settings) {
        self.set_defaults_handling(settings.defaults_handling);
        self.set_type_checking(settings.type_checking);
        self.set_test_mode(settings.test_mode);
    }

    pub(crate) fn set_defaults_handling(&self, level: AlertLevel) {
        self.defaults_handling.store(encode_level(level), Ordering::Release);
    }

    pub(crate) fn set_type_checking(&self, level: AlertLevel) {
        self.type_checking.store(encode_level(level), Ordering::Release);
    }

    pub(crate) fn set_test_mode(&self, enabled: bool) {
        self.test_mode.store(enabled, Ordering::Release);
    }
}

fn encode_level(level: AlertLevel) -> u8 {
    match level {
        AlertLevel::None => 0,
        AlertLevel::Warning => 1,
        AlertLevel::Error => 2,
    }
}

fn decode_level(raw: u8) -> AlertLevel {
    match raw {
        1 => AlertLevel::Warning,
        2 => AlertLevel::Error,
        _ => AlertLevel::None,
    }
}
