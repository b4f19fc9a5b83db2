//! Persistent gateway settings.
//!
//! A small JSON file under the user's config directory.  Keys use the
//! camelCase names the companion UI writes; every field has a default so a
//! missing or corrupt file degrades to stock behavior instead of an error.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// User-tunable behavior toggles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Prepend [`Settings::system_prompt`] as a system message.
    pub include_system_prompt: bool,
    pub system_prompt: String,
    /// When false, only the latest user message is forwarded to the model.
    pub include_history: bool,
    pub debug_logging: bool,
    /// Disable request/response body truncation in logs.
    pub debug_full_request_log: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            include_system_prompt: false,
            system_prompt: String::new(),
            include_history: true,
            debug_logging: false,
            debug_full_request_log: false,
        }
    }
}

/// File-backed store for [`Settings`].
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store at the conventional per-user location.
    pub fn open_default() -> Self {
        let path = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pi-gateway")
            .join("settings.json");
        Self::new(path)
    }

    /// Load settings; any problem yields defaults.
    pub fn load(&self) -> Settings {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "settings file is corrupt; using defaults");
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }

    pub fn save(&self, settings: &Settings) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
        std::fs::write(&self.path, raw)
    }
}
