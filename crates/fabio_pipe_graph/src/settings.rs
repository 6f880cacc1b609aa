// SPDX-License-Identifier: MIT OR Apache-2.0
//! Plugin settings.
//!
//! Settings come from three places, later ones winning:
//! - built-in defaults
//! - an optional RON settings file
//! - the `FABIO_DYNAMIC_PIPE_MAX_OUTPUTS` environment variable

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable overriding the Pipe Out output count
pub const MAX_OUTPUTS_ENV: &str = "FABIO_DYNAMIC_PIPE_MAX_OUTPUTS";

/// Default number of dynamic Pipe Out outputs
pub const DEFAULT_MAX_OUTPUTS: usize = 128;

/// Default number of static Pipe In/Out slots
pub const DEFAULT_STATIC_SLOTS: usize = 64;

/// Upper bound for output and slot counts; larger requests are clamped
pub const MAX_SOCKET_COUNT: usize = 1024;

/// Pipe name used when a Pipe In leaves it blank
pub const DEFAULT_PIPE_NAME: &str = "Pipe Principal";

/// Error loading or saving settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// File could not be read or written
    #[error("settings file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid RON
    #[error("invalid settings file: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Settings could not be serialized
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] ron::Error),
}

/// Plugin settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipeSettings {
    /// Output count of the dynamic Pipe Out
    pub max_outputs: usize,
    /// Slot count of the static Pipe In/Out pair
    pub static_slots: usize,
    /// Fallback pipe name for Pipe In nodes
    pub default_pipe_name: String,
}

impl Default for PipeSettings {
    fn default() -> Self {
        Self {
            max_outputs: DEFAULT_MAX_OUTPUTS,
            static_slots: DEFAULT_STATIC_SLOTS,
            default_pipe_name: DEFAULT_PIPE_NAME.to_string(),
        }
    }
}

impl PipeSettings {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load settings from a RON file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let mut settings: PipeSettings = ron::from_str(&content)?;

        // Zero outputs/slots would make the nodes useless
        if settings.max_outputs == 0 {
            settings.max_outputs = DEFAULT_MAX_OUTPUTS;
        }
        if settings.static_slots == 0 {
            settings.static_slots = DEFAULT_STATIC_SLOTS;
        }
        settings.max_outputs = clamp_socket_count("max_outputs", settings.max_outputs);
        settings.static_slots = clamp_socket_count("static_slots", settings.static_slots);

        tracing::debug!(?path, ?settings, "loaded pipe settings");
        Ok(settings)
    }

    /// Save settings to a RON file
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let config = ron::ser::PrettyConfig::default().struct_names(true);
        let content = ron::ser::to_string_pretty(self, config)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `FABIO_DYNAMIC_PIPE_MAX_OUTPUTS` if it holds a positive integer
    pub fn with_env_overrides(self) -> Self {
        let raw = std::env::var(MAX_OUTPUTS_ENV).ok();
        self.with_max_outputs_override(raw.as_deref())
    }

    /// Apply a raw max-outputs override; invalid values are ignored
    pub fn with_max_outputs_override(mut self, raw: Option<&str>) -> Self {
        match raw.map(parse_max_outputs) {
            Some(Some(max_outputs)) => {
                self.max_outputs = clamp_socket_count(MAX_OUTPUTS_ENV, max_outputs);
            }
            Some(None) => {
                tracing::warn!(
                    value = raw.unwrap_or_default(),
                    "ignoring {MAX_OUTPUTS_ENV}: expected a positive integer"
                );
            }
            None => {}
        }
        self
    }
}

fn clamp_socket_count(source: &str, count: usize) -> usize {
    if count > MAX_SOCKET_COUNT {
        tracing::warn!(
            requested = count,
            limit = MAX_SOCKET_COUNT,
            "{source} exceeds the socket limit, clamping"
        );
        return MAX_SOCKET_COUNT;
    }
    count
}

/// Parse a positive output count (not yet clamped)
pub fn parse_max_outputs(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|n| *n > 0)
}
