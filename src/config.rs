//! Editor tuning knobs.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Failure to read an [`EditorConfig`] document.
#[derive(Debug, Error)]
#[error("invalid editor config: {0}")]
pub struct ConfigError(#[from] toml::de::Error);

/// Runtime configuration shared by the autosave, prompt and render parts.
///
/// All fields have defaults, so a TOML document only needs the keys it
/// overrides:
///
/// ```
/// let cfg = quillpad::config::EditorConfig::from_toml_str("autosave_delay_ms = 250").expect("config");
/// assert_eq!(cfg.autosave_delay().as_millis(), 250);
/// assert_eq!(cfg.excerpt_limit, 500);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Idle time after the last edit before an autosave write.
    pub autosave_delay_ms: u64,
    /// Characters of each chapter body included in prompts.
    pub excerpt_limit: usize,
    /// Reveal cadence of the streaming render queue.
    pub frame_interval_ms: u64,
    /// Model preselected for every assistant function.
    pub default_model: String,
    /// Autosave command mailbox bound.
    pub command_queue_bound: usize,
    /// Broadcast capacity for autosave and render events.
    pub event_capacity: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            autosave_delay_ms: 1000,
            excerpt_limit: 500,
            frame_interval_ms: 16,
            default_model: "gemini-2.0-flash".to_string(),
            command_queue_bound: 256,
            event_capacity: 1024,
        }
    }
}

impl EditorConfig {
    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Debounce window after the last edit.
    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }

    /// Render frame period, never zero.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(EditorConfig::from_toml_str("").expect("parse"), EditorConfig::default());
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(EditorConfig::from_toml_str("excerpt_limit = \"lots\"").is_err());
    }
}
