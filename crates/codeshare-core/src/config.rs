//! Synchronizer configuration.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::Language;

/// Content given to a session created on first visit.
pub const DEFAULT_CONTENT: &str = "// Start coding here...";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Session synchronizer configuration.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Content for newly created sessions.
    pub default_content: String,

    /// Language for newly created sessions.
    pub default_language: Language,

    /// Revert a local edit when its remote write fails.
    ///
    /// Off by default: local keystrokes are kept even if saving failed.
    pub rollback_on_save_failure: bool,

    /// How long "link copied" stays in the status slot.
    pub status_clear_delay_ms: u64,

    /// Pause before resubscribing after a subscription error.
    pub resubscribe_delay_ms: u64,

    /// Consecutive failed resubscribe attempts before giving up.
    pub max_resubscribe_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_content: DEFAULT_CONTENT.to_string(),
            default_language: Language::default(),
            rollback_on_save_failure: false,
            status_clear_delay_ms: 2000,
            resubscribe_delay_ms: 500,
            max_resubscribe_attempts: 5,
        }
    }
}

impl SyncConfig {
    /// Parse a JSON config document.
    ///
    /// # Errors
    /// Returns error if the document is not valid config JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    #[must_use]
    pub const fn status_clear_delay(&self) -> Duration {
        Duration::from_millis(self.status_clear_delay_ms)
    }

    #[must_use]
    pub const fn resubscribe_delay(&self) -> Duration {
        Duration::from_millis(self.resubscribe_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.default_content, "// Start coding here...");
        assert_eq!(config.default_language, Language::Javascript);
        assert!(!config.rollback_on_save_failure);
        assert_eq!(config.status_clear_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            SyncConfig::from_json_str(r#"{"default_language": "python", "rollback_on_save_failure": true}"#)
                .unwrap();
        assert_eq!(config.default_language, Language::Python);
        assert!(config.rollback_on_save_failure);
        assert_eq!(config.default_content, DEFAULT_CONTENT);
        assert_eq!(config.max_resubscribe_attempts, 5);
    }

    #[test]
    fn test_invalid_json() {
        let err = SyncConfig::from_json_str(r#"{"default_language": "cobol"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = SyncConfig::from_json_file("/nonexistent/codeshare.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
