//! Syncer configuration.
//!
//! Loaded from TOML; every key is optional.
//!
//! ```toml
//! suffix = "vsync"
//! target_namespace = "vsync-host"
//! channel_buffer = 32
//! call_timeout_ms = 5000
//! resync_interval_ms = 30000
//! excluded_annotations = ["kubectl.kubernetes.io/last-applied-configuration"]
//! ```
//!
//! `VSYNC_SUFFIX` and `VSYNC_TARGET_NAMESPACE` override the file.

use super::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const SUFFIX_ENV: &str = "VSYNC_SUFFIX";
pub const TARGET_NAMESPACE_ENV: &str = "VSYNC_TARGET_NAMESPACE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Name of this syncer instance. Part of every physical name and the value of
    /// the managed-by label.
    #[serde(default = "default_suffix")]
    pub suffix: String,

    /// Namespace in the physical store that holds every counterpart.
    #[serde(default = "default_target_namespace")]
    pub target_namespace: String,

    /// Mailbox size of each store actor.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Upper bound for a single store call.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// How often every pair is reconciled even without events.
    #[serde(default = "default_resync_interval_ms")]
    pub resync_interval_ms: u64,

    /// Annotation keys that never leave the virtual store.
    #[serde(default)]
    pub excluded_annotations: Vec<String>,
}

fn default_suffix() -> String {
    "vsync".to_string()
}

fn default_target_namespace() -> String {
    "vsync-host".to_string()
}

fn default_channel_buffer() -> usize {
    32
}

fn default_call_timeout_ms() -> u64 {
    5000
}

fn default_resync_interval_ms() -> u64 {
    30_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            suffix: default_suffix(),
            target_namespace: default_target_namespace(),
            channel_buffer: default_channel_buffer(),
            call_timeout_ms: default_call_timeout_ms(),
            resync_interval_ms: default_resync_interval_ms(),
            excluded_annotations: Vec::new(),
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, then applies environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&input)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields from the environment, looked up through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(suffix) = lookup(SUFFIX_ENV).filter(|value| !value.is_empty()) {
            self.suffix = suffix;
        }
        if let Some(namespace) = lookup(TARGET_NAMESPACE_ENV).filter(|value| !value.is_empty()) {
            self.target_namespace = namespace;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.suffix.is_empty() {
            return Err(ConfigError::Invalid("suffix must not be empty".into()));
        }
        if self.suffix.contains("-x-") {
            return Err(ConfigError::Invalid("suffix must not contain \"-x-\"".into()));
        }
        if self.target_namespace.is_empty() {
            return Err(ConfigError::Invalid("target_namespace must not be empty".into()));
        }
        if self.channel_buffer == 0 {
            return Err(ConfigError::Invalid("channel_buffer must be > 0".into()));
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid("call_timeout_ms must be > 0".into()));
        }
        if self.resync_interval_ms == 0 {
            return Err(ConfigError::Invalid("resync_interval_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_millis(self.resync_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = SyncConfig::from_toml_str("").unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.call_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
            suffix = "team-a"
            excluded_annotations = ["internal/secret"]
            "#,
        )
        .unwrap();
        assert_eq!(config.suffix, "team-a");
        assert_eq!(config.target_namespace, "vsync-host");
        assert_eq!(config.excluded_annotations, vec!["internal/secret"]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = SyncConfig::from_toml_str("sufix = \"typo\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = SyncConfig::from_toml_str("suffix = \"a-x-b\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = SyncConfig::from_toml_str("channel_buffer = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = SyncConfig::default();
        config.apply_env_overrides(|key| match key {
            SUFFIX_ENV => Some("blue".to_string()),
            TARGET_NAMESPACE_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.suffix, "blue");
        assert_eq!(config.target_namespace, "vsync-host");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = SyncConfig::from_file("/nonexistent/vsync.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
