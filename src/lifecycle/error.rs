use std::path::PathBuf;

/// Errors raised while loading or validating a [`SyncConfig`](super::SyncConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors raised by the [`SyncSystem`](super::SyncSystem) lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no kind could be registered")]
    NoKindsEnabled,

    #[error("task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}
