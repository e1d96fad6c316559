//! Error types for sidecar-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::AuthMode;

/// All errors that can arise while synthesizing or persisting the service config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Non-loopback bind without a credential for the configured auth mode.
    #[error("{variable} is not set; refusing to bind a non-loopback address with {mode} auth")]
    MissingCredential {
        mode: AuthMode,
        variable: &'static str,
    },

    /// `MOLTBOT_CONFIG_JSON` was supplied but is not valid JSON.
    #[error("pre-built config is not valid JSON: {0}")]
    InvalidRawConfig(#[source] serde_json::Error),

    /// JSON serialization error (write path).
    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
