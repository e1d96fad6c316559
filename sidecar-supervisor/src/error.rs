use std::path::PathBuf;

use thiserror::Error;

use sidecar_core::ConfigError;
use sidecar_mount::MountError;

/// Error surface for launching and supervising the service.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("no runnable service command found ({probes} candidates probed)")]
    Unresolved { probes: usize },

    #[error("storage mount failed: {0}")]
    Mount(#[from] MountError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to launch {program}: {source}")]
    ChildLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("service exited with code {code}")]
    ChildExit { code: i32 },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },
}

impl SupervisorError {
    /// Taxonomy label recorded in the diagnostics snapshot.
    pub fn kind(&self) -> &'static str {
        match self {
            SupervisorError::Unresolved { .. } => "resolution",
            SupervisorError::Mount(_) => "mount",
            SupervisorError::Config(_) => "config",
            SupervisorError::ChildLaunch { .. } => "child_launch",
            SupervisorError::ChildExit { .. } => "child_exit",
            SupervisorError::Io { .. } => "io",
            SupervisorError::Join { .. } => "join",
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SupervisorError {
    SupervisorError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn join_err(task: &'static str, err: tokio::task::JoinError) -> SupervisorError {
    SupervisorError::Join {
        task,
        message: err.to_string(),
    }
}
