use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Error surface for mount preparation, helper supervision and polling.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn mount helper '{helper}': {source}")]
    Spawn {
        helper: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{mount_point} is still mounted after a lazy unmount")]
    StillMounted { mount_point: PathBuf },

    #[error("mount helper exited before {mount_point} became active ({status})")]
    HelperExited {
        mount_point: PathBuf,
        status: ExitStatus,
    },

    #[error("{mount_point} did not appear in the mount table after {attempts} checks")]
    Timeout { mount_point: PathBuf, attempts: u32 },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> MountError {
    MountError::Io {
        path: path.into(),
        source,
    }
}
