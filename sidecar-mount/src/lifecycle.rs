use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use nix::mount::{umount2, MntFlags};
use sidecar_core::paths::{STATE_SUBDIR, WORKSPACE_SUBDIR};
use sidecar_core::{Env, MountStatus};
use tokio::process::{Child, Command};

use crate::error::{io_err, MountError};
use crate::settings::{self, MountSettings};
use crate::table;

/// The live mount helper. The mount stays attached while this is held;
/// dropping it kills the helper.
#[derive(Debug)]
pub struct MountHelper {
    child: Child,
    mount_point: PathBuf,
}

impl MountHelper {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Kill the helper and reap it.
    pub async fn terminate(&mut self) {
        if let Err(err) = self.child.kill().await {
            tracing::debug!(error = %err, "mount helper already gone");
        }
    }
}

/// Result of one pass through the lifecycle.
#[derive(Debug)]
pub struct MountOutcome {
    pub status: MountStatus,
    /// Credentials were absent; the helper was never invoked.
    pub skipped: bool,
    pub required: bool,
    pub failure: Option<MountError>,
    pub helper: Option<MountHelper>,
}

impl MountOutcome {
    pub fn mounted(&self) -> bool {
        self.status.mounted
    }

    fn skipped(mount_point: PathBuf) -> Self {
        Self {
            status: MountStatus {
                enabled: false,
                mounted: false,
                mount_point,
                ..MountStatus::default()
            },
            skipped: true,
            required: false,
            failure: None,
            helper: None,
        }
    }

    /// Apply the `required` policy: a failed required mount becomes an error,
    /// a failed optional mount is returned as-is for degraded operation.
    pub fn enforce(mut self) -> Result<Self, MountError> {
        match self.failure.take() {
            Some(err) if self.required => Err(err),
            other => {
                self.failure = other;
                Ok(self)
            }
        }
    }
}

/// Mount when all required credentials are present, else skip.
pub async fn mount_if_configured(env: &Env) -> MountOutcome {
    match MountSettings::from_env(env) {
        Some(settings) => mount(&settings).await,
        None => {
            tracing::info!(
                missing = ?settings::missing_keys(env),
                "object storage not configured, skipping mount",
            );
            MountOutcome::skipped(settings::mount_point(env))
        }
    }
}

/// Run the full lifecycle for `settings`. Failures are recorded in the
/// outcome; call [`MountOutcome::enforce`] to apply the policy.
pub async fn mount(settings: &MountSettings) -> MountOutcome {
    let mut status = MountStatus {
        enabled: true,
        mounted: false,
        mount_point: settings.mount_point.clone(),
        bucket_ref: Some(settings.bucket_ref()),
        ..MountStatus::default()
    };

    match attach(settings).await {
        Ok((helper, dirs)) => {
            status.mounted = true;
            status.state_dir = Some(dirs.0);
            status.workspace_dir = Some(dirs.1);
            tracing::info!(
                mount_point = %settings.mount_point.display(),
                bucket = %settings.bucket_ref(),
                "object storage mounted",
            );
            MountOutcome {
                status,
                skipped: false,
                required: settings.required,
                failure: None,
                helper: Some(helper),
            }
        }
        Err(err) => {
            status.error = Some(err.to_string());
            if settings.required {
                tracing::error!(error = %err, "required object storage mount failed");
            } else {
                tracing::warn!(
                    error = %err,
                    "object storage mount failed, continuing with local non-persistent directories",
                );
            }
            MountOutcome {
                status,
                skipped: false,
                required: settings.required,
                failure: Some(err),
                helper: None,
            }
        }
    }
}

async fn attach(settings: &MountSettings) -> Result<(MountHelper, (PathBuf, PathBuf)), MountError> {
    let mount_point = settings.mount_point.clone();
    let table_path = settings.mount_table.clone();
    tokio::task::spawn_blocking(move || prepare_mount_point(&mount_point, &table_path))
        .await
        .map_err(|err| io_err(&settings.mount_point, std::io::Error::other(err)))??;

    let mut helper = spawn_helper(settings)?;

    if let Err(err) = wait_for_mount(settings, &mut helper).await {
        helper.terminate().await;
        return Err(err);
    }

    match create_subdirs(&settings.mount_point) {
        Ok(dirs) => Ok((helper, dirs)),
        Err(err) => {
            helper.terminate().await;
            Err(err)
        }
    }
}

/// Detach any stale mount and recreate an empty mount point.
///
/// A mount that is still listed after the lazy unmount is an error: its table
/// entry would otherwise confirm the new helper's mount before it exists, and
/// its contents must never be deleted.
fn prepare_mount_point(mount_point: &Path, table_path: &Path) -> Result<(), MountError> {
    if let Err(errno) = umount2(mount_point, MntFlags::MNT_DETACH) {
        tracing::debug!(
            mount_point = %mount_point.display(),
            error = %errno,
            "lazy unmount skipped",
        );
    }

    if table::is_mounted_blocking(table_path, mount_point) {
        return Err(MountError::StillMounted {
            mount_point: mount_point.to_path_buf(),
        });
    }

    if mount_point.exists() {
        fs::remove_dir_all(mount_point).map_err(|e| io_err(mount_point, e))?;
    }
    fs::create_dir_all(mount_point).map_err(|e| io_err(mount_point, e))
}

fn spawn_helper(settings: &MountSettings) -> Result<MountHelper, MountError> {
    let child = Command::new(&settings.helper)
        .args(settings.helper_args())
        .envs(settings.helper_env())
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| MountError::Spawn {
            helper: settings.helper.clone(),
            source,
        })?;

    tracing::info!(
        helper = %settings.helper,
        pid = ?child.id(),
        mount_point = %settings.mount_point.display(),
        "mount helper started",
    );

    Ok(MountHelper {
        child,
        mount_point: settings.mount_point.clone(),
    })
}

async fn wait_for_mount(settings: &MountSettings, helper: &mut MountHelper) -> Result<u32, MountError> {
    for attempt in 1..=settings.poll_attempts {
        // A listing only counts while the helper that owns it is alive.
        match helper.child.try_wait() {
            Ok(Some(status)) => {
                return Err(MountError::HelperExited {
                    mount_point: settings.mount_point.clone(),
                    status,
                })
            }
            Ok(None) => {}
            Err(err) => return Err(io_err(&settings.helper, err)),
        }

        if table::is_mounted(&settings.mount_table, &settings.mount_point).await {
            tracing::debug!(attempt, "mount point active");
            return Ok(attempt);
        }

        tokio::time::sleep(settings.poll_interval).await;
    }

    Err(MountError::Timeout {
        mount_point: settings.mount_point.clone(),
        attempts: settings.poll_attempts,
    })
}

fn create_subdirs(mount_point: &Path) -> Result<(PathBuf, PathBuf), MountError> {
    let state = mount_point.join(STATE_SUBDIR);
    let workspace = mount_point.join(WORKSPACE_SUBDIR);
    for dir in [&state, &workspace] {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    Ok((state, workspace))
}
