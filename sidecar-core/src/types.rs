//! Domain types shared between the resolver, mount lifecycle and supervisor.
//!
//! Everything here is serializable: the diagnostics snapshot is served as JSON
//! by the fallback status responder.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Command resolution
// ---------------------------------------------------------------------------

/// Outcome of one `--version` probe against a candidate invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    /// Human-readable invocation, e.g. `"moltbot"` or `"node /usr/lib/…/moltbot.mjs"`.
    pub candidate: String,
    pub succeeded: bool,
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Spawn failure (`"No such file or directory"` and friends).
    pub error: Option<String>,
}

/// How to invoke the supervised service.
///
/// `executable == None` means no candidate was viable; the probe trail says why.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCommand {
    pub executable: Option<String>,
    pub args_prefix: Vec<String>,
    pub probe_results: Vec<ProbeResult>,
    /// Package manager global bin directory, if it could be determined.
    pub global_bin: Option<PathBuf>,
    /// Package manager global module root, if it could be determined.
    pub global_root: Option<PathBuf>,
    /// `PATH` at resolution time.
    pub search_path: Option<String>,
}

impl ResolvedCommand {
    pub fn is_available(&self) -> bool {
        self.executable.is_some()
    }

    /// Full argument vector: the resolved prefix followed by `extra`.
    pub fn args_with<S: AsRef<str>>(&self, extra: &[S]) -> Vec<String> {
        self.args_prefix
            .iter()
            .cloned()
            .chain(extra.iter().map(|arg| arg.as_ref().to_string()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Storage mount
// ---------------------------------------------------------------------------

/// Published result of the storage mount lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountStatus {
    pub enabled: bool,
    pub mounted: bool,
    pub mount_point: PathBuf,
    /// `bucket` or `bucket:prefix`.
    pub bucket_ref: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub workspace_dir: Option<PathBuf>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Supervisor diagnostics
// ---------------------------------------------------------------------------

/// Supervisor lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Launching,
    Running,
    Exited,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Launching => write!(f, "launching"),
            Phase::Running => write!(f, "running"),
            Phase::Exited => write!(f, "exited"),
            Phase::Failed => write!(f, "failed"),
        }
    }
}

/// Why the service is not running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartError {
    pub message: String,
    /// Taxonomy label, e.g. `"resolution"`, `"mount"`, `"child_exit"`.
    pub kind: String,
    /// Rendered `source()` chain, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl StartError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: kind.into(),
            causes: Vec::new(),
        }
    }

    /// Capture an error and its full source chain.
    pub fn from_error(kind: impl Into<String>, err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            kind: kind.into(),
            causes,
        }
    }
}

/// Everything the fallback status responder reports about this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub mode: String,
    pub phase: Phase,
    pub probe: Option<ResolvedCommand>,
    pub mount: Option<MountStatus>,
    pub start_error: Option<StartError>,
    pub last_exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
}

impl Diagnostics {
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            phase: Phase::Idle,
            probe: None,
            mount: None,
            start_error: None,
            last_exit_code: None,
            started_at: Utc::now(),
        }
    }
}
