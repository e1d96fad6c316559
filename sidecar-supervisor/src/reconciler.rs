//! Auto-approval reconciler: poll the running service for pending device
//! requests and approve each one.
//!
//! Every failure here is transient. A tick that cannot list or parse is
//! logged and skipped; the next tick tries again.

use std::collections::BTreeSet;
use std::future::Future;
use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::task::{JoinHandle, JoinSet};

use sidecar_core::ResolvedCommand;

use crate::settings::ReconcilerSettings;

/// Envelope field names that may carry the pending request collection.
pub const PENDING_FIELDS: [&str; 5] = ["pending", "requests", "nodes", "items", "list"];

/// Captured result of one administrative sub-command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CliOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Environment overrides applied to every sub-command.
pub type EnvOverlay = Arc<[(String, String)]>;

/// Runs short-lived sub-commands of the service CLI.
pub trait CommandRunner: Send + Sync + 'static {
    fn run(
        &self,
        program: &str,
        args: Vec<String>,
        envs: &[(String, String)],
    ) -> impl Future<Output = io::Result<CliOutput>> + Send;
}

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

impl CommandRunner for TokioRunner {
    async fn run(
        &self,
        program: &str,
        args: Vec<String>,
        envs: &[(String, String)],
    ) -> io::Result<CliOutput> {
        let output = tokio::process::Command::new(program)
            .args(&args)
            .envs(envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(CliOutput {
            // Killed by a signal: no code, treat as failure.
            code: output.status.code().unwrap_or(1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The previous tick was still in flight.
    Skipped,
    /// The list sub-command could not be spawned or exited non-zero.
    ListFailed,
    /// The list sub-command printed something that is not JSON.
    Unparseable,
    /// Nothing pending.
    Idle,
    Approved { approved: usize, failed: usize },
}

/// Clears the in-flight flag when the tick ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Reconciler<R: CommandRunner = TokioRunner> {
    program: String,
    args_prefix: Vec<String>,
    settings: ReconcilerSettings,
    envs: EnvOverlay,
    runner: Arc<R>,
    in_flight: Arc<AtomicBool>,
}

impl<R: CommandRunner> Clone for Reconciler<R> {
    fn clone(&self) -> Self {
        Self {
            program: self.program.clone(),
            args_prefix: self.args_prefix.clone(),
            settings: self.settings.clone(),
            envs: Arc::clone(&self.envs),
            runner: Arc::clone(&self.runner),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<R: CommandRunner> Reconciler<R> {
    /// `None` when the reconciler is disabled or there is no command to run.
    pub fn new(resolved: &ResolvedCommand, settings: ReconcilerSettings, runner: R) -> Option<Self> {
        if !settings.enabled {
            return None;
        }
        let program = resolved.executable.clone()?;
        if settings.legacy_key {
            tracing::warn!(
                "CLAWDBOT_AUTO_APPROVE_NODES is deprecated, use CLAWDBOT_AUTO_APPROVE_DEVICES",
            );
        }
        Some(Self {
            program,
            args_prefix: resolved.args_prefix.clone(),
            settings,
            envs: Arc::from(Vec::new()),
            runner: Arc::new(runner),
            in_flight: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Sub-commands run with `envs` on top of the inherited environment, so
    /// they see the same config and directories as the service.
    pub fn with_env(mut self, envs: Vec<(String, String)>) -> Self {
        self.envs = Arc::from(envs);
        self
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    fn list_args(&self) -> Vec<String> {
        let mut args = self.args_prefix.clone();
        args.extend(["devices", "list", "--json"].map(String::from));
        args.extend(self.settings.connection_args());
        args
    }

    fn approve_args(&self, id: &str) -> Vec<String> {
        let mut args = self.args_prefix.clone();
        args.extend(["devices", "approve", id].map(String::from));
        args.extend(self.settings.connection_args());
        args
    }

    /// One list-and-approve cycle. A no-op while another cycle is running.
    pub async fn tick(&self) -> TickOutcome {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            tracing::debug!("auto-approve tick still in flight, skipping");
            return TickOutcome::Skipped;
        };

        let listed = match self.runner.run(&self.program, self.list_args(), &self.envs).await {
            Ok(output) if output.success() => output,
            Ok(output) => {
                tracing::warn!(
                    code = output.code,
                    stderr = %output.stderr.trim(),
                    "devices list failed",
                );
                return TickOutcome::ListFailed;
            }
            Err(err) => {
                tracing::warn!(program = %self.program, error = %err, "devices list could not run");
                return TickOutcome::ListFailed;
            }
        };

        let payload: Value = match serde_json::from_str(listed.stdout.trim()) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "devices list output is not JSON");
                return TickOutcome::Unparseable;
            }
        };

        let ids = collect_pending_request_ids(&payload);
        if ids.is_empty() {
            return TickOutcome::Idle;
        }

        let mut approvals = JoinSet::new();
        for id in ids {
            let runner = Arc::clone(&self.runner);
            let program = self.program.clone();
            let envs = Arc::clone(&self.envs);
            let args = self.approve_args(&id);
            approvals.spawn(async move {
                let result = runner.run(&program, args, &envs).await;
                (id, result)
            });
        }

        let (mut approved, mut failed) = (0, 0);
        while let Some(joined) = approvals.join_next().await {
            match joined {
                Ok((id, Ok(output))) if output.success() => {
                    tracing::info!(request_id = %id, "device request approved");
                    approved += 1;
                }
                Ok((id, Ok(output))) => {
                    tracing::warn!(
                        request_id = %id,
                        code = output.code,
                        stderr = %output.stderr.trim(),
                        "device approval failed",
                    );
                    failed += 1;
                }
                Ok((id, Err(err))) => {
                    tracing::warn!(request_id = %id, error = %err, "device approval could not run");
                    failed += 1;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "device approval task failed");
                    failed += 1;
                }
            }
        }
        TickOutcome::Approved { approved, failed }
    }

    /// Run ticks on the configured interval until the handle is aborted.
    ///
    /// Each tick runs as its own task so a slow tick does not delay the timer;
    /// the in-flight flag turns overlapping ticks into no-ops. Aborting the
    /// handle drops any tick still running.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                interval_ms = self.settings.interval.as_millis() as u64,
                gateway_url = %self.settings.gateway_url,
                "auto-approve reconciler started",
            );
            let reconciler = Arc::new(self);
            let mut interval = tokio::time::interval(reconciler.settings.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await; // consume the first immediate tick

            let mut ticks = JoinSet::new();
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let reconciler = Arc::clone(&reconciler);
                        ticks.spawn(async move { reconciler.tick().await });
                    }
                    Some(joined) = ticks.join_next(), if !ticks.is_empty() => {
                        match joined {
                            Ok(outcome) => tracing::debug!(?outcome, "auto-approve tick finished"),
                            Err(err) => tracing::warn!(error = %err, "auto-approve tick failed"),
                        }
                    }
                }
            }
        })
    }
}

/// Shapes the `devices list --json` payload is known to take.
#[derive(Debug)]
enum PendingPayload<'a> {
    /// `["id", {"requestId": "id"}, {"id": "id"}]`
    Entries(&'a [Value]),
    /// An object carrying one or more [`PENDING_FIELDS`].
    Envelope(Vec<&'a Value>),
    /// `{"<id>": {...}, ...}` found under an envelope field.
    Keyed(&'a Map<String, Value>),
    Unrecognized,
}

impl<'a> PendingPayload<'a> {
    fn decode(value: &'a Value) -> Self {
        match value {
            Value::Array(items) => PendingPayload::Entries(items),
            Value::Object(map) => {
                let fields = envelope_fields(map);
                if fields.is_empty() {
                    PendingPayload::Unrecognized
                } else {
                    PendingPayload::Envelope(fields)
                }
            }
            _ => PendingPayload::Unrecognized,
        }
    }

    /// Decoding of a value found under an envelope field.
    fn decode_field(value: &'a Value) -> Self {
        match value {
            Value::Object(map) if envelope_fields(map).is_empty() => PendingPayload::Keyed(map),
            other => Self::decode(other),
        }
    }

    fn collect_into(self, ids: &mut BTreeSet<String>) {
        match self {
            PendingPayload::Entries(items) => {
                ids.extend(items.iter().filter_map(entry_id).map(str::to_string));
            }
            PendingPayload::Envelope(fields) => {
                for field in fields {
                    Self::decode_field(field).collect_into(ids);
                }
            }
            PendingPayload::Keyed(map) => {
                ids.extend(map.keys().filter(|k| !k.is_empty()).cloned());
            }
            PendingPayload::Unrecognized => {}
        }
    }
}

fn envelope_fields(map: &Map<String, Value>) -> Vec<&Value> {
    PENDING_FIELDS
        .iter()
        .filter_map(|field| map.get(*field))
        .filter(|value| value.is_array() || value.is_object())
        .collect()
}

fn entry_id(item: &Value) -> Option<&str> {
    match item {
        Value::String(id) if !id.is_empty() => Some(id.as_str()),
        Value::Object(map) => non_empty_str(map.get("requestId")).or_else(|| non_empty_str(map.get("id"))),
        _ => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// De-duplicated pending request ids from a `devices list --json` payload.
///
/// Shapes are tried in order: an array of strings or of objects carrying
/// `requestId` (else `id`); an object whose [`PENDING_FIELDS`] hold such an
/// array; an object whose [`PENDING_FIELDS`] hold a map keyed by id. A map
/// that itself carries pending fields is decoded recursively. Anything else
/// yields an empty set.
pub fn collect_pending_request_ids(payload: &Value) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    PendingPayload::decode(payload).collect_into(&mut ids);
    ids
}
