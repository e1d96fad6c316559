use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::signal::unix::{signal, SignalKind};

use sidecar_core::config::{self, WrittenConfig};
use sidecar_core::paths::keys;
use sidecar_core::{Env, MountStatus, Phase, ResolvedCommand};
use sidecar_mount::{mount_if_configured, MountOutcome};

use crate::context::SupervisorContext;
use crate::error::{io_err, join_err, SupervisorError};
use crate::reconciler::{Reconciler, TokioRunner};
use crate::settings::{RunMode, SupervisorSettings};
use crate::{net, status};

/// How a supervised run ended.
#[derive(Debug)]
pub enum Termination {
    /// The service exited 0 on its own.
    Success,
    /// Launch failed or the service exited non-zero, forwarded signal or
    /// not; the fallback responder should take over.
    Failed(SupervisorError),
}

impl Termination {
    pub fn needs_fallback(&self) -> bool {
        matches!(self, Termination::Failed(_))
    }

    /// Process exit code for the host.
    pub fn exit_code(&self) -> i32 {
        match self {
            Termination::Success => 0,
            Termination::Failed(SupervisorError::ChildExit { code }) => *code,
            Termination::Failed(_) => 1,
        }
    }
}

/// A launched service with everything that must outlive it.
struct Launched {
    child: Child,
    program: String,
    resolved: ResolvedCommand,
    /// Environment overlay the service was started with.
    env: Vec<(String, String)>,
    /// Keeps the storage helper alive for the lifetime of the service.
    mount: MountOutcome,
}

/// Owns one run of the service: resolution, mount, config, child process.
pub struct Supervisor {
    env: Env,
    settings: SupervisorSettings,
    ctx: SupervisorContext,
}

impl Supervisor {
    pub fn new(env: Env) -> Self {
        let settings = SupervisorSettings::from_env(&env);
        let ctx = SupervisorContext::new(settings.mode.to_string());
        Self { env, settings, ctx }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub fn context(&self) -> &SupervisorContext {
        &self.ctx
    }

    /// Resolve the service command and record the probe trail.
    pub async fn resolve(&self) -> Result<ResolvedCommand, SupervisorError> {
        let env = self.env.clone();
        let resolved = tokio::task::spawn_blocking(move || sidecar_resolver::resolve_from(&env))
            .await
            .map_err(|e| join_err("resolver", e))?;

        match &resolved.executable {
            Some(program) => tracing::info!(
                program = %program,
                args_prefix = ?resolved.args_prefix,
                probes = resolved.probe_results.len(),
                "service command resolved",
            ),
            None => tracing::warn!(
                probes = resolved.probe_results.len(),
                "no runnable service command found",
            ),
        }
        self.ctx.record_probe(resolved.clone()).await;
        Ok(resolved)
    }

    /// Launch the service, then wait for it, forwarding SIGINT/SIGTERM.
    ///
    /// Failures are recorded in the context before returning.
    pub async fn supervise(&self) -> Termination {
        let launched = match self.launch().await {
            Ok(launched) => launched,
            Err(err) => {
                tracing::error!(error = %err, kind = err.kind(), "service launch failed");
                self.ctx.record_failure(&err).await;
                return Termination::Failed(err);
            }
        };

        let reconciler = Reconciler::new(
            &launched.resolved,
            self.settings.reconciler.clone(),
            TokioRunner,
        )
        .map(|reconciler| reconciler.with_env(launched.env.clone()).spawn());

        let termination = self.wait(launched).await;

        if let Some(handle) = reconciler {
            handle.abort();
        }
        termination
    }

    async fn launch(&self) -> Result<Launched, SupervisorError> {
        self.ctx.set_phase(Phase::Launching).await;
        if self.settings.diagnostics_enabled {
            net::log_network_summary();
        }

        let resolved = self.resolve().await?;
        let program = resolved
            .executable
            .clone()
            .ok_or(SupervisorError::Unresolved {
                probes: resolved.probe_results.len(),
            })?;

        let mount = mount_if_configured(&self.env).await;
        self.ctx.record_mount(mount.status.clone()).await;
        let mount = mount.enforce()?;

        let written = self.write_config(mount.status.workspace_dir.clone()).await?;
        tracing::info!(
            path = %written.path.display(),
            source = written.source.label(),
            "service config written",
        );

        let env = self.child_env(&written, &mount.status);
        let child = self.spawn_child(&program, &resolved, &env)?;
        self.ctx.set_phase(Phase::Running).await;

        Ok(Launched {
            child,
            program,
            resolved,
            env,
            mount,
        })
    }

    async fn write_config(&self, workspace: Option<PathBuf>) -> Result<WrittenConfig, SupervisorError> {
        let env = self.env.clone();
        let written = tokio::task::spawn_blocking(move || config::write_config(&env, workspace.as_deref()))
            .await
            .map_err(|e| join_err("config", e))??;
        Ok(written)
    }

    /// The snapshot plus the config path and mounted directories. Shared by
    /// the service and the reconciler's sub-commands.
    fn child_env(&self, written: &WrittenConfig, mount: &MountStatus) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = self
            .env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = written.path.display().to_string();
        env.push((keys::CONFIG_PATH.to_string(), config.clone()));
        env.push((keys::CONFIG_PATH_ALIAS.to_string(), config));
        if let Some(state) = &mount.state_dir {
            env.push((keys::STATE_DIR.to_string(), state.display().to_string()));
        }
        if let Some(workspace) = &mount.workspace_dir {
            env.push((keys::CHILD_WORKSPACE_DIR.to_string(), workspace.display().to_string()));
        }
        env
    }

    fn spawn_child(
        &self,
        program: &str,
        resolved: &ResolvedCommand,
        env: &[(String, String)],
    ) -> Result<Child, SupervisorError> {
        let args = resolved.args_with(self.settings.service_args().as_slice());
        let child = Command::new(program)
            .args(&args)
            .envs(env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::ChildLaunch {
                program: program.to_string(),
                source,
            })?;
        tracing::info!(program = %program, args = ?args, pid = ?child.id(), "service started");
        Ok(child)
    }

    async fn wait(&self, launched: Launched) -> Termination {
        let Launched {
            mut child,
            program,
            mount,
            ..
        } = launched;

        let outcome = wait_forwarding_signals(&mut child).await;

        if let Some(mut helper) = mount.helper {
            helper.terminate().await;
        }

        let (status, forwarded) = match outcome {
            Ok(result) => result,
            Err(err) => {
                let err = io_err(program, err);
                self.ctx.record_failure(&err).await;
                return Termination::Failed(err);
            }
        };

        let code = exit_code(status);
        if let Some(signal) = forwarded {
            tracing::info!(code, signal = %signal, "service stopped after forwarded signal");
        }
        if code == 0 {
            tracing::info!("service exited cleanly");
            self.ctx.record_exit(code).await;
            return Termination::Success;
        }

        let err = SupervisorError::ChildExit { code };
        tracing::error!(code, "service exited abnormally");
        self.ctx.record_failure(&err).await;
        Termination::Failed(err)
    }
}

/// Wait for `child`, relaying SIGINT and SIGTERM to it. Returns the exit
/// status and the last signal forwarded, if any.
async fn wait_forwarding_signals(
    child: &mut Child,
) -> std::io::Result<(ExitStatus, Option<Signal>)> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let pid = child.id();
    let mut forwarded = None;

    loop {
        let relay = tokio::select! {
            status = child.wait() => return status.map(|status| (status, forwarded)),
            _ = sigint.recv() => Signal::SIGINT,
            _ = sigterm.recv() => Signal::SIGTERM,
        };
        match pid.and_then(|pid| i32::try_from(pid).ok()) {
            Some(pid) => match kill(Pid::from_raw(pid), relay) {
                Ok(()) => {
                    tracing::info!(signal = %relay, pid, "forwarded signal to service");
                    forwarded = Some(relay);
                }
                Err(errno) => tracing::warn!(signal = %relay, error = %errno, "signal forward failed"),
            },
            None => tracing::debug!(signal = %relay, "service already reaped"),
        }
    }
}

/// Exit code, or `128 + signal` for a signal death.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

/// Run the host process in the configured mode. Returns the exit code.
pub async fn run(env: Env) -> Result<i32, SupervisorError> {
    let supervisor = Supervisor::new(env);
    let settings = supervisor.settings().clone();
    let ctx = supervisor.context().clone();
    tracing::info!(mode = %settings.mode, "sidecar starting");

    match settings.mode {
        RunMode::Status => {
            status::serve(settings.status, ctx).await?;
            Ok(0)
        }
        RunMode::Probe => {
            supervisor.resolve().await?;
            status::serve(settings.status, ctx).await?;
            Ok(0)
        }
        RunMode::Service => {
            let termination = supervisor.supervise().await;
            if termination.needs_fallback() {
                tracing::warn!(
                    addr = %settings.status.addr(),
                    "service not running, starting fallback status responder",
                );
                status::serve(settings.status, ctx).await?;
            }
            Ok(termination.exit_code())
        }
    }
}

/// Build a multi-threaded runtime and block on [`run`].
pub fn start_blocking(env: Env) -> Result<i32, SupervisorError> {
    init_tracing(&env);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(env))
}

/// `RUST_LOG` filter, default `info`. `SIDECAR_LOG_FORMAT=json` for JSON lines.
pub fn init_tracing(env: &Env) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env
        .get(keys::LOG_FORMAT)
        .is_some_and(|format| format.eq_ignore_ascii_case("json"));
    let _ = if json {
        fmt().json().with_env_filter(filter).with_target(false).try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_deaths_map_to_128_plus_signal() {
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
        assert_eq!(exit_code(ExitStatus::from_raw(15)), 143);
    }

    #[test]
    fn only_failures_need_the_fallback() {
        assert!(!Termination::Success.needs_fallback());
        let failed = Termination::Failed(SupervisorError::ChildExit { code: 137 });
        assert!(failed.needs_fallback());
        assert_eq!(failed.exit_code(), 137);
        assert_eq!(
            Termination::Failed(SupervisorError::Unresolved { probes: 3 }).exit_code(),
            1
        );
    }
}
