//! Signal relay to the supervised service.
//!
//! Kept in its own test binary: the test signals its own process, which every
//! other supervisor running in the same process would also relay.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use sidecar_core::{Env, Phase};
use sidecar_supervisor::{Supervisor, SupervisorError, Termination};
use tempfile::TempDir;
use tokio::signal::unix::{signal, SignalKind};

/// Service that records startup, exits 143 on SIGTERM and otherwise idles.
fn trapping_cli(dir: &Path, calls: &Path) -> PathBuf {
    let path = dir.join("moltbot");
    let staging = dir.join("moltbot.partial");
    let body = format!(
        "#!/bin/sh\n\
         if [ \"$1\" = \"--version\" ]; then echo 2026.1.0; exit 0; fi\n\
         trap 'echo forwarded >> {calls}; exit 143' TERM\n\
         echo running >> {calls}\n\
         while true; do sleep 0.1; done\n",
        calls = calls.display(),
    );
    fs::write(&staging, body).expect("write cli");
    fs::set_permissions(&staging, fs::Permissions::from_mode(0o755)).expect("chmod");
    fs::rename(&staging, &path).expect("install cli");
    path
}

async fn wait_for(path: &Path, needle: &str) {
    for _ in 0..200 {
        if fs::read_to_string(path).unwrap_or_default().contains(needle) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{needle} never appeared in {}", path.display());
}

#[tokio::test]
async fn sigterm_is_relayed_and_the_nonzero_exit_needs_fallback() {
    // Replaces the default disposition so early deliveries cannot kill the
    // test before the supervisor starts listening.
    let _own = signal(SignalKind::terminate()).expect("sigterm listener");

    let dir = TempDir::new().expect("tempdir");
    fs::create_dir(dir.path().join("bin")).expect("empty PATH dir");
    let calls = dir.path().join("calls");
    let cli = trapping_cli(dir.path(), &calls);

    let mut env = Env::from_pairs([
        ("CONTAINER_MODE", "service"),
        ("CLAWDBOT_GATEWAY_BIND", "loopback"),
    ]);
    env.set("PATH", dir.path().join("bin").display().to_string());
    env.set("MOLTBOT_CLI", cli.display().to_string());
    env.set(
        "CLAWDBOT_CONFIG_PATH",
        dir.path().join("cfg/moltbot.json").display().to_string(),
    );

    let supervisor = Supervisor::new(env);
    let ctx = supervisor.context().clone();
    let mut task = tokio::spawn(async move { supervisor.supervise().await });
    wait_for(&calls, "running").await;

    let me = Pid::from_raw(i32::try_from(std::process::id()).expect("pid fits i32"));
    // Repeat until the relay is listening; the service exits on the first one.
    let termination = loop {
        kill(me, Signal::SIGTERM).expect("signal self");
        tokio::select! {
            joined = &mut task => break joined.expect("supervisor task"),
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
    };

    assert!(fs::read_to_string(&calls).expect("calls").contains("forwarded"));
    assert!(termination.needs_fallback());
    assert_eq!(termination.exit_code(), 143);
    assert!(matches!(
        termination,
        Termination::Failed(SupervisorError::ChildExit { code: 143 })
    ));

    let diag = ctx.snapshot().await;
    assert_eq!(diag.phase, Phase::Failed);
    assert_eq!(diag.last_exit_code, Some(143));
    assert_eq!(diag.start_error.expect("start error").kind, "child_exit");
}
