use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

/// Keys the sidecar reads; cleared so the host environment cannot leak in.
const SIDECAR_KEYS: &[&str] = &[
    "MOLTBOT_CLI",
    "MOLTBOT_CONFIG_JSON",
    "CLAWDBOT_CONFIG_PATH",
    "CLAWDBOT_GATEWAY_BIND",
    "MOLTBOT_GATEWAY_BIND",
    "CLAWDBOT_GATEWAY_TOKEN",
    "CLAWDBOT_GATEWAY_PASSWORD",
    "MOLTBOT_GATEWAY_AUTH_MODE",
    "MOLTBOT_WORKSPACE_DIR",
    "CLAWDBOT_WORKSPACE_DIR",
    "CLAWDBOT_GATEWAY_PORT",
    "MOLTBOT_GATEWAY_PORT",
    "CONTAINER_PORT",
    "PORT",
];

fn sidecar_cmd(sandbox: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("sidecar"));
    for key in SIDECAR_KEYS {
        cmd.env_remove(key);
    }
    cmd.env("CLAWDBOT_CONFIG_PATH", sandbox.join("cfg/moltbot.json"))
        .env("NO_COLOR", "1");
    cmd
}

fn fake_cli(dir: &Path) -> PathBuf {
    let path = dir.join("moltbot");
    let staging = dir.join("moltbot.partial");
    fs::write(
        &staging,
        "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo 2026.1.0; exit 0; fi\nexit 1\n",
    )
    .expect("write cli");
    fs::set_permissions(&staging, fs::Permissions::from_mode(0o755)).expect("chmod");
    fs::rename(&staging, &path).expect("install cli");
    path
}

fn empty_path(dir: &Path) -> PathBuf {
    let bin = dir.join("bin");
    fs::create_dir_all(&bin).expect("bin dir");
    bin
}

#[test]
fn config_prints_loopback_document_without_credential() {
    let sandbox = TempDir::new().expect("sandbox");
    let output = sidecar_cmd(sandbox.path())
        .env("CLAWDBOT_GATEWAY_BIND", "loopback")
        .env("PORT", "19001")
        .arg("config")
        .output()
        .expect("run sidecar config");
    assert!(output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).expect("config json");
    assert_eq!(doc["gateway"]["bind"], "loopback");
    assert_eq!(doc["gateway"]["port"], 19001);
    assert_eq!(doc["gateway"]["auth"]["mode"], "token");
    assert!(doc["gateway"]["auth"].get("token").is_none());
    assert!(!sandbox.path().join("cfg/moltbot.json").exists(), "print only");
}

#[test]
fn config_refuses_lan_bind_without_token() {
    let sandbox = TempDir::new().expect("sandbox");
    sidecar_cmd(sandbox.path())
        .env("CLAWDBOT_GATEWAY_BIND", "lan")
        .args(["config", "--write"])
        .assert()
        .failure()
        .stderr(contains("CLAWDBOT_GATEWAY_TOKEN"));
    assert!(!sandbox.path().join("cfg/moltbot.json").exists());
}

#[test]
fn config_write_persists_document() {
    let sandbox = TempDir::new().expect("sandbox");
    sidecar_cmd(sandbox.path())
        .env("CLAWDBOT_GATEWAY_BIND", "lan")
        .env("CLAWDBOT_GATEWAY_TOKEN", "s3cret")
        .args(["config", "--write"])
        .assert()
        .success()
        .stdout(contains("wrote synthesized config"));

    let written = fs::read_to_string(sandbox.path().join("cfg/moltbot.json")).expect("written");
    let doc: serde_json::Value = serde_json::from_str(&written).expect("json");
    assert_eq!(doc["gateway"]["auth"]["token"], "s3cret");
}

#[test]
fn probe_json_reports_override() {
    let sandbox = TempDir::new().expect("sandbox");
    let cli = fake_cli(sandbox.path());
    let output = sidecar_cmd(sandbox.path())
        .env("PATH", empty_path(sandbox.path()))
        .env("MOLTBOT_CLI", &cli)
        .args(["probe", "--json"])
        .output()
        .expect("run sidecar probe");
    assert!(output.status.success());

    let resolved: serde_json::Value = serde_json::from_slice(&output.stdout).expect("probe json");
    assert_eq!(resolved["executable"], cli.display().to_string());
    assert_eq!(resolved["probeResults"].as_array().map(Vec::len), Some(1));
    assert_eq!(resolved["probeResults"][0]["stdout"], "2026.1.0\n");
}

#[test]
fn probe_table_fails_when_nothing_resolves() {
    let sandbox = TempDir::new().expect("sandbox");
    sidecar_cmd(sandbox.path())
        .env("PATH", empty_path(sandbox.path()))
        .env("MOLTBOT_CLI", sandbox.path().join("missing"))
        .arg("probe")
        .assert()
        .failure()
        .stdout(contains("failed"))
        .stderr(contains("no runnable service command found").and(contains("candidates probed")));
}
