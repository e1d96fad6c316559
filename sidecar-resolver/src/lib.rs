//! Command resolution for `sidecar-resolver`.
//!
//! `resolve_with(plan)` decides how to invoke the supervised service. Strategies
//! are tried in strict priority order and every candidate is probed with
//! `--version`:
//!
//! 1. explicit override (`MOLTBOT_CLI`)
//! 2. well-known command names on `PATH`
//! 3. the same names under the package manager's global bin directory
//! 4. the package entry file under the global module root, run through the interpreter
//! 5. `bin` entries declared in discovered package manifests, run through the interpreter
//!
//! Probe failures are recorded, never raised. When nothing is viable the
//! result carries `executable: None` and the full probe trail.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;
use serde_json::Value;
use sidecar_core::paths::keys;
use sidecar_core::{Env, ProbeResult, ResolvedCommand};
use thiserror::Error;

pub const VERSION_ARG: &str = "--version";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Which strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Override,
    PathName,
    GlobalBin,
    PackageEntry,
    ManifestBin,
}

/// One invocation to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub strategy: Strategy,
    pub program: String,
    pub args_prefix: Vec<String>,
}

impl Candidate {
    fn direct(strategy: Strategy, program: impl Into<String>) -> Self {
        Self {
            strategy,
            program: program.into(),
            args_prefix: Vec::new(),
        }
    }

    fn interpreted(strategy: Strategy, interpreter: &str, script: &Path) -> Self {
        Self {
            strategy,
            program: interpreter.to_string(),
            args_prefix: vec![script.display().to_string()],
        }
    }

    /// Display form used in the probe trail.
    pub fn label(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args_prefix.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Inputs for resolution. [`ResolverPlan::from_env`] fills the package
/// manager directories by asking `npm`; tests construct plans directly.
#[derive(Debug, Clone)]
pub struct ResolverPlan {
    pub explicit: Option<String>,
    pub command_names: Vec<String>,
    pub global_bin: Option<PathBuf>,
    pub global_root: Option<PathBuf>,
    pub interpreter: String,
    pub entry_package: String,
    pub entry_file: String,
    pub manifest_packages: Vec<String>,
    pub preferred_bin_keys: Vec<String>,
    /// `PATH` handed to probes. `None` inherits the process environment.
    pub search_path: Option<String>,
}

impl Default for ResolverPlan {
    fn default() -> Self {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            explicit: None,
            command_names: names(&["moltbot", "clawdbot", "clawd"]),
            global_bin: None,
            global_root: None,
            interpreter: "node".to_string(),
            entry_package: "moltbot".to_string(),
            entry_file: "moltbot.mjs".to_string(),
            manifest_packages: names(&["moltbot", "clawdbot", "@moltbot/cli", "@clawdbot/cli"]),
            preferred_bin_keys: names(&["moltbot", "clawdbot", "clawd"]),
            search_path: None,
        }
    }
}

impl ResolverPlan {
    /// Default plan with the override and `PATH` from `env` and the package
    /// manager directories discovered through `npm`.
    pub fn from_env(env: &Env) -> Self {
        let search_path = env.get("PATH").map(str::to_string);
        let global_bin = npm_global_bin(search_path.as_deref());
        let global_root = npm_query(&["root", "-g"], search_path.as_deref()).map(PathBuf::from);
        Self {
            explicit: env.get(keys::CLI_OVERRIDE).map(str::to_string),
            global_bin,
            global_root,
            search_path,
            ..Self::default()
        }
    }
}

/// Errors reading a package manifest. Logged and skipped during resolution.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Resolve against the current process environment.
pub fn resolve() -> ResolvedCommand {
    resolve_from(&Env::from_process())
}

pub fn resolve_from(env: &Env) -> ResolvedCommand {
    resolve_with(&ResolverPlan::from_env(env))
}

/// Probe candidates in priority order and stop at the first viable one.
pub fn resolve_with(plan: &ResolverPlan) -> ResolvedCommand {
    let mut resolved = ResolvedCommand {
        global_bin: plan.global_bin.clone(),
        global_root: plan.global_root.clone(),
        search_path: plan.search_path.clone(),
        ..ResolvedCommand::default()
    };

    for candidate in candidates(plan) {
        let probe = probe(&candidate, plan.search_path.as_deref());
        let ok = probe.succeeded;
        tracing::debug!(
            candidate = %probe.candidate,
            strategy = ?candidate.strategy,
            ok,
            "probed service command",
        );
        resolved.probe_results.push(probe);
        if ok {
            resolved.executable = Some(candidate.program);
            resolved.args_prefix = candidate.args_prefix;
            return resolved;
        }
    }

    resolved
}

/// Every candidate the plan yields, in priority order, without duplicates.
///
/// Strategies 4 and 5 only yield candidates whose script exists on disk.
pub fn candidates(plan: &ResolverPlan) -> Vec<Candidate> {
    let mut list = Vec::new();

    if let Some(explicit) = &plan.explicit {
        list.push(Candidate::direct(Strategy::Override, explicit.clone()));
    }

    for name in &plan.command_names {
        list.push(Candidate::direct(Strategy::PathName, name.clone()));
    }

    if let Some(bin) = &plan.global_bin {
        for name in &plan.command_names {
            let path = bin.join(name);
            list.push(Candidate::direct(Strategy::GlobalBin, path.display().to_string()));
        }
    }

    if let Some(root) = &plan.global_root {
        let entry = root.join(&plan.entry_package).join(&plan.entry_file);
        if entry.is_file() {
            list.push(Candidate::interpreted(Strategy::PackageEntry, &plan.interpreter, &entry));
        }

        for package in &plan.manifest_packages {
            match manifest_bin(root, package, &plan.preferred_bin_keys) {
                Ok(Some(script)) if script.is_file() => list.push(Candidate::interpreted(
                    Strategy::ManifestBin,
                    &plan.interpreter,
                    &script,
                )),
                Ok(_) => {}
                Err(err) => tracing::debug!(package, error = %err, "skipping package manifest"),
            }
        }
    }

    let mut seen = HashSet::new();
    list.retain(|candidate| seen.insert(candidate.label()));
    list
}

/// Script path declared by `<root>/<package>/package.json`.
///
/// A string `bin` is used as-is. A map `bin` prefers `preferred_keys` in
/// order, else the first declared key. Non-string entries are skipped. `Ok(None)` when the package or its
/// `bin` is absent.
pub fn manifest_bin(
    root: &Path,
    package: &str,
    preferred_keys: &[String],
) -> Result<Option<PathBuf>, ManifestError> {
    let package_dir = root.join(package);
    let manifest_path = package_dir.join("package.json");
    if !manifest_path.is_file() {
        return Ok(None);
    }

    let content = fs::read_to_string(&manifest_path).map_err(|source| ManifestError::Io {
        path: manifest_path.clone(),
        source,
    })?;
    let manifest: PackageManifest =
        serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
            path: manifest_path.clone(),
            source,
        })?;

    let relative = match manifest.bin {
        Some(Value::String(bin)) => Some(bin),
        Some(Value::Object(map)) => preferred_keys
            .iter()
            .find_map(|key| map.get(key).and_then(Value::as_str))
            .or_else(|| map.values().find_map(Value::as_str))
            .map(str::to_string),
        _ => None,
    };

    Ok(relative.map(|bin| package_dir.join(bin)))
}

/// Run `<candidate> --version` and capture the outcome.
pub fn probe(candidate: &Candidate, search_path: Option<&str>) -> ProbeResult {
    let mut command = Command::new(&candidate.program);
    command
        .args(&candidate.args_prefix)
        .arg(VERSION_ARG)
        .stdin(Stdio::null());
    if let Some(path) = search_path {
        command.env("PATH", path);
    }

    match command.output() {
        Ok(output) => ProbeResult {
            candidate: candidate.label(),
            succeeded: output.status.success(),
            exit_status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            error: None,
        },
        Err(err) => ProbeResult {
            candidate: candidate.label(),
            succeeded: false,
            exit_status: None,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(err.to_string()),
        },
    }
}

// ---------------------------------------------------------------------------
// Package manager lookups
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    bin: Option<Value>,
}

/// `npm bin -g` was removed in npm 9; fall back to `<npm prefix -g>/bin`.
fn npm_global_bin(search_path: Option<&str>) -> Option<PathBuf> {
    npm_query(&["bin", "-g"], search_path)
        .map(PathBuf::from)
        .or_else(|| npm_query(&["prefix", "-g"], search_path).map(|p| PathBuf::from(p).join("bin")))
}

fn npm_query(args: &[&str], search_path: Option<&str>) -> Option<String> {
    let mut command = Command::new("npm");
    command.args(args).stdin(Stdio::null());
    if let Some(path) = search_path {
        command.env("PATH", path);
    }

    match command.output() {
        Ok(output) if output.status.success() => {
            let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
            (!value.is_empty()).then_some(value)
        }
        Ok(output) => {
            tracing::debug!(
                args = ?args,
                status = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "npm lookup failed",
            );
            None
        }
        Err(err) => {
            tracing::debug!(args = ?args, error = %err, "npm unavailable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_label_joins_prefix() {
        let c = Candidate::interpreted(Strategy::PackageEntry, "node", Path::new("/g/m.mjs"));
        assert_eq!(c.label(), "node /g/m.mjs");
    }

    #[test]
    fn duplicate_candidates_are_probed_once() {
        let plan = ResolverPlan {
            explicit: Some("moltbot".into()),
            ..ResolverPlan::default()
        };
        let labels: Vec<String> = candidates(&plan).iter().map(Candidate::label).collect();
        assert_eq!(labels, vec!["moltbot", "clawdbot", "clawd"]);
        assert_eq!(candidates(&plan)[0].strategy, Strategy::Override);
    }

    #[test]
    fn missing_global_dirs_yield_only_named_candidates() {
        let plan = ResolverPlan::default();
        assert!(candidates(&plan)
            .iter()
            .all(|c| c.strategy == Strategy::PathName));
    }
}
