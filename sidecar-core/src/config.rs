//! Service configuration synthesis.
//!
//! ## Pipeline
//!
//! 1. [`synthesize`] reads bind/port/auth/workspace from an [`Env`], or takes a
//!    pre-built document verbatim from `MOLTBOT_CONFIG_JSON`.
//! 2. [`ServiceConfig::new`] enforces the credential invariant for
//!    non-loopback binds.
//! 3. [`persist`] writes the rendered JSON atomically (`<path>.tmp` + rename),
//!    creating parent directories as needed.
//!
//! The rendered document has a fixed key order:
//!
//! ```json
//! {
//!   "gateway": { "mode": "local", "bind": "lan", "port": 18789,
//!                "auth": { "mode": "token", "token": "…" } },
//!   "agents": { "defaults": { "workspace": "/mnt/s3/workspace" } }
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::env::{parse_positive, Env};
use crate::error::{io_err, ConfigError};
use crate::paths::{keys, DEFAULT_CONFIG_PATH, DEFAULT_PORT};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which addresses the service listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    Loopback,
    #[default]
    Lan,
}

impl BindMode {
    /// `"loopback"` selects loopback; every other value is treated as a
    /// routable bind so the credential check still applies.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("loopback") => BindMode::Loopback,
            _ => BindMode::Lan,
        }
    }

    pub fn is_loopback(self) -> bool {
        self == BindMode::Loopback
    }
}

impl fmt::Display for BindMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindMode::Loopback => write!(f, "loopback"),
            BindMode::Lan => write!(f, "lan"),
        }
    }
}

/// How clients authenticate against the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Token,
    Password,
}

impl AuthMode {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("password") => AuthMode::Password,
            _ => AuthMode::Token,
        }
    }

    /// Environment variable carrying the credential for this mode.
    pub fn credential_key(self) -> &'static str {
        match self {
            AuthMode::Token => keys::GATEWAY_TOKEN,
            AuthMode::Password => keys::GATEWAY_PASSWORD,
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Token => write!(f, "token"),
            AuthMode::Password => write!(f, "password"),
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayAuth {
    pub mode: AuthMode,
    pub credential: Option<String>,
}

/// Validated in-memory service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    bind: BindMode,
    port: u16,
    auth: GatewayAuth,
    workspace: Option<PathBuf>,
}

impl ServiceConfig {
    /// Build a config, rejecting a routable bind without a credential.
    pub fn new(
        bind: BindMode,
        port: u16,
        auth: GatewayAuth,
        workspace: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let has_credential = auth.credential.as_deref().is_some_and(|c| !c.is_empty());
        if !bind.is_loopback() && !has_credential {
            return Err(ConfigError::MissingCredential {
                mode: auth.mode,
                variable: auth.mode.credential_key(),
            });
        }
        Ok(Self {
            bind,
            port,
            auth,
            workspace,
        })
    }

    /// Read every input from `env`.
    ///
    /// `published_workspace` (from a confirmed storage mount) wins over the
    /// workspace environment variables.
    pub fn from_env(env: &Env, published_workspace: Option<&Path>) -> Result<Self, ConfigError> {
        let mode = AuthMode::parse(env.get(keys::GATEWAY_AUTH_MODE));
        let auth = GatewayAuth {
            mode,
            credential: env.get(mode.credential_key()).map(str::to_string),
        };
        let workspace = published_workspace
            .map(Path::to_path_buf)
            .or_else(|| env.first(&keys::WORKSPACE_DIR).map(PathBuf::from));
        Self::new(bind_mode(env), gateway_port(env), auth, workspace)
    }

    pub fn bind(&self) -> BindMode {
        self.bind
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn auth(&self) -> &GatewayAuth {
        &self.auth
    }

    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }

    /// Canonical pretty-printed JSON document.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        let credential = self.auth.credential.as_deref();
        let document = ConfigDocument {
            gateway: GatewayDocument {
                mode: "local",
                bind: self.bind,
                port: self.port,
                auth: AuthDocument {
                    mode: self.auth.mode,
                    token: credential.filter(|_| self.auth.mode == AuthMode::Token),
                    password: credential.filter(|_| self.auth.mode == AuthMode::Password),
                },
            },
            agents: self.workspace.as_deref().map(|workspace| AgentsDocument {
                defaults: AgentDefaults { workspace },
            }),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }
}

#[derive(Serialize)]
struct ConfigDocument<'a> {
    gateway: GatewayDocument<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    agents: Option<AgentsDocument<'a>>,
}

#[derive(Serialize)]
struct GatewayDocument<'a> {
    mode: &'static str,
    bind: BindMode,
    port: u16,
    auth: AuthDocument<'a>,
}

#[derive(Serialize)]
struct AuthDocument<'a> {
    mode: AuthMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
}

#[derive(Serialize)]
struct AgentsDocument<'a> {
    defaults: AgentDefaults<'a>,
}

#[derive(Serialize)]
struct AgentDefaults<'a> {
    workspace: &'a Path,
}

// ---------------------------------------------------------------------------
// Synthesis and persistence
// ---------------------------------------------------------------------------

/// Where the config body came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Synthesized(ServiceConfig),
    /// `MOLTBOT_CONFIG_JSON`, written verbatim.
    Raw(String),
}

impl ConfigSource {
    pub fn body(&self) -> Result<String, ConfigError> {
        match self {
            ConfigSource::Synthesized(config) => config.to_json(),
            ConfigSource::Raw(raw) => Ok(raw.clone()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfigSource::Synthesized(_) => "synthesized",
            ConfigSource::Raw(_) => "raw",
        }
    }
}

/// A config document that has been persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenConfig {
    pub path: PathBuf,
    pub source: ConfigSource,
}

/// Resolve the config body: the pre-built document if supplied, else synthesis.
pub fn synthesize(env: &Env, published_workspace: Option<&Path>) -> Result<ConfigSource, ConfigError> {
    if let Some(raw) = env.get(keys::CONFIG_JSON) {
        serde_json::from_str::<serde_json::Value>(raw).map_err(ConfigError::InvalidRawConfig)?;
        return Ok(ConfigSource::Raw(raw.to_string()));
    }
    ServiceConfig::from_env(env, published_workspace).map(ConfigSource::Synthesized)
}

/// Synthesize and persist to [`config_path`]. Nothing is written on error.
pub fn write_config(env: &Env, published_workspace: Option<&Path>) -> Result<WrittenConfig, ConfigError> {
    let source = synthesize(env, published_workspace)?;
    let path = config_path(env);
    persist(&path, &source.body()?)?;
    Ok(WrittenConfig { path, source })
}

/// Atomically write `body` to `path`, creating parent directories.
pub fn persist(path: &Path, body: &str) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    let tmp = PathBuf::from(format!("{}.tmp", path.display()));
    std::fs::write(&tmp, body).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

pub fn config_path(env: &Env) -> PathBuf {
    PathBuf::from(env.get(keys::CONFIG_PATH).unwrap_or(DEFAULT_CONFIG_PATH))
}

pub fn bind_mode(env: &Env) -> BindMode {
    BindMode::parse(env.first(&keys::GATEWAY_BIND))
}

/// First port variable that is set wins; an invalid value falls back to the default.
pub fn gateway_port(env: &Env) -> u16 {
    parse_positive(env.first(&keys::GATEWAY_PORT)).unwrap_or(DEFAULT_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(mode: AuthMode, credential: Option<&str>) -> GatewayAuth {
        GatewayAuth {
            mode,
            credential: credential.map(str::to_string),
        }
    }

    #[test]
    fn empty_credential_counts_as_missing() {
        let err = ServiceConfig::new(BindMode::Lan, 1, auth(AuthMode::Token, Some("")), None)
            .expect_err("empty token on lan");
        assert!(matches!(
            err,
            ConfigError::MissingCredential {
                mode: AuthMode::Token,
                variable: "CLAWDBOT_GATEWAY_TOKEN"
            }
        ));
    }

    #[test]
    fn password_mode_omits_token_key() {
        let config = ServiceConfig::new(
            BindMode::Lan,
            9000,
            auth(AuthMode::Password, Some("hunter2")),
            None,
        )
        .expect("valid");
        let value: serde_json::Value =
            serde_json::from_str(&config.to_json().expect("json")).expect("parse");
        assert_eq!(value["gateway"]["auth"]["mode"], "password");
        assert_eq!(value["gateway"]["auth"]["password"], "hunter2");
        assert!(value["gateway"]["auth"].get("token").is_none());
        assert!(value.get("agents").is_none());
    }

    #[test]
    fn rendered_keys_keep_declaration_order() {
        let config = ServiceConfig::new(
            BindMode::Loopback,
            18789,
            auth(AuthMode::Token, Some("t")),
            Some(PathBuf::from("/ws")),
        )
        .expect("valid");
        let json = config.to_json().expect("json");
        let positions: Vec<usize> = ["\"mode\"", "\"bind\"", "\"port\"", "\"auth\"", "\"agents\""]
            .iter()
            .map(|key| json.find(key).expect("key present"))
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted, "keys out of order in:\n{json}");
    }

    #[test]
    fn unknown_bind_value_is_treated_as_routable() {
        assert_eq!(BindMode::parse(Some("auto")), BindMode::Lan);
        assert_eq!(BindMode::parse(Some("LOOPBACK")), BindMode::Loopback);
        assert_eq!(BindMode::parse(None), BindMode::Lan);
    }
}
