use std::fmt;
use std::time::Duration;

use sidecar_core::env::parse_positive;
use sidecar_core::paths::{keys, DEFAULT_AUTO_APPROVE_INTERVAL, DEFAULT_PORT, DEFAULT_STATUS_BIND};
use sidecar_core::Env;

use crate::net;

/// What the host process does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Status responder only.
    #[default]
    Status,
    /// Resolve the command, record the probe trail, serve status.
    Probe,
    /// Full supervision of the service.
    Service,
}

impl RunMode {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("service") | Some("moltbot") => RunMode::Service,
            Some("probe") => RunMode::Probe,
            _ => RunMode::Status,
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Status => write!(f, "status"),
            RunMode::Probe => write!(f, "probe"),
            RunMode::Service => write!(f, "service"),
        }
    }
}

/// Fallback status responder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSettings {
    pub host: String,
    pub port: u16,
    pub message: String,
    pub version: String,
}

impl StatusSettings {
    pub fn from_env(env: &Env) -> Self {
        Self {
            host: env
                .get(keys::CONTAINER_BIND)
                .unwrap_or(DEFAULT_STATUS_BIND)
                .to_string(),
            port: parse_positive(env.first(&[keys::PORT, keys::CONTAINER_PORT]))
                .unwrap_or(DEFAULT_PORT),
            message: env
                .get(keys::CONTAINER_STATUS_MESSAGE)
                .unwrap_or("ok")
                .to_string(),
            version: env.get(keys::CONTAINER_VERSION).unwrap_or("dev").to_string(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Auto-approval reconciler settings.
#[derive(Clone, PartialEq, Eq)]
pub struct ReconcilerSettings {
    pub enabled: bool,
    /// Enabled through the deprecated `CLAWDBOT_AUTO_APPROVE_NODES` key.
    pub legacy_key: bool,
    pub interval: Duration,
    pub gateway_url: String,
    pub token: Option<String>,
}

impl ReconcilerSettings {
    pub fn from_env(env: &Env) -> Self {
        let explicit = env.get(keys::AUTO_APPROVE_DEVICES);
        let legacy = env.get(keys::AUTO_APPROVE_NODES);
        let enabled = explicit
            .or(legacy)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self {
            enabled,
            legacy_key: explicit.is_none() && legacy.is_some(),
            interval: parse_positive(env.get(keys::AUTO_APPROVE_INTERVAL_MS))
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_AUTO_APPROVE_INTERVAL),
            gateway_url: net::gateway_url(env),
            token: env.get(keys::GATEWAY_TOKEN).map(str::to_string),
        }
    }

    /// `--url <u> [--token <t>]`
    pub fn connection_args(&self) -> Vec<String> {
        let mut args = vec!["--url".to_string(), self.gateway_url.clone()];
        if let Some(token) = &self.token {
            args.push("--token".to_string());
            args.push(token.clone());
        }
        args
    }
}

impl fmt::Debug for ReconcilerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconcilerSettings")
            .field("enabled", &self.enabled)
            .field("interval", &self.interval)
            .field("gateway_url", &self.gateway_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Everything the host process needs, read once from the environment.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub mode: RunMode,
    pub status: StatusSettings,
    pub reconciler: ReconcilerSettings,
    pub verbose: bool,
    pub allow_unconfigured: bool,
    pub diagnostics_enabled: bool,
}

impl SupervisorSettings {
    pub fn from_env(env: &Env) -> Self {
        Self {
            mode: RunMode::parse(env.get(keys::CONTAINER_MODE)),
            status: StatusSettings::from_env(env),
            reconciler: ReconcilerSettings::from_env(env),
            verbose: env.flag(keys::GATEWAY_VERBOSE),
            allow_unconfigured: env.flag(keys::ALLOW_UNCONFIGURED),
            diagnostics_enabled: env.flag(keys::DIAGNOSTICS_ENABLED),
        }
    }

    /// `gateway [--verbose] [--allow-unconfigured]`
    pub fn service_args(&self) -> Vec<&'static str> {
        let mut args = vec!["gateway"];
        if self.verbose {
            args.push("--verbose");
        }
        if self.allow_unconfigured {
            args.push("--allow-unconfigured");
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_aliases() {
        assert_eq!(RunMode::parse(Some("MOLTBOT")), RunMode::Service);
        assert_eq!(RunMode::parse(Some("service")), RunMode::Service);
        assert_eq!(RunMode::parse(Some("probe")), RunMode::Probe);
        assert_eq!(RunMode::parse(Some("anything")), RunMode::Status);
        assert_eq!(RunMode::parse(None), RunMode::Status);
    }

    #[test]
    fn reconciler_defaults_and_legacy_key() {
        let off = ReconcilerSettings::from_env(&Env::default());
        assert!(!off.enabled);
        assert_eq!(off.interval, Duration::from_millis(4000));

        let legacy = ReconcilerSettings::from_env(&Env::from_pairs([
            ("CLAWDBOT_AUTO_APPROVE_NODES", "true"),
            ("CLAWDBOT_AUTO_APPROVE_INTERVAL_MS", "-5"),
        ]));
        assert!(legacy.enabled && legacy.legacy_key);
        assert_eq!(legacy.interval, Duration::from_millis(4000));

        let explicit_off = ReconcilerSettings::from_env(&Env::from_pairs([
            ("CLAWDBOT_AUTO_APPROVE_DEVICES", "false"),
            ("CLAWDBOT_AUTO_APPROVE_NODES", "true"),
        ]));
        assert!(!explicit_off.enabled);
    }

    #[test]
    fn connection_args_include_token_only_when_set() {
        let mut settings = ReconcilerSettings::from_env(&Env::from_pairs([(
            "CLAWDBOT_GATEWAY_URL",
            "ws://10.0.0.2:18789",
        )]));
        assert_eq!(settings.connection_args(), vec!["--url", "ws://10.0.0.2:18789"]);
        settings.token = Some("t0k".into());
        assert_eq!(
            settings.connection_args(),
            vec!["--url", "ws://10.0.0.2:18789", "--token", "t0k"]
        );
        assert!(!format!("{settings:?}").contains("t0k"));
    }

    #[test]
    fn service_args_follow_flags() {
        let settings = SupervisorSettings::from_env(&Env::from_pairs([
            ("MOLTBOT_GATEWAY_VERBOSE", "true"),
            ("MOLTBOT_ALLOW_UNCONFIGURED", "true"),
        ]));
        assert_eq!(
            settings.service_args(),
            vec!["gateway", "--verbose", "--allow-unconfigured"]
        );
    }

    #[test]
    fn status_port_prefers_port_over_container_port() {
        let both = StatusSettings::from_env(&Env::from_pairs([
            ("PORT", "8080"),
            ("CONTAINER_PORT", "9090"),
        ]));
        assert_eq!(both.port, 8080);

        let container = StatusSettings::from_env(&Env::from_pairs([("CONTAINER_PORT", "9090")]));
        assert_eq!(container.port, 9090);

        let defaulted = StatusSettings::from_env(&Env::from_pairs([("PORT", "0")]));
        assert_eq!(defaulted.port, 18789);
        assert_eq!(defaulted.addr(), "0.0.0.0:18789");
    }
}
