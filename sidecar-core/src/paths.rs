//! Defaults and environment keys shared by every sidecar crate.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 18789;
pub const DEFAULT_CONFIG_PATH: &str = "/root/.clawdbot/moltbot.json";
pub const DEFAULT_STATUS_BIND: &str = "0.0.0.0";
pub const DEFAULT_AUTO_APPROVE_INTERVAL: Duration = Duration::from_millis(4000);

pub const DEFAULT_MOUNT_POINT: &str = "/mnt/s3";
pub const DEFAULT_MOUNT_HELPER: &str = "tigrisfs";
pub const MOUNT_TABLE: &str = "/proc/mounts";
pub const MOUNT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const MOUNT_POLL_ATTEMPTS: u32 = 20;
pub const STATE_SUBDIR: &str = "state";
pub const WORKSPACE_SUBDIR: &str = "workspace";

/// Environment keys, grouped by the component that reads them.
pub mod keys {
    pub const CONTAINER_MODE: &str = "CONTAINER_MODE";
    pub const CONTAINER_STATUS_MESSAGE: &str = "CONTAINER_STATUS_MESSAGE";
    pub const CONTAINER_VERSION: &str = "CONTAINER_VERSION";
    pub const CONTAINER_PORT: &str = "CONTAINER_PORT";
    pub const CONTAINER_BIND: &str = "CONTAINER_BIND";
    pub const PORT: &str = "PORT";
    pub const DIAGNOSTICS_ENABLED: &str = "DIAGNOSTICS_ENABLED";

    pub const CLI_OVERRIDE: &str = "MOLTBOT_CLI";

    pub const GATEWAY_PORT: [&str; 4] = [
        "CLAWDBOT_GATEWAY_PORT",
        "MOLTBOT_GATEWAY_PORT",
        CONTAINER_PORT,
        PORT,
    ];
    pub const GATEWAY_BIND: [&str; 2] = ["CLAWDBOT_GATEWAY_BIND", "MOLTBOT_GATEWAY_BIND"];
    pub const GATEWAY_URL: [&str; 2] = ["CLAWDBOT_GATEWAY_URL", "MOLTBOT_GATEWAY_URL"];
    pub const GATEWAY_AUTH_MODE: &str = "MOLTBOT_GATEWAY_AUTH_MODE";
    pub const GATEWAY_TOKEN: &str = "CLAWDBOT_GATEWAY_TOKEN";
    pub const GATEWAY_PASSWORD: &str = "CLAWDBOT_GATEWAY_PASSWORD";
    pub const GATEWAY_VERBOSE: &str = "MOLTBOT_GATEWAY_VERBOSE";
    pub const ALLOW_UNCONFIGURED: &str = "MOLTBOT_ALLOW_UNCONFIGURED";

    pub const CONFIG_JSON: &str = "MOLTBOT_CONFIG_JSON";
    pub const CONFIG_PATH: &str = "CLAWDBOT_CONFIG_PATH";
    pub const CONFIG_PATH_ALIAS: &str = "MOLTBOT_CONFIG_PATH";
    pub const WORKSPACE_DIR: [&str; 2] = ["MOLTBOT_WORKSPACE_DIR", "CLAWDBOT_WORKSPACE_DIR"];
    pub const STATE_DIR: &str = "CLAWDBOT_STATE_DIR";
    pub const CHILD_WORKSPACE_DIR: &str = "CLAWDBOT_WORKSPACE_DIR";

    pub const AUTO_APPROVE_DEVICES: &str = "CLAWDBOT_AUTO_APPROVE_DEVICES";
    pub const AUTO_APPROVE_NODES: &str = "CLAWDBOT_AUTO_APPROVE_NODES";
    pub const AUTO_APPROVE_INTERVAL_MS: &str = "CLAWDBOT_AUTO_APPROVE_INTERVAL_MS";

    pub const S3_ENDPOINT: &str = "S3_ENDPOINT";
    pub const S3_BUCKET: &str = "S3_BUCKET";
    pub const S3_ACCESS_KEY_ID: &str = "S3_ACCESS_KEY_ID";
    pub const S3_SECRET_ACCESS_KEY: &str = "S3_SECRET_ACCESS_KEY";
    pub const S3_REGION: &str = "S3_REGION";
    pub const S3_PATH_STYLE: &str = "S3_PATH_STYLE";
    pub const S3_PREFIX: &str = "S3_PREFIX";
    pub const S3_MOUNT_POINT: &str = "S3_MOUNT_POINT";
    pub const S3_MOUNT_REQUIRED: &str = "S3_MOUNT_REQUIRED";
    pub const S3_MOUNT_HELPER: &str = "S3_MOUNT_HELPER";
    pub const S3_MOUNT_TABLE: &str = "S3_MOUNT_TABLE";
    pub const MOUNT_HELPER_ARGS: &str = "TIGRISFS_ARGS";

    pub const LOG_FORMAT: &str = "SIDECAR_LOG_FORMAT";
}
