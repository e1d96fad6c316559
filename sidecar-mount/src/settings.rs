use std::path::PathBuf;
use std::time::Duration;

use sidecar_core::paths::{
    keys, DEFAULT_MOUNT_HELPER, DEFAULT_MOUNT_POINT, MOUNT_POLL_ATTEMPTS, MOUNT_POLL_INTERVAL,
    MOUNT_TABLE,
};
use sidecar_core::Env;

/// Keys that must all be present for the mount to be attempted.
pub const REQUIRED_KEYS: [&str; 4] = [
    keys::S3_ENDPOINT,
    keys::S3_BUCKET,
    keys::S3_ACCESS_KEY_ID,
    keys::S3_SECRET_ACCESS_KEY,
];

/// Everything needed to attach the bucket.
#[derive(Clone)]
pub struct MountSettings {
    pub endpoint: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: Option<String>,
    pub path_style: bool,
    pub prefix: Option<String>,
    pub mount_point: PathBuf,
    pub required: bool,
    pub helper: String,
    pub extra_args: Vec<String>,
    pub mount_table: PathBuf,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
}

impl MountSettings {
    /// `None` when any of [`REQUIRED_KEYS`] is absent.
    pub fn from_env(env: &Env) -> Option<Self> {
        Some(Self {
            endpoint: env.get(keys::S3_ENDPOINT)?.to_string(),
            bucket: env.get(keys::S3_BUCKET)?.to_string(),
            access_key_id: env.get(keys::S3_ACCESS_KEY_ID)?.to_string(),
            secret_access_key: env.get(keys::S3_SECRET_ACCESS_KEY)?.to_string(),
            region: env.get(keys::S3_REGION).map(str::to_string),
            path_style: env
                .get(keys::S3_PATH_STYLE)
                .map(|v| !v.trim().eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            prefix: env
                .get(keys::S3_PREFIX)
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            mount_point: mount_point(env),
            required: env.flag(keys::S3_MOUNT_REQUIRED),
            helper: env
                .get(keys::S3_MOUNT_HELPER)
                .unwrap_or(DEFAULT_MOUNT_HELPER)
                .to_string(),
            extra_args: env
                .get(keys::MOUNT_HELPER_ARGS)
                .map(|args| args.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            mount_table: PathBuf::from(env.get(keys::S3_MOUNT_TABLE).unwrap_or(MOUNT_TABLE)),
            poll_interval: MOUNT_POLL_INTERVAL,
            poll_attempts: MOUNT_POLL_ATTEMPTS,
        })
    }

    /// `bucket` or `bucket:prefix`.
    pub fn bucket_ref(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", self.bucket, prefix),
            None => self.bucket.clone(),
        }
    }

    /// Helper argument vector. Credentials travel in the environment only.
    pub fn helper_args(&self) -> Vec<String> {
        let mut args = vec!["--endpoint".to_string(), self.endpoint.clone()];
        if !self.path_style {
            args.push("--subdomain".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args.push("-f".to_string());
        args.push(self.bucket_ref());
        args.push(self.mount_point.display().to_string());
        args
    }

    pub fn helper_env(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            ("AWS_ACCESS_KEY_ID", self.access_key_id.clone()),
            ("AWS_SECRET_ACCESS_KEY", self.secret_access_key.clone()),
        ];
        if let Some(region) = &self.region {
            vars.push(("AWS_REGION", region.clone()));
        }
        vars
    }
}

impl std::fmt::Debug for MountSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountSettings")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket_ref())
            .field("mount_point", &self.mount_point)
            .field("required", &self.required)
            .field("helper", &self.helper)
            .finish_non_exhaustive()
    }
}

/// Mount point from `S3_MOUNT_POINT`, else the default.
pub fn mount_point(env: &Env) -> PathBuf {
    PathBuf::from(env.get(keys::S3_MOUNT_POINT).unwrap_or(DEFAULT_MOUNT_POINT))
}

/// Required keys absent from `env`.
pub fn missing_keys(env: &Env) -> Vec<&'static str> {
    REQUIRED_KEYS
        .into_iter()
        .filter(|key| !env.contains(key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_env(extra: &[(&str, &str)]) -> Env {
        let mut env = Env::from_pairs([
            ("S3_ENDPOINT", "https://fly.storage.tigris.dev"),
            ("S3_BUCKET", "agents"),
            ("S3_ACCESS_KEY_ID", "AKIA"),
            ("S3_SECRET_ACCESS_KEY", "shh"),
        ]);
        for (k, v) in extra {
            env.set(*k, *v);
        }
        env
    }

    #[test]
    fn any_missing_key_disables_mount() {
        for key in REQUIRED_KEYS {
            let mut env = full_env(&[]);
            env.set(key, "");
            assert!(MountSettings::from_env(&env).is_none(), "{key} missing");
            assert_eq!(missing_keys(&env), vec![key]);
        }
    }

    #[test]
    fn helper_args_keep_secrets_out_of_argv() {
        let settings = MountSettings::from_env(&full_env(&[
            ("S3_PREFIX", "/team-a/"),
            ("S3_PATH_STYLE", "false"),
            ("TIGRISFS_ARGS", "--uid 0  --gid 0"),
            ("S3_MOUNT_POINT", "/data"),
        ]))
        .expect("settings");

        assert_eq!(
            settings.helper_args(),
            vec![
                "--endpoint",
                "https://fly.storage.tigris.dev",
                "--subdomain",
                "--uid",
                "0",
                "--gid",
                "0",
                "-f",
                "agents:team-a",
                "/data",
            ]
        );
        assert!(!settings.helper_args().iter().any(|a| a.contains("shh")));
        assert!(!format!("{settings:?}").contains("shh"));
    }

    #[test]
    fn defaults_apply_when_optional_keys_absent() {
        let settings = MountSettings::from_env(&full_env(&[])).expect("settings");
        assert!(settings.path_style);
        assert!(!settings.required);
        assert_eq!(settings.mount_point, PathBuf::from(DEFAULT_MOUNT_POINT));
        assert_eq!(settings.helper, DEFAULT_MOUNT_HELPER);
        assert_eq!(settings.bucket_ref(), "agents");
    }
}
