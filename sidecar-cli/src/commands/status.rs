//! `sidecar status`: read the fallback responder's diagnostics payload.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Base URL of the status responder.
    #[arg(long, default_value = "http://127.0.0.1:18789")]
    pub url: String,

    /// Hit `/healthz` instead of the diagnostics payload.
    #[arg(long)]
    pub health: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let base = self.url.trim_end_matches('/');
        let path = if self.health { "healthz" } else { "status" };
        let url = format!("{base}/{path}");

        let response = ureq::get(&url)
            .timeout(Duration::from_secs(5))
            .call()
            .with_context(|| format!("status responder unreachable at {url}"))?;

        if self.health {
            println!("{}", response.into_string()?.trim());
            return Ok(());
        }

        let payload: serde_json::Value = response
            .into_json()
            .with_context(|| format!("{url} did not return JSON"))?;
        println!("{}", serde_json::to_string_pretty(&payload)?);
        Ok(())
    }
}
