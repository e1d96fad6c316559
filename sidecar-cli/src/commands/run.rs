//! `sidecar run`: the container entrypoint.

use anyhow::{Context, Result};
use clap::Args;

use sidecar_core::paths::keys;
use sidecar_core::Env;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Override `CONTAINER_MODE`.
    #[arg(long, value_parser = ["status", "probe", "service", "moltbot"])]
    pub mode: Option<String>,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let mut env = Env::from_process();
        if let Some(mode) = self.mode {
            env.set(keys::CONTAINER_MODE, mode);
        }

        let code = sidecar_supervisor::start_blocking(env).context("sidecar runtime failed")?;
        if code != 0 {
            std::process::exit(code);
        }
        Ok(())
    }
}
