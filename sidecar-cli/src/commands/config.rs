//! `sidecar config`: show the config the service would be launched with.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use sidecar_core::config;
use sidecar_core::Env;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Persist to `CLAWDBOT_CONFIG_PATH` instead of printing.
    #[arg(long)]
    pub write: bool,
}

impl ConfigArgs {
    pub fn run(self) -> Result<()> {
        let env = Env::from_process();

        if self.write {
            let written =
                config::write_config(&env, None).context("failed to write service config")?;
            println!(
                "{} {} config to {}",
                "wrote".green(),
                written.source.label(),
                written.path.display()
            );
            return Ok(());
        }

        let source = config::synthesize(&env, None).context("invalid service config")?;
        println!("{}", source.body()?);
        Ok(())
    }
}
