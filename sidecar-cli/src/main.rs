//! Sidecar: resolve, mount, configure and supervise the gateway service.
//!
//! # Usage
//!
//! ```text
//! sidecar run [--mode status|probe|service]
//! sidecar probe [--json]
//! sidecar config [--write]
//! sidecar status [--url <url>] [--health]
//! ```
//!
//! Every command reads its inputs from the process environment.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config::ConfigArgs, probe::ProbeArgs, run::RunArgs, status::StatusArgs};

#[derive(Parser, Debug)]
#[command(
    name = "sidecar",
    version,
    about = "Container entrypoint that supervises the gateway service",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the container entrypoint in the configured mode.
    Run(RunArgs),

    /// Resolve the service command and show every probe attempt.
    Probe(ProbeArgs),

    /// Print or write the synthesized service config.
    Config(ConfigArgs),

    /// Query a running fallback status responder.
    Status(StatusArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Probe(args) => args.run(),
        Commands::Config(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}
