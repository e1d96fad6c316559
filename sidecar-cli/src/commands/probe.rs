//! `sidecar probe`: which service command would run, and why.

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use sidecar_core::{Env, ProbeResult, ResolvedCommand};

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Emit the full resolution result as JSON.
    #[arg(long)]
    pub json: bool,
}

impl ProbeArgs {
    pub fn run(self) -> Result<()> {
        let resolved = sidecar_resolver::resolve_from(&Env::from_process());

        if self.json {
            println!("{}", serde_json::to_string_pretty(&resolved)?);
            return Ok(());
        }

        print_table(&resolved);
        match &resolved.executable {
            Some(program) => {
                let invocation = std::iter::once(program.as_str())
                    .chain(resolved.args_prefix.iter().map(String::as_str))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("{} {}", "resolved:".green().bold(), invocation);
                Ok(())
            }
            None => bail!(
                "no runnable service command found ({} candidates probed)",
                resolved.probe_results.len()
            ),
        }
    }
}

#[derive(Tabled)]
struct ProbeRow {
    #[tabled(rename = "candidate")]
    candidate: String,
    #[tabled(rename = "result")]
    result: String,
    #[tabled(rename = "exit")]
    exit: String,
    #[tabled(rename = "detail")]
    detail: String,
}

impl From<&ProbeResult> for ProbeRow {
    fn from(probe: &ProbeResult) -> Self {
        let detail = probe
            .error
            .as_deref()
            .or_else(|| first_line(&probe.stdout))
            .or_else(|| first_line(&probe.stderr))
            .unwrap_or("-")
            .to_string();
        Self {
            candidate: probe.candidate.clone(),
            result: if probe.succeeded {
                "ok".green().to_string()
            } else {
                "failed".red().to_string()
            },
            exit: probe
                .exit_status
                .map(|code| code.to_string())
                .unwrap_or_else(|| "-".to_string()),
            detail,
        }
    }
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}

fn print_table(resolved: &ResolvedCommand) {
    if let Some(bin) = &resolved.global_bin {
        println!("global bin:  {}", bin.display());
    }
    if let Some(root) = &resolved.global_root {
        println!("global root: {}", root.display());
    }

    let rows: Vec<ProbeRow> = resolved.probe_results.iter().map(ProbeRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
