//! CLI for the reqguard request layer.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use reqguard_core::config;
use reqguard_core::Method;
use std::path::PathBuf;

use commands::{run_completions, run_policies, run_send, SendArgs};

/// Top-level CLI for reqguard.
#[derive(Debug, Parser)]
#[command(name = "reqguard")]
#[command(about = "reqguard: resilient requests against the back-office API", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/reqguard/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Send one request through the dispatcher and print the response.
    Send {
        /// Path relative to the configured base URL (e.g. /clients/12).
        path: String,

        /// HTTP method.
        #[arg(short = 'X', long, default_value = "GET")]
        method: Method,

        /// Retry policy for this request (preset or a name from [policies]).
        #[arg(long)]
        policy: Option<String>,

        /// Per-attempt timeout in milliseconds (default from config).
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,

        /// Request body.
        #[arg(short, long)]
        data: Option<String>,

        /// Extra header, "Name: value". May be repeated.
        #[arg(short = 'H', long = "header", value_name = "HEADER")]
        headers: Vec<String>,
    },

    /// List registered retry policies with their delay schedules.
    Policies,

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        if let CliCommand::Completions { shell } = cli.command {
            run_completions(shell);
            return Ok(());
        }

        let cfg = match &cli.config {
            Some(path) => config::load_from(path)?,
            None => config::load_or_init()?,
        };
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Send {
                path,
                method,
                policy,
                timeout_ms,
                data,
                headers,
            } => {
                let args = SendArgs {
                    path,
                    method,
                    policy,
                    timeout_ms,
                    data,
                    headers,
                };
                run_send(&cfg, args).await?
            }
            CliCommand::Policies => run_policies(&cfg)?,
            CliCommand::Completions { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
