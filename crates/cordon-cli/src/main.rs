//! cordon - sandboxed filesystem service for untrusted automation agents.
//!
//! The binary is a thin shell: it loads the config, assembles the
//! service, and speaks one JSON request per stdin line, one JSON response
//! per stdout line. Logs and the audit stream go to stderr (or the
//! configured audit file).

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cordon_core::AgentId;
use cordon_service::{FsService, Request};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// cordon - confine agent filesystem access to one workspace.
#[derive(Parser)]
#[command(name = "cordon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON config file (falls back to $CORDON_CONFIG).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve requests over stdin/stdout.
    Run,

    /// Validate the config and print the effective policy.
    CheckConfig,
}

/// One stdin line: agent attribution plus the operation fields.
#[derive(Deserialize)]
struct Envelope {
    #[serde(default = "anonymous_agent")]
    agent_id: String,
    #[serde(flatten)]
    request: Request,
}

fn anonymous_agent() -> String {
    "anonymous".to_owned()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run => run(cli.config.as_deref()).await,
        Commands::CheckConfig => check_config(cli.config.as_deref()),
    }
}

async fn run(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = cordon_config::load(config_path).context("loading config")?;
    let service = FsService::new(&config).context("assembling service")?;
    info!(
        workspace_root = %config.workspace_root.display(),
        "cordon serving on stdio"
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<Envelope>(&line) {
            Ok(envelope) => {
                let agent = AgentId::new(envelope.agent_id);
                let response = service.handle(&agent, envelope.request).await;
                serde_json::to_string(&response)?
            },
            Err(e) => {
                warn!(error = %e, "malformed request line");
                serde_json::to_string(&serde_json::json!({
                    "status": "error",
                    "code": "VAL-001",
                    "message": format!("invalid argument: malformed request: {e}"),
                }))?
            },
        };
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    service.shutdown().await;
    Ok(())
}

fn check_config(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = cordon_config::load(config_path).context("loading config")?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
