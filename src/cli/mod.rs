//! Command-line interface for callbridge.
//!
//! `run` (the default) bridges calls until the PBX is gone for good,
//! `calls` prints one classified snapshot and `config` shows the loaded
//! configuration with secrets masked.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::adapters::{connect, PbxApi, TicketingWebhook};
use crate::config::{Config, CONFIG_ENV};
use crate::core::Reconciler;

/// callbridge - forwards PBX call events to a helpdesk
#[derive(Parser, Debug)]
#[command(name = "callbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (otherwise ./config.yaml, /etc/callbridge/config.yaml, /opt/callbridge/config.yaml)
    #[arg(short, long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Bridge calls to the ticketing system (default)
    Run,

    /// Fetch the active calls once and show how they are classified
    Calls,

    /// Show the loaded configuration with secrets masked
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let (config, path) = Config::load(self.config.as_deref())?;
        info!(path = %path.display(), "Loaded config");

        match self.command.unwrap_or(Commands::Run) {
            Commands::Run => run_bridge(&config).await,
            Commands::Calls => show_calls(&config).await,
            Commands::Config => show_config(&config, &path),
        }
    }
}

/// Connect to both sides and poll until the PBX stays offline
async fn run_bridge(config: &Config) -> Result<()> {
    let sink = TicketingWebhook::new(config.ticketing.endpoint.clone())
        .context("Failed to set up the ticketing webhook")?;
    info!(endpoint = %sink.endpoint(), "Forwarding call events");

    let pbx = connect(&config.pbx, &config.retry_policy())
        .await
        .context("Unable to connect to the PBX")?;

    let mut reconciler = Reconciler::new(pbx, sink, config.classifier(), config.settings());
    reconciler.run().await.context("Giving up on the PBX")?;

    Ok(())
}

/// Print the current snapshot with direction and parties
async fn show_calls(config: &Config) -> Result<()> {
    let pbx = connect(&config.pbx, &config.retry_policy())
        .await
        .context("Unable to connect to the PBX")?;
    let classifier = config.classifier();

    let extensions = pbx.extensions().sorted();
    println!("API: {}", pbx.generation());
    println!("Monitored extensions ({}): {}", extensions.len(), extensions.join(", "));
    println!();

    let snapshots = pbx
        .fetch_active_calls()
        .await
        .context("Failed to fetch active calls")?;

    if snapshots.is_empty() {
        println!("No active calls");
        return Ok(());
    }

    println!(
        "{:<12} {:<14} {:<10} {:<12} {:<16}",
        "CALL ID", "STATUS", "DIRECTION", "AGENT", "EXTERNAL"
    );
    println!("{}", "-".repeat(68));

    for snapshot in &snapshots {
        match classifier.classify(snapshot, |number| pbx.is_monitored_extension(number)) {
            Some((direction, parties)) => println!(
                "{:<12} {:<14} {:<10} {:<12} {:<16}",
                snapshot.id,
                snapshot.status.as_str(),
                direction.to_string(),
                parties.agent_number,
                parties.external_number
            ),
            None => println!(
                "{:<12} {:<14} {:<10} {} -> {}",
                snapshot.id,
                snapshot.status.as_str(),
                "ignored",
                snapshot.caller_text(),
                snapshot.callee_text()
            ),
        }
    }

    println!("\nTotal: {} call(s)", snapshots.len());

    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config(config: &Config, path: &std::path::Path) -> Result<()> {
    let yaml = serde_yaml::to_string(&config.redacted()).context("Failed to render config")?;

    println!("Config file: {}", path.display());
    println!();
    print!("{}", yaml);

    Ok(())
}
