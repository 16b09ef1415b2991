//! specpush - publish specification documents into a git repository
//!
//! Usage:
//!   specpush generate spec.json     # publish one document, print done/failed
//!   specpush generate < spec.json   # same, reading the document from stdin
//!   specpush serve                  # HTTP endpoint POST /v1/api/generate

mod server;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use specpush_core::config::{self, GenerateMode, ProvisionerConfig};
use specpush_core::provision::Provisioner;
use specpush_core::repository::install_transport_timeouts;

#[derive(Parser)]
#[command(name = "specpush")]
#[command(about = "Publish specification documents into a git repository", long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/specpush/config.toml)
    #[arg(long, short, global = true, env = "SPECPUSH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish one document and print `done` or `failed`
    Generate {
        /// JSON document to publish; read from stdin when omitted
        file: Option<PathBuf>,

        /// Which branches to publish to (generated, generated-and-dev)
        #[arg(long)]
        mode: Option<GenerateMode>,
    },

    /// Accept documents over HTTP
    Serve {
        /// Address to bind to, overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "specpush=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = config::load(cli.config.as_deref())?;
    install_transport_timeouts(Duration::from_secs(config.provision.timeout_secs))
        .context("Failed to configure git transport timeouts")?;

    match cli.command {
        Commands::Generate { file, mode } => {
            if let Some(mode) = mode {
                config.provision.mode = mode;
            }
            run_generate(&config, file.as_deref())?;
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            server::run(config)?;
        }
    }

    Ok(())
}

fn run_generate(config: &ProvisionerConfig, file: Option<&Path>) -> Result<()> {
    let specification = read_specification(file)?;
    let provisioner = Provisioner::from_config(config)?;

    let outcome = provisioner.generate(&specification);
    println!("{outcome}");
    if !outcome.is_done() {
        std::process::exit(1);
    }
    Ok(())
}

fn read_specification(file: Option<&Path>) -> Result<Value> {
    let text = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read specification: {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read specification from stdin")?;
            buf
        }
    };
    serde_json::from_str(&text).context("Specification is not valid JSON")
}
