// packages/sim-server/src/main.rs
//! Pooled simulation server
//!
//! Listens for line-delimited JSON simulation requests and runs them on a
//! pool of subprocess engines bound to one model.

use anyhow::{Context, Result};
use clap::Parser;
use sim_server::observability::{init_metrics, init_tracing};
use sim_server::runtime::ProcessEngineFactory;
use sim_server::server::Listener;
use sim_server::utils::config::ServerConfig;
use std::path::PathBuf;
use tracing::info;

/// Pooled simulation server
#[derive(Parser, Debug)]
#[command(name = "sim-server", version, about)]
struct Cli {
    /// Model file every engine instance opens
    #[arg(value_name = "MODEL")]
    model: Option<PathBuf>,

    /// Config file (TOML, YAML or JSON)
    #[arg(short, long, env = "SIM_SERVER_CONFIG")]
    config: Option<PathBuf>,

    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Engine executable speaking the JSON-lines engine protocol
    #[arg(long)]
    engine_program: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(model) = self.model {
            config.model.path = model;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(program) = self.engine_program {
            config.engine.program = program;
        }
        if self.json_logs {
            config.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config =
        ServerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate()?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.logging)?;
    init_metrics(&config.metrics)?;

    info!("Starting sim-server v{}", sim_server::VERSION);
    info!("Configuration loaded: {:?}", config);

    let factory = ProcessEngineFactory::new(config.engine.clone());
    let mut listener = Listener::from_config(&config, factory)?;
    let addr = listener.start().await?;
    info!("Serving model {} on {}", config.model.path.display(), addr);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install CTRL+C signal handler")?;
    info!("Received shutdown signal, cleaning up...");

    listener.stop().await?;
    let stats = listener.runner().pool().stats();
    info!(
        "Server stopped ({} engines created, {} discarded)",
        stats.created, stats.discarded
    );
    Ok(())
}
