mod api;
mod client;
mod config;
mod docker;
mod graph;
mod helper;
mod jobs;
mod logging;
mod orchestrator;
mod server;

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use config::{HelperConfig, ServerConfig};

#[derive(Parser)]
#[command(name = "saltbox-docker-controller")]
#[command(about = "Dependency-aware Docker container orchestrator for Saltbox", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Docker controller API server
    Server {
        /// API server host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// API server port
        #[arg(long, default_value_t = 3377)]
        port: u16,
    },

    /// Run in helper mode (Docker lifecycle integration)
    Helper {
        /// Controller API URL
        #[arg(long, default_value = "http://127.0.0.1:3377")]
        controller_url: String,

        /// Initial delay before starting containers
        #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
        startup_delay: Duration,

        /// Operation timeout in seconds
        #[arg(long, default_value_t = 600)]
        timeout: u64,

        /// Job status polling interval
        #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
        poll_interval: Duration,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Server { host, port } => server::run(ServerConfig { host, port }).await,
        Commands::Helper {
            controller_url,
            startup_delay,
            timeout,
            poll_interval,
        } => {
            helper::run(HelperConfig {
                controller_url,
                startup_delay,
                timeout,
                poll_interval,
            })
            .await
        }
    }
}

/// Resolves when SIGINT or SIGTERM arrives.
pub(crate) async fn shutdown_signal() -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }

    Ok(())
}
