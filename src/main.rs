//! Risk-profiled portfolio allocator
//!
//! Computes Markowitz allocations for each risk profile from live upstream data.

use clap::{Parser, Subcommand};
use portfolio_allocator::{client::HttpDataSource, config::Config, server, service::AllocationService};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "portfolio-allocator")]
#[command(about = "Mean-variance allocations per risk profile")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute allocations once and print them as JSON
    Run {
        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },
    /// Serve allocations over HTTP
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    let source = Arc::new(HttpDataSource::new(&config.source)?);
    let service = Arc::new(AllocationService::new(source, config));

    match cli.command {
        Commands::Run { pretty } => run_once(&service, pretty).await,
        Commands::Serve => {
            let addr = service.config().server.bind_addr();
            server::serve(service, &addr).await?;
            Ok(())
        }
    }
}

async fn run_once(service: &AllocationService, pretty: bool) -> anyhow::Result<()> {
    tracing::info!("Fetching data from {}", service.config().source.base_url);

    let table = service.compute().await?;
    let output = if pretty {
        serde_json::to_string_pretty(&table)?
    } else {
        serde_json::to_string(&table)?
    };
    println!("{}", output);

    Ok(())
}
