use anyhow::Result;
use clap::{Parser, Subcommand};
use glacier_arb::ArbStage;
use glacier_chain::probe_health;
use glacier_core::config::AppConfig;
use glacier_core::Registry;
use glacier_mempool::MempoolIngestor;
use glacier_sim::SimStage;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "arbd", version, about = "Glacier cross-venue arbitrage pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the mempool ingestion stage
    StartMempool {
        #[arg(short, long, default_value = "config/avalanche.toml")]
        config: String,
    },
    /// Run the reserve refresh + arbitrage detection stage
    StartArbitrage {
        #[arg(short, long, default_value = "config/avalanche.toml")]
        config: String,
    },
    /// Run the bundle simulation stage
    StartSimulate {
        #[arg(short, long, default_value = "config/avalanche.toml")]
        config: String,
    },
    /// Probe the chain node's health endpoint; exits 0/1/2
    Health {
        #[arg(short, long, default_value = "config/avalanche.toml")]
        config: String,
    },
    PrintConfig {
        #[arg(short, long, default_value = "config/avalanche.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::StartMempool { config } => {
            let cfg = AppConfig::load(&config)?;
            init_tracing(&cfg.observability.log_level);
            let registry = Registry::from_config(&cfg)?;
            let mut stage = MempoolIngestor::new(&cfg, &registry).await?;
            stage.run().await?;
        }
        Commands::StartArbitrage { config } => {
            let cfg = AppConfig::load(&config)?;
            init_tracing(&cfg.observability.log_level);
            let registry = Registry::from_config(&cfg)?;
            let mut stage = ArbStage::new(&cfg, registry).await?;
            stage.run().await?;
        }
        Commands::StartSimulate { config } => {
            let cfg = AppConfig::load(&config)?;
            init_tracing(&cfg.observability.log_level);
            let registry = Registry::from_config(&cfg)?;
            let mut stage = SimStage::new(&cfg, registry).await?;
            stage.run().await?;
        }
        Commands::Health { config } => {
            let cfg = AppConfig::load(&config)?;
            let network = cfg.chain.selected()?;
            let status = probe_health(&network.health_url, HEALTH_TIMEOUT).await;
            println!("{status:?}: {}", network.health_url);
            std::process::exit(status.exit_code());
        }
        Commands::PrintConfig { config } => {
            let cfg = AppConfig::load(&config)?;
            init_tracing(&cfg.observability.log_level);
            let json = serde_json::to_string_pretty(&cfg)?;
            println!("{json}");
        }
    }

    info!("done");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(value) => EnvFilter::try_new(value).unwrap_or_else(|_| EnvFilter::new("info")),
        Err(_) => EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
