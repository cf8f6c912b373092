use std::sync::Arc;
use std::time::Duration;

use actix_web::web;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use risk_engine::api::{self, AppState};
use risk_engine::config;
use risk_engine::db::InMemoryProfileRepository;
use risk_engine::security::notification::LogOnlyMailer;
use risk_engine::security::{SystemClock, TransactionSecurityService};
use risk_engine::utils;
use risk_engine::wallet::StaticWalletClient;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and the background cleanup task
    Serve,

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[actix_web::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let config = config::load_config()?;

    match cli.command {
        Command::ShowConfig => {
            let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", rendered);
        }
        Command::Serve => {
            // Initialize logging
            utils::logging::init_logger(&config.log_level);

            info!(
                "Scoring table v{} (weights {}/{}/{}/{}/{})",
                config.risk.version,
                config.risk.weights.amount_ratio,
                config.risk.weights.address_novelty,
                config.risk.weights.statistical_anomaly,
                config.risk.weights.time_of_day,
                config.risk.weights.behavioral_timing
            );
            warn!("No email transport configured; verification codes will be written to the log");

            let service = Arc::new(TransactionSecurityService::new(
                &config,
                Arc::new(InMemoryProfileRepository::new()),
                Arc::new(LogOnlyMailer),
                Arc::new(SystemClock),
            ));
            let cleanup = service
                .clone()
                .spawn_cleanup_task(Duration::from_secs(config.cleanup_interval_secs));

            let wallet = StaticWalletClient::from_settings(&config.wallet);
            if wallet.account_count() == 0 {
                warn!("No wallet balances configured; requests must carry an explicit balance");
            } else {
                info!("Wallet client seeded with {} account balances", wallet.account_count());
            }

            let state = web::Data::new(AppState::new(service, Arc::new(wallet), config.clone()));

            let result = api::start_api_server(config, state).await;
            cleanup.abort();
            result.context("API server failed")?;
        }
    }

    Ok(())
}
