use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod data;
mod error;
mod ml;
mod web;

use crate::config::{Config, LoggingConfig};
use crate::data::{PredictionResult, SensorTable};
use crate::ml::MLEngine;
use crate::web::{DashboardServer, InferenceClient, InferenceServer};

#[derive(Parser)]
#[command(name = "rul-service")]
#[command(about = "Remaining-useful-life prediction service and dashboard for turbofan sensor logs")]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the prediction API
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Serve the dashboard, forwarding predictions to the API
    Dashboard {
        #[arg(long)]
        port: Option<u16>,

        #[arg(long)]
        api_url: Option<String>,
    },
    /// Predict once from a CSV or C-MAPSS text file and print the result
    Predict {
        #[arg(long)]
        file: PathBuf,

        #[arg(long)]
        engine_id: i64,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", logging.filter)));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_file(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;

    init_tracing(&config.logging);

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            info!("Starting RUL inference service");

            let engine = Arc::new(MLEngine::new(&config.model)?);
            let prometheus = match PrometheusBuilder::new().install_recorder() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!("Prometheus exporter disabled: {}", e);
                    None
                }
            };

            InferenceServer::new(engine, prometheus)
                .start(&config.server_addr())
                .await?;
        }
        Command::Dashboard { port, api_url } => {
            if let Some(port) = port {
                config.dashboard.port = port;
            }
            if let Some(url) = api_url {
                config.dashboard.api_url = url;
            }
            info!("Starting RUL dashboard");

            let client = InferenceClient::new(&config.dashboard.api_url)?;
            DashboardServer::new(client)
                .start(&config.dashboard_addr())
                .await?;
        }
        Command::Predict { file, engine_id } => {
            let engine = MLEngine::new(&config.model)?;
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let file_name = file.to_string_lossy();

            let table = SensorTable::from_upload(&file_name, &bytes)?.for_engine(engine_id);
            let predicted_rul = engine.predict(&table)?;

            let result = PredictionResult {
                engine_id,
                predicted_rul,
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    info!("Shutdown complete");
    Ok(())
}
