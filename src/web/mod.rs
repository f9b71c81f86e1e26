pub mod api;
pub mod client;
pub mod dashboard;
mod render;

pub use api::InferenceServer;
pub use client::InferenceClient;
pub use dashboard::DashboardServer;

use tracing::{info, warn};

pub(crate) async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, stopping server..."),
        Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
    }
}
