//! Spark Echo Node
//!
//! Serves the node directory, liveness tracker and broadcast log over HTTP.
//! See `spark_echo::config` for flags and environment variables.

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use spark_echo::{
    api::{self, AppContext},
    config::NodeConfig,
    storage::Backend,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = NodeConfig::load();

    info!("⚡ Starting Spark Echo node...");
    info!("  API Port: {}", config.api_port);
    info!("  Data Dir: {}", config.data_dir);
    info!("  Backend: {:?}", config.backend);
    info!("  Active Window: {} min", config.active_window_minutes);

    let backend = Backend::open(config.backend, &config.data_dir)?;
    let context = AppContext::open(&backend)?.with_active_window(config.active_window_minutes);

    let addr = format!("0.0.0.0:{}", config.api_port);
    api::start_server(Arc::new(context), &addr).await?;

    Ok(())
}
