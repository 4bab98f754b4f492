//! R0N Balancer binary entry point.
//!
//! Usage: `r0n-balancer [CONFIG]`. The configuration path falls back to
//! `R0N_BALANCER_CONFIG` and then `balancer.toml`; a missing file means
//! defaults.

use r0n_balancer::config::{BalancerConfig, ConfigLoader, LogFormat, LoggingConfig};
use r0n_balancer::gateway::Gateway;
use r0n_balancer::module::ModuleContract;
use r0n_balancer::modules::proxy::serve;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const CONFIG_ENV: &str = "R0N_BALANCER_CONFIG";
const DEFAULT_CONFIG: &str = "balancer.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path();
    let config = ConfigLoader::new().load_or_default(&path)?;
    init_logging(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %path.display(),
        "Starting r0n-balancer"
    );
    run(config).await
}

fn config_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os(CONFIG_ENV))
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from)
}

fn init_logging(config: &LoggingConfig) {
    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).init(),
    }
}

async fn run(config: BalancerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config
        .listener
        .socket_addr()
        .ok_or_else(|| format!("invalid listener address: {}", config.listener.bind_address))?;

    let mut gateway = Gateway::new();
    gateway.configure(config)?;
    gateway.start()?;
    let dispatcher = gateway.dispatcher().ok_or("balancer is not configured")?;

    let listener = TcpListener::bind(addr).await?;
    let served = serve(listener, dispatcher, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
    })
    .await;

    gateway.stop()?;
    info!("Shutdown complete");
    Ok(served?)
}
