/// Letterpost short-link server - Main entry point
use letterpost_core::shortlink_api::start_shortlink_server;
use letterpost_core::Config;
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    info!("📮 Starting Letterpost short-link server");
    info!("   Public URL: {}", config.public_base_url);
    info!("   Data dir: {:?}", config.data_dir);

    // Runs until the process is killed
    start_shortlink_server(&config).await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
