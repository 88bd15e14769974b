use anyhow::Result;
use tracing::info;

mod config;
mod server;
mod shutdown;
mod telemetry;

use config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init().map_err(|e| anyhow::anyhow!("Failed to init telemetry: {}", e))?;

    info!("Callrelay Server starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let server_config = ServerConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load server configuration: {}", e))?;
    server_config.log_config();

    server::start(server_config).await?;

    telemetry::shutdown();

    Ok(())
}
