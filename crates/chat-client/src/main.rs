//! Demo client: connects one shard and logs every dispatch event
//!
//! Run with:
//! ```bash
//! CHAT_TOKEN=... cargo run -p chat-client
//! ```
//!
//! Configuration is loaded from environment variables or a `.env` file.

use anyhow::Context;
use chat_client::{handler_fn, Client, ClientConfig};
use chat_common::{try_init_tracing_with_config, TracingConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %format!("{e:#}"), "Client failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ClientConfig::from_env().context("Failed to load configuration")?;

    if let Err(e) = try_init_tracing_with_config(&TracingConfig::from_log_config(&config.log)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        retention = %config.cache.retention,
        shard = config.gateway.shard_id,
        shard_count = config.gateway.shard_count,
        "Configuration loaded"
    );

    let client = Client::new(config)?;
    client.add_handler(handler_fn(|event| {
        info!(
            event = %event.name,
            seq = event.sequence,
            affected = event.affected.len(),
            "Event received"
        );
    }));

    client.open()?;

    tokio::select! {
        result = client.wait() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            client.close().await?;
        }
    }

    info!("Client stopped");
    Ok(())
}
