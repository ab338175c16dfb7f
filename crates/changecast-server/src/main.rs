//! changecast broker - standalone message relay.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use changecast_server::{BrokerArgs, Relay};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "changecast_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting changecast broker");

    let args = BrokerArgs::parse();
    let config = args.into_config();

    tracing::info!(
        ingest = %config.ingest_address,
        fanout = %config.fanout_address,
        max_message_size = config.max_message_size,
        "configuration loaded"
    );

    let mut relay = Relay::start(&config)?;
    tracing::info!("broker ready, relaying messages");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl+c");
    } else {
        tracing::info!("received shutdown signal");
    }

    tokio::task::spawn_blocking(move || relay.stop()).await?;
    tracing::info!("broker shutdown complete");

    Ok(())
}
