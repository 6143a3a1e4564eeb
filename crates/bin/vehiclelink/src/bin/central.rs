//! `vehiclelink-central`: Finds the sample vehicle and drives it.

use std::sync::Arc;

use tokio::sync::mpsc;
use vehiclelink::config::Config;
use vehiclelink::{CHANNEL_CAPACITY, central, logging};
use vehiclelink_adapter_btleplug::BtleplugCentral;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    logging::init(&config.logging.filter);

    let (events_tx, events) = mpsc::channel(CHANNEL_CAPACITY);
    let transport = BtleplugCentral::open(events_tx).await?;
    let orchestrator = central(Arc::new(transport), events, &config.central);
    tracing::info!(target_service = %config.central.target_service, "central started");

    tokio::select! {
        result = orchestrator.run() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("interrupted, shutting down");
        }
    }
    Ok(())
}
