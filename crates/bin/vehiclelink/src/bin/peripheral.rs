//! `vehiclelink-peripheral`: Hosts the sample vehicle sensor profile.

use tokio::sync::mpsc;
use vehiclelink::config::Config;
use vehiclelink::{CHANNEL_CAPACITY, log_vehicle_state, logging, peripheral};
use vehiclelink_adapter_ble_peripheral::BlePeripheral;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    logging::init(&config.logging.filter);

    let (requests_tx, requests) = mpsc::channel(CHANNEL_CAPACITY);
    let backend = BlePeripheral::start(requests_tx).await?;
    let hosted = peripheral(backend, requests, &config.peripheral).await?;
    tracing::info!(device_name = %config.peripheral.device_name, "peripheral started");
    let states = tokio::spawn(log_vehicle_state(hosted.control.watch()));

    tokio::select! {
        _ = hosted.server.run() => tracing::info!("request stream closed"),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("interrupted, shutting down");
        }
    }
    states.abort();
    Ok(())
}
