//! # vehiclelink: Composition root
//!
//! Wires adapters and application services into two binaries:
//!
//! | Binary | Role | Radio adapter |
//! |--------|------|---------------|
//! | `vehiclelink-central` | scans, connects, drives the vehicle | `vehiclelink-adapter-btleplug` |
//! | `vehiclelink-peripheral` | hosts the sample vehicle sensor profile | `vehiclelink-adapter-ble-peripheral` |
//!
//! The wiring functions here are generic over the port traits so the same
//! assembly runs against the loopback radio in tests.
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: No domain logic belongs here.

pub mod config;
pub mod logging;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use vehiclelink_app::ports::{CentralTransport, PeripheralBackend, PeripheralRequest, RadioEvent};
use vehiclelink_app::services::attribute_store::AttributeStore;
use vehiclelink_app::services::orchestrator::CentralOrchestrator;
use vehiclelink_app::services::peripheral_profile::{advertising_parameters, define_sample_profile};
use vehiclelink_app::services::peripheral_server::{PeripheralServer, SensorFeed};
use vehiclelink_app::services::sensor_simulator::SensorSimulator;
use vehiclelink_app::services::vehicle_control::VehicleControl;
use vehiclelink_domain::error::SetupError;
use vehiclelink_domain::vehicle::VehicleState;

use crate::config::{CentralConfig, PeripheralConfig};

/// Depth of the radio event and peripheral request channels.
pub const CHANNEL_CAPACITY: usize = 64;

/// Build the central control loop on top of `transport`.
#[must_use]
pub fn central<T: CentralTransport>(
    transport: Arc<T>,
    events: mpsc::Receiver<RadioEvent>,
    config: &CentralConfig,
) -> CentralOrchestrator<T> {
    CentralOrchestrator::new(transport, events, config.orchestrator_settings())
}

/// A peripheral whose profile is published and ready to serve.
pub struct Peripheral<B> {
    pub server: PeripheralServer<B>,
    pub control: VehicleControl,
}

/// Define the sample profile on `backend`, publish it and start advertising.
///
/// # Errors
///
/// Returns [`SetupError`] when the profile does not fit the attribute store
/// or the backend refuses a service or the advertisement.
#[tracing::instrument(skip_all, fields(device_name = %config.device_name))]
pub async fn peripheral<B: PeripheralBackend>(
    backend: B,
    requests: mpsc::Receiver<PeripheralRequest>,
    config: &PeripheralConfig,
) -> Result<Peripheral<B>, SetupError> {
    let control = VehicleControl::new();
    let settings = config.profile_settings();
    let mut store = AttributeStore::new(backend, config.attribute_capacity);
    let profile = define_sample_profile(&mut store, &settings, &control)?;
    store.publish(&advertising_parameters(&settings)).await?;
    tracing::info!(free_slots = store.available(), "profile published");

    let feed = SensorFeed {
        handle: profile.temperature,
        simulator: SensorSimulator::new(config.initial_temperature, config.temperature_step),
        interval: config.sensor_interval(),
        current_time: Some(profile.current_time),
    };
    Ok(Peripheral {
        server: PeripheralServer::new(store, requests).with_sensor(feed),
        control,
    })
}

/// Log every speed and direction the peripheral accepts.
///
/// Returns the last state once every [`VehicleControl`] handle is gone.
pub async fn log_vehicle_state(mut states: watch::Receiver<VehicleState>) -> VehicleState {
    while states.changed().await.is_ok() {
        let state = *states.borrow_and_update();
        tracing::info!(speed = ?state.speed, direction = ?state.direction, "vehicle state changed");
    }
    *states.borrow()
}
