//! # vehiclelink-adapter-ble-peripheral
//!
//! Peripheral-role radio adapter. Implements the `PeripheralBackend` port
//! on top of [ble-peripheral-rust](https://docs.rs/ble-peripheral-rust).
//!
//! ## How it works
//!
//! A dedicated worker thread owns the stack handle. [`BlePeripheral`] is a
//! cheap, `Send` front for it: every port call becomes a command with a
//! one-shot reply. Stack events flow the other way as
//! [`PeripheralRequest`]s:
//!
//! | Stack event | Request |
//! |-------------|---------|
//! | `ReadRequest` | `Read`, answered through the stack responder |
//! | `WriteRequest` | `Write`, answered through the stack responder |
//! | `CharacteristicSubscriptionUpdate` | `Subscription` |
//!
//! Long (offset) writes are refused with an invalid-offset status.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `vehiclelink-app` and
//! `vehiclelink-domain`.

mod error;
mod mapping;
mod worker;

pub use error::PeripheralAdapterError;

use std::future::Future;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;
use vehiclelink_app::ports::{BackendError, PeripheralBackend, PeripheralRequest};
use vehiclelink_domain::gatt::{AdvertisingParameters, ServiceDefinition};

use crate::worker::Command;

const COMMAND_CAPACITY: usize = 16;

/// Handle to the peripheral worker.
#[derive(Clone)]
pub struct BlePeripheral {
    commands: mpsc::Sender<Command>,
}

impl BlePeripheral {
    /// Start the worker and wait until the radio is powered.
    ///
    /// Requests from connected centrals are delivered on `requests`.
    ///
    /// # Errors
    ///
    /// Returns [`PeripheralAdapterError::NotPowered`] when the radio never
    /// powers up, or another variant when the stack cannot be opened.
    pub async fn start(
        requests: mpsc::Sender<PeripheralRequest>,
    ) -> Result<Self, PeripheralAdapterError> {
        let (commands, inbox) = mpsc::channel(COMMAND_CAPACITY);
        let (ready, started) = oneshot::channel();
        worker::spawn(inbox, requests, ready)?;
        started
            .await
            .map_err(|_| PeripheralAdapterError::Stopped)??;
        Ok(Self { commands })
    }

    async fn call(
        commands: mpsc::Sender<Command>,
        command: impl FnOnce(oneshot::Sender<Result<(), PeripheralAdapterError>>) -> Command,
    ) -> Result<(), BackendError> {
        let (reply, response) = oneshot::channel();
        commands
            .send(command(reply))
            .await
            .map_err(|_| BackendError::Closed)?;
        response
            .await
            .map_err(|_| BackendError::Closed)?
            .map_err(BackendError::from)
    }
}

impl PeripheralBackend for BlePeripheral {
    fn add_service(
        &self,
        service: &ServiceDefinition,
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        let service = mapping::service_of(service);
        Self::call(self.commands.clone(), move |reply| Command::AddService {
            service,
            reply,
        })
    }

    fn start_advertising(
        &self,
        parameters: &AdvertisingParameters,
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        let name = parameters.local_name.clone();
        let services = parameters.service_uuids.clone();
        tracing::info!(%name, services = services.len(), "advertising");
        Self::call(self.commands.clone(), move |reply| {
            Command::StartAdvertising {
                name,
                services,
                reply,
            }
        })
    }

    fn notify(
        &self,
        characteristic: Uuid,
        value: &[u8],
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        let value = value.to_vec();
        Self::call(self.commands.clone(), move |reply| Command::Notify {
            characteristic,
            value,
            reply,
        })
    }
}
