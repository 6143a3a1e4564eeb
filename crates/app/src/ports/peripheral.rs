//! Peripheral port: What the peripheral role needs from a radio.
//!
//! The backend hosts the published attribute table on the radio. Requests
//! from connected centrals come back as [`PeripheralRequest`] messages; each
//! read and write carries a one-shot responder that must be answered exactly
//! once.

use std::future::Future;

use tokio::sync::oneshot;
use uuid::Uuid;
use vehiclelink_domain::error::BoxError;
use vehiclelink_domain::gatt::{AdvertisingParameters, ReadOutcome, ServiceDefinition, WriteOutcome};

/// A request from a connected central.
#[derive(Debug)]
pub enum PeripheralRequest {
    Read {
        client: String,
        characteristic: Uuid,
        offset: usize,
        responder: oneshot::Sender<ReadOutcome>,
    },
    Write {
        client: String,
        characteristic: Uuid,
        value: Vec<u8>,
        responder: oneshot::Sender<WriteOutcome>,
    },
    /// A central wrote the client characteristic configuration descriptor.
    Subscription {
        client: String,
        characteristic: Uuid,
        subscribed: bool,
    },
}

/// Errors surfaced by a [`PeripheralBackend`].
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The radio is absent or powered off.
    #[error("peripheral radio unavailable")]
    Unavailable,

    /// The backend stopped (its worker exited).
    #[error("peripheral backend closed")]
    Closed,

    #[error("peripheral backend error")]
    Backend(#[source] BoxError),
}

/// Hosting of services on the radio.
///
/// Implementations live in adapter crates (e.g. `adapter-ble-peripheral`).
pub trait PeripheralBackend: Send + Sync {
    /// Register one service and all of its characteristics.
    fn add_service(
        &self,
        service: &ServiceDefinition,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn start_advertising(
        &self,
        parameters: &AdvertisingParameters,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Push a value to every subscribed central.
    fn notify(
        &self,
        characteristic: Uuid,
        value: &[u8],
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

impl<T: PeripheralBackend> PeripheralBackend for std::sync::Arc<T> {
    fn add_service(
        &self,
        service: &ServiceDefinition,
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        (**self).add_service(service)
    }

    fn start_advertising(
        &self,
        parameters: &AdvertisingParameters,
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        (**self).start_advertising(parameters)
    }

    fn notify(
        &self,
        characteristic: Uuid,
        value: &[u8],
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        (**self).notify(characteristic, value)
    }
}
