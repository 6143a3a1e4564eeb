//! # vehiclelink-adapter-loopback
//!
//! An in-process radio. Simulated peripherals register with a
//! [`LoopbackRadio`], which then behaves as the central's transport:
//! advertisements, GATT requests and notifications travel over channels
//! instead of the air.
//!
//! ## Test hooks
//!
//! | Hook | Effect |
//! |------|--------|
//! | [`LoopbackRadio::inject_advertisement`] | Deliver a raw advertisement event while scanning |
//! | [`LoopbackRadio::refuse_connect`] | Make connects to an identity fail |
//! | [`LoopbackRadio::drop_link`] | Sever a link as if the peer went out of range |
//!
//! ## Dependency rule
//!
//! Depends on `vehiclelink-app` (port traits) and `vehiclelink-domain` only.

mod central;
mod peripheral;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use uuid::Uuid;
use vehiclelink_app::ports::{PeripheralRequest, RadioEvent};
use vehiclelink_domain::advertisement::Advertisement;
use vehiclelink_domain::gatt::{AdvertisingParameters, ServiceDefinition};
use vehiclelink_domain::identity::DeviceIdentity;

pub use central::LoopbackLink;
pub use peripheral::LoopbackPeripheral;

/// Client name the loopback central presents to peripherals.
pub const CENTRAL_CLIENT: &str = "loopback-central";

struct SimulatedDevice {
    services: Vec<ServiceDefinition>,
    advertising: Option<AdvertisingParameters>,
    requests: mpsc::Sender<PeripheralRequest>,
    connected: bool,
    subscriptions: BTreeSet<Uuid>,
}

#[derive(Default)]
struct Air {
    scanning: bool,
    devices: BTreeMap<DeviceIdentity, SimulatedDevice>,
    refused: HashSet<DeviceIdentity>,
}

/// Shared loopback medium. Cheap to clone.
#[derive(Clone)]
pub struct LoopbackRadio {
    air: Arc<Mutex<Air>>,
    events: mpsc::Sender<RadioEvent>,
}

/// The advertising data and the scan response arrive as separate events.
fn advertisements(identity: DeviceIdentity, parameters: &AdvertisingParameters) -> [Advertisement; 2] {
    let mut data = Advertisement::new(identity);
    data.service_uuids.clone_from(&parameters.service_uuids);
    let response = Advertisement::new(identity).with_local_name(parameters.local_name.clone());
    [data, response]
}

impl LoopbackRadio {
    /// Create a radio delivering central-side events to `events`.
    #[must_use]
    pub fn new(events: mpsc::Sender<RadioEvent>) -> Self {
        Self {
            air: Arc::new(Mutex::new(Air::default())),
            events,
        }
    }

    fn air(&self) -> MutexGuard<'_, Air> {
        self.air.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a simulated peripheral answering GATT requests on `requests`.
    #[must_use]
    pub fn peripheral(
        &self,
        identity: DeviceIdentity,
        requests: mpsc::Sender<PeripheralRequest>,
    ) -> LoopbackPeripheral {
        self.air().devices.insert(
            identity,
            SimulatedDevice {
                services: Vec::new(),
                advertising: None,
                requests,
                connected: false,
                subscriptions: BTreeSet::new(),
            },
        );
        LoopbackPeripheral::new(identity, self.clone())
    }

    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.air().scanning
    }

    #[must_use]
    pub fn is_connected(&self, identity: &DeviceIdentity) -> bool {
        self.air()
            .devices
            .get(identity)
            .is_some_and(|device| device.connected)
    }

    /// Deliver a raw advertisement. Returns `false` when not scanning.
    pub async fn inject_advertisement(&self, advertisement: Advertisement) -> bool {
        if !self.is_scanning() {
            return false;
        }
        self.emit(RadioEvent::Advertisement(advertisement)).await;
        true
    }

    pub fn refuse_connect(&self, identity: DeviceIdentity) {
        self.air().refused.insert(identity);
    }

    pub fn allow_connect(&self, identity: &DeviceIdentity) {
        self.air().refused.remove(identity);
    }

    /// Sever the link to `identity` and report the disconnect to the central.
    ///
    /// Returns `false` when no link was up.
    pub async fn drop_link(&self, identity: DeviceIdentity) -> bool {
        if !self.close(identity).await {
            return false;
        }
        tracing::debug!(%identity, "loopback link dropped");
        self.emit(RadioEvent::Disconnected(identity)).await;
        true
    }

    /// Mark the link closed and unsubscribe the central on the peripheral side.
    async fn close(&self, identity: DeviceIdentity) -> bool {
        let closed = {
            let mut air = self.air();
            match air.devices.get_mut(&identity) {
                Some(device) if device.connected => {
                    device.connected = false;
                    Some((
                        std::mem::take(&mut device.subscriptions),
                        device.requests.clone(),
                    ))
                }
                _ => None,
            }
        };
        let Some((subscriptions, requests)) = closed else {
            return false;
        };
        for characteristic in subscriptions {
            let request = PeripheralRequest::Subscription {
                client: CENTRAL_CLIENT.to_string(),
                characteristic,
                subscribed: false,
            };
            if requests.send(request).await.is_err() {
                break;
            }
        }
        true
    }

    async fn emit(&self, event: RadioEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("central event receiver dropped");
        }
    }
}
