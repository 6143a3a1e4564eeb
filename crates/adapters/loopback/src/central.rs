//! Central side of the loopback radio.

use std::future::Future;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;
use vehiclelink_app::ports::{
    CentralTransport, PeerLink, PeripheralRequest, RadioEvent, TransportError,
};
use vehiclelink_domain::gatt::{CharacteristicHandle, ReadOutcome, WriteOutcome};
use vehiclelink_domain::identity::DeviceIdentity;

use crate::{CENTRAL_CLIENT, LoopbackRadio, SimulatedDevice, advertisements};

/// A link from the loopback central to one simulated peripheral.
pub struct LoopbackLink {
    identity: DeviceIdentity,
    radio: LoopbackRadio,
}

impl LoopbackLink {
    fn with_device<R>(
        &self,
        f: impl FnOnce(&mut SimulatedDevice) -> R,
    ) -> Result<R, TransportError> {
        let mut air = self.radio.air();
        match air.devices.get_mut(&self.identity) {
            Some(device) if device.connected => Ok(f(device)),
            _ => Err(TransportError::NotConnected),
        }
    }

    fn requests(&self) -> Result<mpsc::Sender<PeripheralRequest>, TransportError> {
        self.with_device(|device| device.requests.clone())
    }
}

impl CentralTransport for LoopbackRadio {
    type Link = LoopbackLink;

    fn start_scan(
        &self,
        _services: &[Uuid],
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let pending: Vec<_> = {
            let mut air = self.air();
            air.scanning = true;
            air.devices
                .iter()
                .filter(|(_, device)| !device.connected)
                .filter_map(|(identity, device)| {
                    device
                        .advertising
                        .as_ref()
                        .map(|parameters| advertisements(*identity, parameters))
                })
                .flatten()
                .collect()
        };
        let radio = self.clone();
        async move {
            for advertisement in pending {
                radio.emit(RadioEvent::Advertisement(advertisement)).await;
            }
            Ok(())
        }
    }

    fn stop_scan(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.air().scanning = false;
        async { Ok(()) }
    }

    fn connect(
        &self,
        identity: &DeviceIdentity,
    ) -> impl Future<Output = Result<Self::Link, TransportError>> + Send {
        let identity = *identity;
        let connected = {
            let mut air = self.air();
            let refused = air.refused.contains(&identity);
            match air.devices.get_mut(&identity) {
                Some(device) if !refused && device.advertising.is_some() => {
                    device.connected = true;
                    true
                }
                _ => false,
            }
        };
        let result = if connected {
            tracing::debug!(%identity, "loopback link up");
            Ok(LoopbackLink {
                identity,
                radio: self.clone(),
            })
        } else {
            Err(TransportError::Unreachable(identity))
        };
        async move { result }
    }
}

impl PeerLink for LoopbackLink {
    fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    fn discover_services(
        &self,
        expected: &[Uuid],
    ) -> impl Future<Output = Result<Vec<Uuid>, TransportError>> + Send {
        let result = self.with_device(|device| {
            device
                .services
                .iter()
                .map(|service| service.uuid)
                .filter(|uuid| expected.contains(uuid))
                .collect()
        });
        async move { result }
    }

    fn discover_characteristics(
        &self,
        service: Uuid,
        expected: &[Uuid],
    ) -> impl Future<Output = Result<Vec<CharacteristicHandle>, TransportError>> + Send {
        let result = self.with_device(|device| {
            device
                .services
                .iter()
                .filter(|definition| definition.uuid == service)
                .flat_map(|definition| definition.characteristics.iter())
                .filter(|characteristic| expected.contains(&characteristic.uuid))
                .map(|characteristic| {
                    CharacteristicHandle::new(service, characteristic.uuid, characteristic.capabilities)
                })
                .collect()
        });
        async move { result }
    }

    fn read(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
        let requests = self.requests();
        let characteristic = characteristic.uuid;
        async move {
            let (responder, response) = oneshot::channel();
            requests?
                .send(PeripheralRequest::Read {
                    client: CENTRAL_CLIENT.to_string(),
                    characteristic,
                    offset: 0,
                    responder,
                })
                .await
                .map_err(|_| TransportError::NotConnected)?;
            match response.await {
                Ok(ReadOutcome::Value(value)) => Ok(value),
                Ok(ReadOutcome::Rejected(reason)) => Err(reason.into()),
                Err(_) => Err(TransportError::NotConnected),
            }
        }
    }

    fn write(
        &self,
        characteristic: &CharacteristicHandle,
        value: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let requests = self.requests();
        let characteristic = characteristic.uuid;
        let value = value.to_vec();
        async move {
            let (responder, response) = oneshot::channel();
            requests?
                .send(PeripheralRequest::Write {
                    client: CENTRAL_CLIENT.to_string(),
                    characteristic,
                    value,
                    responder,
                })
                .await
                .map_err(|_| TransportError::NotConnected)?;
            match response.await {
                Ok(WriteOutcome::Accepted) => Ok(()),
                Ok(WriteOutcome::Rejected(reason)) => Err(reason.into()),
                Err(_) => Err(TransportError::NotConnected),
            }
        }
    }

    fn subscribe(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let characteristic = characteristic.uuid;
        let requests = self.with_device(|device| {
            device.subscriptions.insert(characteristic);
            device.requests.clone()
        });
        async move {
            requests?
                .send(PeripheralRequest::Subscription {
                    client: CENTRAL_CLIENT.to_string(),
                    characteristic,
                    subscribed: true,
                })
                .await
                .map_err(|_| TransportError::NotConnected)
        }
    }

    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        let radio = self.radio.clone();
        let identity = self.identity;
        async move {
            if radio.close(identity).await {
                tracing::debug!(%identity, "loopback link closed by central");
            }
            Ok(())
        }
    }
}
