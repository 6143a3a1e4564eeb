//! GATT client operations on one connected peer.

use std::future::Future;

use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt as _;
use uuid::Uuid;
use vehiclelink_app::ports::{PeerLink, RadioEvent, TransportError};
use vehiclelink_domain::gatt::CharacteristicHandle;
use vehiclelink_domain::identity::DeviceIdentity;

use crate::capabilities_of;
use crate::error::BtleplugError;

fn stack_error(err: btleplug::Error) -> TransportError {
    BtleplugError::from(err).into()
}

/// Find a discovered characteristic by service and characteristic UUID.
fn find_characteristic(
    peripheral: &Peripheral,
    handle: &CharacteristicHandle,
) -> Result<Characteristic, BtleplugError> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == handle.uuid && c.service_uuid == handle.service_uuid)
        .ok_or(BtleplugError::CharacteristicNotFound { uuid: handle.uuid })
}

/// A connected btleplug peripheral.
///
/// Value notifications are forwarded as [`RadioEvent::ValueChanged`] for as
/// long as the link lives.
pub struct BtleplugLink {
    identity: DeviceIdentity,
    peripheral: Peripheral,
    notifications: JoinHandle<()>,
}

impl BtleplugLink {
    pub(crate) async fn open(
        identity: DeviceIdentity,
        peripheral: Peripheral,
        events: mpsc::Sender<RadioEvent>,
    ) -> Result<Self, BtleplugError> {
        let mut stream = peripheral.notifications().await?;
        let notifications = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                let event = RadioEvent::ValueChanged {
                    identity,
                    characteristic: notification.uuid,
                    value: notification.value,
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
            tracing::debug!(%identity, "notification stream ended");
        });
        Ok(Self {
            identity,
            peripheral,
            notifications,
        })
    }
}

impl Drop for BtleplugLink {
    fn drop(&mut self) {
        self.notifications.abort();
    }
}

impl PeerLink for BtleplugLink {
    fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    fn discover_services(
        &self,
        expected: &[Uuid],
    ) -> impl Future<Output = Result<Vec<Uuid>, TransportError>> + Send {
        let peripheral = self.peripheral.clone();
        let expected = expected.to_vec();
        async move {
            peripheral.discover_services().await.map_err(stack_error)?;
            Ok(peripheral
                .services()
                .into_iter()
                .map(|service| service.uuid)
                .filter(|uuid| expected.contains(uuid))
                .collect())
        }
    }

    fn discover_characteristics(
        &self,
        service: Uuid,
        expected: &[Uuid],
    ) -> impl Future<Output = Result<Vec<CharacteristicHandle>, TransportError>> + Send {
        let handles = self
            .peripheral
            .services()
            .into_iter()
            .filter(|candidate| candidate.uuid == service)
            .flat_map(|candidate| candidate.characteristics)
            .filter(|characteristic| expected.contains(&characteristic.uuid))
            .map(|characteristic| {
                CharacteristicHandle::new(
                    service,
                    characteristic.uuid,
                    capabilities_of(characteristic.properties),
                )
            })
            .collect();
        async move { Ok(handles) }
    }

    fn read(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
        let peripheral = self.peripheral.clone();
        let found = find_characteristic(&self.peripheral, characteristic);
        async move {
            let characteristic = found?;
            peripheral.read(&characteristic).await.map_err(stack_error)
        }
    }

    fn write(
        &self,
        characteristic: &CharacteristicHandle,
        value: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let peripheral = self.peripheral.clone();
        let found = find_characteristic(&self.peripheral, characteristic);
        let value = value.to_vec();
        async move {
            let characteristic = found?;
            peripheral
                .write(&characteristic, &value, WriteType::WithResponse)
                .await
                .map_err(stack_error)
        }
    }

    fn subscribe(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let peripheral = self.peripheral.clone();
        let found = find_characteristic(&self.peripheral, characteristic);
        async move {
            let characteristic = found?;
            peripheral.subscribe(&characteristic).await.map_err(stack_error)
        }
    }

    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        let peripheral = self.peripheral.clone();
        let identity = self.identity;
        async move {
            peripheral.disconnect().await.map_err(stack_error)?;
            tracing::debug!(%identity, "link closed");
            Ok(())
        }
    }
}
