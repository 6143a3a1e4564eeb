//! Peripheral side of the loopback radio.

use std::future::Future;

use uuid::Uuid;
use vehiclelink_app::ports::{BackendError, PeripheralBackend, RadioEvent};
use vehiclelink_domain::gatt::{AdvertisingParameters, ServiceDefinition};
use vehiclelink_domain::identity::DeviceIdentity;

use crate::{LoopbackRadio, SimulatedDevice, advertisements};

/// Backend handle of one simulated peripheral.
#[derive(Clone)]
pub struct LoopbackPeripheral {
    identity: DeviceIdentity,
    radio: LoopbackRadio,
}

impl LoopbackPeripheral {
    pub(crate) fn new(identity: DeviceIdentity, radio: LoopbackRadio) -> Self {
        Self { identity, radio }
    }

    #[must_use]
    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    fn with_device<R>(&self, f: impl FnOnce(&mut SimulatedDevice) -> R) -> Result<R, BackendError> {
        let mut air = self.radio.air();
        air.devices
            .get_mut(&self.identity)
            .map(f)
            .ok_or(BackendError::Closed)
    }
}

impl PeripheralBackend for LoopbackPeripheral {
    fn add_service(
        &self,
        service: &ServiceDefinition,
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        let result = self.with_device(|device| device.services.push(service.clone()));
        async move { result }
    }

    fn start_advertising(
        &self,
        parameters: &AdvertisingParameters,
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        let scanning = self.radio.is_scanning();
        let identity = self.identity;
        let result = self.with_device(|device| {
            device.advertising = Some(parameters.clone());
            scanning && !device.connected
        });
        let pending = match &result {
            Ok(true) => advertisements(identity, parameters).to_vec(),
            _ => Vec::new(),
        };
        let radio = self.radio.clone();
        async move {
            result?;
            for advertisement in pending {
                radio.emit(RadioEvent::Advertisement(advertisement)).await;
            }
            Ok(())
        }
    }

    fn notify(
        &self,
        characteristic: Uuid,
        value: &[u8],
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        let identity = self.identity;
        let deliver = self.with_device(|device| {
            device.connected && device.subscriptions.contains(&characteristic)
        });
        let value = value.to_vec();
        let radio = self.radio.clone();
        async move {
            if deliver? {
                radio
                    .emit(RadioEvent::ValueChanged {
                        identity,
                        characteristic,
                        value,
                    })
                    .await;
            }
            Ok(())
        }
    }
}
