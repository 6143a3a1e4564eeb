//! Scripted central radio shared by the connection manager and orchestrator tests.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;
use vehiclelink_domain::gatt::{Capabilities, CharacteristicHandle};
use vehiclelink_domain::identity::{Address, AddressType, DeviceIdentity};
use vehiclelink_domain::uuids;

use crate::ports::{CentralTransport, PeerLink, TransportError};

pub(crate) fn identity(last: u8) -> DeviceIdentity {
    DeviceIdentity::new(Address::new([0xC0, 0, 0, 0, 0, last]), AddressType::Public)
}

#[derive(Default)]
pub(crate) struct Script {
    pub services: Vec<Uuid>,
    pub characteristics: Vec<CharacteristicHandle>,
    pub values: HashMap<Uuid, Vec<u8>>,
    pub refused: HashSet<DeviceIdentity>,
    pub dropped: HashSet<DeviceIdentity>,
    pub failing_reads: HashSet<Uuid>,
    pub connect_delay: Option<Duration>,
    pub log: Vec<String>,
}

/// Every peer shares the same scripted GATT table.
#[derive(Clone, Default)]
pub(crate) struct ScriptedRadio {
    pub script: Arc<Mutex<Script>>,
}

impl ScriptedRadio {
    /// Peer hosting the environmental sensing and vehicle-control services.
    pub fn vehicle_peer() -> Self {
        let radio = Self::default();
        {
            let mut script = radio.script.lock().unwrap();
            script.services = vec![
                uuids::ENVIRONMENTAL_SENSING_SERVICE,
                uuids::VEHICLE_CONTROL_SERVICE,
            ];
            script.characteristics = vec![
                CharacteristicHandle::new(
                    uuids::ENVIRONMENTAL_SENSING_SERVICE,
                    uuids::TEMPERATURE_CHAR,
                    Capabilities::READ | Capabilities::NOTIFY,
                ),
                CharacteristicHandle::new(
                    uuids::VEHICLE_CONTROL_SERVICE,
                    uuids::SPEED_CHAR,
                    Capabilities::WRITE,
                ),
                CharacteristicHandle::new(
                    uuids::VEHICLE_CONTROL_SERVICE,
                    uuids::DIRECTION_CHAR,
                    Capabilities::WRITE,
                ),
            ];
            script
                .values
                .insert(uuids::TEMPERATURE_CHAR, 2340_i16.to_le_bytes().to_vec());
        }
        radio
    }

    pub fn edit(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.script.lock().unwrap());
    }

    pub fn log(&self) -> Vec<String> {
        self.script.lock().unwrap().log.clone()
    }

    fn record(&self, entry: String) {
        self.script.lock().unwrap().log.push(entry);
    }
}

pub(crate) struct ScriptedLink {
    identity: DeviceIdentity,
    radio: ScriptedRadio,
}

impl ScriptedLink {
    fn check_connected(&self) -> Result<(), TransportError> {
        if self.radio.script.lock().unwrap().dropped.contains(&self.identity) {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }
}

impl CentralTransport for ScriptedRadio {
    type Link = ScriptedLink;

    fn start_scan(
        &self,
        _services: &[Uuid],
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.record("start_scan".to_string());
        async { Ok(()) }
    }

    fn stop_scan(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.record("stop_scan".to_string());
        async { Ok(()) }
    }

    fn connect(
        &self,
        identity: &DeviceIdentity,
    ) -> impl Future<Output = Result<Self::Link, TransportError>> + Send {
        let identity = *identity;
        self.record(format!("connect {identity}"));
        let (refused, delay) = {
            let script = self.script.lock().unwrap();
            (script.refused.contains(&identity), script.connect_delay)
        };
        let radio = self.clone();
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if refused {
                return Err(TransportError::Unreachable(identity));
            }
            Ok(ScriptedLink { identity, radio })
        }
    }
}

impl PeerLink for ScriptedLink {
    fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    fn discover_services(
        &self,
        expected: &[Uuid],
    ) -> impl Future<Output = Result<Vec<Uuid>, TransportError>> + Send {
        let found: Vec<Uuid> = self
            .radio
            .script
            .lock()
            .unwrap()
            .services
            .iter()
            .filter(|s| expected.contains(s))
            .copied()
            .collect();
        async move { Ok(found) }
    }

    fn discover_characteristics(
        &self,
        service: Uuid,
        expected: &[Uuid],
    ) -> impl Future<Output = Result<Vec<CharacteristicHandle>, TransportError>> + Send {
        let found: Vec<CharacteristicHandle> = self
            .radio
            .script
            .lock()
            .unwrap()
            .characteristics
            .iter()
            .filter(|c| c.service_uuid == service && expected.contains(&c.uuid))
            .cloned()
            .collect();
        async move { Ok(found) }
    }

    fn read(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
        let uuid = characteristic.uuid;
        let result = self.check_connected().and_then(|()| {
            let script = self.radio.script.lock().unwrap();
            if script.failing_reads.contains(&uuid) {
                return Err(TransportError::Backend("read failed".into()));
            }
            Ok(script.values.get(&uuid).cloned().unwrap_or_default())
        });
        async move { result }
    }

    fn write(
        &self,
        characteristic: &CharacteristicHandle,
        value: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let result = self.check_connected();
        if result.is_ok() {
            self.radio
                .record(format!("write {} {value:?}", characteristic.uuid));
        }
        async move { result }
    }

    fn subscribe(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.radio
            .record(format!("subscribe {}", characteristic.uuid));
        async { Ok(()) }
    }

    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.radio.record(format!("disconnect {}", self.identity));
        async { Ok(()) }
    }
}
