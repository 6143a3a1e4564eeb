//! Scanning and connection establishment on the host adapter.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt as _};
use uuid::Uuid;
use vehiclelink_app::ports::{CentralTransport, RadioEvent, TransportError};
use vehiclelink_domain::advertisement::Advertisement;
use vehiclelink_domain::identity::DeviceIdentity;

use crate::error::BtleplugError;
use crate::link::BtleplugLink;
use crate::advertisement_of;

type CentralEvents = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

/// Peers seen while scanning, by identity.
#[derive(Clone, Default)]
struct Peers(Arc<Mutex<HashMap<DeviceIdentity, PeripheralId>>>);

impl Peers {
    fn lock(&self) -> MutexGuard<'_, HashMap<DeviceIdentity, PeripheralId>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn id_of(&self, identity: &DeviceIdentity) -> Option<PeripheralId> {
        self.lock().get(identity).cloned()
    }

    fn identity_of(&self, id: &PeripheralId) -> Option<DeviceIdentity> {
        self.lock()
            .iter()
            .find(|(_, known)| *known == id)
            .map(|(identity, _)| *identity)
    }
}

/// The central role on the first Bluetooth adapter of the host.
pub struct BtleplugCentral {
    adapter: Adapter,
    peers: Peers,
    scanning: Arc<AtomicBool>,
    events: mpsc::Sender<RadioEvent>,
    pump: JoinHandle<()>,
}

impl BtleplugCentral {
    /// Take the first adapter and start forwarding its events to `events`.
    ///
    /// # Errors
    ///
    /// Returns [`BtleplugError::NotAvailable`] when the host has no adapter,
    /// or [`BtleplugError::Stack`] when the stack cannot be opened.
    pub async fn open(events: mpsc::Sender<RadioEvent>) -> Result<Self, BtleplugError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters.into_iter().next().ok_or(BtleplugError::NotAvailable)?;
        let stream = adapter.events().await?;

        let peers = Peers::default();
        let scanning = Arc::new(AtomicBool::new(false));
        let pump = tokio::spawn(pump(
            adapter.clone(),
            stream,
            peers.clone(),
            Arc::clone(&scanning),
            events.clone(),
        ));
        tracing::info!("Bluetooth adapter opened");

        Ok(Self {
            adapter,
            peers,
            scanning,
            events,
            pump,
        })
    }
}

impl Drop for BtleplugCentral {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn pump(
    adapter: Adapter,
    mut stream: CentralEvents,
    peers: Peers,
    scanning: Arc<AtomicBool>,
    events: mpsc::Sender<RadioEvent>,
) {
    while let Some(event) = stream.next().await {
        let forwarded = match event {
            CentralEvent::DeviceDiscovered(id)
            | CentralEvent::DeviceUpdated(id)
            | CentralEvent::ServicesAdvertisement { id, .. } => {
                if !scanning.load(Ordering::Relaxed) {
                    continue;
                }
                advertised(&adapter, &peers, id).await.map(RadioEvent::Advertisement)
            }
            CentralEvent::DeviceDisconnected(id) => peers.identity_of(&id).map(RadioEvent::Disconnected),
            _ => None,
        };
        let Some(forwarded) = forwarded else {
            continue;
        };
        if events.send(forwarded).await.is_err() {
            tracing::debug!("central event receiver dropped, stopping event pump");
            break;
        }
    }
}

async fn advertised(
    adapter: &Adapter,
    peers: &Peers,
    id: PeripheralId,
) -> Option<Advertisement> {
    let peripheral = adapter.peripheral(&id).await.ok()?;
    let properties = match peripheral.properties().await {
        Ok(Some(properties)) => properties,
        Ok(None) => return None,
        Err(err) => {
            tracing::trace!(%err, "no properties for advertising peer");
            return None;
        }
    };
    let advertisement = advertisement_of(&properties);
    peers.lock().insert(advertisement.identity, id);
    tracing::trace!(
        identity = %advertisement.identity,
        name = ?advertisement.local_name,
        "advertisement"
    );
    Some(advertisement)
}

impl CentralTransport for BtleplugCentral {
    type Link = BtleplugLink;

    fn start_scan(
        &self,
        services: &[Uuid],
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let adapter = self.adapter.clone();
        let filter = ScanFilter {
            services: services.to_vec(),
        };
        let scanning = Arc::clone(&self.scanning);
        async move {
            scanning.store(true, Ordering::Relaxed);
            adapter
                .start_scan(filter)
                .await
                .map_err(|err| TransportError::from(BtleplugError::from(err)))
        }
    }

    fn stop_scan(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        let adapter = self.adapter.clone();
        self.scanning.store(false, Ordering::Relaxed);
        async move {
            adapter
                .stop_scan()
                .await
                .map_err(|err| TransportError::from(BtleplugError::from(err)))
        }
    }

    fn connect(
        &self,
        identity: &DeviceIdentity,
    ) -> impl Future<Output = Result<Self::Link, TransportError>> + Send {
        let identity = *identity;
        let id = self.peers.id_of(&identity);
        let adapter = self.adapter.clone();
        let events = self.events.clone();
        async move {
            let id = id.ok_or(TransportError::Unreachable(identity))?;
            let peripheral = adapter
                .peripheral(&id)
                .await
                .map_err(|_| TransportError::Unreachable(identity))?;
            peripheral
                .connect()
                .await
                .map_err(|err| TransportError::from(BtleplugError::from(err)))?;
            BtleplugLink::open(identity, peripheral, events)
                .await
                .map_err(TransportError::from)
        }
    }
}
