//! Peripheral server: the single loop that owns the attribute store.
//!
//! Requests from centrals and sensor ticks are serialised through one
//! `select!`, so the store never needs a lock.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use vehiclelink_domain::clock;
use vehiclelink_domain::gatt::AttributeHandle;

use crate::ports::{PeripheralBackend, PeripheralRequest};
use crate::services::attribute_store::AttributeStore;
use crate::services::sensor_simulator::SensorSimulator;
use crate::services::session_handler::PeripheralSessionHandler;

/// Periodic temperature updates pushed through the store.
#[derive(Debug, Clone)]
pub struct SensorFeed {
    pub handle: AttributeHandle,
    pub simulator: SensorSimulator,
    pub interval: Duration,
    /// Current time characteristic refreshed on the same tick.
    pub current_time: Option<AttributeHandle>,
}

pub struct PeripheralServer<B> {
    store: AttributeStore<B>,
    handler: PeripheralSessionHandler,
    requests: mpsc::Receiver<PeripheralRequest>,
    sensor: Option<SensorFeed>,
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl<B: PeripheralBackend> PeripheralServer<B> {
    #[must_use]
    pub fn new(store: AttributeStore<B>, requests: mpsc::Receiver<PeripheralRequest>) -> Self {
        Self {
            store,
            handler: PeripheralSessionHandler::new(),
            requests,
            sensor: None,
        }
    }

    #[must_use]
    pub fn with_sensor(mut self, feed: SensorFeed) -> Self {
        self.sensor = Some(feed);
        self
    }

    /// Serve until the request channel closes, then hand the store back.
    pub async fn run(mut self) -> AttributeStore<B> {
        let mut ticker = self.sensor.as_ref().map(|feed| {
            let mut ticker = tokio::time::interval(feed.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                biased;
                request = self.requests.recv() => match request {
                    Some(request) => self.handler.handle(&mut self.store, request),
                    None => {
                        tracing::info!("request channel closed, peripheral server stopping");
                        break;
                    }
                },
                () = next_tick(&mut ticker) => self.refresh_sensor().await,
            }
        }
        self.store
    }

    async fn refresh_sensor(&mut self) {
        let Some(feed) = self.sensor.as_mut() else {
            return;
        };
        let handle = feed.handle;
        let current_time = feed.current_time;
        let reading = feed.simulator.advance();
        match self
            .store
            .update_value(handle, reading.to_le_bytes().to_vec())
            .await
        {
            Ok(notified) => tracing::info!(temperature = %reading, notified, "sensor updated"),
            Err(err) => tracing::warn!(error = %err, "sensor update failed"),
        }

        let Some(current_time) = current_time else {
            return;
        };
        let now = chrono::Utc::now();
        let value = clock::encode_current_time(&now, 0).to_vec();
        match self.store.update_value(current_time, value).await {
            Ok(notified) => tracing::debug!(%now, notified, "current time updated"),
            Err(err) => tracing::warn!(error = %err, "current time update failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::BackendError;
    use crate::services::peripheral_profile::{
        ProfileSettings, advertising_parameters, define_sample_profile,
    };
    use crate::services::vehicle_control::VehicleControl;
    use std::future::Future;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;
    use uuid::Uuid;
    use vehiclelink_domain::gatt::{
        AdvertisingParameters, ReadOutcome, ServiceDefinition, WriteOutcome,
    };
    use vehiclelink_domain::uuids;
    use vehiclelink_domain::vehicle::{Temperature, VehicleState};

    #[derive(Default)]
    struct NotifyLog {
        sent: Mutex<Vec<(Uuid, Vec<u8>)>>,
    }

    impl PeripheralBackend for NotifyLog {
        fn add_service(
            &self,
            _service: &ServiceDefinition,
        ) -> impl Future<Output = Result<(), BackendError>> + Send {
            async { Ok(()) }
        }

        fn start_advertising(
            &self,
            _parameters: &AdvertisingParameters,
        ) -> impl Future<Output = Result<(), BackendError>> + Send {
            async { Ok(()) }
        }

        fn notify(
            &self,
            characteristic: Uuid,
            value: &[u8],
        ) -> impl Future<Output = Result<(), BackendError>> + Send {
            self.sent
                .lock()
                .unwrap()
                .push((characteristic, value.to_vec()));
            async { Ok(()) }
        }
    }

    async fn published(
        backend: Arc<NotifyLog>,
        control: &VehicleControl,
    ) -> (AttributeStore<Arc<NotifyLog>>, AttributeHandle) {
        let settings = ProfileSettings::default();
        let mut store = AttributeStore::new(backend, 128);
        let profile = define_sample_profile(&mut store, &settings, control).unwrap();
        store.publish(&advertising_parameters(&settings)).await.unwrap();
        (store, profile.temperature)
    }

    #[tokio::test(start_paused = true)]
    async fn should_notify_subscribers_on_every_sensor_tick() {
        let backend = Arc::new(NotifyLog::default());
        let control = VehicleControl::new();
        let (store, temperature) = published(Arc::clone(&backend), &control).await;
        let (tx, rx) = mpsc::channel(8);
        tx.send(PeripheralRequest::Subscription {
            client: "central".to_string(),
            characteristic: uuids::TEMPERATURE_CHAR,
            subscribed: true,
        })
        .await
        .unwrap();

        let server = PeripheralServer::new(store, rx).with_sensor(SensorFeed {
            handle: temperature,
            simulator: SensorSimulator::new(23.4, 1.3),
            interval: Duration::from_secs(5),
            current_time: None,
        });
        let task = tokio::spawn(server.run());
        tokio::time::sleep(Duration::from_secs(11)).await;
        drop(tx);
        let store = task.await.unwrap();

        let sent: Vec<i16> = backend
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, value)| Temperature::from_le_bytes(value).unwrap().hundredths())
            .collect();
        assert_eq!(sent, vec![2470, 2600, 2730]);
        assert_eq!(store.value(temperature).unwrap(), &2730_i16.to_le_bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_notify_without_subscribers() {
        let backend = Arc::new(NotifyLog::default());
        let control = VehicleControl::new();
        let (store, temperature) = published(Arc::clone(&backend), &control).await;
        let (tx, rx) = mpsc::channel(8);

        let server = PeripheralServer::new(store, rx).with_sensor(SensorFeed {
            handle: temperature,
            simulator: SensorSimulator::new(23.4, 1.3),
            interval: Duration::from_secs(5),
            current_time: None,
        });
        let task = tokio::spawn(server.run());
        tokio::time::sleep(Duration::from_secs(6)).await;
        drop(tx);
        let store = task.await.unwrap();

        assert!(backend.sent.lock().unwrap().is_empty());
        assert_eq!(store.value(temperature).unwrap(), &2600_i16.to_le_bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn should_push_current_time_to_subscribers_on_sensor_tick() {
        let backend = Arc::new(NotifyLog::default());
        let control = VehicleControl::new();
        let settings = ProfileSettings::default();
        let mut store = AttributeStore::new(Arc::clone(&backend), 128);
        let profile = define_sample_profile(&mut store, &settings, &control).unwrap();
        store.publish(&advertising_parameters(&settings)).await.unwrap();
        let (tx, rx) = mpsc::channel(8);
        tx.send(PeripheralRequest::Subscription {
            client: "central".to_string(),
            characteristic: uuids::CURRENT_TIME_CHAR,
            subscribed: true,
        })
        .await
        .unwrap();

        let server = PeripheralServer::new(store, rx).with_sensor(SensorFeed {
            handle: profile.temperature,
            simulator: SensorSimulator::new(23.4, 1.3),
            interval: Duration::from_secs(5),
            current_time: Some(profile.current_time),
        });
        let task = tokio::spawn(server.run());
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(tx);
        let store = task.await.unwrap();

        let sent = backend.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, uuids::CURRENT_TIME_CHAR);
        assert_eq!(sent[0].1.len(), clock::CURRENT_TIME_WIDTH);
        assert_eq!(sent[0].1[9], 0);
        assert_eq!(store.value(profile.current_time).unwrap(), sent[0].1.as_slice());
    }

    #[tokio::test]
    async fn should_apply_control_writes_and_answer_each_request() {
        let backend = Arc::new(NotifyLog::default());
        let control = VehicleControl::new();
        let (store, _) = published(backend, &control).await;
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(PeripheralServer::new(store, rx).run());

        let (speed_tx, speed_rx) = oneshot::channel();
        tx.send(PeripheralRequest::Write {
            client: "central".to_string(),
            characteristic: uuids::SPEED_CHAR,
            value: vec![25],
            responder: speed_tx,
        })
        .await
        .unwrap();
        let (bad_tx, bad_rx) = oneshot::channel();
        tx.send(PeripheralRequest::Write {
            client: "central".to_string(),
            characteristic: uuids::DIRECTION_CHAR,
            value: vec![],
            responder: bad_tx,
        })
        .await
        .unwrap();
        let (read_tx, read_rx) = oneshot::channel();
        tx.send(PeripheralRequest::Read {
            client: "central".to_string(),
            characteristic: uuids::BATTERY_LEVEL_CHAR,
            offset: 0,
            responder: read_tx,
        })
        .await
        .unwrap();

        assert_eq!(speed_rx.await.unwrap(), WriteOutcome::Accepted);
        assert!(!bad_rx.await.unwrap().is_accepted());
        assert_eq!(read_rx.await.unwrap(), ReadOutcome::Value(vec![94]));
        assert_eq!(
            control.current(),
            VehicleState {
                speed: Some(25),
                direction: None
            }
        );

        drop(tx);
        task.await.unwrap();
    }
}
