//! Central orchestrator: the central role's single control loop.
//!
//! `Scanning → Connecting → Active → Disconnected → Scanning`
//!
//! The orchestrator owns the registry and the active connection. Radio
//! callbacks never touch them directly: they arrive as [`RadioEvent`]s on
//! the inbox and are applied here, between steps.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;
use vehiclelink_domain::error::WriteError;
use vehiclelink_domain::session::{ConnectionSession, ConnectionStatus};
use vehiclelink_domain::uuids;
use vehiclelink_domain::vehicle::VehicleCommand;

use crate::ports::{CentralTransport, RadioEvent};
use crate::services::connection_manager::{
    Connection, ConnectionManager, GattProfile, log_value,
};
use crate::services::registry::DeviceRegistry;
use crate::services::scanner::AdvertisementScanner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CentralState {
    Scanning,
    Connecting,
    Active,
    Disconnected,
}

impl fmt::Display for CentralState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scanning => write!(f, "scanning"),
            Self::Connecting => write!(f, "connecting"),
            Self::Active => write!(f, "active"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Service UUID an advertisement must carry to become a candidate.
    pub target_service: Uuid,
    pub profile: GattProfile,
    pub command: VehicleCommand,
    pub command_interval: Duration,
    /// `None` waits on a stalled connect indefinitely.
    pub connect_timeout: Option<Duration>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            target_service: uuids::SENSOR_SERVICE,
            profile: GattProfile::vehicle_sensor(),
            command: VehicleCommand::default(),
            command_interval: Duration::from_secs(1),
            connect_timeout: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Every sender of radio events is gone; nothing can happen any more.
    #[error("radio event channel closed")]
    InboxClosed,
}

pub struct CentralOrchestrator<T: CentralTransport> {
    scanner: AdvertisementScanner<T>,
    manager: ConnectionManager<T>,
    registry: DeviceRegistry,
    inbox: mpsc::Receiver<RadioEvent>,
    settings: OrchestratorSettings,
    state: CentralState,
    active: Option<Connection<T::Link>>,
}

impl<T: CentralTransport> CentralOrchestrator<T> {
    pub fn new(
        transport: Arc<T>,
        inbox: mpsc::Receiver<RadioEvent>,
        settings: OrchestratorSettings,
    ) -> Self {
        let manager = ConnectionManager::new(Arc::clone(&transport), settings.profile.clone())
            .with_connect_timeout(settings.connect_timeout);
        Self {
            scanner: AdvertisementScanner::new(transport),
            manager,
            registry: DeviceRegistry::new(),
            inbox,
            settings,
            state: CentralState::Scanning,
            active: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> CentralState {
        self.state
    }

    #[must_use]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    #[must_use]
    pub fn active_session(&self) -> Option<&ConnectionSession> {
        self.active.as_ref().map(Connection::session)
    }

    /// Run forever.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InboxClosed`] once the radio stops
    /// delivering events.
    pub async fn run(mut self) -> Result<(), OrchestratorError> {
        loop {
            self.step().await?;
        }
    }

    /// Execute the current state once and move to the next one.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InboxClosed`] when scanning waits on a
    /// closed inbox.
    pub async fn step(&mut self) -> Result<CentralState, OrchestratorError> {
        let next = match self.state {
            CentralState::Scanning => self.scan().await?,
            CentralState::Connecting => self.connect_candidates().await,
            CentralState::Active => self.drive().await,
            CentralState::Disconnected => self.teardown().await,
        };
        if next != self.state {
            tracing::info!(from = %self.state, to = %next, "central state transition");
            self.state = next;
        }
        Ok(next)
    }

    async fn scan(&mut self) -> Result<CentralState, OrchestratorError> {
        if let Err(err) = self.scanner.start(self.settings.target_service).await {
            tracing::warn!(error = %err, "failed to start scanning, retrying");
            tokio::time::sleep(self.settings.command_interval).await;
            return Ok(CentralState::Scanning);
        }

        let event = self.inbox.recv().await.ok_or(OrchestratorError::InboxClosed)?;
        self.dispatch(event);
        self.drain_inbox();
        if self.registry.is_empty() {
            return Ok(CentralState::Scanning);
        }

        if let Err(err) = self.scanner.stop().await {
            tracing::warn!(error = %err, "failed to stop scanning");
        }
        Ok(CentralState::Connecting)
    }

    async fn connect_candidates(&mut self) -> CentralState {
        let candidates = self.registry.drain();
        tracing::info!(candidates = candidates.len(), "trying candidates");

        let total = candidates.len();
        for (index, candidate) in candidates.into_iter().enumerate() {
            match self.manager.connect(candidate.identity).await {
                Ok(connection) => {
                    self.registry
                        .track_active(candidate.identity, connection.session().id());
                    tracing::info!(
                        identity = %candidate.identity,
                        name = %candidate.display_name(),
                        "device active"
                    );
                    let discarded = total - index - 1;
                    if discarded > 0 {
                        tracing::info!(discarded, "single connection policy, other candidates dropped");
                    }
                    self.active = Some(connection);
                    self.issue_command().await;
                    return CentralState::Active;
                }
                Err(err) => {
                    tracing::warn!(identity = %err.identity(), error = %err, "candidate skipped");
                }
            }
        }

        tracing::info!("no candidate could be connected");
        CentralState::Scanning
    }

    async fn drive(&mut self) -> CentralState {
        tokio::time::sleep(self.settings.command_interval).await;
        self.drain_inbox();
        if !self.session_connected() {
            return CentralState::Disconnected;
        }
        self.issue_command().await;
        if !self.session_connected() {
            return CentralState::Disconnected;
        }
        CentralState::Active
    }

    async fn teardown(&mut self) -> CentralState {
        if let Some(connection) = self.active.take() {
            let identity = connection.identity();
            self.manager.release(connection).await;
            self.registry.untrack_active(&identity);
        }
        self.registry.clear();
        CentralState::Scanning
    }

    fn session_connected(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|c| c.session().status() == ConnectionStatus::Connected)
    }

    async fn issue_command(&mut self) {
        let Some(connection) = self.active.as_mut() else {
            return;
        };
        let command = self.settings.command;
        let writes = [
            (uuids::SPEED_CHAR, command.speed),
            (uuids::DIRECTION_CHAR, command.direction),
        ];
        let mut delivered = true;
        for (characteristic, value) in writes {
            match self
                .manager
                .write_characteristic(connection, characteristic, value)
                .await
            {
                Ok(()) => {}
                Err(WriteError::Session(err)) => {
                    tracing::info!(error = %err, "session ended while sending command");
                    return;
                }
                Err(err) => {
                    delivered = false;
                    tracing::warn!(%characteristic, error = %err, "command write failed");
                }
            }
        }
        if delivered {
            tracing::info!(speed = command.speed, direction = command.direction, "command sent");
        }
    }

    fn drain_inbox(&mut self) {
        while let Ok(event) = self.inbox.try_recv() {
            self.dispatch(event);
        }
    }

    fn dispatch(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::Advertisement(advertisement) => {
                tracing::trace!(
                    identity = %advertisement.identity,
                    services = ?advertisement.service_uuids,
                    "advertisement"
                );
                if self.registry.refresh(&advertisement, Utc::now()) {
                    tracing::trace!(identity = %advertisement.identity, "candidate refreshed");
                    return;
                }
                if let Some(device) = self.scanner.observe(&advertisement, &self.registry) {
                    tracing::info!(
                        identity = %device.identity,
                        name = %device.display_name(),
                        "device discovered"
                    );
                    self.registry.add(device);
                }
            }
            RadioEvent::ValueChanged {
                identity,
                characteristic,
                value,
            } => {
                let Some(connection) = self.active.as_mut().filter(|c| c.identity() == identity)
                else {
                    tracing::debug!(%identity, "value from inactive device ignored");
                    return;
                };
                log_value(characteristic, &value);
                connection.session_mut().record_value(characteristic, value);
            }
            RadioEvent::Disconnected(identity) => {
                let Some(connection) = self.active.as_mut().filter(|c| c.identity() == identity)
                else {
                    tracing::debug!(%identity, "disconnect of inactive device ignored");
                    return;
                };
                if connection.session_mut().mark_disconnected() {
                    tracing::info!(%identity, "device disconnected");
                }
            }
        }
    }
}
