//! Advertisement scanner: turns raw advertisements into discoveries.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use vehiclelink_domain::advertisement::{Advertisement, DiscoveredDevice};

use crate::ports::{CentralTransport, TransportError};
use crate::services::registry::DeviceRegistry;

/// Filters advertisements on one service UUID.
///
/// Restartable: after [`stop`](Self::stop), a later [`start`](Self::start)
/// resumes reporting as if the scanner were new.
pub struct AdvertisementScanner<T> {
    transport: Arc<T>,
    filter: Option<Uuid>,
}

impl<T: CentralTransport> AdvertisementScanner<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            filter: None,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.filter.is_some()
    }

    /// Start scanning for devices advertising `service`.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the radio cannot scan. The scanner
    /// stays stopped in that case.
    #[tracing::instrument(skip(self))]
    pub async fn start(&mut self, service: Uuid) -> Result<(), TransportError> {
        if self.filter == Some(service) {
            return Ok(());
        }
        self.transport.start_scan(&[service]).await?;
        self.filter = Some(service);
        tracing::info!("scanning started");
        Ok(())
    }

    /// Stop scanning. A stopped scanner reports nothing.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the radio refuses to stop. The scanner
    /// is considered stopped regardless.
    pub async fn stop(&mut self) -> Result<(), TransportError> {
        if self.filter.take().is_none() {
            return Ok(());
        }
        tracing::info!("scanning stopped");
        self.transport.stop_scan().await
    }

    /// Decide whether an advertisement is a new discovery.
    ///
    /// Returns `None` while stopped, when the advertisement lacks the target
    /// service, or when the identity is already a candidate or active.
    #[must_use]
    pub fn observe(
        &self,
        advertisement: &Advertisement,
        registry: &DeviceRegistry,
    ) -> Option<DiscoveredDevice> {
        let filter = self.filter?;
        if !advertisement.advertises(filter) {
            tracing::trace!(identity = %advertisement.identity, "advertisement without target service");
            return None;
        }
        let identity = &advertisement.identity;
        if registry.contains(identity) || registry.is_active(identity) {
            return None;
        }
        Some(DiscoveredDevice::from_advertisement(advertisement, Utc::now()))
    }
}
