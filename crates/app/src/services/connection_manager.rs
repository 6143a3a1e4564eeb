//! Connection manager: turns a discovered identity into a usable session.
//!
//! Connect, discover the profile's services, resolve their characteristics,
//! seed readable values and subscribe to notifying ones. The session is
//! handed back together with the transport link that serves it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;
use vehiclelink_domain::error::{ConnectError, SessionError, WriteError};
use vehiclelink_domain::gatt::RejectReason;
use vehiclelink_domain::identity::DeviceIdentity;
use vehiclelink_domain::session::ConnectionSession;
use vehiclelink_domain::uuids;
use vehiclelink_domain::vehicle::Temperature;

use crate::ports::{CentralTransport, PeerLink, TransportError};

/// One service the central looks for on a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequirement {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
    /// A missing required service fails the connection. A required service
    /// that is present but resolves none of its characteristics does not.
    pub required: bool,
}

/// The services a central expects, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattProfile {
    pub services: Vec<ServiceRequirement>,
}

impl GattProfile {
    /// Temperature is required, vehicle control is optional.
    #[must_use]
    pub fn vehicle_sensor() -> Self {
        Self {
            services: vec![
                ServiceRequirement {
                    uuid: uuids::ENVIRONMENTAL_SENSING_SERVICE,
                    characteristics: vec![uuids::TEMPERATURE_CHAR],
                    required: true,
                },
                ServiceRequirement {
                    uuid: uuids::VEHICLE_CONTROL_SERVICE,
                    characteristics: vec![uuids::SPEED_CHAR, uuids::DIRECTION_CHAR],
                    required: false,
                },
            ],
        }
    }

    fn service_uuids(&self) -> Vec<Uuid> {
        self.services.iter().map(|s| s.uuid).collect()
    }
}

/// A session together with the link it runs on.
pub struct Connection<L> {
    session: ConnectionSession,
    link: L,
}

impl<L: PeerLink> Connection<L> {
    #[must_use]
    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ConnectionSession {
        &mut self.session
    }

    #[must_use]
    pub fn identity(&self) -> DeviceIdentity {
        self.session.identity()
    }
}

/// Raised when the connect deadline passes.
#[derive(Debug, thiserror::Error)]
#[error("connect attempt timed out after {0:?}")]
pub struct ConnectTimeout(pub Duration);

pub struct ConnectionManager<T> {
    transport: Arc<T>,
    profile: GattProfile,
    connect_timeout: Option<Duration>,
}

async fn before<F: Future>(deadline: Option<Instant>, future: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, future).await.ok(),
        None => Some(future.await),
    }
}

impl<T: CentralTransport> ConnectionManager<T> {
    pub fn new(transport: Arc<T>, profile: GattProfile) -> Self {
        Self {
            transport,
            profile,
            connect_timeout: None,
        }
    }

    /// Bound the whole connect and discovery pipeline.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Connect to `identity` and resolve the profile.
    ///
    /// # Errors
    ///
    /// - [`ConnectError::ConnectFailed`] when the link cannot be opened or
    ///   the connect timeout expires.
    /// - [`ConnectError::DiscoveryFailed`] when no expected service, or a
    ///   required one, is found.
    /// - [`ConnectError::NoMatchingCharacteristics`] when services were found
    ///   but no characteristic could be resolved.
    ///
    /// The link is released before any error is returned.
    #[tracing::instrument(skip(self))]
    pub async fn connect(&self, identity: DeviceIdentity) -> Result<Connection<T::Link>, ConnectError> {
        let deadline = self.connect_timeout.map(|timeout| Instant::now() + timeout);
        let timed_out = |timeout: Option<Duration>| ConnectError::ConnectFailed {
            identity,
            source: Box::new(ConnectTimeout(timeout.unwrap_or_default())),
        };

        let mut session = ConnectionSession::connecting(identity);
        tracing::info!("connecting");
        let link = match before(deadline, self.transport.connect(&identity)).await {
            Some(Ok(link)) => link,
            Some(Err(err)) => {
                return Err(ConnectError::ConnectFailed {
                    identity,
                    source: Box::new(err),
                });
            }
            None => return Err(timed_out(self.connect_timeout)),
        };

        let discovered = match before(deadline, self.discover(&link, &mut session)).await {
            Some(result) => result,
            None => Err(timed_out(self.connect_timeout)),
        };
        match discovered {
            Ok(()) => {
                tracing::info!(
                    session = %session.id(),
                    characteristics = session.characteristics().len(),
                    "connected"
                );
                Ok(Connection { session, link })
            }
            Err(err) => {
                if let Err(release) = link.disconnect().await {
                    tracing::warn!(error = %release, "failed to release link");
                }
                Err(err)
            }
        }
    }

    async fn discover(
        &self,
        link: &T::Link,
        session: &mut ConnectionSession,
    ) -> Result<(), ConnectError> {
        let identity = session.identity();
        let expected = self.profile.service_uuids();
        let found = link.discover_services(&expected).await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "service discovery failed");
            Vec::new()
        });
        if found.is_empty() {
            return Err(ConnectError::DiscoveryFailed {
                identity,
                missing: expected,
            });
        }

        let mut missing: Vec<Uuid> = self
            .profile
            .services
            .iter()
            .filter(|s| s.required && !found.contains(&s.uuid))
            .map(|s| s.uuid)
            .collect();
        let mut handles = Vec::new();
        for requirement in self.profile.services.iter().filter(|s| found.contains(&s.uuid)) {
            let characteristics = match link
                .discover_characteristics(requirement.uuid, &requirement.characteristics)
                .await
            {
                Ok(characteristics) => characteristics,
                Err(err) => {
                    tracing::warn!(service = %requirement.uuid, error = %err, "characteristic discovery failed");
                    if requirement.required {
                        missing.push(requirement.uuid);
                    }
                    continue;
                }
            };

            for mut characteristic in characteristics {
                if characteristic.can_read() {
                    match link.read(&characteristic).await {
                        Ok(value) => {
                            log_value(characteristic.uuid, &value);
                            characteristic.value = Some(value);
                        }
                        Err(err) => {
                            tracing::warn!(characteristic = %characteristic.uuid, error = %err, "initial read failed, skipping");
                            continue;
                        }
                    }
                }
                let subscribed = if characteristic.can_notify() {
                    link.subscribe(&characteristic).await
                } else {
                    Ok(())
                };
                if let Err(err) = subscribed {
                    tracing::warn!(characteristic = %characteristic.uuid, error = %err, "subscription failed");
                }
                handles.push(characteristic);
            }
        }

        session.complete_discovery(handles, &missing);
        if !missing.is_empty() {
            return Err(ConnectError::DiscoveryFailed { identity, missing });
        }
        if !session.is_usable() {
            return Err(ConnectError::NoMatchingCharacteristics { identity });
        }
        Ok(())
    }

    /// Write a single byte to a characteristic of the session.
    ///
    /// # Errors
    ///
    /// - [`WriteError::Session`] once the session is disconnected; a link
    ///   that reports the peer gone also marks the session disconnected.
    /// - [`WriteError::NotFound`] when discovery never resolved `characteristic`.
    /// - [`WriteError::WriteRejected`] when the peer answers with an error.
    #[tracing::instrument(skip(self, connection), fields(identity = %connection.identity()))]
    pub async fn write_characteristic(
        &self,
        connection: &mut Connection<T::Link>,
        characteristic: Uuid,
        value: u8,
    ) -> Result<(), WriteError> {
        connection.session.ensure_connected()?;
        let handle = connection
            .session
            .characteristic(characteristic)
            .cloned()
            .ok_or(WriteError::NotFound { characteristic })?;
        if !handle.can_write() {
            return Err(WriteError::WriteRejected {
                characteristic,
                source: Box::new(RejectReason::WriteNotPermitted),
            });
        }

        match connection.link.write(&handle, &[value]).await {
            Ok(()) => {
                connection.session.record_value(characteristic, vec![value]);
                Ok(())
            }
            Err(TransportError::NotConnected) => {
                connection.session.mark_disconnected();
                Err(SessionError::Disconnected {
                    identity: connection.identity(),
                }
                .into())
            }
            Err(err) => Err(WriteError::WriteRejected {
                characteristic,
                source: Box::new(err),
            }),
        }
    }

    /// Tear the connection down and release the link.
    #[tracing::instrument(skip_all, fields(identity = %connection.identity()))]
    pub async fn release(&self, mut connection: Connection<T::Link>) {
        connection.session.mark_disconnected();
        if let Err(err) = connection.link.disconnect().await {
            tracing::debug!(error = %err, "link already closed");
        }
        tracing::info!(session = %connection.session.id(), "session released");
    }
}

/// Log a characteristic value the central knows how to decode.
pub(crate) fn log_value(characteristic: Uuid, value: &[u8]) {
    if characteristic != uuids::TEMPERATURE_CHAR {
        tracing::debug!(%characteristic, ?value, "value received");
        return;
    }
    match Temperature::from_le_bytes(value) {
        Ok(temperature) => tracing::info!(%temperature, "current temperature"),
        Err(err) => tracing::warn!(error = %err, "malformed temperature value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{ScriptedRadio, identity};
    use vehiclelink_domain::session::ConnectionStatus;

    fn manager(radio: &ScriptedRadio) -> ConnectionManager<ScriptedRadio> {
        ConnectionManager::new(Arc::new(radio.clone()), GattProfile::vehicle_sensor())
    }

    #[tokio::test]
    async fn should_resolve_profile_seed_values_and_subscribe() {
        let radio = ScriptedRadio::vehicle_peer();

        let connection = manager(&radio).connect(identity(1)).await.unwrap();

        let session = connection.session();
        assert_eq!(session.status(), ConnectionStatus::Connected);
        assert!(session.is_usable());
        assert_eq!(session.characteristics().len(), 3);
        assert_eq!(
            session.characteristic(uuids::TEMPERATURE_CHAR).unwrap().value,
            Some(2340_i16.to_le_bytes().to_vec())
        );
        assert!(radio
            .log()
            .contains(&format!("subscribe {}", uuids::TEMPERATURE_CHAR)));
    }

    #[tokio::test]
    async fn should_fail_with_connect_failed_when_peer_refuses() {
        let radio = ScriptedRadio::vehicle_peer();
        radio.edit(|s| {
            s.refused.insert(identity(1));
        });

        let result = manager(&radio).connect(identity(1)).await;

        assert!(matches!(result, Err(ConnectError::ConnectFailed { identity: id, .. }) if id == identity(1)));
    }

    #[tokio::test]
    async fn should_fail_discovery_when_no_expected_service_exists() {
        let radio = ScriptedRadio::vehicle_peer();
        radio.edit(|s| s.services = vec![Uuid::from_u128(1)]);

        let result = manager(&radio).connect(identity(1)).await;

        assert!(matches!(result, Err(ConnectError::DiscoveryFailed { .. })));
        assert!(radio.log().contains(&format!("disconnect {}", identity(1))));
    }

    #[tokio::test]
    async fn should_fail_discovery_when_required_service_is_missing() {
        let radio = ScriptedRadio::vehicle_peer();
        radio.edit(|s| s.services = vec![uuids::VEHICLE_CONTROL_SERVICE]);

        let result = manager(&radio).connect(identity(1)).await;

        match result {
            Err(ConnectError::DiscoveryFailed { missing, .. }) => {
                assert_eq!(missing, vec![uuids::ENVIRONMENTAL_SENSING_SERVICE]);
            }
            other => panic!("unexpected result: {:?}", other.map(|c| c.identity())),
        }
    }

    #[tokio::test]
    async fn should_report_no_matching_characteristics() {
        let radio = ScriptedRadio::vehicle_peer();
        radio.edit(|s| s.characteristics.clear());

        let result = manager(&radio).connect(identity(1)).await;

        assert!(matches!(
            result,
            Err(ConnectError::NoMatchingCharacteristics { .. })
        ));
    }

    #[tokio::test]
    async fn should_skip_characteristic_whose_initial_read_fails() {
        let radio = ScriptedRadio::vehicle_peer();
        radio.edit(|s| {
            s.failing_reads.insert(uuids::TEMPERATURE_CHAR);
        });

        let connection = manager(&radio).connect(identity(1)).await.unwrap();

        assert!(connection.session().characteristic(uuids::TEMPERATURE_CHAR).is_none());
        assert!(connection.session().characteristic(uuids::SPEED_CHAR).is_some());
    }

    #[tokio::test]
    async fn should_accept_required_service_present_without_its_characteristic() {
        let radio = ScriptedRadio::vehicle_peer();
        radio.edit(|s| s.characteristics.retain(|c| c.uuid != uuids::TEMPERATURE_CHAR));

        let connection = manager(&radio).connect(identity(1)).await.unwrap();

        assert!(connection.session().is_usable());
        assert!(connection.session().characteristic(uuids::TEMPERATURE_CHAR).is_none());
        assert!(connection.session().characteristic(uuids::DIRECTION_CHAR).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_stalled_connect() {
        let radio = ScriptedRadio::vehicle_peer();
        radio.edit(|s| s.connect_delay = Some(Duration::from_secs(60)));
        let manager = manager(&radio).with_connect_timeout(Some(Duration::from_secs(5)));

        let result = manager.connect(identity(1)).await;

        assert!(matches!(result, Err(ConnectError::ConnectFailed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn should_wait_for_slow_connect_without_timeout() {
        let radio = ScriptedRadio::vehicle_peer();
        radio.edit(|s| s.connect_delay = Some(Duration::from_secs(60)));

        let result = manager(&radio).connect(identity(1)).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn should_write_single_byte_to_resolved_characteristic() {
        let radio = ScriptedRadio::vehicle_peer();
        let manager = manager(&radio);
        let mut connection = manager.connect(identity(1)).await.unwrap();

        manager
            .write_characteristic(&mut connection, uuids::SPEED_CHAR, 25)
            .await
            .unwrap();

        assert!(radio.log().contains(&format!("write {} [25]", uuids::SPEED_CHAR)));
        assert_eq!(
            connection.session().characteristic(uuids::SPEED_CHAR).unwrap().value,
            Some(vec![25])
        );
    }

    #[tokio::test]
    async fn should_return_not_found_for_unresolved_characteristic() {
        let radio = ScriptedRadio::vehicle_peer();
        radio.edit(|s| s.services = vec![uuids::ENVIRONMENTAL_SENSING_SERVICE]);
        let manager = manager(&radio);
        let mut connection = manager.connect(identity(1)).await.unwrap();

        let result = manager
            .write_characteristic(&mut connection, uuids::SPEED_CHAR, 25)
            .await;

        assert!(matches!(result, Err(WriteError::NotFound { characteristic }) if characteristic == uuids::SPEED_CHAR));
    }

    #[tokio::test]
    async fn should_mark_session_disconnected_when_link_is_gone() {
        let radio = ScriptedRadio::vehicle_peer();
        let manager = manager(&radio);
        let mut connection = manager.connect(identity(1)).await.unwrap();
        radio.edit(|s| {
            s.dropped.insert(identity(1));
        });

        let first = manager
            .write_characteristic(&mut connection, uuids::SPEED_CHAR, 25)
            .await;
        let second = manager
            .write_characteristic(&mut connection, uuids::DIRECTION_CHAR, 90)
            .await;

        assert!(matches!(first, Err(WriteError::Session(_))));
        assert!(matches!(second, Err(WriteError::Session(_))));
        assert_eq!(connection.session().status(), ConnectionStatus::Disconnected);
    }
}
