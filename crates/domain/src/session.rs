//! Connection session: A central's view of one connected peripheral.

use std::fmt;

use uuid::Uuid;

use crate::error::SessionError;
use crate::gatt::CharacteristicHandle;
use crate::id::SessionId;
use crate::identity::DeviceIdentity;

/// Lifecycle of a [`ConnectionSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Everything a central knows about one connection attempt.
///
/// Invariant: the characteristic set is non-empty only when discovery of
/// every required service succeeded. A partially discovered session is
/// flagged unusable and holds no characteristics.
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    id: SessionId,
    identity: DeviceIdentity,
    status: ConnectionStatus,
    characteristics: Vec<CharacteristicHandle>,
    usable: bool,
}

impl ConnectionSession {
    /// Start a session for a connect attempt in progress.
    #[must_use]
    pub fn connecting(identity: DeviceIdentity) -> Self {
        Self {
            id: SessionId::new(),
            identity,
            status: ConnectionStatus::Connecting,
            characteristics: Vec::new(),
            usable: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Resolved characteristics, in discovery order.
    #[must_use]
    pub fn characteristics(&self) -> &[CharacteristicHandle] {
        &self.characteristics
    }

    /// Record the outcome of service/characteristic discovery.
    ///
    /// When `missing_required` is non-empty the session is flagged unusable
    /// and the resolved characteristics are dropped.
    pub fn complete_discovery(
        &mut self,
        characteristics: Vec<CharacteristicHandle>,
        missing_required: &[Uuid],
    ) {
        if missing_required.is_empty() {
            self.usable = !characteristics.is_empty();
            self.characteristics = characteristics;
            self.status = ConnectionStatus::Connected;
        } else {
            self.usable = false;
            self.characteristics.clear();
        }
    }

    /// Whether the session may be driven by the command loop.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.usable && self.status == ConnectionStatus::Connected
    }

    /// Find a resolved characteristic by UUID.
    #[must_use]
    pub fn characteristic(&self, uuid: Uuid) -> Option<&CharacteristicHandle> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }

    /// Update the cached value of a characteristic.
    ///
    /// Returns `false` when the session has no characteristic with this UUID.
    pub fn record_value(&mut self, uuid: Uuid, value: Vec<u8>) -> bool {
        match self.characteristics.iter_mut().find(|c| c.uuid == uuid) {
            Some(characteristic) => {
                characteristic.value = Some(value);
                true
            }
            None => false,
        }
    }

    /// Transition to [`ConnectionStatus::Disconnected`].
    ///
    /// Returns `true` only for the call that performed the transition, so a
    /// disconnect is observed at most once.
    pub fn mark_disconnected(&mut self) -> bool {
        if self.status == ConnectionStatus::Disconnected {
            return false;
        }
        self.status = ConnectionStatus::Disconnected;
        true
    }

    /// Fail with [`SessionError::Disconnected`] unless still connected.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Disconnected`] once the peer has gone away.
    pub fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.status == ConnectionStatus::Disconnected {
            return Err(SessionError::Disconnected {
                identity: self.identity,
            });
        }
        Ok(())
    }
}
