//! Error taxonomy shared by both BLE roles.
//!
//! Each failure family has its own enum so callers can branch on the kind of
//! failure instead of inspecting messages:
//!
//! - [`SetupError`]: Fatal to peripheral startup
//! - [`ConnectError`]: A candidate device could not become a session
//! - [`WriteError`]: A single command write failed
//! - [`SessionError`]: The session reached its terminal state
//! - [`PayloadError`]: A value did not match its wire encoding
//! - [`AttributeError`]: A runtime lookup in the attribute table failed

use uuid::Uuid;

use crate::gatt::{AttributeHandle, ServiceHandle};
use crate::identity::DeviceIdentity;

/// Boxed error coming from an adapter, kept opaque at the domain boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while the peripheral defines its services.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// A service or characteristic with this UUID already exists.
    #[error("attribute {uuid} is already defined")]
    Conflict { uuid: Uuid },

    /// The service handle does not belong to this attribute table.
    #[error("unknown service handle {0}")]
    UnknownService(ServiceHandle),

    /// No characteristic with this UUID is defined.
    #[error("characteristic {uuid} is not defined")]
    UnknownCharacteristic { uuid: Uuid },

    /// The backend could not hold or publish the definition.
    #[error("peripheral backend failure")]
    BackendFailure(#[from] BackendFailure),
}

/// Details about a [`SetupError::BackendFailure`].
#[derive(Debug, thiserror::Error)]
pub enum BackendFailure {
    /// The attribute table has no room left.
    #[error("attribute table exhausted: {requested} attributes requested, {available} available")]
    ResourceExhausted { requested: usize, available: usize },

    /// The radio backend refused the operation.
    #[error("radio backend refused the operation")]
    Backend(#[source] BoxError),
}

/// Reasons a discovered device could not become a usable session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The transport-level connection could not be established.
    #[error("failed to connect to {identity}")]
    ConnectFailed {
        identity: DeviceIdentity,
        #[source]
        source: BoxError,
    },

    /// None of the expected services, or a required one, could be resolved.
    #[error("service discovery failed on {identity}, missing {missing:?}")]
    DiscoveryFailed {
        identity: DeviceIdentity,
        missing: Vec<Uuid>,
    },

    /// Services were found but none of them carried a usable characteristic.
    #[error("no matching characteristics on {identity}")]
    NoMatchingCharacteristics { identity: DeviceIdentity },
}

impl ConnectError {
    /// The device the failed attempt targeted.
    #[must_use]
    pub fn identity(&self) -> DeviceIdentity {
        match self {
            Self::ConnectFailed { identity, .. }
            | Self::DiscoveryFailed { identity, .. }
            | Self::NoMatchingCharacteristics { identity } => *identity,
        }
    }
}

/// Errors raised when writing a characteristic on an active session.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The session never resolved a characteristic with this UUID.
    #[error("characteristic {characteristic} not found in session")]
    NotFound { characteristic: Uuid },

    /// The peer answered with a non-success status.
    #[error("write to {characteristic} rejected")]
    WriteRejected {
        characteristic: Uuid,
        #[source]
        source: BoxError,
    },

    /// The session is no longer connected.
    #[error("session unusable")]
    Session(#[from] SessionError),
}

/// Terminal session states surfaced as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The peer is no longer connected.
    #[error("device {identity} disconnected")]
    Disconnected { identity: DeviceIdentity },
}

/// A raw value does not match the expected wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    /// Wrong number of bytes for the primitive width.
    #[error("payload must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Runtime lookups in a peripheral attribute table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AttributeError {
    /// No characteristic is registered under this handle.
    #[error("unknown attribute handle {0}")]
    UnknownHandle(AttributeHandle),

    /// No characteristic is registered under this UUID.
    #[error("unknown characteristic {0}")]
    UnknownCharacteristic(Uuid),
}
