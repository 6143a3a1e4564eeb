//! Central port: What the central role needs from a radio.
//!
//! The transport never calls back into the application. Everything it
//! observes asynchronously (advertisements, notifications, link drops) is
//! posted as a [`RadioEvent`] on the channel handed to it at construction,
//! and the orchestrator drains that channel from its own loop.

use std::future::Future;

use uuid::Uuid;
use vehiclelink_domain::advertisement::Advertisement;
use vehiclelink_domain::error::BoxError;
use vehiclelink_domain::gatt::{CharacteristicHandle, RejectReason};
use vehiclelink_domain::identity::DeviceIdentity;

/// Something the radio observed outside of a request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// One advertisement (or scan response) while scanning.
    Advertisement(Advertisement),

    /// A subscribed characteristic pushed a new value.
    ValueChanged {
        identity: DeviceIdentity,
        characteristic: Uuid,
        value: Vec<u8>,
    },

    /// The link to a peer went away.
    Disconnected(DeviceIdentity),
}

/// Errors surfaced by a [`CentralTransport`] or one of its links.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No radio adapter is present or powered.
    #[error("no radio adapter available")]
    Unavailable,

    /// The peer is not known to the radio (never seen while scanning).
    #[error("device {0} is not reachable")]
    Unreachable(DeviceIdentity),

    /// The link was closed by either side.
    #[error("peer is not connected")]
    NotConnected,

    /// The peer answered with a protocol-level error status.
    #[error("peer rejected the request: {0}")]
    Rejected(#[from] RejectReason),

    /// Any other failure of the underlying stack.
    #[error("radio backend error")]
    Backend(#[source] BoxError),
}

/// Scanning and connection establishment.
///
/// Implementations live in adapter crates (e.g. `adapter-btleplug`).
pub trait CentralTransport: Send + Sync + 'static {
    /// An established link to one peer.
    type Link: PeerLink;

    /// Start reporting advertisements that carry one of `services`.
    ///
    /// Filtering by the radio is a hint only; the scanner still checks every
    /// advertisement it receives.
    fn start_scan(&self, services: &[Uuid]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stop scanning. Stopping an idle scanner is not an error.
    fn stop_scan(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Open a link to a previously advertised device.
    fn connect(
        &self,
        identity: &DeviceIdentity,
    ) -> impl Future<Output = Result<Self::Link, TransportError>> + Send;
}

/// GATT client operations on an established link.
pub trait PeerLink: Send + Sync {
    /// The device on the other end of this link.
    fn identity(&self) -> DeviceIdentity;

    /// Resolve which of the `expected` services the peer hosts.
    fn discover_services(
        &self,
        expected: &[Uuid],
    ) -> impl Future<Output = Result<Vec<Uuid>, TransportError>> + Send;

    /// Resolve the `expected` characteristics of one service.
    ///
    /// The returned handles carry the capabilities the peer declared.
    fn discover_characteristics(
        &self,
        service: Uuid,
        expected: &[Uuid],
    ) -> impl Future<Output = Result<Vec<CharacteristicHandle>, TransportError>> + Send;

    fn read(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Write with response: resolves once the peer acknowledged.
    fn write(
        &self,
        characteristic: &CharacteristicHandle,
        value: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Enable notifications; values then arrive as [`RadioEvent::ValueChanged`].
    fn subscribe(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
