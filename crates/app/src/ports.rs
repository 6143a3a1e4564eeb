//! Port definitions: traits that radio adapters implement.
//!
//! Both roles are split along the same line: the application core owns the
//! state machines, while an adapter owns the radio and turns its callbacks
//! into messages on a channel the core drains.

pub mod central;
pub mod peripheral;

pub use central::{CentralTransport, PeerLink, RadioEvent, TransportError};
pub use peripheral::{BackendError, PeripheralBackend, PeripheralRequest};
