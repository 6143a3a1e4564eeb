//! # vehiclelink-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that radio adapters must implement:
//!   - `CentralTransport` / `PeerLink`: Scan, connect, discover, read, write, subscribe
//!   - `PeripheralBackend`: Register services, advertise, notify
//! - Define the **inbound message types** both roles consume:
//!   - `RadioEvent`: Advertisements, notifications and link drops for the central
//!   - `PeripheralRequest`: Reads, writes and subscriptions for the peripheral
//! - Provide the **use-cases**:
//!   - `AttributeStore`, `PeripheralSessionHandler`, `PeripheralServer`: The peripheral role
//!   - `AdvertisementScanner`, `DeviceRegistry`, `ConnectionManager`, `CentralOrchestrator`: The central role
//!
//! ## Dependency rule
//! Depends on `vehiclelink-domain` only (plus `tokio` for channels and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod ports;
pub mod services;
