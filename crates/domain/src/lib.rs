//! # vehiclelink-domain
//!
//! Pure domain model for the vehiclelink BLE sample.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error taxonomy, timestamps
//! - Define **device identities** and **advertisements** observed by a central
//! - Define **connection sessions** and the **characteristic handles** they own
//! - Define **GATT service/characteristic definitions** exposed by a peripheral
//! - Define the **UUID contract** shared by both roles
//! - Define the **wire encodings** (speed, direction, temperature, current time)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or radio crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;

pub mod advertisement;
pub mod clock;
pub mod gatt;
pub mod identity;
pub mod session;
pub mod uuids;
pub mod vehicle;
