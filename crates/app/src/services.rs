//! Application services: use-case implementations.
//!
//! Each service struct accepts port trait implementations via generic parameters
//! (constructor injection), keeping this layer decoupled from concrete adapters.

pub mod attribute_store;
pub mod connection_manager;
pub mod orchestrator;
pub mod peripheral_profile;
pub mod peripheral_server;
pub mod registry;
pub mod scanner;
pub mod sensor_simulator;
pub mod session_handler;
pub mod vehicle_control;

#[cfg(test)]
mod test_support;
