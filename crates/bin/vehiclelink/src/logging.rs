//! Subscriber setup for both binaries.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Used when the configured directive does not parse.
pub const FALLBACK_FILTER: &str = "vehiclelink=info";

fn filter(directive: &str) -> (EnvFilter, bool) {
    match EnvFilter::try_new(directive) {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(FALLBACK_FILTER), false),
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(directive: &str) {
    let (filter, valid) = filter(directive);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
    if !valid {
        tracing::warn!(directive, fallback = FALLBACK_FILTER, "invalid log filter");
    }
}
