//! Peripheral session handler: answers requests from connected centrals.
//!
//! Every read and write is answered exactly once: the responder is consumed
//! by the reply, and a handler that panics still produces
//! [`RejectReason::HandlerFailed`].

use std::panic::{self, AssertUnwindSafe};

use uuid::Uuid;
use vehiclelink_domain::gatt::{Capabilities, RejectReason, WriteOutcome};

use crate::ports::{PeripheralBackend, PeripheralRequest};
use crate::services::attribute_store::AttributeStore;

/// Dispatches [`PeripheralRequest`]s against an [`AttributeStore`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PeripheralSessionHandler;

impl PeripheralSessionHandler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Decide the outcome of an inbound write.
    ///
    /// Accepted payloads are stored as the characteristic's new value.
    #[tracing::instrument(skip(self, store, payload), fields(len = payload.len()))]
    pub fn on_write_requested<B: PeripheralBackend>(
        &self,
        store: &mut AttributeStore<B>,
        characteristic: Uuid,
        payload: &[u8],
    ) -> WriteOutcome {
        let Some(definition) = store.definition(characteristic) else {
            return WriteOutcome::Rejected(RejectReason::UnknownCharacteristic);
        };
        if !definition.capabilities.contains(Capabilities::WRITE) {
            return WriteOutcome::Rejected(RejectReason::WriteNotPermitted);
        }

        let outcome = match definition.behavior.clone() {
            Some(behavior) => panic::catch_unwind(AssertUnwindSafe(|| behavior.on_write(payload)))
                .unwrap_or_else(|_| {
                    tracing::error!("write handler panicked");
                    WriteOutcome::Rejected(RejectReason::HandlerFailed)
                }),
            None => WriteOutcome::Accepted,
        };

        if outcome.is_accepted() {
            store.store_written(characteristic, payload);
        }
        outcome
    }

    /// Answer one request.
    pub fn handle<B: PeripheralBackend>(
        &self,
        store: &mut AttributeStore<B>,
        request: PeripheralRequest,
    ) {
        match request {
            PeripheralRequest::Read {
                client,
                characteristic,
                offset,
                responder,
            } => {
                let outcome = store.read(characteristic, offset);
                tracing::debug!(client, %characteristic, offset, ?outcome, "read");
                if responder.send(outcome).is_err() {
                    tracing::debug!(client, "central went away before read response");
                }
            }
            PeripheralRequest::Write {
                client,
                characteristic,
                value,
                responder,
            } => {
                let outcome = self.on_write_requested(store, characteristic, &value);
                if let WriteOutcome::Rejected(reason) = outcome {
                    tracing::warn!(client, %characteristic, %reason, "write rejected");
                }
                if responder.send(outcome).is_err() {
                    tracing::debug!(client, "central went away before write response");
                }
            }
            PeripheralRequest::Subscription {
                client,
                characteristic,
                subscribed,
            } => match store.set_subscription(characteristic, &client, subscribed) {
                Ok(true) => tracing::info!(client, %characteristic, subscribed, "subscription changed"),
                Ok(false) => {}
                Err(err) => tracing::warn!(client, error = %err, "subscription ignored"),
            },
        }
    }
}
