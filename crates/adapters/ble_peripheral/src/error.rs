//! Peripheral adapter error types.

use vehiclelink_app::ports::BackendError;

/// Errors specific to the ble-peripheral adapter.
#[derive(Debug, thiserror::Error)]
pub enum PeripheralAdapterError {
    /// The radio stayed powered off for the whole power-up wait.
    #[error("Bluetooth radio is not powered")]
    NotPowered,

    /// The stack rejected an operation.
    #[error("peripheral stack error: {0}")]
    Stack(String),

    /// The worker thread could not be started.
    #[error("failed to start peripheral worker")]
    Worker(#[source] std::io::Error),

    /// The worker thread exited.
    #[error("peripheral worker stopped")]
    Stopped,
}

impl PeripheralAdapterError {
    pub(crate) fn stack(err: impl std::fmt::Display) -> Self {
        Self::Stack(err.to_string())
    }
}

impl From<PeripheralAdapterError> for BackendError {
    fn from(err: PeripheralAdapterError) -> Self {
        match err {
            PeripheralAdapterError::NotPowered => Self::Unavailable,
            PeripheralAdapterError::Stopped => Self::Closed,
            other => Self::Backend(Box::new(other)),
        }
    }
}
