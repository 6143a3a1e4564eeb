//! Central adapter error types.

use vehiclelink_app::ports::TransportError;

/// Errors specific to the btleplug adapter.
#[derive(Debug, thiserror::Error)]
pub enum BtleplugError {
    /// No Bluetooth adapter found on the host.
    #[error("no Bluetooth adapter available")]
    NotAvailable,

    /// The stack reported an error.
    #[error("Bluetooth stack error")]
    Stack(#[from] btleplug::Error),

    /// The characteristic was not among those discovered on the peer.
    #[error("characteristic {uuid} not discovered")]
    CharacteristicNotFound {
        uuid: uuid::Uuid,
    },
}

impl From<BtleplugError> for TransportError {
    fn from(err: BtleplugError) -> Self {
        match err {
            BtleplugError::NotAvailable => Self::Unavailable,
            BtleplugError::Stack(btleplug::Error::NotConnected) => Self::NotConnected,
            other => Self::Backend(Box::new(other)),
        }
    }
}
