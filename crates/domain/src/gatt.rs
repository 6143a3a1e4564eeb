//! GATT model: Characteristic capabilities, handles, and the declarative
//! service/characteristic definitions a peripheral exposes.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

bitflags::bitflags! {
    /// Operations a characteristic permits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u8 {
        const READ = 0b001;
        const WRITE = 0b010;
        const NOTIFY = 0b100;
    }
}

impl Capabilities {
    /// Number of attribute-table slots a characteristic with these
    /// capabilities occupies: declaration + value, plus the client
    /// configuration descriptor when notifications are possible.
    #[must_use]
    pub fn attribute_slots(self) -> usize {
        if self.contains(Self::NOTIFY) { 3 } else { 2 }
    }
}

macro_rules! define_handle {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u16);

        impl $name {
            /// Wrap a raw attribute-table handle.
            #[must_use]
            pub const fn new(raw: u16) -> Self {
                Self(raw)
            }

            /// The raw attribute-table handle.
            #[must_use]
            pub const fn raw(self) -> u16 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{:04X}", self.0)
            }
        }
    };
}

define_handle!(
    /// Handle of a service declaration in a peripheral attribute table.
    ServiceHandle
);

define_handle!(
    /// Handle of a characteristic value in a peripheral attribute table.
    AttributeHandle
);

/// A characteristic resolved on a remote peripheral during discovery.
///
/// Identity fields are fixed at discovery; only the cached value changes
/// (initial read, then value-changed notifications).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicHandle {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub capabilities: Capabilities,
    pub value: Option<Vec<u8>>,
}

impl CharacteristicHandle {
    #[must_use]
    pub fn new(service_uuid: Uuid, uuid: Uuid, capabilities: Capabilities) -> Self {
        Self {
            uuid,
            service_uuid,
            capabilities,
            value: None,
        }
    }

    #[must_use]
    pub fn can_read(&self) -> bool {
        self.capabilities.contains(Capabilities::READ)
    }

    #[must_use]
    pub fn can_write(&self) -> bool {
        self.capabilities.contains(Capabilities::WRITE)
    }

    #[must_use]
    pub fn can_notify(&self) -> bool {
        self.capabilities.contains(Capabilities::NOTIFY)
    }
}

/// Why a peripheral refused a read or write at the protocol level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    /// The payload size does not match the characteristic's primitive width.
    #[error("invalid attribute value length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("write not permitted")]
    WriteNotPermitted,

    #[error("read not permitted")]
    ReadNotPermitted,

    #[error("unknown characteristic")]
    UnknownCharacteristic,

    #[error("invalid offset")]
    InvalidOffset,

    /// The characteristic handler failed before producing an outcome.
    #[error("handler failed")]
    HandlerFailed,
}

/// Result of a write request, sent back to the initiating central.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Accepted,
    Rejected(RejectReason),
}

impl WriteOutcome {
    #[must_use]
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Result of a read request, sent back to the initiating central.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Value(Vec<u8>),
    Rejected(RejectReason),
}

/// Role-specific logic attached to a characteristic at definition time.
///
/// Implementations must not block: they are called from the peripheral's
/// single request loop.
pub trait CharacteristicBehavior: Send + Sync {
    /// Decode and apply an inbound write.
    fn on_write(&self, payload: &[u8]) -> WriteOutcome;

    /// Observe a value update made by the peripheral itself.
    fn on_value_changed(&self, _value: &[u8]) {}
}

/// Declarative description of one characteristic.
#[derive(Clone)]
pub struct CharacteristicDefinition {
    pub uuid: Uuid,
    pub capabilities: Capabilities,
    pub value: Vec<u8>,
    pub user_description: Option<String>,
    pub behavior: Option<Arc<dyn CharacteristicBehavior>>,
}

impl CharacteristicDefinition {
    #[must_use]
    pub fn new(uuid: Uuid, capabilities: Capabilities) -> Self {
        Self {
            uuid,
            capabilities,
            value: Vec::new(),
            user_description: None,
            behavior: None,
        }
    }

    /// Initial (or static, for read-only characteristics) value.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = value.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.user_description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_behavior(mut self, behavior: Arc<dyn CharacteristicBehavior>) -> Self {
        self.behavior = Some(behavior);
        self
    }
}

impl fmt::Debug for CharacteristicDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CharacteristicDefinition")
            .field("uuid", &self.uuid)
            .field("capabilities", &self.capabilities)
            .field("value", &self.value)
            .field("user_description", &self.user_description)
            .field("has_behavior", &self.behavior.is_some())
            .finish()
    }
}

/// Declarative description of a service, handed to the radio backend.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    pub uuid: Uuid,
    pub primary: bool,
    pub characteristics: Vec<CharacteristicDefinition>,
}

/// How the peripheral announces itself once its services are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingParameters {
    pub local_name: String,
    pub service_uuids: Vec<Uuid>,
    pub connectable: bool,
    pub discoverable: bool,
}
