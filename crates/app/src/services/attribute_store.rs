//! Attribute store: the peripheral's local GATT table.
//!
//! Services and characteristics are defined up front, then published to the
//! radio in one step. After publication the store stays the single owner of
//! characteristic values: reads are answered from it, accepted writes land in
//! it, and value updates fan out as notifications to subscribed centrals.

use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;
use vehiclelink_domain::error::{AttributeError, BackendFailure, SetupError};
use vehiclelink_domain::gatt::{
    AdvertisingParameters, AttributeHandle, Capabilities, CharacteristicDefinition, ReadOutcome,
    RejectReason, ServiceDefinition, ServiceHandle,
};

use crate::ports::PeripheralBackend;

/// Attribute slots available when no capacity is configured.
pub const DEFAULT_ATTRIBUTE_CAPACITY: usize = 128;

/// Handles are 16-bit and `0x0000` is reserved.
const MAX_ATTRIBUTE_CAPACITY: usize = u16::MAX as usize - 1;

struct ServiceEntry {
    handle: ServiceHandle,
    uuid: Uuid,
    primary: bool,
    characteristics: Vec<AttributeHandle>,
}

struct CharacteristicEntry {
    definition: CharacteristicDefinition,
    subscribers: BTreeSet<String>,
}

/// Handles allocated by [`AttributeStore::define`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinedService {
    pub handle: ServiceHandle,
    /// Value handles, in definition order.
    pub characteristics: Vec<AttributeHandle>,
}

/// Local GATT table backed by a [`PeripheralBackend`].
pub struct AttributeStore<B> {
    backend: B,
    capacity: usize,
    next_handle: u16,
    services: Vec<ServiceEntry>,
    characteristics: BTreeMap<AttributeHandle, CharacteristicEntry>,
    published: bool,
}

fn characteristic_slots(definition: &CharacteristicDefinition) -> usize {
    definition.capabilities.attribute_slots() + usize::from(definition.user_description.is_some())
}

impl<B: PeripheralBackend> AttributeStore<B> {
    /// Create an empty table holding at most `capacity` attributes.
    pub fn new(backend: B, capacity: usize) -> Self {
        Self {
            backend,
            capacity: capacity.min(MAX_ATTRIBUTE_CAPACITY),
            next_handle: 1,
            services: Vec::new(),
            characteristics: BTreeMap::new(),
            published: false,
        }
    }

    /// Attribute slots still free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.capacity - self.used()
    }

    fn used(&self) -> usize {
        usize::from(self.next_handle - 1)
    }

    #[must_use]
    pub fn is_published(&self) -> bool {
        self.published
    }

    fn uuid_in_use(&self, uuid: Uuid) -> bool {
        self.services.iter().any(|s| s.uuid == uuid)
            || self
                .characteristics
                .values()
                .any(|c| c.definition.uuid == uuid)
    }

    fn reserve(&mut self, slots: usize) -> Result<u16, BackendFailure> {
        let available = self.available();
        let exhausted = BackendFailure::ResourceExhausted {
            requested: slots,
            available,
        };
        if slots > available {
            return Err(exhausted);
        }
        let width = u16::try_from(slots).map_err(|_| exhausted)?;
        let start = self.next_handle;
        self.next_handle += width;
        Ok(start)
    }

    /// Define an empty primary service.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Conflict`] if the UUID is already defined, or
    /// [`BackendFailure::ResourceExhausted`] when the table is full. The
    /// store is left unchanged on error.
    #[tracing::instrument(skip(self))]
    pub fn define_service(&mut self, uuid: Uuid) -> Result<ServiceHandle, SetupError> {
        if self.uuid_in_use(uuid) {
            return Err(SetupError::Conflict { uuid });
        }
        let handle = ServiceHandle::new(self.reserve(1)?);
        self.services.push(ServiceEntry {
            handle,
            uuid,
            primary: true,
            characteristics: Vec::new(),
        });
        tracing::debug!(%handle, "service defined");
        Ok(handle)
    }

    /// Attach a characteristic to a previously defined service.
    ///
    /// Returns the handle of the characteristic value attribute.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::UnknownService`] for a handle not issued by this
    /// store, [`SetupError::Conflict`] for a duplicate UUID, or
    /// [`BackendFailure::ResourceExhausted`] when the table is full. The
    /// store is left unchanged on error.
    #[tracing::instrument(skip(self, definition), fields(uuid = %definition.uuid))]
    pub fn define_characteristic(
        &mut self,
        service: ServiceHandle,
        definition: CharacteristicDefinition,
    ) -> Result<AttributeHandle, SetupError> {
        let index = self
            .services
            .iter()
            .position(|s| s.handle == service)
            .ok_or(SetupError::UnknownService(service))?;
        if self.uuid_in_use(definition.uuid) {
            return Err(SetupError::Conflict {
                uuid: definition.uuid,
            });
        }
        let declaration = self.reserve(characteristic_slots(&definition))?;
        let handle = AttributeHandle::new(declaration + 1);
        self.characteristics.insert(
            handle,
            CharacteristicEntry {
                definition,
                subscribers: BTreeSet::new(),
            },
        );
        self.services[index].characteristics.push(handle);
        tracing::debug!(%handle, "characteristic defined");
        Ok(handle)
    }

    /// Define a whole service, all or nothing.
    ///
    /// # Errors
    ///
    /// Same as [`define_service`](Self::define_service) and
    /// [`define_characteristic`](Self::define_characteristic). Everything is
    /// checked before the first attribute is allocated, so a failure never
    /// leaves a half-built service behind.
    pub fn define(&mut self, definition: ServiceDefinition) -> Result<DefinedService, SetupError> {
        let mut seen = BTreeSet::new();
        let uuids = std::iter::once(definition.uuid)
            .chain(definition.characteristics.iter().map(|c| c.uuid));
        for uuid in uuids {
            if self.uuid_in_use(uuid) || !seen.insert(uuid) {
                return Err(SetupError::Conflict { uuid });
            }
        }

        let requested = 1 + definition
            .characteristics
            .iter()
            .map(characteristic_slots)
            .sum::<usize>();
        let available = self.available();
        if requested > available {
            return Err(BackendFailure::ResourceExhausted {
                requested,
                available,
            }
            .into());
        }

        let handle = self.define_service(definition.uuid)?;
        if let Some(entry) = self.services.last_mut() {
            entry.primary = definition.primary;
        }
        let characteristics = definition
            .characteristics
            .into_iter()
            .map(|characteristic| self.define_characteristic(handle, characteristic))
            .collect::<Result<_, _>>()?;
        Ok(DefinedService {
            handle,
            characteristics,
        })
    }

    /// Snapshot of the table in definition order, with current values.
    #[must_use]
    pub fn service_definitions(&self) -> Vec<ServiceDefinition> {
        self.services
            .iter()
            .map(|service| ServiceDefinition {
                uuid: service.uuid,
                primary: service.primary,
                characteristics: service
                    .characteristics
                    .iter()
                    .filter_map(|handle| self.characteristics.get(handle))
                    .map(|entry| entry.definition.clone())
                    .collect(),
            })
            .collect()
    }

    /// Register every service with the backend, then start advertising.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::BackendFailure`] on the first refusal; nothing
    /// after it is attempted and the store is not marked as published.
    #[tracing::instrument(skip_all, fields(local_name = %parameters.local_name))]
    pub async fn publish(&mut self, parameters: &AdvertisingParameters) -> Result<(), SetupError> {
        for service in self.service_definitions() {
            self.backend
                .add_service(&service)
                .await
                .map_err(|err| BackendFailure::Backend(Box::new(err)))?;
            tracing::debug!(uuid = %service.uuid, "service registered");
        }
        self.backend
            .start_advertising(parameters)
            .await
            .map_err(|err| BackendFailure::Backend(Box::new(err)))?;
        self.published = true;
        tracing::info!(services = self.services.len(), "advertising started");
        Ok(())
    }

    /// Handle of the characteristic with this UUID.
    #[must_use]
    pub fn handle_of(&self, uuid: Uuid) -> Option<AttributeHandle> {
        self.characteristics
            .iter()
            .find(|(_, entry)| entry.definition.uuid == uuid)
            .map(|(handle, _)| *handle)
    }

    /// Definition (including the current value) of the characteristic with this UUID.
    #[must_use]
    pub fn definition(&self, uuid: Uuid) -> Option<&CharacteristicDefinition> {
        self.characteristics
            .values()
            .map(|entry| &entry.definition)
            .find(|definition| definition.uuid == uuid)
    }

    /// Current value of a characteristic.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::UnknownHandle`] for a handle not issued by this store.
    pub fn value(&self, handle: AttributeHandle) -> Result<&[u8], AttributeError> {
        self.characteristics
            .get(&handle)
            .map(|entry| entry.definition.value.as_slice())
            .ok_or(AttributeError::UnknownHandle(handle))
    }

    /// Answer a read request starting at `offset`.
    #[must_use]
    pub fn read(&self, uuid: Uuid, offset: usize) -> ReadOutcome {
        let Some(definition) = self.definition(uuid) else {
            return ReadOutcome::Rejected(RejectReason::UnknownCharacteristic);
        };
        if !definition.capabilities.contains(Capabilities::READ) {
            return ReadOutcome::Rejected(RejectReason::ReadNotPermitted);
        }
        match definition.value.get(offset..) {
            Some(tail) => ReadOutcome::Value(tail.to_vec()),
            None => ReadOutcome::Rejected(RejectReason::InvalidOffset),
        }
    }

    /// Store a value a central wrote. No notification is sent back.
    pub(crate) fn store_written(&mut self, uuid: Uuid, value: &[u8]) {
        if let Some(entry) = self
            .characteristics
            .values_mut()
            .find(|entry| entry.definition.uuid == uuid)
        {
            entry.definition.value = value.to_vec();
        }
    }

    /// Record a CCCD write from `client`.
    ///
    /// Returns `true` when the subscriber set changed.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::UnknownCharacteristic`] for an unknown UUID.
    pub fn set_subscription(
        &mut self,
        uuid: Uuid,
        client: &str,
        subscribed: bool,
    ) -> Result<bool, AttributeError> {
        let entry = self
            .characteristics
            .values_mut()
            .find(|entry| entry.definition.uuid == uuid)
            .ok_or(AttributeError::UnknownCharacteristic(uuid))?;
        if !entry.definition.capabilities.contains(Capabilities::NOTIFY) {
            tracing::debug!(%uuid, client, "subscription to non-notifying characteristic ignored");
            return Ok(false);
        }
        let changed = if subscribed {
            entry.subscribers.insert(client.to_owned())
        } else {
            entry.subscribers.remove(client)
        };
        Ok(changed)
    }

    /// Number of centrals subscribed to a characteristic.
    #[must_use]
    pub fn subscriber_count(&self, handle: AttributeHandle) -> usize {
        self.characteristics
            .get(&handle)
            .map_or(0, |entry| entry.subscribers.len())
    }

    /// Replace a characteristic value and notify subscribers.
    ///
    /// Notifications go out only once the store is published and at least
    /// one central subscribed. A failed notification is logged and does not
    /// roll the value back. Returns `true` when a notification was sent.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::UnknownHandle`] for a handle not issued by this store.
    pub async fn update_value(
        &mut self,
        handle: AttributeHandle,
        value: Vec<u8>,
    ) -> Result<bool, AttributeError> {
        let published = self.published;
        let entry = self
            .characteristics
            .get_mut(&handle)
            .ok_or(AttributeError::UnknownHandle(handle))?;
        entry.definition.value = value;
        if let Some(behavior) = &entry.definition.behavior {
            behavior.on_value_changed(&entry.definition.value);
        }

        let notify = published
            && entry.definition.capabilities.contains(Capabilities::NOTIFY)
            && !entry.subscribers.is_empty();
        if !notify {
            return Ok(false);
        }

        let uuid = entry.definition.uuid;
        let value = entry.definition.value.clone();
        match self.backend.notify(uuid, &value).await {
            Ok(()) => Ok(true),
            Err(err) => {
                tracing::warn!(error = %err, %uuid, "notification failed");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::BackendError;
    use std::future::Future;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<String>>,
        refuse_services: bool,
        refuse_notify: bool,
    }

    impl RecordingBackend {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PeripheralBackend for RecordingBackend {
        fn add_service(
            &self,
            service: &ServiceDefinition,
        ) -> impl Future<Output = Result<(), BackendError>> + Send {
            self.calls
                .lock()
                .unwrap()
                .push(format!("service {}", service.uuid));
            let refuse = self.refuse_services;
            async move {
                if refuse {
                    Err(BackendError::Unavailable)
                } else {
                    Ok(())
                }
            }
        }

        fn start_advertising(
            &self,
            parameters: &AdvertisingParameters,
        ) -> impl Future<Output = Result<(), BackendError>> + Send {
            self.calls
                .lock()
                .unwrap()
                .push(format!("advertise {}", parameters.local_name));
            async { Ok(()) }
        }

        fn notify(
            &self,
            characteristic: Uuid,
            value: &[u8],
        ) -> impl Future<Output = Result<(), BackendError>> + Send {
            self.calls
                .lock()
                .unwrap()
                .push(format!("notify {characteristic} {value:?}"));
            let refuse = self.refuse_notify;
            async move {
                if refuse {
                    Err(BackendError::Closed)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn uuid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn params() -> AdvertisingParameters {
        AdvertisingParameters {
            local_name: "Sample3".to_string(),
            service_uuids: vec![uuid(1)],
            connectable: true,
            discoverable: true,
        }
    }

    fn notifying(n: u128) -> CharacteristicDefinition {
        CharacteristicDefinition::new(uuid(n), Capabilities::READ | Capabilities::NOTIFY)
            .with_value(vec![0])
    }

    #[test]
    fn should_allocate_increasing_handles() {
        let mut store = AttributeStore::new(RecordingBackend::default(), 32);
        let service = store.define_service(uuid(1)).unwrap();
        let first = store
            .define_characteristic(service, CharacteristicDefinition::new(uuid(2), Capabilities::READ))
            .unwrap();
        let second = store.define_characteristic(service, notifying(3)).unwrap();

        assert_eq!(service.raw(), 1);
        assert_eq!(first.raw(), 3);
        assert_eq!(second.raw(), 5);
        assert_eq!(store.available(), 32 - 1 - 2 - 3);
    }

    #[test]
    fn should_reject_duplicate_service_uuid() {
        let mut store = AttributeStore::new(RecordingBackend::default(), 32);
        store.define_service(uuid(1)).unwrap();

        let result = store.define_service(uuid(1));

        assert!(matches!(result, Err(SetupError::Conflict { uuid: u }) if u == uuid(1)));
    }

    #[test]
    fn should_reject_characteristic_reusing_a_defined_uuid() {
        let mut store = AttributeStore::new(RecordingBackend::default(), 32);
        let service = store.define_service(uuid(1)).unwrap();
        store.define_characteristic(service, notifying(2)).unwrap();

        let result = store.define_characteristic(service, notifying(2));

        assert!(matches!(result, Err(SetupError::Conflict { .. })));
    }

    #[test]
    fn should_reject_unknown_service_handle() {
        let mut store = AttributeStore::new(RecordingBackend::default(), 32);

        let result = store.define_characteristic(ServiceHandle::new(7), notifying(2));

        assert!(matches!(result, Err(SetupError::UnknownService(h)) if h.raw() == 7));
    }

    #[test]
    fn should_report_exhaustion_and_leave_store_unchanged() {
        let mut store = AttributeStore::new(RecordingBackend::default(), 3);
        let service = store.define_service(uuid(1)).unwrap();

        let result = store.define_characteristic(service, notifying(2));

        assert!(matches!(
            result,
            Err(SetupError::BackendFailure(BackendFailure::ResourceExhausted {
                requested: 3,
                available: 2
            }))
        ));
        assert_eq!(store.available(), 2);
        assert!(store.handle_of(uuid(2)).is_none());
        let next = store
            .define_characteristic(service, CharacteristicDefinition::new(uuid(2), Capabilities::READ))
            .unwrap();
        assert_eq!(next.raw(), 3);
    }

    #[test]
    fn should_define_nothing_when_whole_service_does_not_fit() {
        let mut store = AttributeStore::new(RecordingBackend::default(), 5);
        let definition = ServiceDefinition {
            uuid: uuid(1),
            primary: true,
            characteristics: vec![notifying(2), notifying(3)],
        };

        let result = store.define(definition);

        assert!(matches!(
            result,
            Err(SetupError::BackendFailure(BackendFailure::ResourceExhausted { .. }))
        ));
        assert!(store.service_definitions().is_empty());
        assert_eq!(store.available(), 5);
    }

    #[test]
    fn should_reject_service_definition_with_repeated_characteristic() {
        let mut store = AttributeStore::new(RecordingBackend::default(), 32);
        let definition = ServiceDefinition {
            uuid: uuid(1),
            primary: true,
            characteristics: vec![notifying(2), notifying(2)],
        };

        let result = store.define(definition);

        assert!(matches!(result, Err(SetupError::Conflict { .. })));
        assert!(store.service_definitions().is_empty());
    }

    #[tokio::test]
    async fn should_register_every_service_before_advertising() {
        let backend = Arc::new(RecordingBackend::default());
        let mut store = AttributeStore::new(Arc::clone(&backend), 32);
        store.define_service(uuid(1)).unwrap();
        store.define_service(uuid(2)).unwrap();

        store.publish(&params()).await.unwrap();

        assert!(store.is_published());
        assert_eq!(
            backend.calls(),
            vec![
                format!("service {}", uuid(1)),
                format!("service {}", uuid(2)),
                "advertise Sample3".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn should_abort_publish_on_first_backend_refusal() {
        let backend = Arc::new(RecordingBackend {
            refuse_services: true,
            ..RecordingBackend::default()
        });
        let mut store = AttributeStore::new(Arc::clone(&backend), 32);
        store.define_service(uuid(1)).unwrap();
        store.define_service(uuid(2)).unwrap();

        let result = store.publish(&params()).await;

        assert!(matches!(
            result,
            Err(SetupError::BackendFailure(BackendFailure::Backend(_)))
        ));
        assert!(!store.is_published());
        assert_eq!(backend.calls(), vec![format!("service {}", uuid(1))]);
    }

    #[tokio::test]
    async fn should_notify_only_when_published_and_subscribed() {
        let backend = Arc::new(RecordingBackend::default());
        let mut store = AttributeStore::new(Arc::clone(&backend), 32);
        let service = store.define_service(uuid(1)).unwrap();
        let handle = store.define_characteristic(service, notifying(2)).unwrap();

        assert!(!store.update_value(handle, vec![1]).await.unwrap());

        store.publish(&params()).await.unwrap();
        assert!(!store.update_value(handle, vec![2]).await.unwrap());

        assert!(store.set_subscription(uuid(2), "central-1", true).unwrap());
        assert!(store.update_value(handle, vec![3]).await.unwrap());

        assert_eq!(store.value(handle).unwrap(), &[3]);
        let notifications: Vec<_> = backend
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("notify"))
            .collect();
        assert_eq!(notifications, vec![format!("notify {} [3]", uuid(2))]);
    }

    #[tokio::test]
    async fn should_read_back_updated_value() {
        let mut store = AttributeStore::new(RecordingBackend::default(), 32);
        let service = store.define_service(uuid(1)).unwrap();
        let handle = store.define_characteristic(service, notifying(2)).unwrap();
        store.publish(&params()).await.unwrap();

        for value in [vec![0x24, 0x09], Vec::new(), b"twenty bytes or more!".to_vec()] {
            store.update_value(handle, value.clone()).await.unwrap();

            assert_eq!(store.read(uuid(2), 0), ReadOutcome::Value(value));
        }
        assert_eq!(store.read(uuid(2), 7), ReadOutcome::Value(b"bytes or more!".to_vec()));
    }

    #[tokio::test]
    async fn should_keep_new_value_when_notification_fails() {
        let backend = Arc::new(RecordingBackend {
            refuse_notify: true,
            ..RecordingBackend::default()
        });
        let mut store = AttributeStore::new(Arc::clone(&backend), 32);
        let service = store.define_service(uuid(1)).unwrap();
        let handle = store.define_characteristic(service, notifying(2)).unwrap();
        store.publish(&params()).await.unwrap();
        store.set_subscription(uuid(2), "central-1", true).unwrap();

        let notified = store.update_value(handle, vec![9, 9]).await.unwrap();

        assert!(!notified);
        assert_eq!(store.value(handle).unwrap(), &[9, 9]);
    }

    #[tokio::test]
    async fn should_reject_update_of_unknown_handle() {
        let mut store = AttributeStore::new(RecordingBackend::default(), 32);

        let result = store.update_value(AttributeHandle::new(42), vec![1]).await;

        assert_eq!(
            result,
            Err(AttributeError::UnknownHandle(AttributeHandle::new(42)))
        );
    }

    #[test]
    fn should_track_subscribers_per_client() {
        let mut store = AttributeStore::new(RecordingBackend::default(), 32);
        let service = store.define_service(uuid(1)).unwrap();
        let handle = store.define_characteristic(service, notifying(2)).unwrap();

        assert!(store.set_subscription(uuid(2), "a", true).unwrap());
        assert!(!store.set_subscription(uuid(2), "a", true).unwrap());
        assert!(store.set_subscription(uuid(2), "b", true).unwrap());
        assert_eq!(store.subscriber_count(handle), 2);

        assert!(store.set_subscription(uuid(2), "a", false).unwrap());
        assert_eq!(store.subscriber_count(handle), 1);
    }

    #[test]
    fn should_answer_reads_from_offset() {
        let mut store = AttributeStore::new(RecordingBackend::default(), 32);
        let service = store.define_service(uuid(1)).unwrap();
        store
            .define_characteristic(
                service,
                CharacteristicDefinition::new(uuid(2), Capabilities::READ).with_value(b"hello".to_vec()),
            )
            .unwrap();
        store
            .define_characteristic(service, CharacteristicDefinition::new(uuid(3), Capabilities::WRITE))
            .unwrap();

        assert_eq!(store.read(uuid(2), 0), ReadOutcome::Value(b"hello".to_vec()));
        assert_eq!(store.read(uuid(2), 3), ReadOutcome::Value(b"lo".to_vec()));
        assert_eq!(store.read(uuid(2), 5), ReadOutcome::Value(Vec::new()));
        assert_eq!(
            store.read(uuid(2), 6),
            ReadOutcome::Rejected(RejectReason::InvalidOffset)
        );
        assert_eq!(
            store.read(uuid(3), 0),
            ReadOutcome::Rejected(RejectReason::ReadNotPermitted)
        );
        assert_eq!(
            store.read(uuid(9), 0),
            ReadOutcome::Rejected(RejectReason::UnknownCharacteristic)
        );
    }
}
