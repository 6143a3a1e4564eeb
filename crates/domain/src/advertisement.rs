//! Advertisements observed by a central and the devices they reveal.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::identity::DeviceIdentity;

/// UTC timestamp used for `last_seen` and session bookkeeping.
pub type Timestamp = DateTime<Utc>;

/// One advertisement event as reported by the radio.
///
/// A single advertising interval may be split across several events for the
/// same identity (advertising data and scan response), so every field except
/// the identity may be missing from any given event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub identity: DeviceIdentity,
    pub service_uuids: Vec<Uuid>,
    pub local_name: Option<String>,
}

impl Advertisement {
    /// Create an advertisement carrying no optional fields.
    #[must_use]
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            service_uuids: Vec::new(),
            local_name: None,
        }
    }

    #[must_use]
    pub fn with_service(mut self, uuid: Uuid) -> Self {
        self.service_uuids.push(uuid);
        self
    }

    #[must_use]
    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    /// Whether this event lists the given service UUID.
    #[must_use]
    pub fn advertises(&self, uuid: Uuid) -> bool {
        self.service_uuids.contains(&uuid)
    }
}

/// A device surfaced by the scanner because it advertised the target service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub identity: DeviceIdentity,
    pub service_uuids: Vec<Uuid>,
    pub local_name: Option<String>,
    pub last_seen: Timestamp,
}

impl DiscoveredDevice {
    /// Build a discovered device from the advertisement that matched.
    #[must_use]
    pub fn from_advertisement(advertisement: &Advertisement, seen_at: Timestamp) -> Self {
        Self {
            identity: advertisement.identity,
            service_uuids: advertisement.service_uuids.clone(),
            local_name: advertisement.local_name.clone(),
            last_seen: seen_at,
        }
    }

    /// Fold a later advertisement from the same device into this one.
    ///
    /// A scan response usually carries the name while the advertising data
    /// carries the service list, so fields are merged rather than replaced.
    pub fn merge(&mut self, advertisement: &Advertisement, seen_at: Timestamp) {
        self.last_seen = self.last_seen.max(seen_at);
        if let Some(name) = &advertisement.local_name {
            self.local_name = Some(name.clone());
        }
        for uuid in &advertisement.service_uuids {
            if !self.service_uuids.contains(uuid) {
                self.service_uuids.push(*uuid);
            }
        }
    }

    /// Display name, falling back to the address when none was advertised.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.local_name
            .clone()
            .unwrap_or_else(|| self.identity.address.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Address, AddressType};

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new(Address::new([1, 2, 3, 4, 5, 6]), AddressType::Public)
    }

    #[test]
    fn should_detect_advertised_service() {
        let uuid = Uuid::from_u128(0xABCD);
        let adv = Advertisement::new(identity()).with_service(uuid);
        assert!(adv.advertises(uuid));
        assert!(!adv.advertises(Uuid::from_u128(0x1)));
    }

    #[test]
    fn should_not_advertise_anything_without_uuids() {
        let adv = Advertisement::new(identity()).with_local_name("Sample3");
        assert!(!adv.advertises(Uuid::from_u128(0xABCD)));
    }

    #[test]
    fn should_copy_fields_from_advertisement() {
        let uuid = Uuid::from_u128(0xABCD);
        let adv = Advertisement::new(identity())
            .with_service(uuid)
            .with_local_name("Sample3");
        let now = Utc::now();
        let device = DiscoveredDevice::from_advertisement(&adv, now);
        assert_eq!(device.identity, identity());
        assert_eq!(device.service_uuids, vec![uuid]);
        assert_eq!(device.local_name.as_deref(), Some("Sample3"));
        assert_eq!(device.last_seen, now);
    }

    #[test]
    fn should_merge_scan_response_into_discovered_device() {
        let uuid = Uuid::from_u128(0xABCD);
        let first_seen = Utc::now();
        let mut device = DiscoveredDevice::from_advertisement(
            &Advertisement::new(identity()).with_service(uuid),
            first_seen,
        );
        let later = first_seen + chrono::Duration::seconds(2);

        device.merge(&Advertisement::new(identity()).with_local_name("Sample3"), later);
        device.merge(&Advertisement::new(identity()).with_service(uuid), first_seen);

        assert_eq!(device.display_name(), "Sample3");
        assert_eq!(device.service_uuids, vec![uuid]);
        assert_eq!(device.last_seen, later);
    }

    #[test]
    fn should_fall_back_to_address_for_display_name() {
        let device = DiscoveredDevice::from_advertisement(&Advertisement::new(identity()), Utc::now());
        assert_eq!(device.display_name(), "01:02:03:04:05:06");
    }
}
