//! Device registry: candidates found in the current scan cycle, plus the
//! devices that currently hold a session.

use std::collections::HashMap;

use vehiclelink_domain::advertisement::{Advertisement, DiscoveredDevice, Timestamp};
use vehiclelink_domain::id::SessionId;
use vehiclelink_domain::identity::DeviceIdentity;

/// Identity-keyed bookkeeping owned by the central orchestrator.
///
/// Candidates keep discovery order. An identity appears at most once among
/// candidates, and never while it is active.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    found: Vec<DiscoveredDevice>,
    active: HashMap<DeviceIdentity, SessionId>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a candidate. Returns `false` if the identity is already known.
    pub fn add(&mut self, device: DiscoveredDevice) -> bool {
        if self.contains(&device.identity) || self.is_active(&device.identity) {
            return false;
        }
        self.found.push(device);
        true
    }

    /// Merge a later advertisement into the matching candidate.
    ///
    /// Returns `false` when the identity is not a candidate.
    pub fn refresh(&mut self, advertisement: &Advertisement, seen_at: Timestamp) -> bool {
        match self
            .found
            .iter_mut()
            .find(|d| d.identity == advertisement.identity)
        {
            Some(device) => {
                device.merge(advertisement, seen_at);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn contains(&self, identity: &DeviceIdentity) -> bool {
        self.found.iter().any(|d| &d.identity == identity)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.found.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.found.len()
    }

    /// Take every candidate in discovery order, leaving the registry empty.
    pub fn drain(&mut self) -> Vec<DiscoveredDevice> {
        std::mem::take(&mut self.found)
    }

    pub fn clear(&mut self) {
        self.found.clear();
    }

    /// Mark `identity` as owning `session`, replacing any previous entry.
    pub fn track_active(&mut self, identity: DeviceIdentity, session: SessionId) -> Option<SessionId> {
        self.found.retain(|d| d.identity != identity);
        self.active.insert(identity, session)
    }

    pub fn untrack_active(&mut self, identity: &DeviceIdentity) -> Option<SessionId> {
        self.active.remove(identity)
    }

    #[must_use]
    pub fn is_active(&self, identity: &DeviceIdentity) -> bool {
        self.active.contains_key(identity)
    }
}
