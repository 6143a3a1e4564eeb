//! # vehiclelink-adapter-btleplug
//!
//! Central-role radio adapter. Implements the `CentralTransport` and
//! `PeerLink` ports on top of [btleplug](https://docs.rs/btleplug), which
//! drives BlueZ, CoreBluetooth or WinRT depending on the host.
//!
//! ## How it works
//!
//! [`BtleplugCentral::open`] takes the first adapter on the host and spawns
//! an event pump. The pump turns stack events into [`RadioEvent`]s:
//!
//! | Stack event | Radio event |
//! |-------------|-------------|
//! | `DeviceDiscovered`, `DeviceUpdated`, `ServicesAdvertisement` | `Advertisement` (while scanning) |
//! | `DeviceDisconnected` | `Disconnected` |
//! | value notification on a link | `ValueChanged` |
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `vehiclelink-app` and
//! `vehiclelink-domain`.
//!
//! [`RadioEvent`]: vehiclelink_app::ports::RadioEvent

mod error;
mod link;
mod transport;

pub use error::BtleplugError;
pub use link::BtleplugLink;
pub use transport::BtleplugCentral;

use btleplug::api::{AddressType as StackAddressType, BDAddr, CharPropFlags, PeripheralProperties};
use vehiclelink_domain::advertisement::Advertisement;
use vehiclelink_domain::gatt::Capabilities;
use vehiclelink_domain::identity::{Address, AddressType, DeviceIdentity};

pub(crate) fn identity_of(address: BDAddr, address_type: Option<StackAddressType>) -> DeviceIdentity {
    let address_type = match address_type {
        Some(StackAddressType::Random) => AddressType::Random,
        _ => AddressType::Public,
    };
    DeviceIdentity::new(Address::new(address.into_inner()), address_type)
}

pub(crate) fn advertisement_of(properties: &PeripheralProperties) -> Advertisement {
    let mut advertisement = Advertisement::new(identity_of(properties.address, properties.address_type));
    advertisement.service_uuids.clone_from(&properties.services);
    advertisement.local_name.clone_from(&properties.local_name);
    advertisement
}

/// Both write types count as writable; notify and indicate both count as
/// notifying.
pub(crate) fn capabilities_of(properties: CharPropFlags) -> Capabilities {
    let mut capabilities = Capabilities::empty();
    if properties.contains(CharPropFlags::READ) {
        capabilities |= Capabilities::READ;
    }
    if properties.intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE) {
        capabilities |= Capabilities::WRITE;
    }
    if properties.intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE) {
        capabilities |= Capabilities::NOTIFY;
    }
    capabilities
}
