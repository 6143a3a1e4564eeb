//! Device identity: The address plus address-type pair naming a radio peer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A 48-bit Bluetooth device address, stored most-significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address([u8; 6]);

impl Address {
    /// Wrap raw address bytes (most-significant byte first).
    #[must_use]
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Access the raw address bytes.
    #[must_use]
    pub const fn into_inner(self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Failure to parse an [`Address`] from its `AA:BB:CC:DD:EE:FF` form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid device address {0:?}")]
pub struct ParseAddressError(String);

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in &mut bytes {
            let part = parts.next().ok_or_else(|| ParseAddressError(s.to_owned()))?;
            if part.len() != 2 {
                return Err(ParseAddressError(s.to_owned()));
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| ParseAddressError(s.to_owned()))?;
        }
        if parts.next().is_some() {
            return Err(ParseAddressError(s.to_owned()));
        }
        Ok(Self(bytes))
    }
}

/// Whether the advertised address is public or random.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    #[default]
    Public,
    Random,
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Random => f.write_str("random"),
        }
    }
}

/// Uniquely identifies a radio peer for the lifetime of the process.
///
/// Immutable once observed; used as the deduplication key everywhere a
/// device may be seen more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub address: Address,
    pub address_type: AddressType,
}

impl DeviceIdentity {
    #[must_use]
    pub const fn new(address: Address, address_type: AddressType) -> Self {
        Self {
            address,
            address_type,
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.address_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_format_address_as_uppercase_colon_separated() {
        let addr = Address::new([0xA4, 0xC1, 0x38, 0x5B, 0x0E, 0xDF]);
        assert_eq!(addr.to_string(), "A4:C1:38:5B:0E:DF");
    }

    #[test]
    fn should_parse_address_case_insensitively() {
        let addr: Address = "a4:c1:38:5b:0e:df".parse().unwrap();
        assert_eq!(addr.into_inner(), [0xA4, 0xC1, 0x38, 0x5B, 0x0E, 0xDF]);
    }

    #[test]
    fn should_reject_short_address() {
        assert!("A4:C1:38".parse::<Address>().is_err());
    }

    #[test]
    fn should_reject_address_with_extra_octet() {
        assert!("A4:C1:38:5B:0E:DF:00".parse::<Address>().is_err());
    }

    #[test]
    fn should_distinguish_identities_by_address_type() {
        let addr = Address::new([1, 2, 3, 4, 5, 6]);
        let public = DeviceIdentity::new(addr, AddressType::Public);
        let random = DeviceIdentity::new(addr, AddressType::Random);
        assert_ne!(public, random);
    }

    #[test]
    fn should_display_identity_with_address_type() {
        let identity = DeviceIdentity::new(Address::new([1, 2, 3, 4, 5, 6]), AddressType::Random);
        assert_eq!(identity.to_string(), "01:02:03:04:05:06/random");
    }

    #[test]
    fn should_roundtrip_identity_through_serde_json() {
        let identity = DeviceIdentity::new(Address::new([1, 2, 3, 4, 5, 6]), AddressType::Public);
        let json = serde_json::to_string(&identity).unwrap();
        let parsed: DeviceIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, identity);
    }
}
