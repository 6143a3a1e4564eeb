//! UUID contract shared by the peripheral and the central.
//!
//! Both roles must agree on these identifiers byte for byte.

use uuid::Uuid;

const BLUETOOTH_BASE: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Expand a 16-bit SIG-assigned number into a full 128-bit UUID.
#[must_use]
pub const fn from_short(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | BLUETOOTH_BASE)
}

/// Primary sensor service advertised by the peripheral and used as the scan filter.
pub const SENSOR_SERVICE: Uuid = Uuid::from_u128(0xA7EE_DF2C_DA87_4CB5_A9C5_5151_C78B_0057);

/// Read-only characteristic carrying a static description of the peripheral.
pub const STATIC_INFO_CHAR: Uuid = Uuid::from_u128(0xA7EE_DF2C_DA89_4CB5_A9C5_5151_C78B_0057);

/// Vehicle-control service.
pub const VEHICLE_CONTROL_SERVICE: Uuid =
    Uuid::from_u128(0x2454_63B4_38E9_43BD_90A7_6CE3_97CA_9BCE);

/// Speed command, one unsigned byte.
pub const SPEED_CHAR: Uuid = Uuid::from_u128(0x27BF_A565_7FAE_4CFF_BE56_7AC3_082B_0E8D);

/// Direction command, one unsigned byte.
pub const DIRECTION_CHAR: Uuid = Uuid::from_u128(0x2F63_43CE_E5BF_49F2_B189_07AB_6EB6_F168);

/// Environmental Sensing service (`0x181A`).
pub const ENVIRONMENTAL_SENSING_SERVICE: Uuid = from_short(0x181A);

/// Temperature characteristic (`0x2A6E`), i16 LE hundredths of a degree.
pub const TEMPERATURE_CHAR: Uuid = from_short(0x2A6E);

/// Battery service (`0x180F`).
pub const BATTERY_SERVICE: Uuid = from_short(0x180F);

/// Battery level characteristic (`0x2A19`), percentage in one byte.
pub const BATTERY_LEVEL_CHAR: Uuid = from_short(0x2A19);

/// Device Information service (`0x180A`).
pub const DEVICE_INFORMATION_SERVICE: Uuid = from_short(0x180A);

pub const MANUFACTURER_NAME_CHAR: Uuid = from_short(0x2A29);
pub const MODEL_NUMBER_CHAR: Uuid = from_short(0x2A24);
pub const FIRMWARE_REVISION_CHAR: Uuid = from_short(0x2A26);
pub const SOFTWARE_REVISION_CHAR: Uuid = from_short(0x2A28);

/// Current Time service (`0x1805`).
pub const CURRENT_TIME_SERVICE: Uuid = from_short(0x1805);

/// Current Time characteristic (`0x2A2B`), see [`crate::clock`].
pub const CURRENT_TIME_CHAR: Uuid = from_short(0x2A2B);

/// Characteristic User Description descriptor (`0x2901`).
pub const CHARACTERISTIC_USER_DESCRIPTION: Uuid = from_short(0x2901);
