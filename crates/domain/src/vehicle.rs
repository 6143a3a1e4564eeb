//! Vehicle domain values and their wire encodings.
//!
//! | Value | Characteristic | Encoding |
//! |-------|----------------|----------|
//! | Speed | [`SPEED_CHAR`](crate::uuids::SPEED_CHAR) | u8 |
//! | Direction | [`DIRECTION_CHAR`](crate::uuids::DIRECTION_CHAR) | u8 |
//! | Temperature | [`TEMPERATURE_CHAR`](crate::uuids::TEMPERATURE_CHAR) | i16 LE, x0.01 °C |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PayloadError;

const BYTE_WIDTH: usize = 1;
const TEMPERATURE_WIDTH: usize = 2;

/// Decode a single unsigned byte, rejecting any other payload length.
///
/// # Errors
///
/// Returns [`PayloadError::InvalidLength`] unless `payload` is exactly one byte.
pub fn decode_byte(payload: &[u8]) -> Result<u8, PayloadError> {
    match payload {
        [value] => Ok(*value),
        _ => Err(PayloadError::InvalidLength {
            expected: BYTE_WIDTH,
            actual: payload.len(),
        }),
    }
}

/// A speed and direction pair issued by the central on every command tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleCommand {
    pub speed: u8,
    pub direction: u8,
}

impl Default for VehicleCommand {
    fn default() -> Self {
        Self {
            speed: 25,
            direction: 90,
        }
    }
}

/// Last speed and direction accepted by the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VehicleState {
    pub speed: Option<u8>,
    pub direction: Option<u8>,
}

/// A temperature in hundredths of a degree Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Temperature(i16);

impl Temperature {
    #[must_use]
    pub const fn from_hundredths(raw: i16) -> Self {
        Self(raw)
    }

    /// Round a Celsius value to the nearest hundredth, saturating at the i16 range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_celsius(celsius: f32) -> Self {
        let raw = (celsius * 100.0)
            .round()
            .clamp(f32::from(i16::MIN), f32::from(i16::MAX));
        Self(raw as i16)
    }

    #[must_use]
    pub const fn hundredths(self) -> i16 {
        self.0
    }

    #[must_use]
    pub fn celsius(self) -> f32 {
        f32::from(self.0) / 100.0
    }

    /// Decode the characteristic payload.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::InvalidLength`] unless `payload` is exactly two bytes.
    pub fn from_le_bytes(payload: &[u8]) -> Result<Self, PayloadError> {
        match payload {
            [lo, hi] => Ok(Self(i16::from_le_bytes([*lo, *hi]))),
            _ => Err(PayloadError::InvalidLength {
                expected: TEMPERATURE_WIDTH,
                actual: payload.len(),
            }),
        }
    }

    #[must_use]
    pub fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} \u{b0}C", self.celsius())
    }
}
