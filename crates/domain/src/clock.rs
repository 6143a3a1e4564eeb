//! Current Time Service value ([`CURRENT_TIME_CHAR`](crate::uuids::CURRENT_TIME_CHAR)).
//!
//! Encoded as Exact Time 256 followed by an adjust-reason byte:
//!
//! | Bytes | Field |
//! |-------|-------|
//! | 0..2 | year, u16 LE |
//! | 2 | month, 1..=12 |
//! | 3 | day, 1..=31 |
//! | 4..7 | hours, minutes, seconds |
//! | 7 | day of week, Monday = 1 |
//! | 8 | fractions of a second, 1/256 |
//! | 9 | adjust reason |

use chrono::{Datelike, Timelike};

use crate::advertisement::Timestamp;

pub const CURRENT_TIME_WIDTH: usize = 10;

/// Adjust reason bit set when the time was updated manually.
pub const MANUAL_TIME_UPDATE: u8 = 0b0000_0001;

#[must_use]
pub fn encode_current_time(at: &Timestamp, adjust_reason: u8) -> [u8; CURRENT_TIME_WIDTH] {
    let [year_lo, year_hi] = u16::try_from(at.year()).unwrap_or(0).to_le_bytes();
    // Leap seconds report nanoseconds past 1e9.
    let nanos = u64::from(at.nanosecond().min(999_999_999));
    let fractions = u8::try_from(nanos * 256 / 1_000_000_000).unwrap_or(u8::MAX);
    [
        year_lo,
        year_hi,
        u8::try_from(at.month()).unwrap_or(0),
        u8::try_from(at.day()).unwrap_or(0),
        u8::try_from(at.hour()).unwrap_or(0),
        u8::try_from(at.minute()).unwrap_or(0),
        u8::try_from(at.second()).unwrap_or(0),
        u8::try_from(at.weekday().number_from_monday()).unwrap_or(0),
        fractions,
        adjust_reason,
    ]
}
