//! Device-relative timestamps.
//!
//! The pump stamps every record with a free-running seconds counter (RTC)
//! and the offset that maps it to the pump's wall clock. Changing the clock
//! only changes the offset, so the counter alone orders events and measures
//! elapsed time.

use crate::fields::Fields;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// 2000-01-01T00:00:00 in the pump's local wall clock, as Unix seconds
pub const PUMP_EPOCH_SECONDS: i64 = 946_684_800;

/// Width of an encoded timestamp
pub const TIMESTAMP_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceTimestamp {
    /// Seconds since the device epoch
    pub counter: u32,
    /// Wall-clock offset in seconds
    pub offset: i32,
}

impl DeviceTimestamp {
    pub fn new(counter: u32, offset: i32) -> Self {
        Self { counter, offset }
    }

    /// Decode the 8-byte counter/offset pair at `offset`
    ///
    /// The offset is stored as a u32 and reinterpreted as a two's complement
    /// i32. Pump offsets have the top bit set, so they read back negative.
    pub fn read(fields: &Fields<'_>, at: usize) -> Result<Self> {
        let counter = fields.u32(at)?;
        let offset = fields.u32(at + 4)? as i32;
        Ok(Self { counter, offset })
    }

    /// Wall-clock time on the device, in its local zone
    pub fn device_time(&self) -> Result<NaiveDateTime> {
        let seconds = PUMP_EPOCH_SECONDS + self.counter as i64 + self.offset as i64;
        DateTime::from_timestamp(seconds, 0)
            .map(|dt| dt.naive_utc())
            .ok_or(Error::TimestampOutOfRange {
                counter: self.counter,
                offset: self.offset,
            })
    }

    /// Same wall-clock offset, counter moved back by `seconds`
    pub fn earlier_by(&self, seconds: u32) -> Self {
        Self {
            counter: self.counter.saturating_sub(seconds),
            offset: self.offset,
        }
    }

    /// Counter-based elapsed milliseconds from `self` to `later`
    ///
    /// Negative when `later` was recorded first.
    pub fn elapsed_ms_until(&self, later: &DeviceTimestamp) -> i64 {
        (later.counter as i64 - self.counter as i64) * 1000
    }
}
