//! Device time to UTC.
//!
//! The pump only knows its own wall clock. When the user changes the clock
//! (travel, DST, drift correction) the history records the old and new
//! times, and every earlier record has to be shifted by the accumulated
//! difference. Changes are walked newest first: the newest window is
//! anchored on the configured zone and each older window adds the offset
//! that the change undid.
//!
//! Windows are keyed by RTC counter, `(start, end]`, and together cover the
//! whole counter range.

use crate::event::{EventKind, HistoryEvent};
use crate::timestamp::DeviceTimestamp;
use crate::types::{Agent, RecordTime, TimeChange};
use crate::{Error, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Timelike, Utc};
use jiff::tz::TimeZone;

/// Largest real difference between two zones, UTC+14 to UTC-12
const MAX_ZONE_DIFF_MINUTES: i64 = 840 + 720;
const MAX_TIMEZONE_OFFSET: i64 = 840;
const MIN_TIMEZONE_OFFSET: i64 = -720;
const DAY_MINUTES: i64 = 1440;
const ROUND_TO_MINUTES: i64 = 30;
const MINUTE_MS: i64 = 60_000;

/// IANA zone the pump is assumed to be set to
#[derive(Clone, Debug)]
pub struct DeviceZone {
    name: String,
    tz: TimeZone,
}

impl DeviceZone {
    pub fn new(name: &str) -> Result<Self> {
        let tz = match name {
            "UTC" | "GMT" | "Etc/UTC" => TimeZone::UTC,
            _ => TimeZone::get(name)
                .map_err(|e| Error::Timezone(format!("{}: {}", name, e)))?,
        };
        Ok(Self {
            name: name.to_string(),
            tz,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// UTC instant of a local wall-clock time
    ///
    /// Times in a DST gap or fold resolve the "compatible" way: gaps move
    /// forward, folds take the earlier instant.
    pub fn to_utc(&self, local: NaiveDateTime) -> Result<DateTime<Utc>> {
        let civil = jiff::civil::DateTime::new(
            local.year() as i16,
            local.month() as i8,
            local.day() as i8,
            local.hour() as i8,
            local.minute() as i8,
            local.second() as i8,
            0,
        )
        .map_err(|e| Error::Timezone(e.to_string()))?;
        let zoned = civil
            .to_zoned(self.tz.clone())
            .map_err(|e| Error::Timezone(e.to_string()))?;
        DateTime::from_timestamp(zoned.timestamp().as_second(), 0)
            .ok_or_else(|| Error::Timezone(format!("{} is out of range", local)))
    }

    /// Offset from UTC in minutes at `instant`
    pub fn offset_minutes_at(&self, instant: DateTime<Utc>) -> Result<i64> {
        let ts = jiff::Timestamp::from_second(instant.timestamp())
            .map_err(|e| Error::Timezone(e.to_string()))?;
        Ok(self.tz.to_offset(ts).seconds() as i64 / 60)
    }
}

/// Offsets that map device time onto UTC
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Offsets {
    /// Minutes
    pub timezone: i64,
    /// Milliseconds not explained by a zone change
    pub clock_drift: i64,
    /// Milliseconds, whole-day and out-of-range jumps
    pub conversion: i64,
}

impl Offsets {
    /// UTC = device time - timezone - conversion
    pub fn apply(&self, device_time: NaiveDateTime) -> DateTime<Utc> {
        device_time.and_utc()
            - Duration::minutes(self.timezone)
            - Duration::milliseconds(self.conversion)
    }

    /// Move the offsets across one clock change, newer to older
    fn cross(&mut self, change: &ClockChange) {
        let diff = change.from - change.to;
        let diff_minutes = diff.num_minutes();
        let raw_ms = diff.num_milliseconds();
        // Half-up rounding, -45 rounds to -30
        let offset_diff =
            ((diff_minutes as f64 / ROUND_TO_MINUTES as f64) + 0.5).floor() as i64 * ROUND_TO_MINUTES;

        if offset_diff.abs() <= MAX_ZONE_DIFF_MINUTES {
            self.timezone += offset_diff;
            self.clock_drift += raw_ms - offset_diff * MINUTE_MS;
        } else {
            self.conversion += raw_ms;
        }

        while self.timezone > MAX_TIMEZONE_OFFSET {
            self.timezone -= DAY_MINUTES;
            self.conversion += DAY_MINUTES * MINUTE_MS;
        }
        while self.timezone < MIN_TIMEZONE_OFFSET {
            self.timezone += DAY_MINUTES;
            self.conversion -= DAY_MINUTES * MINUTE_MS;
        }
    }
}

/// A user clock change: old and new wall clock at the same RTC instant
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeChangeRecord {
    pub from: DeviceTimestamp,
    pub to: DeviceTimestamp,
}

impl TimeChangeRecord {
    /// USER_TIME_DATE_CHANGE events only; resets are not user changes
    pub fn from_event(event: &HistoryEvent) -> Option<Self> {
        match event.kind {
            EventKind::TimeChange {
                new_timestamp,
                reset: false,
            } => Some(Self {
                from: event.timestamp,
                to: new_timestamp,
            }),
            _ => None,
        }
    }

    fn index(&self) -> u32 {
        self.to.counter
    }
}

struct ClockChange {
    from: NaiveDateTime,
    to: NaiveDateTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowOffsets {
    /// No clock changes: apply the configured zone per instant
    Zone,
    Fixed(Offsets),
}

/// Counter range `(start_index, end_index]`; `None` is open-ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OffsetWindow {
    pub start_index: Option<u32>,
    pub end_index: Option<u32>,
    pub offsets: WindowOffsets,
}

impl OffsetWindow {
    pub fn contains(&self, index: u32) -> bool {
        self.start_index.map_or(true, |start| index > start)
            && self.end_index.map_or(true, |end| index <= end)
    }
}

/// Resolves device timestamps against the clock changes of one history
#[derive(Debug)]
pub struct TimezoneResolver {
    zone: DeviceZone,
    /// Newest first
    windows: Vec<OffsetWindow>,
    time_changes: Vec<TimeChange>,
}

impl TimezoneResolver {
    /// Build from a decoded history
    ///
    /// `now` anchors the newest window; without it the last event's device
    /// time stands in for the capture instant.
    pub fn build(
        events: &[HistoryEvent],
        zone: DeviceZone,
        now: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let changes: Vec<_> = events.iter().filter_map(TimeChangeRecord::from_event).collect();
        let anchor = match (now, events.last()) {
            (Some(now), _) => now,
            (None, Some(last)) => last.timestamp.device_time()?.and_utc(),
            (None, None) => Utc::now(),
        };
        Self::from_changes(changes, zone, anchor)
    }

    pub fn from_changes(
        mut changes: Vec<TimeChangeRecord>,
        zone: DeviceZone,
        anchor: DateTime<Utc>,
    ) -> Result<Self> {
        if changes.is_empty() {
            tracing::debug!("No clock changes, applying {} throughout", zone.name());
            return Ok(Self {
                zone,
                windows: vec![OffsetWindow {
                    start_index: None,
                    end_index: None,
                    offsets: WindowOffsets::Zone,
                }],
                time_changes: Vec::new(),
            });
        }

        changes.sort_by_key(TimeChangeRecord::index);
        changes.reverse();

        let mut windows = Vec::with_capacity(changes.len() + 1);
        let mut time_changes = Vec::with_capacity(changes.len());
        let mut offsets = Offsets::default();
        let mut current_index = 0;

        for (i, change) in changes.iter().enumerate() {
            let clock = ClockChange {
                from: change.from.device_time()?,
                to: change.to.device_time()?,
            };
            let index = change.index();

            let (time, here) = if i == 0 {
                offsets.timezone = zone.offset_minutes_at(anchor)?;
                let here = offsets;
                windows.push(OffsetWindow {
                    start_index: Some(index),
                    end_index: None,
                    offsets: WindowOffsets::Fixed(here),
                });
                (zone.to_utc(clock.to)?, here)
            } else {
                let here = offsets;
                windows.push(OffsetWindow {
                    start_index: Some(index),
                    end_index: Some(current_index),
                    offsets: WindowOffsets::Fixed(here),
                });
                (here.apply(clock.to), here)
            };

            offsets.cross(&clock);
            current_index = index;

            time_changes.push(TimeChange {
                time: RecordTime {
                    time,
                    device_time: clock.to,
                    timezone_offset: here.timezone,
                    clock_drift_offset: here.clock_drift,
                    conversion_offset: here.conversion,
                    index,
                },
                from: clock.from,
                to: clock.to,
                agent: Agent::Manual,
            });
        }

        windows.push(OffsetWindow {
            start_index: None,
            end_index: Some(current_index),
            offsets: WindowOffsets::Fixed(offsets),
        });

        tracing::debug!(
            "Built {} offset windows from {} clock changes",
            windows.len(),
            changes.len()
        );

        Ok(Self {
            zone,
            windows,
            time_changes,
        })
    }

    pub fn windows(&self) -> &[OffsetWindow] {
        &self.windows
    }

    /// Time change records, each stamped from the window after it
    pub fn time_changes(&self) -> &[TimeChange] {
        &self.time_changes
    }

    pub fn window_for(&self, index: u32) -> Option<&OffsetWindow> {
        self.windows.iter().find(|w| w.contains(index))
    }

    pub fn resolve(&self, timestamp: DeviceTimestamp) -> Result<RecordTime> {
        let device_time = timestamp.device_time()?;
        let offsets = match self.window_for(timestamp.counter).map(|w| w.offsets) {
            Some(WindowOffsets::Fixed(offsets)) => offsets,
            Some(WindowOffsets::Zone) | None => {
                let time = self.zone.to_utc(device_time)?;
                return Ok(RecordTime {
                    time,
                    device_time,
                    timezone_offset: self.zone.offset_minutes_at(time)?,
                    clock_drift_offset: 0,
                    conversion_offset: 0,
                    index: timestamp.counter,
                });
            }
        };

        Ok(RecordTime {
            time: offsets.apply(device_time),
            device_time,
            timezone_offset: offsets.timezone,
            clock_drift_offset: offsets.clock_drift,
            conversion_offset: offsets.conversion,
            index: timestamp.counter,
        })
    }
}
