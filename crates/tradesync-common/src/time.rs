//! Broker-clock timestamp normalization
//!
//! The trading terminal stamps records with epoch values that are really the
//! broker server's wall clock written as if it were UTC. This module turns
//! such a value back into a true instant and re-expresses it in a fixed-offset
//! target zone.
//!
//! Two broker clocks are supported:
//!
//! - [`BrokerClock::LocalMonth`]: summer offset for calendar months April to
//!   October of the *raw* value read as a naive date, winter offset otherwise.
//!   This is the rule the stored history was produced with; it is off by one
//!   hour for the days between the real DST switch and the month boundary.
//! - [`BrokerClock::Zone`]: the IANA rules of the broker's zone.
//!
//! # Example
//!
//! ```
//! use tradesync_common::time::{EpochUnit, TimestampNormalizer};
//!
//! let normalizer = TimestampNormalizer::default();
//!
//! // 2024-06-15 12:00:00 on the broker clock
//! let dt = normalizer.normalize(Some(1_718_452_800), EpochUnit::Seconds).unwrap();
//! assert_eq!(dt.to_rfc3339(), "2024-06-15T17:00:00+08:00");
//!
//! assert!(normalizer.normalize(None, EpochUnit::Seconds).is_none());
//! ```

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{CommonError, Result};

/// Broker offset from UTC during April-October, in hours.
pub const DEFAULT_SUMMER_OFFSET_HOURS: i32 = 3;

/// Broker offset from UTC outside April-October, in hours.
pub const DEFAULT_WINTER_OFFSET_HOURS: i32 = 2;

/// Offset of the zone normalized values are expressed in, in hours.
pub const DEFAULT_TARGET_OFFSET_HOURS: i32 = 8;

/// IANA zone used when the zone-aware clock is selected without a name.
pub const DEFAULT_BROKER_TIMEZONE: &str = "Europe/Athens";

const SECONDS_PER_HOUR: i32 = 3600;

/// First and last calendar month (inclusive) on summer time.
const SUMMER_MONTHS: std::ops::RangeInclusive<u32> = 4..=10;

/// Resolution of a raw epoch value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochUnit {
    Seconds,
    Milliseconds,
}

/// How the broker's wall clock relates to UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerClock {
    /// Month-based rule evaluated on the naive wall-clock date.
    LocalMonth {
        summer_offset_secs: i32,
        winter_offset_secs: i32,
    },
    /// Full timezone rules.
    Zone(Tz),
}

impl BrokerClock {
    /// Month-based clock with offsets given in whole hours
    pub fn local_month(summer_offset_hours: i32, winter_offset_hours: i32) -> Result<Self> {
        Ok(Self::LocalMonth {
            summer_offset_secs: offset_secs(summer_offset_hours, "summer")?,
            winter_offset_secs: offset_secs(winter_offset_hours, "winter")?,
        })
    }

    /// Zone-aware clock from an IANA name such as `Europe/Athens`
    pub fn zone(name: &str) -> Result<Self> {
        name.parse::<Tz>()
            .map(Self::Zone)
            .map_err(|_| CommonError::InvalidTimezone(name.to_string()))
    }

    /// Interpret a naive broker wall-clock value as a UTC instant
    fn to_utc(&self, wall_clock: NaiveDateTime) -> Option<DateTime<Utc>> {
        match *self {
            BrokerClock::LocalMonth {
                summer_offset_secs,
                winter_offset_secs,
            } => {
                let offset = if SUMMER_MONTHS.contains(&wall_clock.month()) {
                    summer_offset_secs
                } else {
                    winter_offset_secs
                };
                let utc = wall_clock.checked_sub_signed(TimeDelta::try_seconds(offset.into())?)?;
                Some(Utc.from_utc_datetime(&utc))
            },
            BrokerClock::Zone(tz) => {
                // Repeated hours resolve to the first occurrence; skipped hours
                // are read one hour later, past the gap.
                let local = tz.from_local_datetime(&wall_clock).earliest().or_else(|| {
                    let shifted = wall_clock.checked_add_signed(TimeDelta::try_hours(1)?)?;
                    tz.from_local_datetime(&shifted).earliest()
                })?;
                Some(local.with_timezone(&Utc))
            },
        }
    }
}

impl Default for BrokerClock {
    fn default() -> Self {
        Self::LocalMonth {
            summer_offset_secs: DEFAULT_SUMMER_OFFSET_HOURS * SECONDS_PER_HOUR,
            winter_offset_secs: DEFAULT_WINTER_OFFSET_HOURS * SECONDS_PER_HOUR,
        }
    }
}

/// Converts broker-clock epochs into the fixed target zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampNormalizer {
    clock: BrokerClock,
    target_offset_secs: i32,
}

impl TimestampNormalizer {
    pub fn new(clock: BrokerClock, target_offset_hours: i32) -> Result<Self> {
        Ok(Self {
            clock,
            target_offset_secs: offset_secs(target_offset_hours, "target")?,
        })
    }

    pub fn clock(&self) -> BrokerClock {
        self.clock
    }

    /// The fixed offset normalized values carry
    pub fn target_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.target_offset_secs).unwrap_or_else(|| Utc.fix())
    }

    /// Normalize one raw epoch value.
    ///
    /// Absent input yields `None`. Values outside the range chrono can
    /// represent also yield `None`; this never panics.
    pub fn normalize(&self, value: Option<i64>, unit: EpochUnit) -> Option<DateTime<FixedOffset>> {
        let raw = match unit {
            EpochUnit::Seconds => DateTime::from_timestamp(value?, 0)?,
            EpochUnit::Milliseconds => DateTime::from_timestamp_millis(value?)?,
        };
        let utc = self.clock.to_utc(raw.naive_utc())?;
        Some(utc.with_timezone(&self.target_offset()))
    }
}

impl Default for TimestampNormalizer {
    fn default() -> Self {
        Self {
            clock: BrokerClock::default(),
            target_offset_secs: DEFAULT_TARGET_OFFSET_HOURS * SECONDS_PER_HOUR,
        }
    }
}

fn offset_secs(hours: i32, label: &str) -> Result<i32> {
    if !(-23..=23).contains(&hours) {
        return Err(CommonError::Config(format!(
            "{} offset must be within -23..=23 hours, got {}",
            label, hours
        )));
    }
    Ok(hours * SECONDS_PER_HOUR)
}
