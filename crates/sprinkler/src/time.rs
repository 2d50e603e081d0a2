//! Conversions between the UTC clock the controller runs on and the local
//! civil time programs are written in.
//!
//! All instants are Unix seconds. Nothing in here reads the wall clock.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::error::{Result, ScheduleError};

pub const SECONDS_PER_DAY: u32 = 86_400;

/// Longest DST gap we probe through when local midnight does not exist.
const MAX_GAP_MINUTES: i64 = 180;

/// Seconds from local midnight for a wall-clock `hour:minute`.
pub fn seconds_from_midnight(hour: u32, minute: u32) -> Result<u32> {
    if hour >= 24 {
        return Err(ScheduleError::Range {
            field: "hour",
            value: hour,
            min: 0,
            max: 23,
        });
    }
    if minute >= 60 {
        return Err(ScheduleError::Range {
            field: "minute",
            value: minute,
            min: 0,
            max: 59,
        });
    }
    Ok(hour * 3600 + minute * 60)
}

/// The local date and time in `tz` at the UTC instant `now`.
pub fn local_datetime_for_utc(now: i64, tz: Tz) -> Result<DateTime<Tz>> {
    DateTime::from_timestamp(now, 0)
        .map(|utc| utc.with_timezone(&tz))
        .ok_or(ScheduleError::InvalidTimestamp(now))
}

/// The UTC instant of local midnight for the local day containing `now`.
///
/// This is an instant, not `now` rounded down by a fixed 86400: local days
/// are 23 or 25 hours long across DST transitions.
pub fn utc_for_local_midnight(now: i64, tz: Tz) -> Result<i64> {
    let local = local_datetime_for_utc(now, tz)?;
    let midnight = local
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .ok_or(ScheduleError::InvalidTimestamp(now))?;
    first_instant_at_or_after(tz, midnight)
        .map(|dt| dt.timestamp())
        .ok_or(ScheduleError::InvalidTimestamp(now))
}

/// Resolve a local wall-clock time to an instant. Ambiguous times take the
/// earlier instant; times inside a gap resolve to the end of the gap.
fn first_instant_at_or_after(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    if let Some(dt) = tz.from_local_datetime(&local).earliest() {
        return Some(dt);
    }
    (1..=MAX_GAP_MINUTES).find_map(|m| {
        tz.from_local_datetime(&(local + Duration::minutes(m)))
            .earliest()
    })
}

/// True when `now` is at `check_time` or at most `jitter` seconds past it.
///
/// Never true before `check_time`.
pub fn after_now(now: i64, check_time: i64, jitter: i64) -> bool {
    now == check_time
        || (now > check_time && now.checked_sub(check_time).is_some_and(|late| late <= jitter))
}
