use chrono::{Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use super::freebusy::Interval;
use crate::errors::{DonnaError, DonnaResult};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a strict, zero-padded `YYYY-MM-DD` date
pub fn parse_day(input: &str) -> DonnaResult<NaiveDate> {
    let input = input.trim();
    let invalid = || DonnaError::validation("date", format!("'{}' is not a YYYY-MM-DD date (e.g. 2024-03-16)", input));

    // chrono accepts unpadded months and days, so check the shape first
    let bytes = input.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes.iter().enumerate().all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !well_formed {
        return Err(invalid());
    }

    NaiveDate::parse_from_str(input, DATE_FORMAT).map_err(|_| invalid())
}

/// `[local midnight, local midnight + 24h)` of `date` in `tz`, expressed in UTC
pub fn day_span(date: NaiveDate, tz: Tz) -> DonnaResult<Interval> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| DonnaError::validation("date", format!("{} has no midnight", date)))?;

    // Midnight can fall into a DST gap; take the first valid instant after it
    let start = tz
        .from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
        .ok_or_else(|| DonnaError::validation("date", format!("{} does not exist in {}", midnight, tz)))?
        .with_timezone(&Utc);

    Ok(Interval::new(start, start + Duration::hours(24)))
}
