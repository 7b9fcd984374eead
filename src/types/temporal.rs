//! Epoch-millisecond encodings for temporal vendor values.
//!
//! All three encodings are UTC and millisecond-granular. Sub-millisecond
//! precision is truncated on the way in.

use crate::error::{ConnectorError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Midnight UTC of `date`, in epoch milliseconds.
#[must_use]
pub fn date_to_millis(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Calendar date whose midnight UTC is `millis`.
///
/// # Errors
/// `ValueOutOfRange` when `millis` is not a midnight or is outside chrono's
/// range.
pub fn millis_to_date(millis: i64) -> Result<NaiveDate> {
    if millis.rem_euclid(MILLIS_PER_DAY) != 0 {
        return Err(ConnectorError::out_of_range(millis, "DATE (not a midnight UTC)"));
    }
    millis_to_timestamp(millis).map(|ts| ts.date())
}

/// Milliseconds since midnight.
#[must_use]
pub fn time_to_millis(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight()) * 1000 + i64::from(time.nanosecond() / 1_000_000)
}

/// Time of day for `millis`; whole days (including negative ones) are dropped.
///
/// # Errors
/// Never in practice; kept fallible to match the other decoders.
pub fn millis_to_time(millis: i64) -> Result<NaiveTime> {
    let of_day = millis.rem_euclid(MILLIS_PER_DAY);
    let secs = u32::try_from(of_day / 1000).map_err(|_| ConnectorError::out_of_range(millis, "TIME"))?;
    let nanos = u32::try_from(of_day % 1000).map_err(|_| ConnectorError::out_of_range(millis, "TIME"))? * 1_000_000;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .ok_or_else(|| ConnectorError::out_of_range(millis, "TIME"))
}

/// Epoch milliseconds of a timestamp taken as UTC.
#[must_use]
pub fn timestamp_to_millis(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_millis()
}

/// UTC timestamp for epoch milliseconds.
///
/// # Errors
/// `ValueOutOfRange` when the instant is outside chrono's range.
pub fn millis_to_timestamp(millis: i64) -> Result<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| ConnectorError::out_of_range(millis, "TIMESTAMP"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_date_is_zero() {
        let d = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(date_to_millis(d), 0);
        assert_eq!(millis_to_date(0).unwrap(), d);
    }

    #[test]
    fn pre_epoch_midnight_is_previous_day() {
        let d = millis_to_date(-MILLIS_PER_DAY).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(1969, 12, 31).unwrap());
    }

    #[test]
    fn date_with_time_of_day_is_rejected() {
        for ms in [-1, 1, 3_600_000, MILLIS_PER_DAY - 1] {
            assert!(matches!(millis_to_date(ms), Err(ConnectorError::ValueOutOfRange { .. })), "{ms}");
        }
    }

    #[test]
    fn negative_time_wraps_into_day() {
        let t = millis_to_time(-1000).unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(23, 59, 59).unwrap());
    }

    #[test]
    fn timestamp_drops_sub_millis() {
        let ts = NaiveDate::from_ymd_opt(2020, 5, 17)
            .unwrap()
            .and_hms_nano_opt(10, 11, 12, 345_678_901)
            .unwrap();
        let ms = timestamp_to_millis(ts);
        let back = millis_to_timestamp(ms).unwrap();
        assert_eq!(back.and_utc().timestamp_subsec_millis(), 345);
        assert_eq!(timestamp_to_millis(back), ms);
    }
}
