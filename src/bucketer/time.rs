// Calendar math shared by both aggregation paths: truncation and offsets.

use chrono::{Datelike, Days, Duration, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Calendar granularity, ordered coarse to fine (`Year < Second`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[serde(alias = "years")]
    Year,
    #[serde(alias = "months")]
    Month,
    #[serde(alias = "days")]
    Day,
    #[serde(alias = "hours")]
    Hour,
    #[serde(alias = "minutes")]
    Minute,
    #[serde(alias = "seconds")]
    Second,
}

impl TimeUnit {
    /// True if `self` is the same as or finer than `other`.
    pub fn is_finer_or_equal(self, other: TimeUnit) -> bool {
        self >= other
    }
}

/// Zero every calendar component finer than `level`, sub-second part included.
pub fn truncate(ts: NaiveDateTime, level: TimeUnit) -> NaiveDateTime {
    let date = ts.date();
    let time = ts.time();
    let date = match level {
        TimeUnit::Year => date - Days::new(u64::from(date.ordinal0())),
        TimeUnit::Month => date - Days::new(u64::from(date.day0())),
        _ => date,
    };
    let kept = match level {
        TimeUnit::Year | TimeUnit::Month | TimeUnit::Day => Duration::zero(),
        TimeUnit::Hour => Duration::hours(i64::from(time.hour())),
        TimeUnit::Minute => {
            Duration::hours(i64::from(time.hour())) + Duration::minutes(i64::from(time.minute()))
        }
        TimeUnit::Second => Duration::seconds(i64::from(time.num_seconds_from_midnight())),
    };
    date.and_time(NaiveTime::MIN) + kept
}

/// Sub-bucket index of `ts` at `resolution`.
///
/// MONTH and DAY count from 1 while HOUR, MINUTE and SECOND count from 0, and
/// YEAR is a plain difference. Existing stored buckets depend on these exact
/// values, so the asymmetry is kept as is.
pub fn offset(bucket_ts: NaiveDateTime, ts: NaiveDateTime, resolution: TimeUnit) -> i64 {
    let elapsed = ts - bucket_ts;
    match resolution {
        TimeUnit::Year => i64::from(ts.year() - bucket_ts.year()),
        TimeUnit::Month => i64::from(ts.month()) - i64::from(bucket_ts.month()) + 1,
        TimeUnit::Day => elapsed.num_days() + 1,
        TimeUnit::Hour => elapsed.num_hours(),
        TimeUnit::Minute => elapsed.num_minutes(),
        TimeUnit::Second => elapsed.num_seconds(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn truncate_cascades_from_level_down() {
        let ts = at(2019, 2, 2, 1, 59, 59);
        assert_eq!(truncate(ts, TimeUnit::Year), at(2019, 1, 1, 0, 0, 0));
        assert_eq!(truncate(ts, TimeUnit::Month), at(2019, 2, 1, 0, 0, 0));
        assert_eq!(truncate(ts, TimeUnit::Day), at(2019, 2, 2, 0, 0, 0));
        assert_eq!(truncate(ts, TimeUnit::Hour), at(2019, 2, 2, 1, 0, 0));
        assert_eq!(truncate(ts, TimeUnit::Minute), at(2019, 2, 2, 1, 59, 0));
        assert_eq!(truncate(ts, TimeUnit::Second), ts);
    }

    #[test]
    fn truncate_drops_nanos() {
        let ts = at(2019, 2, 2, 1, 59, 59) + Duration::milliseconds(250);
        assert_eq!(truncate(ts, TimeUnit::Second), at(2019, 2, 2, 1, 59, 59));
    }

    #[test]
    fn unit_order_is_coarse_to_fine() {
        assert!(TimeUnit::Second.is_finer_or_equal(TimeUnit::Minute));
        assert!(TimeUnit::Day.is_finer_or_equal(TimeUnit::Day));
        assert!(!TimeUnit::Month.is_finer_or_equal(TimeUnit::Day));
    }
}
