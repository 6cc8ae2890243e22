// Timestamp lines: `MM/DD/YY HH:MM:SS`, as iostat prints them with `-t`.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::error::{Error, Result};

static TIMESTAMP_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{1,2})\s(\d{2}):(\d{2}):(\d{2})$")
        .expect("timestamp pattern compiles")
});

/// Two-digit years count from 2000 (`18` is 2018).
const CENTURY_BASE: i32 = 2000;

/// True iff the whole line (trailing whitespace aside) is a snapshot timestamp.
pub fn is_timestamp_line(line: &str) -> bool {
    TIMESTAMP_LINE.is_match(line.trim_end())
}

/// Parse a timestamp line. Lines that do not match, or name an impossible
/// calendar date, are a `Format` error reported at line 0; callers re-tag it.
pub fn parse_timestamp(line: &str) -> Result<NaiveDateTime> {
    let line = line.trim_end();
    let caps = TIMESTAMP_LINE
        .captures(line)
        .ok_or_else(|| Error::format(0, format!("not a timestamp line: {line:?}")))?;
    let num = |i: usize| -> u32 { caps[i].parse().unwrap_or(u32::MAX) };

    let (month, day, year) = (num(1), num(2), CENTURY_BASE + num(3) as i32);
    let (hour, minute, second) = (num(4), num(5), num(6));

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(|| Error::format(0, format!("invalid calendar timestamp: {line:?}")))
}
