//! Start instant, increment and the per-file EXIF timestamp.
//!
//! File `i` is stamped with `start + i * increment`. Nothing is accumulated
//! between files, so files can be processed in any order.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, TimeDelta};

use crate::error::{Error, Result};

const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";
const EXIF_DATE_LEN: usize = 19;

/// An EXIF date/time string, `YYYY:MM:DD HH:MM:SS`, without timezone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExifDateTime(String);

impl ExifDateTime {
    /// Format a wall-clock time. Years outside 0000-9999 do not fit the
    /// fixed-width field and are rejected.
    pub fn from_naive(when: NaiveDateTime) -> Result<Self> {
        if !(0..=9999).contains(&when.year()) {
            return Err(Error::InvalidTimestamp(format!(
                "{when} is outside the years EXIF can record"
            )));
        }
        Ok(Self(when.format(EXIF_DATE_FORMAT).to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ExifDateTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != EXIF_DATE_LEN {
            return Err(Error::InvalidTimestamp(format!(
                "{s:?} is not in YYYY:MM:DD HH:MM:SS form"
            )));
        }
        let when = NaiveDateTime::parse_from_str(s, EXIF_DATE_FORMAT)
            .map_err(|e| Error::InvalidTimestamp(format!("{s:?}: {e}")))?;
        Self::from_naive(when)
    }
}

impl fmt::Display for ExifDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse an ISO-8601 instant with a mandatory zone offset, e.g.
/// `2021-01-20T17:00:01Z` or `2021-01-20T17:00:01-05:00`. Seconds may be
/// left out (`2021-01-20T17:00Z`).
pub fn parse_start(input: &str) -> Result<DateTime<FixedOffset>> {
    let text = input.trim();
    DateTime::parse_from_rfc3339(text)
        .or_else(|e| DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M%#z").map_err(|_| e))
        .map_err(|e| Error::InvalidTimestamp(format!("{input:?}: {e}")))
}

/// Parse an ISO-8601 duration of the form `[±]PnDTnHnMn.nS`, e.g. `PT10M`.
///
/// Days are exact 24-hour days. Years, months and weeks are not accepted since
/// they have no fixed length. Every component may carry its own sign, and the
/// seconds component may have up to nine fractional digits.
pub fn parse_duration(input: &str) -> Result<TimeDelta> {
    let invalid = || Error::InvalidDuration(input.to_string());
    let text = input.trim();

    let (negate, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let rest = rest.strip_prefix(['P', 'p']).ok_or_else(invalid)?;
    let (date_part, time_part) = match rest.find(['T', 't']) {
        Some(i) => (&rest[..i], Some(&rest[i + 1..])),
        None => (rest, None),
    };

    let mut total = TimeDelta::zero();
    let mut components = 0;

    // Days is the only date unit and may appear once.
    for (number, unit) in split_components(date_part).ok_or_else(invalid)? {
        if unit != 'D' || components > 0 {
            return Err(invalid());
        }
        let part = TimeDelta::try_days(parse_whole(number).ok_or_else(invalid)?);
        total = total.checked_add(&part.ok_or_else(invalid)?).ok_or_else(invalid)?;
        components += 1;
    }

    if let Some(time_part) = time_part {
        if time_part.is_empty() {
            return Err(invalid());
        }
        let mut last_unit = 0;
        for (number, unit) in split_components(time_part).ok_or_else(invalid)? {
            let rank = match unit {
                'H' => 1,
                'M' => 2,
                'S' => 3,
                _ => return Err(invalid()),
            };
            if rank <= last_unit {
                return Err(invalid());
            }
            last_unit = rank;

            let part = match unit {
                'H' => TimeDelta::try_hours(parse_whole(number).ok_or_else(invalid)?),
                'M' => TimeDelta::try_minutes(parse_whole(number).ok_or_else(invalid)?),
                _ => parse_seconds(number),
            };
            total = total.checked_add(&part.ok_or_else(invalid)?).ok_or_else(invalid)?;
            components += 1;
        }
    }

    if components == 0 {
        return Err(invalid());
    }
    Ok(if negate { -total } else { total })
}

/// Split `12H30M` into `[("12", 'H'), ("30", 'M')]`. Units are upper-cased.
fn split_components(part: &str) -> Option<Vec<(&str, char)>> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in part.char_indices() {
        if c.is_ascii_alphabetic() {
            if i == start {
                return None;
            }
            out.push((&part[start..i], c.to_ascii_uppercase()));
            start = i + c.len_utf8();
        }
    }
    (start == part.len()).then_some(out)
}

fn parse_whole(number: &str) -> Option<i64> {
    if number.contains(['.', ',']) {
        return None;
    }
    number.parse().ok()
}

fn parse_seconds(number: &str) -> Option<TimeDelta> {
    let (negative, digits) = match number.as_bytes().first()? {
        b'-' => (true, &number[1..]),
        b'+' => (false, &number[1..]),
        _ => (false, number),
    };
    let (whole, fraction) = match digits.find(['.', ',']) {
        Some(i) => (&digits[..i], &digits[i + 1..]),
        None => (digits, ""),
    };
    if whole.is_empty()
        || fraction.len() > 9
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let seconds: i64 = whole.parse().ok()?;
    let nanos: i64 = if fraction.is_empty() {
        0
    } else {
        format!("{fraction:0<9}").parse().ok()?
    };
    let value = TimeDelta::try_seconds(seconds)?.checked_add(&TimeDelta::nanoseconds(nanos))?;
    Some(if negative { -value } else { value })
}

/// Start time and increment for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    start: NaiveDateTime,
    increment: TimeDelta,
}

impl Schedule {
    /// The wall-clock time in the start instant's own offset is what gets
    /// stamped.
    pub fn new(start: DateTime<FixedOffset>, increment: TimeDelta) -> Self {
        Self {
            start: start.naive_local(),
            increment,
        }
    }

    pub fn parse(start: &str, increment: &str) -> Result<Self> {
        Ok(Self::new(parse_start(start)?, parse_duration(increment)?))
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn increment(&self) -> TimeDelta {
        self.increment
    }

    /// Timestamp for the file at `index` in sorted order.
    pub fn timestamp_for(&self, index: usize) -> Result<ExifDateTime> {
        let overflow = || {
            Error::InvalidTimestamp(format!(
                "{} + {index} x {} overflows the calendar",
                self.start, self.increment
            ))
        };
        let factor = i32::try_from(index).map_err(|_| overflow())?;
        let offset = self.increment.checked_mul(factor).ok_or_else(overflow)?;
        let when = self.start.checked_add_signed(offset).ok_or_else(overflow)?;
        ExifDateTime::from_naive(when)
    }
}
