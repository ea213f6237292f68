//! Date math expressions.
//!
//! Expressions follow the search-engine convention: an anchor (`now` or a
//! literal date followed by `||`), zero or more signed offsets, and an
//! optional rounding unit:
//!
//! ```text
//! now-30d
//! 2024-01-31||+1M
//! now+1d-2h/d
//! ```
//!
//! Units are `y` (years), `M` (months), `w` (weeks), `d` (days), `h`/`H`
//! (hours), `m` (minutes) and `s` (seconds). Month and year offsets clamp the
//! day of month to the end of the resulting month. Rounding truncates to the
//! start of the unit in UTC; weeks start on Sunday.
//!
//! `now` is read from a [`Clock`] so callers can pin it in tests.

use chrono::{
    DateTime, Datelike, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta,
    TimeZone, Timelike, Utc,
};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::DateMathError;
use crate::value::Timestamp;

/// Anchor, offset terms and rounding unit. Unit letters are validated after
/// matching so an unknown unit is reported as such.
static DATE_MATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((?:[\dT:+\-Z.]*\|\|)|now)((?:[+-]\d+[A-Za-z])*)(?:/([A-Za-z]))?$")
        .expect("date math pattern is valid")
});

static TERM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([+-])(\d+)([A-Za-z])").expect("date math term pattern is valid"));

static EXPLICIT_OFFSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([+-])(\d\d):(\d\d)$").expect("offset pattern is valid"));

/// Source of the current time for `now`.
pub trait Clock {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from(Utc::now())
    }
}

/// A clock pinned to one instant.
///
/// # Example
///
/// ```
/// use quarry::{parse_date_math, FixedClock, Timestamp};
///
/// let clock = FixedClock(Timestamp::from_millis(1_708_000_496_789)); // 2024-02-15T12:34:56.789Z
/// let start_of_day = parse_date_math("now/d", &clock).unwrap();
/// assert_eq!(start_of_day.to_rfc3339(), "2024-02-15T00:00:00.000Z");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

impl<F> Clock for F
where
    F: Fn() -> Timestamp,
{
    fn now(&self) -> Timestamp {
        self()
    }
}

/// Date math unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

impl Unit {
    fn parse(letter: &str) -> Result<Unit, DateMathError> {
        match letter {
            "y" => Ok(Unit::Year),
            "M" => Ok(Unit::Month),
            "w" => Ok(Unit::Week),
            "d" => Ok(Unit::Day),
            "h" | "H" => Ok(Unit::Hour),
            "m" => Ok(Unit::Minute),
            "s" => Ok(Unit::Second),
            other => Err(DateMathError::UnsupportedUnit(other.to_string())),
        }
    }
}

/// Returns `true` if `expr` has the shape of a date math expression.
///
/// Shape only: the anchor literal and unit letters are checked by
/// [`parse_date_math`].
pub fn is_date_math(expr: &str) -> bool {
    DATE_MATH.is_match(expr)
}

/// Parses a date math expression into a timestamp.
pub fn parse_date_math(expr: &str, clock: &dyn Clock) -> Result<Timestamp, DateMathError> {
    let caps = DATE_MATH.captures(expr).ok_or(DateMathError::Syntax)?;

    let anchor = caps.get(1).map_or("", |m| m.as_str());
    let mut date = if anchor == "now" {
        clock.now().to_datetime().ok_or(DateMathError::OutOfRange)?
    } else {
        let literal = anchor.trim_end_matches("||");
        parse_date_literal(literal).ok_or_else(|| DateMathError::InvalidLiteral(literal.to_string()))?
    };

    if let Some(math) = caps.get(2) {
        for term in TERM.captures_iter(math.as_str()) {
            let negative = &term[1] == "-";
            let amount: i64 = term[2].parse().map_err(|_| DateMathError::OutOfRange)?;
            let unit = Unit::parse(&term[3])?;
            date = apply_offset(date, if negative { -amount } else { amount }, unit)?;
        }
    }

    if let Some(round) = caps.get(3) {
        date = round_down(date, Unit::parse(round.as_str())?)?;
    }

    Ok(Timestamp::from(date))
}

/// Parses a literal calendar date.
///
/// Accepts `YYYY`, `YYYY-MM`, `YYYY-MM-DD` and `YYYY-MM-DDTHH:MM[:SS[.fff]]`,
/// optionally followed by `Z` or a `±HH:MM` offset. Literals without an
/// explicit offset are UTC.
pub fn parse_date_literal(literal: &str) -> Option<DateTime<Utc>> {
    let literal = literal.trim();

    let (local, offset) = if let Some(stripped) = literal.strip_suffix('Z') {
        (stripped, FixedOffset::east_opt(0)?)
    } else if let Some(caps) = EXPLICIT_OFFSET.captures(literal).filter(|_| literal.contains('T')) {
        let hours: i32 = caps[2].parse().ok()?;
        let minutes: i32 = caps[3].parse().ok()?;
        let seconds = hours * 3600 + minutes * 60;
        let offset = if &caps[1] == "-" {
            FixedOffset::west_opt(seconds)?
        } else {
            FixedOffset::east_opt(seconds)?
        };
        let start = caps.get(0)?.start();
        (&literal[..start], offset)
    } else {
        (literal, FixedOffset::east_opt(0)?)
    };

    let naive = parse_naive(local)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_naive(local: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

    if local.contains('T') {
        return DATETIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(local, fmt).ok());
    }

    let date = match local.len() {
        4 => NaiveDate::parse_from_str(&format!("{local}-01-01"), "%Y-%m-%d").ok()?,
        7 => NaiveDate::parse_from_str(&format!("{local}-01"), "%Y-%m-%d").ok()?,
        _ => NaiveDate::parse_from_str(local, "%Y-%m-%d").ok()?,
    };
    Some(date.and_time(NaiveTime::MIN))
}

fn apply_offset(date: DateTime<Utc>, amount: i64, unit: Unit) -> Result<DateTime<Utc>, DateMathError> {
    let shifted = match unit {
        Unit::Year => shift_months(date, amount.checked_mul(12).ok_or(DateMathError::OutOfRange)?),
        Unit::Month => shift_months(date, amount),
        Unit::Week => amount
            .checked_mul(7)
            .and_then(TimeDelta::try_days)
            .and_then(|delta| date.checked_add_signed(delta)),
        Unit::Day => TimeDelta::try_days(amount).and_then(|delta| date.checked_add_signed(delta)),
        Unit::Hour => TimeDelta::try_hours(amount).and_then(|delta| date.checked_add_signed(delta)),
        Unit::Minute => TimeDelta::try_minutes(amount).and_then(|delta| date.checked_add_signed(delta)),
        Unit::Second => TimeDelta::try_seconds(amount).and_then(|delta| date.checked_add_signed(delta)),
    };
    shifted.ok_or(DateMathError::OutOfRange)
}

/// Calendar month arithmetic; the day of month is clamped to the last day
/// of the target month.
fn shift_months(date: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months < 0 {
        date.checked_sub_months(magnitude)
    } else {
        date.checked_add_months(magnitude)
    }
}

fn round_down(date: DateTime<Utc>, unit: Unit) -> Result<DateTime<Utc>, DateMathError> {
    let day = date.date_naive();
    let rounded = match unit {
        Unit::Year => NaiveDate::from_ymd_opt(day.year(), 1, 1).map(|d| d.and_time(NaiveTime::MIN)),
        Unit::Month => NaiveDate::from_ymd_opt(day.year(), day.month(), 1).map(|d| d.and_time(NaiveTime::MIN)),
        Unit::Week => {
            let back = i64::from(day.weekday().num_days_from_sunday());
            day.checked_sub_signed(TimeDelta::days(back))
                .map(|d| d.and_time(NaiveTime::MIN))
        }
        Unit::Day => Some(day.and_time(NaiveTime::MIN)),
        Unit::Hour => NaiveTime::from_hms_opt(date.hour(), 0, 0).map(|t| day.and_time(t)),
        Unit::Minute => NaiveTime::from_hms_opt(date.hour(), date.minute(), 0).map(|t| day.and_time(t)),
        Unit::Second => {
            NaiveTime::from_hms_opt(date.hour(), date.minute(), date.second()).map(|t| day.and_time(t))
        }
    };
    rounded
        .map(|naive| naive.and_utc())
        .ok_or(DateMathError::OutOfRange)
}
