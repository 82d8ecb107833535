//! Cron expression parsing and next-occurrence search.
//!
//! ```text
//! *    *    *    *    *    *
//! ┬    ┬    ┬    ┬    ┬    ┬
//! │    │    │    │    │    └ day of week (0-7, 0 or 7 is Sunday)
//! │    │    │    │    └───── month (1-12)
//! │    │    │    └────────── day of month (1-31)
//! │    │    └─────────────── hour (0-23)
//! │    └──────────────────── minute (0-59)
//! └───────────────────────── second (0-59, optional)
//! ```
//!
//! The day-of-month field additionally understands `L` (last day of month),
//! `LW` (last workday of month) and `nW` (nearest workday to day `n`); the
//! day-of-week field understands `xL` (last weekday `x` in the month) and
//! `x#n` (the n-th weekday `x` in the month).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::bitset::{BitSet16, BitSet32, BitSet64, BitSet8};
use crate::error::{CronError, Result};
use crate::field::{self, FieldDescriptor};

/// How far ahead of the starting instant the occurrence search is willing to
/// scan before concluding the expression has no solution (e.g. `0 0 0 30 2 *`).
const SEARCH_HORIZON_DAYS: i64 = 365 * 5 + 2;

/// A parsed cron expression.
///
/// The canonical (alias-expanded) source text is retained: equality and
/// serialization both go through it, so two expressions compare equal exactly
/// when their texts do.
#[derive(Debug, Clone)]
pub struct CronExpression {
    source: String,

    seconds: BitSet64,
    minutes: BitSet64,
    hours: BitSet64,
    months: BitSet16,

    days_of_month: BitSet32,
    dom_restricted: bool,
    last_day: bool,
    last_workday: bool,
    nearest_workday: Option<u32>,

    days_of_week: BitSet8,
    dow_restricted: bool,
    last_dow: BitSet8,
    // bit (weekday + 7 * n) marks "n-th <weekday> of the month"
    nth_dow: BitSet64,
}

impl CronExpression {
    /// Parse a cron expression with 5 fields (seconds default to `0`) or
    /// 6 fields (explicit seconds). Named aliases (`@daily`, `@hourly`, ...)
    /// are expanded first.
    pub fn parse(text: &str) -> Result<Self> {
        let source = expand_alias(text.trim()).to_string();
        let fields: Vec<&str> = source.split_whitespace().collect();
        let count = fields.len();
        if count < 5 || count > 6 {
            return Err(CronError::FieldCount {
                expr: source,
                count,
            });
        }

        // With 5 fields the seconds component is implicitly "0".
        let offset = fields.len() - 5;
        let seconds = if offset == 0 {
            BitSet64::empty().set(0, true)
        } else {
            parse_mask(fields[0], &field::SECOND)?
        };
        let minutes = parse_mask(fields[offset], &field::MINUTE)?;
        let hours = parse_mask(fields[offset + 1], &field::HOUR)?;
        let dom = DayOfMonth::parse(fields[offset + 2])?;
        let months = BitSet16(parse_mask(fields[offset + 3], &field::MONTH)?.0 as u16);
        let dow = DayOfWeek::parse(fields[offset + 4])?;

        Ok(Self {
            source,
            seconds,
            minutes,
            hours,
            months,
            days_of_month: dom.mask,
            dom_restricted: dom.restricted,
            last_day: dom.last_day,
            last_workday: dom.last_workday,
            nearest_workday: dom.nearest_workday,
            days_of_week: dow.mask,
            dow_restricted: dow.restricted,
            last_dow: dow.last,
            nth_dow: dow.nth,
        })
    }

    /// The canonical source text this expression was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compute the next matching instant strictly after `from`.
    ///
    /// Fails with [`CronError::NoMatch`] when no instant within the search
    /// horizon satisfies the expression.
    pub fn next_execution_date(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.search_after(from).ok_or_else(|| CronError::NoMatch {
            expr: self.source.clone(),
        })
    }

    /// Endless sequence of occurrences following `from`. The iterator ends
    /// only if the expression stops producing matches.
    pub fn execution_sequence(&self, from: DateTime<Utc>) -> ExecutionSequence<'_> {
        ExecutionSequence {
            expr: self,
            current: from,
        }
    }

    /// Cascading search, lowest unit first, carrying into the next higher
    /// unit whenever a field mask is exhausted.
    fn search_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = from.with_nanosecond(0)? + Duration::seconds(1);
        let horizon = start.date_naive() + Duration::days(SEARCH_HORIZON_DAYS);

        let mut date = start.date_naive();
        let (mut hour, mut minute, mut second) = (start.hour(), start.minute(), start.second());

        loop {
            if date > horizon {
                return None;
            }

            if !self.months.get(date.month()) {
                date = match self.months.first_set_at_or_after(date.month() + 1, 13) {
                    13 => NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)?,
                    next => NaiveDate::from_ymd_opt(date.year(), next, 1)?,
                };
                (hour, minute, second) = (0, 0, 0);
                continue;
            }

            if !self.day_matches(date) {
                date = date.succ_opt()?;
                (hour, minute, second) = (0, 0, 0);
                continue;
            }

            match self.hours.first_set_at_or_after(hour, 24) {
                24 => {
                    date = date.succ_opt()?;
                    (hour, minute, second) = (0, 0, 0);
                    continue;
                }
                h if h != hour => (hour, minute, second) = (h, 0, 0),
                _ => {}
            }

            match self.minutes.first_set_at_or_after(minute, 60) {
                60 => {
                    // hour carry cascades through the next loop pass
                    (hour, minute, second) = (hour + 1, 0, 0);
                    continue;
                }
                m if m != minute => (minute, second) = (m, 0),
                _ => {}
            }

            match self.seconds.first_set_at_or_after(second, 60) {
                60 => {
                    (minute, second) = (minute + 1, 0);
                    continue;
                }
                s => {
                    return date.and_hms_opt(hour, minute, s).map(|dt| dt.and_utc());
                }
            }
        }
    }

    /// Day eligibility with standard cron OR semantics: when both the
    /// day-of-month and day-of-week fields are restricted, a day matching
    /// either one is eligible. The `L`/`W`/`LW`/`#n` flags are evaluated
    /// against the candidate month's real length.
    fn day_matches(&self, date: NaiveDate) -> bool {
        match (self.dom_restricted, self.dow_restricted) {
            (false, false) => true,
            (true, false) => self.dom_matches(date),
            (false, true) => self.dow_matches(date),
            (true, true) => self.dom_matches(date) || self.dow_matches(date),
        }
    }

    fn dom_matches(&self, date: NaiveDate) -> bool {
        let day = date.day();
        if self.days_of_month.get(day) {
            return true;
        }
        let last = days_in_month(date.year(), date.month());
        if self.last_day && day == last {
            return true;
        }
        if self.last_workday && day == last_workday(date.year(), date.month()) {
            return true;
        }
        if let Some(n) = self.nearest_workday {
            if day == nearest_workday(date.year(), date.month(), n) {
                return true;
            }
        }
        false
    }

    fn dow_matches(&self, date: NaiveDate) -> bool {
        let dow = date.weekday().num_days_from_sunday();
        if self.days_of_week.get(dow) {
            return true;
        }
        if self.last_dow.get(dow) {
            // last such weekday: no same weekday left in this month
            let last = days_in_month(date.year(), date.month());
            if date.day() + 7 > last {
                return true;
            }
        }
        if !self.nth_dow.is_empty() {
            let nth = (date.day() - 1) / 7 + 1;
            if self.nth_dow.get(dow + 7 * nth) {
                return true;
            }
        }
        false
    }
}

/// Parsed day-of-month field: numeric mask plus the special-case flags.
struct DayOfMonth {
    mask: BitSet32,
    restricted: bool,
    last_day: bool,
    last_workday: bool,
    nearest_workday: Option<u32>,
}

impl DayOfMonth {
    fn parse(value: &str) -> Result<Self> {
        let mut dom = Self {
            mask: BitSet32::empty(),
            restricted: true,
            last_day: false,
            last_workday: false,
            nearest_workday: None,
        };

        match value {
            "*" => dom.restricted = false,
            "L" => dom.last_day = true,
            "LW" => dom.last_workday = true,
            _ if value.len() > 1 && value.ends_with('W') => {
                let day = field::DAY_OF_MONTH.parse(&value[..value.len() - 1])?;
                dom.nearest_workday = Some(day);
            }
            _ => dom.mask = BitSet32(parse_mask(value, &field::DAY_OF_MONTH)?.0 as u32),
        }
        Ok(dom)
    }
}

/// Parsed day-of-week field: numeric mask plus the `xL` / `x#n` flags.
struct DayOfWeek {
    mask: BitSet8,
    restricted: bool,
    last: BitSet8,
    nth: BitSet64,
}

impl DayOfWeek {
    fn parse(value: &str) -> Result<Self> {
        let mut dow = Self {
            mask: BitSet8::empty(),
            restricted: true,
            last: BitSet8::empty(),
            nth: BitSet64::empty(),
        };

        if value == "*" {
            dow.restricted = false;
            return Ok(dow);
        }

        if let Some((day, nth)) = value.split_once('#') {
            let day = field::DAY_OF_WEEK.parse(day)?;
            let nth: u32 = nth.parse().map_err(|_| CronError::InvalidField {
                field: field::DAY_OF_WEEK.name,
                value: value.to_string(),
            })?;
            if nth < 1 || nth > 5 {
                return Err(CronError::OutOfRange {
                    field: field::DAY_OF_WEEK.name,
                    value: value.to_string(),
                    min: 1,
                    max: 5,
                });
            }
            dow.nth = dow.nth.set(day + 7 * nth, true);
            return Ok(dow);
        }

        if value.len() > 1 && value.ends_with('L') {
            dow.last = BitSet8(parse_mask(&value[..value.len() - 1], &field::DAY_OF_WEEK)?.0 as u8);
            return Ok(dow);
        }

        dow.mask = BitSet8(parse_mask(value, &field::DAY_OF_WEEK)?.0 as u8);
        Ok(dow)
    }
}

/// Parse one standard field into a bitmask. Grammar, in precedence order:
/// `*` → comma list → `a-b[/c]` → `x/y` → single value.
fn parse_mask(value: &str, desc: &FieldDescriptor) -> Result<BitSet64> {
    if value == "*" {
        return Ok(full_mask(desc));
    }

    if value.contains(',') {
        let mut mask = BitSet64::empty();
        for token in value.split(',') {
            mask = mask.set(desc.parse(token)?, true);
        }
        return Ok(mask);
    }

    if let Some((min, rest)) = value.split_once('-') {
        let min = desc.parse(min)?;
        let (max, step) = match rest.split_once('/') {
            Some((max, step)) => (desc.parse(max)?, desc.parse(step)?),
            None => (desc.parse(rest)?, 0),
        };
        if min >= max {
            return Err(CronError::InvalidRange {
                field: desc.name,
                value: value.to_string(),
            });
        }
        if step >= max - min {
            return Err(CronError::InvalidStep {
                field: desc.name,
                value: value.to_string(),
            });
        }
        return Ok(build_steps(min, max, step));
    }

    if let Some((base, step)) = value.split_once('/') {
        let min = if base == "*" {
            desc.min
        } else {
            desc.parse(base)?
        };
        let step = desc.parse(step)?;
        if step == 0 {
            return Err(CronError::InvalidStep {
                field: desc.name,
                value: value.to_string(),
            });
        }
        return Ok(build_steps(min, desc.max, step));
    }

    Ok(BitSet64::empty().set(desc.parse(value)?, true))
}

fn full_mask(desc: &FieldDescriptor) -> BitSet64 {
    BitSet64::first(desc.max + 1).slice(desc.min, desc.max - desc.min + 1)
}

fn build_steps(min: u32, max: u32, step: u32) -> BitSet64 {
    if step <= 1 {
        BitSet64::first(max + 1).slice(min, max - min + 1)
    } else {
        let mut mask = BitSet64::empty();
        let mut i = min;
        while i <= max {
            mask = mask.set(i, true);
            i += step;
        }
        mask
    }
}

fn expand_alias(text: &str) -> &str {
    match text {
        "@yearly" | "@annually" => "0 0 0 1 1 *",
        "@monthly" => "0 0 0 1 * *",
        "@weekly" => "0 0 0 * * 0",
        "@daily" => "0 0 0 * * *",
        "@hourly" => "0 0 * * * *",
        other => other,
    }
}

fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ if is_leap_year(year) => 29,
        _ => 28,
    }
}

/// Last Monday-Friday day of the month.
fn last_workday(year: i32, month: u32) -> u32 {
    let mut day = days_in_month(year, month);
    while let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
        match date.weekday().num_days_from_sunday() {
            0 | 6 => day -= 1,
            _ => break,
        }
    }
    day
}

/// Nearest Monday-Friday day to day `n`, staying within the month.
fn nearest_workday(year: i32, month: u32, n: u32) -> u32 {
    let last = days_in_month(year, month);
    let n = n.min(last);
    let Some(date) = NaiveDate::from_ymd_opt(year, month, n) else {
        return n;
    };
    match date.weekday().num_days_from_sunday() {
        // Saturday: step back to Friday, unless that leaves the month
        6 => {
            if n > 1 {
                n - 1
            } else {
                n + 2
            }
        }
        // Sunday: step forward to Monday, unless that leaves the month
        0 => {
            if n < last {
                n + 1
            } else {
                n - 2
            }
        }
        _ => n,
    }
}

/// Iterator over successive occurrences of a [`CronExpression`].
pub struct ExecutionSequence<'a> {
    expr: &'a CronExpression,
    current: DateTime<Utc>,
}

impl Iterator for ExecutionSequence<'_> {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.expr.search_after(self.current)?;
        self.current = next;
        Some(next)
    }
}

impl PartialEq for CronExpression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for CronExpression {}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for CronExpression {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for CronExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for CronExpression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(de::Error::custom)
    }
}
