//! Date ranges and store key naming for usage analytics.

use std::fmt;

use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::domain::error::DomainError;

const DAY_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year][month][day]");
const KEY_SEPARATOR: char = ':';
const RANGE_SEPARATOR: char = '_';

/// Analytics keyspaces. Each metric owns a distinct key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Approximate unique visitors (HyperLogLog).
    UniqueVisitors,
    /// Exact daily active users (bitmap).
    ActiveUsers,
}

impl Metric {
    pub fn prefix(self) -> &'static str {
        match self {
            Metric::UniqueVisitors => "uv",
            Metric::ActiveUsers => "dau",
        }
    }

    /// Key of one calendar day's structure: `prefix:YYYYMMDD`.
    pub fn day_key(self, day: Date) -> Result<String, DomainError> {
        Ok(format!("{}{KEY_SEPARATOR}{}", self.prefix(), format_day(day)?))
    }

    /// Key of a materialized range merge: `prefix:YYYYMMDD_YYYYMMDD`.
    pub fn range_key(self, range: &DateRange) -> Result<String, DomainError> {
        Ok(format!(
            "{}{KEY_SEPARATOR}{}{RANGE_SEPARATOR}{}",
            self.prefix(),
            format_day(range.start)?,
            format_day(range.end)?
        ))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Inclusive calendar-day range with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: Date,
    end: Date,
}

impl DateRange {
    pub fn new(start: Date, end: Date) -> Result<Self, DomainError> {
        if start > end {
            return Err(DomainError::validation(format!(
                "range start {start} is after range end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Validate raw bounds where either side may be missing.
    pub fn from_bounds(start: Option<Date>, end: Option<Date>) -> Result<Self, DomainError> {
        match (start, end) {
            (Some(start), Some(end)) => Self::new(start, end),
            _ => Err(DomainError::validation(
                "both range bounds must be provided",
            )),
        }
    }

    pub fn single(day: Date) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    pub fn start(&self) -> Date {
        self.start
    }

    pub fn end(&self) -> Date {
        self.end
    }

    /// Number of days covered, counting both ends.
    pub fn len_days(&self) -> u32 {
        (self.end - self.start).whole_days() as u32 + 1
    }

    /// Every day from `start` to `end` inclusive, in order.
    pub fn days(&self) -> impl Iterator<Item = Date> + use<> {
        let end = self.end;
        std::iter::successors(Some(self.start), move |day| {
            day.next_day().filter(|next| *next <= end)
        })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// `YYYYMMDD` form of a date as used in store keys.
pub fn format_day(day: Date) -> Result<String, DomainError> {
    day.format(DAY_FORMAT)
        .map_err(|err| DomainError::validation(format!("cannot format date {day}: {err}")))
}

/// Parse a `YYYYMMDD` or `YYYY-MM-DD` date.
pub fn parse_day(value: &str) -> Result<Date, DomainError> {
    let trimmed = value.trim();
    let compact = trimmed.replace('-', "");
    Date::parse(&compact, DAY_FORMAT)
        .map_err(|err| DomainError::validation(format!("invalid date `{trimmed}`: {err}")))
}
