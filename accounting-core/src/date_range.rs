//! Inclusive calendar date ranges (`YYYY-MM-DD..YYYY-MM-DD`)

use crate::error::ValidationError;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::fmt;
use std::str::FromStr;

const SEPARATOR: &str = "..";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive range of UTC calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Range from `start` to `end`, both days included
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::MalformedDateRange(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Single day
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// First instant of the start day
    pub fn start(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// Last representable instant of the end day
    pub fn end(&self) -> DateTime<Utc> {
        let last = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN);
        self.end.and_time(last).and_utc()
    }

    /// Whether `instant` falls within the range
    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        let day = instant.date_naive();
        self.start <= day && day <= self.end
    }
}

impl FromStr for DateRange {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| ValidationError::MalformedDateRange(s.to_string()))?;

        let parse = |part: &str| {
            NaiveDate::parse_from_str(part.trim(), DATE_FORMAT)
                .map_err(|_| ValidationError::MalformedDateRange(s.to_string()))
        };

        DateRange::new(parse(start)?, parse(end)?)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.start.format(DATE_FORMAT),
            SEPARATOR,
            self.end.format(DATE_FORMAT)
        )
    }
}
