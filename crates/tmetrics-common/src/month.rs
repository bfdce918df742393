//! Calendar month arithmetic

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MetricsError;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// A calendar month in UTC, ordered chronologically.
///
/// Serialized as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    /// Create a month, rejecting month numbers outside `1..=12`
    pub fn new(year: i32, month: u32) -> Result<Self, MetricsError> {
        if !(1..=12).contains(&month) {
            return Err(MetricsError::validation_field(
                format!("month must be between 1 and 12, got {month}"),
                "month",
            ));
        }
        if !(1000..=9999).contains(&year) {
            return Err(MetricsError::validation_field(
                format!("year must have four digits, got {year}"),
                "year",
            ));
        }
        Ok(Self { year, month })
    }

    /// Month containing the given instant
    pub fn of(timestamp: DateTime<Utc>) -> Self {
        Self {
            year: timestamp.year(),
            month: timestamp.month(),
        }
    }

    /// The calendar month before the one containing `now`
    pub fn previous_of(now: DateTime<Utc>) -> Self {
        Self::of(now).previous()
    }

    /// Calendar year
    pub const fn year(self) -> i32 {
        self.year
    }

    /// Month number, 1-based
    pub const fn month(self) -> u32 {
        self.month
    }

    /// The following month
    #[must_use]
    pub const fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The preceding month
    #[must_use]
    pub const fn previous(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// The same month one year earlier
    #[must_use]
    pub const fn year_before(self) -> Self {
        Self {
            year: self.year - 1,
            month: self.month,
        }
    }

    /// Shift by a signed number of months
    #[must_use]
    pub fn offset(self, months: i32) -> Self {
        let index = self.index() + i64::from(months);
        Self {
            year: i32::try_from(index.div_euclid(12)).unwrap_or(self.year),
            month: u32::try_from(index.rem_euclid(12) + 1).unwrap_or(self.month),
        }
    }

    /// Number of months from `self` to `other` (negative when `other` is earlier)
    pub fn months_until(self, other: Self) -> i64 {
        other.index() - self.index()
    }

    fn index(self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    /// First instant of the month
    pub fn start(self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// First instant of the following month (exclusive end)
    pub fn end(self) -> DateTime<Utc> {
        self.next().start()
    }

    /// Whether the instant falls inside this month
    pub fn contains(self, timestamp: DateTime<Utc>) -> bool {
        Self::of(timestamp) == self
    }

    /// Every month from `from` to `to`, both inclusive; empty when `to < from`
    pub fn range_inclusive(from: Self, to: Self) -> Vec<Self> {
        let mut months = Vec::new();
        let mut current = from;
        while current <= to {
            months.push(current);
            current = current.next();
        }
        months
    }

    /// English month name, e.g. "March"
    pub fn name(self) -> &'static str {
        MONTH_NAMES[(self.month - 1) as usize]
    }

    /// Three letter abbreviation, e.g. "Mar"
    pub fn abbreviation(self) -> &'static str {
        &self.name()[..3]
    }

    /// Long label, e.g. "March 2024"
    pub fn label(self) -> String {
        format!("{} {}", self.name(), self.year)
    }

    /// Short axis label, e.g. "Mar 24"
    pub fn short_label(self) -> String {
        format!("{} {:02}", self.abbreviation(), self.year.rem_euclid(100))
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MetricsError::validation_field(format!("expected YYYY-MM, got '{s}'"), "month");
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for Month {
    type Error = MetricsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Month> for String {
    fn from(month: Month) -> Self {
        month.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(s: &str) -> Month {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(month("2024-03").to_string(), "2024-03");
        assert!("2024-13".parse::<Month>().is_err());
        assert!("2024-3".parse::<Month>().is_err());
        assert!("march".parse::<Month>().is_err());
    }

    #[test]
    fn test_navigation_across_years() {
        assert_eq!(month("2024-01").previous(), month("2023-12"));
        assert_eq!(month("2023-12").next(), month("2024-01"));
        assert_eq!(month("2024-02").year_before(), month("2023-02"));
        assert_eq!(month("2024-02").offset(-14), month("2022-12"));
        assert_eq!(month("2024-02").offset(11), month("2025-01"));
        assert_eq!(month("2023-11").months_until(month("2024-02")), 3);
    }

    #[test]
    fn test_previous_of_now() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();
        assert_eq!(Month::previous_of(now), month("2023-12"));
    }

    #[test]
    fn test_bounds_and_contains() {
        let m = month("2024-02");
        assert_eq!(m.start(), Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(m.end(), Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert!(m.contains(Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap()));
        assert!(!m.contains(m.end()));
    }

    #[test]
    fn test_range_inclusive() {
        let months = Month::range_inclusive(month("2023-11"), month("2024-02"));
        let labels: Vec<String> = months.iter().map(ToString::to_string).collect();
        assert_eq!(labels, ["2023-11", "2023-12", "2024-01", "2024-02"]);
        assert!(Month::range_inclusive(month("2024-02"), month("2024-01")).is_empty());
    }

    #[test]
    fn test_labels() {
        assert_eq!(month("2024-03").label(), "March 2024");
        assert_eq!(month("2024-03").short_label(), "Mar 24");
    }

    #[test]
    fn test_serde_roundtrip_as_string() {
        let json = serde_json::to_string(&month("2024-05")).unwrap();
        assert_eq!(json, "\"2024-05\"");
        let back: Month = serde_json::from_str(&json).unwrap();
        assert_eq!(back, month("2024-05"));
    }
}
