//! Month-over-month and year-over-year deltas.

use std::fmt;

use serde::Serialize;
use tmetrics_common::{BucketValue, MetricName, Month, TimeSeries};

/// Which two months a delta compares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    /// Target month against the month before it
    MonthOverMonth,
    /// Target month against the same month a year earlier
    YearOverYear,
    /// Adjacent months anywhere in the series
    Sequential,
}

impl DeltaKind {
    /// Short label for reports
    pub const fn label(self) -> &'static str {
        match self {
            Self::MonthOverMonth => "vs previous month",
            Self::YearOverYear => "vs same month last year",
            Self::Sequential => "month over month",
        }
    }
}

/// Relative change, undefined for a zero base
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentChange {
    /// Change relative to the base, in percent
    Defined(f64),
    /// Base was zero or one side had no data
    NotApplicable,
}

impl PercentChange {
    #[allow(clippy::cast_precision_loss)]
    fn between(from: u64, to: u64) -> Self {
        if from == 0 {
            Self::NotApplicable
        } else {
            Self::Defined((to as f64 - from as f64) / from as f64 * 100.0)
        }
    }
}

impl fmt::Display for PercentChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defined(pct) => write!(f, "{pct:+.1}%"),
            Self::NotApplicable => f.write_str("n/a"),
        }
    }
}

/// Change of one metric between two months
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delta {
    /// Metric name
    pub metric: MetricName,
    /// Comparison kind
    pub kind: DeltaKind,
    /// Base month
    pub from: Month,
    /// Compared month
    pub to: Month,
    /// `to - from`, absent when either month is unavailable
    pub absolute: Option<i64>,
    /// Relative change
    pub percent: PercentChange,
}

impl Delta {
    /// Compare two months of a series.
    ///
    /// `None` when the compared month is not stored at all.
    pub fn between(series: &TimeSeries, kind: DeltaKind, from: Month, to: Month) -> Option<Self> {
        let to_value = series.value(to)?;
        let from_value = series.value(from).unwrap_or(BucketValue::Unavailable);
        let (absolute, percent) = match (from_value.count(), to_value.count()) {
            (Some(a), Some(b)) => (Some(signed(b) - signed(a)), PercentChange::between(a, b)),
            _ => (None, PercentChange::NotApplicable),
        };
        Some(Self {
            metric: series.metric.clone(),
            kind,
            from,
            to,
            absolute,
            percent,
        })
    }
}

fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Deltas for `target`: against the previous month, and against the same
/// month a year earlier when that month holds data
pub fn build_deltas(series: &TimeSeries, target: Month) -> Vec<Delta> {
    let mut deltas = Vec::with_capacity(2);
    if let Some(mom) = Delta::between(series, DeltaKind::MonthOverMonth, target.previous(), target) {
        deltas.push(mom);
    }
    let year_before = target.year_before();
    if series.value(year_before).is_some_and(BucketValue::is_available) {
        if let Some(yoy) = Delta::between(series, DeltaKind::YearOverYear, year_before, target) {
            deltas.push(yoy);
        }
    }
    deltas
}

/// Deltas between adjacent months from the first to the last stored month
pub fn sequential_deltas(series: &TimeSeries) -> Vec<Delta> {
    let months: Vec<Month> = series.filled().into_iter().map(|(m, _)| m).collect();
    months
        .windows(2)
        .filter_map(|pair| Delta::between(series, DeltaKind::Sequential, pair[0], pair[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tmetrics_common::test_utils::property_testing::{counts_strategy, month_strategy};
    use tmetrics_common::test_utils::{metric_name, month, source_key};
    use tmetrics_common::SeriesEntry;

    fn series(counts: &[u64]) -> TimeSeries {
        TimeSeries::from_counts(source_key("sumo"), metric_name("questions"), month("2024-01"), counts)
    }

    #[test]
    fn test_sequential_deltas_handle_zero_base() {
        let deltas = sequential_deltas(&series(&[10, 15, 0, 20]));
        let summary: Vec<_> = deltas.iter().map(|d| (d.absolute, d.percent.to_string())).collect();
        assert_eq!(
            summary,
            vec![
                (Some(5), "+50.0%".to_string()),
                (Some(-15), "-100.0%".to_string()),
                (Some(20), "n/a".to_string()),
            ]
        );
        assert!(deltas.iter().all(|d| d.kind == DeltaKind::Sequential));
        assert_eq!(deltas[0].from, month("2024-01"));
        assert_eq!(deltas[2].to, month("2024-04"));
    }

    #[test]
    fn test_deltas_are_deterministic() {
        let s = series(&[3, 9, 4, 4, 12, 0, 7]);
        assert_eq!(sequential_deltas(&s), sequential_deltas(&s));
        assert_eq!(build_deltas(&s, month("2024-05")), build_deltas(&s, month("2024-05")));
    }

    #[test]
    fn test_build_deltas_with_a_year_of_history() {
        let counts: Vec<u64> = (1..=13).map(|i| i * 10).collect();
        let s = series(&counts);
        let deltas = build_deltas(&s, month("2025-01"));

        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].kind, DeltaKind::MonthOverMonth);
        assert_eq!(deltas[0].absolute, Some(10));
        assert_eq!(deltas[1].kind, DeltaKind::YearOverYear);
        assert_eq!(deltas[1].from, month("2024-01"));
        assert_eq!(deltas[1].absolute, Some(120));
        assert_eq!(deltas[1].percent, PercentChange::Defined(1200.0));
    }

    #[test]
    fn test_build_deltas_without_history() {
        let s = series(&[5]);
        let deltas = build_deltas(&s, month("2024-01"));
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].absolute, None);
        assert_eq!(deltas[0].percent, PercentChange::NotApplicable);

        assert!(build_deltas(&s, month("2024-06")).is_empty());
    }

    #[test]
    fn test_unavailable_months_have_no_change() {
        let mut s = series(&[8, 8]);
        s.insert(
            month("2024-03"),
            SeriesEntry {
                value: BucketValue::Unavailable,
                finalized: true,
            },
        );
        s.insert(
            month("2024-04"),
            SeriesEntry {
                value: BucketValue::Count(2),
                finalized: true,
            },
        );
        let deltas = sequential_deltas(&s);
        assert_eq!(deltas[1].absolute, None);
        assert_eq!(deltas[2].absolute, None);
        assert_eq!(deltas[2].percent.to_string(), "n/a");
    }

    proptest! {
        #[test]
        fn prop_sequential_deltas_sum_to_total_change(first in month_strategy(), counts in counts_strategy()) {
            let s = TimeSeries::from_counts(source_key("sumo"), metric_name("questions"), first, &counts);
            let deltas = sequential_deltas(&s);
            prop_assert_eq!(deltas.len(), counts.len() - 1);

            let total: i64 = deltas.iter().filter_map(|d| d.absolute).sum();
            let expected = signed(counts[counts.len() - 1]) - signed(counts[0]);
            prop_assert_eq!(total, expected);
        }
    }
}
