//! Monthly time series for one (source, metric) pair

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::month::Month;
use crate::types::{BucketValue, MetricName, MonthlyBucket, SourceKey};

/// One stored month of a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesEntry {
    /// Aggregated value
    pub value: BucketValue,
    /// Whether the month had ended when the value was stored
    pub finalized: bool,
}

/// Ordered-by-month sequence of buckets for one (source, metric) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Source key
    pub source: SourceKey,
    /// Metric name
    pub metric: MetricName,
    entries: BTreeMap<Month, SeriesEntry>,
}

impl TimeSeries {
    /// Create an empty series
    pub fn new(source: SourceKey, metric: MetricName) -> Self {
        Self {
            source,
            metric,
            entries: BTreeMap::new(),
        }
    }

    /// Build a series of finalized counts starting at `first`, one value per month
    pub fn from_counts(source: SourceKey, metric: MetricName, first: Month, counts: &[u64]) -> Self {
        let mut series = Self::new(source, metric);
        let mut month = first;
        for &count in counts {
            series.insert(
                month,
                SeriesEntry {
                    value: BucketValue::Count(count),
                    finalized: true,
                },
            );
            month = month.next();
        }
        series
    }

    /// Number of stored months
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored entry for a month
    pub fn entry(&self, month: Month) -> Option<SeriesEntry> {
        self.entries.get(&month).copied()
    }

    /// Stored value for a month
    pub fn value(&self, month: Month) -> Option<BucketValue> {
        self.entries.get(&month).map(|e| e.value)
    }

    /// Store or replace a month
    pub fn insert(&mut self, month: Month, entry: SeriesEntry) -> Option<SeriesEntry> {
        self.entries.insert(month, entry)
    }

    /// Earliest stored month
    pub fn first_month(&self) -> Option<Month> {
        self.entries.keys().next().copied()
    }

    /// Latest stored month
    pub fn last_month(&self) -> Option<Month> {
        self.entries.keys().next_back().copied()
    }

    /// Stored entries in chronological order
    pub fn entries(&self) -> impl Iterator<Item = (Month, SeriesEntry)> + '_ {
        self.entries.iter().map(|(m, e)| (*m, *e))
    }

    /// Every month from first to last with missing months reported as `Unavailable`
    pub fn filled(&self) -> Vec<(Month, BucketValue)> {
        match (self.first_month(), self.last_month()) {
            (Some(first), Some(last)) => Month::range_inclusive(first, last)
                .into_iter()
                .map(|m| (m, self.value(m).unwrap_or(BucketValue::Unavailable)))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Copy restricted to `from..=to`
    #[must_use]
    pub fn window(&self, from: Month, to: Month) -> Self {
        Self {
            source: self.source.clone(),
            metric: self.metric.clone(),
            entries: self
                .entries
                .range(from..=to)
                .map(|(m, e)| (*m, *e))
                .collect(),
        }
    }

    /// The stored month as a bucket
    pub fn bucket(&self, month: Month) -> Option<MonthlyBucket> {
        self.value(month).map(|value| MonthlyBucket {
            source: self.source.clone(),
            metric: self.metric.clone(),
            month,
            value,
        })
    }
}
