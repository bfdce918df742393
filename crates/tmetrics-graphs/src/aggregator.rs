//! Monthly aggregation of raw points and reconciliation with stored series.

use std::fmt;

use tmetrics_common::{
    BucketValue, MetricName, MetricSpec, MetricsError, Month, MonthlyBucket, RawDataPoint, Result,
    SeriesEntry, SourceKey, TimeSeries,
};
use tracing::{debug, info, warn};

/// Bucket one metric for `month`.
///
/// Points outside the month are ignored. An empty month counts as an
/// available zero; an average with no sample in the month is `Unavailable`.
pub fn aggregate(source: &SourceKey, metric: &MetricSpec, month: Month, points: &[RawDataPoint]) -> MonthlyBucket {
    let value = metric
        .evaluate(points.iter().filter(|p| month.contains(p.timestamp)))
        .map_or(BucketValue::Unavailable, BucketValue::Count);
    MonthlyBucket {
        source: source.clone(),
        metric: metric.name.clone(),
        month,
        value,
    }
}

/// Bucket every metric of a source for `month`, in metric order
pub fn aggregate_all(source: &SourceKey, metrics: &[MetricSpec], month: Month, points: &[RawDataPoint]) -> Vec<MonthlyBucket> {
    metrics
        .iter()
        .map(|metric| aggregate(source, metric, month, points))
        .collect()
}

/// What a merge did to the stored month
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    /// The month was not stored before
    Inserted,
    /// The stored value already matched
    Unchanged,
    /// A different stored value was overwritten
    Replaced {
        /// Value before the merge
        previous: BucketValue,
    },
}

/// A re-fetch reported a smaller count than was already stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataAnomaly {
    /// Source key
    pub source: SourceKey,
    /// Metric name
    pub metric: MetricName,
    /// Affected month
    pub month: Month,
    /// Stored count
    pub previous: u64,
    /// Re-fetched count
    pub current: u64,
    /// Whether the month had already ended
    pub finalized: bool,
}

impl DataAnomaly {
    /// As an error for logging and report annotations
    pub fn to_error(&self) -> MetricsError {
        MetricsError::data_anomaly(
            self.source.as_str(),
            self.metric.as_str(),
            self.month.to_string(),
            self.to_string(),
        )
    }
}

impl fmt::Display for DataAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.finalized { "final" } else { "in-progress" };
        write!(
            f,
            "{state} value for {} dropped from {} to {} on re-fetch",
            self.month, self.previous, self.current
        )
    }
}

/// Result of merging one bucket into a series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Effect on the bucket's month
    pub action: MergeAction,
    /// Months that were missing before the bucket and are now marked unavailable
    pub gaps_filled: Vec<Month>,
    /// Set when the stored count shrank
    pub anomaly: Option<DataAnomaly>,
}

/// Merge a bucket into the series of its (source, metric) pair.
///
/// Months before `current_month` are stored as finalized. Missing months
/// between the series' last month and the bucket are filled with explicit
/// `Unavailable` markers. An available value is never overwritten by
/// `Unavailable`, and merging the same bucket twice leaves the series as it
/// was after the first merge.
pub fn merge_into_series(bucket: &MonthlyBucket, series: &mut TimeSeries, current_month: Month) -> Result<MergeOutcome> {
    if bucket.source != series.source || bucket.metric != series.metric {
        return Err(MetricsError::validation(format!(
            "bucket {}/{} cannot be merged into series {}/{}",
            bucket.source, bucket.metric, series.source, series.metric
        )));
    }
    if bucket.month > current_month {
        return Err(MetricsError::validation_field(
            format!("{} has not started yet (current month {current_month})", bucket.month),
            "month",
        ));
    }

    let finalized = bucket.month < current_month;
    let mut gaps_filled = Vec::new();
    if let Some(last) = series.last_month() {
        if bucket.month > last.next() {
            for month in Month::range_inclusive(last.next(), bucket.month.previous()) {
                series.insert(
                    month,
                    SeriesEntry {
                        value: BucketValue::Unavailable,
                        finalized: month < current_month,
                    },
                );
                gaps_filled.push(month);
            }
            debug!(
                source = %bucket.source,
                metric = %bucket.metric,
                gaps = gaps_filled.len(),
                "marked missing months unavailable"
            );
        }
    }

    let incoming = SeriesEntry {
        value: bucket.value,
        finalized,
    };
    let Some(stored) = series.entry(bucket.month) else {
        series.insert(bucket.month, incoming);
        return Ok(MergeOutcome {
            action: MergeAction::Inserted,
            gaps_filled,
            anomaly: None,
        });
    };

    if stored.value == bucket.value || !bucket.value.is_available() {
        // Keep the value; only promote the entry to final once its month is over
        let entry = SeriesEntry {
            value: stored.value,
            finalized: stored.finalized || finalized,
        };
        series.insert(bucket.month, entry);
        return Ok(MergeOutcome {
            action: MergeAction::Unchanged,
            gaps_filled,
            anomaly: None,
        });
    }

    let anomaly = match (stored.value.count(), bucket.value.count()) {
        (Some(previous), Some(current)) if current < previous => Some(DataAnomaly {
            source: bucket.source.clone(),
            metric: bucket.metric.clone(),
            month: bucket.month,
            previous,
            current,
            finalized: stored.finalized,
        }),
        _ => None,
    };

    if let Some(anomaly) = &anomaly {
        warn!(
            source = %anomaly.source,
            metric = %anomaly.metric,
            month = %anomaly.month,
            previous = anomaly.previous,
            current = anomaly.current,
            "stored count shrank on re-fetch"
        );
    } else if stored.finalized {
        info!(
            source = %bucket.source,
            metric = %bucket.metric,
            month = %bucket.month,
            "reconciled finalized month with re-fetched value"
        );
    }

    series.insert(bucket.month, incoming);
    Ok(MergeOutcome {
        action: MergeAction::Replaced {
            previous: stored.value,
        },
        gaps_filled,
        anomaly,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tmetrics_common::{MetricRule, MetricUnit};
    use tmetrics_common::test_utils::{
        category_metric, category_points, init_test_logging, metric_name, mock_timestamp, month, source_key,
    };

    fn bucket(m: &str, value: BucketValue) -> MonthlyBucket {
        MonthlyBucket {
            source: source_key("bugzilla"),
            metric: metric_name("bugs_created"),
            month: month(m),
            value,
        }
    }

    fn empty_series() -> TimeSeries {
        TimeSeries::new(source_key("bugzilla"), metric_name("bugs_created"))
    }

    #[test]
    fn test_aggregate_counts_only_the_month() {
        let metric = category_metric("bugs_created", "created");
        let mut points = category_points(month("2024-03"), "created", 5);
        points.extend(category_points(month("2024-04"), "created", 2));
        points.push(RawDataPoint::category(mock_timestamp(2024, 3, 9, 0, 0, 0), "resolved"));

        let march = aggregate(&source_key("bugzilla"), &metric, month("2024-03"), &points);
        assert_eq!(march.value, BucketValue::Count(5));
        assert_eq!(march.month, month("2024-03"));

        let may = aggregate(&source_key("bugzilla"), &metric, month("2024-05"), &points);
        assert_eq!(may.value, BucketValue::Count(0));
    }

    #[test]
    fn test_aggregate_all_follows_metric_order() {
        let metrics = [category_metric("resolved", "resolved"), category_metric("created", "created")];
        let mut points = category_points(month("2024-03"), "created", 3);
        points.extend(category_points(month("2024-03"), "resolved", 1));

        let buckets = aggregate_all(&source_key("bugzilla"), &metrics, month("2024-03"), &points);
        let values: Vec<_> = buckets.iter().map(|b| (b.metric.as_str(), b.value)).collect();
        assert_eq!(
            values,
            vec![("resolved", BucketValue::Count(1)), ("created", BucketValue::Count(3))]
        );
    }

    #[test]
    fn test_average_without_samples_is_unavailable() {
        let coverage = MetricSpec::new(metric_name("line_coverage"), "Line coverage", MetricRule::Average)
            .with_unit(MetricUnit::Percent);
        let points = vec![RawDataPoint::count(mock_timestamp(2024, 2, 20, 0, 0, 0), 6010)];

        let february = aggregate(&source_key("coverage"), &coverage, month("2024-02"), &points);
        assert_eq!(february.value, BucketValue::Count(6010));

        let march = aggregate(&source_key("coverage"), &coverage, month("2024-03"), &points);
        assert_eq!(march.value, BucketValue::Unavailable);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut series = empty_series();
        let b = bucket("2024-03", BucketValue::Count(12));

        let first = merge_into_series(&b, &mut series, month("2024-04")).unwrap();
        assert_eq!(first.action, MergeAction::Inserted);
        let after_first = series.clone();

        let second = merge_into_series(&b, &mut series, month("2024-04")).unwrap();
        assert_eq!(second.action, MergeAction::Unchanged);
        assert_eq!(series, after_first);
        assert!(series.entry(month("2024-03")).unwrap().finalized);
    }

    #[test]
    fn test_shrinking_final_count_is_flagged() {
        init_test_logging();
        let mut series = empty_series();
        merge_into_series(&bucket("2024-03", BucketValue::Count(100)), &mut series, month("2024-04")).unwrap();

        let outcome =
            merge_into_series(&bucket("2024-03", BucketValue::Count(90)), &mut series, month("2024-04")).unwrap();
        assert_eq!(
            outcome.action,
            MergeAction::Replaced {
                previous: BucketValue::Count(100)
            }
        );
        let anomaly = outcome.anomaly.expect("shrink must be flagged");
        assert_eq!((anomaly.previous, anomaly.current), (100, 90));
        assert!(anomaly.finalized);
        assert!(matches!(anomaly.to_error(), MetricsError::DataAnomaly { .. }));
        assert_eq!(series.value(month("2024-03")), Some(BucketValue::Count(90)));
    }

    #[test]
    fn test_growing_final_count_is_reconciled_quietly() {
        let mut series = empty_series();
        merge_into_series(&bucket("2024-03", BucketValue::Count(100)), &mut series, month("2024-04")).unwrap();
        let outcome =
            merge_into_series(&bucket("2024-03", BucketValue::Count(104)), &mut series, month("2024-05")).unwrap();
        assert!(outcome.anomaly.is_none());
        assert_eq!(series.value(month("2024-03")), Some(BucketValue::Count(104)));
    }

    #[test]
    fn test_in_progress_month_becomes_final() {
        let mut series = empty_series();
        merge_into_series(&bucket("2024-04", BucketValue::Count(3)), &mut series, month("2024-04")).unwrap();
        assert!(!series.entry(month("2024-04")).unwrap().finalized);

        merge_into_series(&bucket("2024-04", BucketValue::Count(7)), &mut series, month("2024-05")).unwrap();
        let entry = series.entry(month("2024-04")).unwrap();
        assert_eq!(entry.value, BucketValue::Count(7));
        assert!(entry.finalized);
    }

    #[test]
    fn test_gap_months_are_marked_unavailable() {
        let mut series = empty_series();
        merge_into_series(&bucket("2024-01", BucketValue::Count(5)), &mut series, month("2024-06")).unwrap();
        let outcome =
            merge_into_series(&bucket("2024-04", BucketValue::Count(8)), &mut series, month("2024-06")).unwrap();

        assert_eq!(outcome.gaps_filled, vec![month("2024-02"), month("2024-03")]);
        assert_eq!(series.value(month("2024-02")), Some(BucketValue::Unavailable));
        assert_eq!(series.len(), 4);
    }

    #[test]
    fn test_unavailable_never_hides_a_value() {
        let mut series = empty_series();
        merge_into_series(&bucket("2024-03", BucketValue::Count(9)), &mut series, month("2024-04")).unwrap();
        let outcome =
            merge_into_series(&bucket("2024-03", BucketValue::Unavailable), &mut series, month("2024-04")).unwrap();
        assert_eq!(outcome.action, MergeAction::Unchanged);
        assert_eq!(series.value(month("2024-03")), Some(BucketValue::Count(9)));
    }

    #[test]
    fn test_merge_rejects_mismatched_or_future_buckets() {
        let mut series = TimeSeries::new(source_key("github"), metric_name("prs_opened"));
        assert!(merge_into_series(&bucket("2024-03", BucketValue::Count(1)), &mut series, month("2024-04")).is_err());

        let mut series = empty_series();
        let err =
            merge_into_series(&bucket("2024-06", BucketValue::Count(1)), &mut series, month("2024-04")).unwrap_err();
        assert!(matches!(err, MetricsError::Validation { .. }));
        assert!(series.is_empty());
    }

    proptest! {
        #[test]
        fn prop_repeated_merges_settle(values in proptest::collection::vec(0u64..1_000, 1..12)) {
            let mut series = empty_series();
            let current = month("2025-01");
            let mut m = month("2024-01");
            for v in &values {
                merge_into_series(&bucket(&m.to_string(), BucketValue::Count(*v)), &mut series, current).unwrap();
                m = m.next();
            }
            let settled = series.clone();

            let mut m = month("2024-01");
            for v in &values {
                let outcome = merge_into_series(&bucket(&m.to_string(), BucketValue::Count(*v)), &mut series, current).unwrap();
                prop_assert_eq!(outcome.action, MergeAction::Unchanged);
                m = m.next();
            }
            prop_assert_eq!(series, settled);
        }
    }
}
