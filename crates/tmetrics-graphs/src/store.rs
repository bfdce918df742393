//! Persisted monthly series backed by an embedded sled database.
//!
//! Each stored month is one key, `source/metric/YYYY-MM`, holding a JSON
//! encoded [`SeriesEntry`]. Writers of the same (source, metric) pair are
//! serialized in-process; sled's own file lock keeps a second process out.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tmetrics_common::{MetricName, MetricsError, Month, MonthlyBucket, Result, SeriesEntry, SourceKey, TimeSeries};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::aggregator::{merge_into_series, MergeOutcome};

/// Durable store of every (source, metric) series
#[derive(Clone)]
pub struct SeriesStore {
    db: sled::Db,
    writers: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SeriesStore {
    /// Open or create the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .map_err(|e| MetricsError::storage_with_source(format!("cannot open series store at {}", path.display()), e))?;
        info!(path = %path.display(), series_keys = db.len(), "series store opened");
        Ok(Self::from_db(db))
    }

    /// Store that is discarded when dropped
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| MetricsError::storage_with_source("cannot open temporary series store", e))?;
        Ok(Self::from_db(db))
    }

    fn from_db(db: sled::Db) -> Self {
        Self {
            db,
            writers: Arc::new(DashMap::new()),
        }
    }

    /// Load the full series of one pair; unknown pairs load empty
    pub fn load(&self, source: &SourceKey, metric: &MetricName) -> Result<TimeSeries> {
        let mut series = TimeSeries::new(source.clone(), metric.clone());
        for item in self.db.scan_prefix(series_prefix(source, metric)) {
            let (key, value) = item.map_err(|e| MetricsError::storage_with_source("series scan failed", e))?;
            let key = String::from_utf8_lossy(&key);
            let month: Month = key
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .parse()
                .map_err(|_| MetricsError::storage(format!("malformed series key '{key}'")))?;
            let entry: SeriesEntry = serde_json::from_slice(&value)?;
            series.insert(month, entry);
        }
        Ok(series)
    }

    /// Merge one bucket and persist the changed months.
    ///
    /// Returns the series as stored after the merge.
    pub async fn merge(&self, bucket: &MonthlyBucket, current_month: Month) -> Result<(TimeSeries, MergeOutcome)> {
        let writer = self
            .writers
            .entry(format!("{}/{}", bucket.source, bucket.metric))
            .or_default()
            .clone();
        let _guard = writer.lock().await;

        let before = self.load(&bucket.source, &bucket.metric)?;
        let mut series = before.clone();
        let outcome = merge_into_series(bucket, &mut series, current_month)?;

        let mut batch = sled::Batch::default();
        let mut changed = 0usize;
        for (month, entry) in series.entries() {
            if before.entry(month) != Some(entry) {
                batch.insert(
                    entry_key(&bucket.source, &bucket.metric, month).into_bytes(),
                    serde_json::to_vec(&entry)?,
                );
                changed += 1;
            }
        }
        if changed > 0 {
            self.db
                .apply_batch(batch)
                .map_err(|e| MetricsError::storage_with_source("series write failed", e))?;
            self.db
                .flush_async()
                .await
                .map_err(|e| MetricsError::storage_with_source("series flush failed", e))?;
        }
        debug!(
            source = %bucket.source,
            metric = %bucket.metric,
            month = %bucket.month,
            changed,
            "bucket merged"
        );
        Ok((series, outcome))
    }
}

fn series_prefix(source: &SourceKey, metric: &MetricName) -> String {
    format!("{source}/{metric}/")
}

fn entry_key(source: &SourceKey, metric: &MetricName, month: Month) -> String {
    format!("{source}/{metric}/{month}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::MergeAction;
    use tmetrics_common::test_utils::{create_temp_dir, metric_name, month, source_key};
    use tmetrics_common::BucketValue;

    fn bucket(source: &str, metric: &str, m: &str, value: u64) -> MonthlyBucket {
        MonthlyBucket {
            source: source_key(source),
            metric: metric_name(metric),
            month: month(m),
            value: BucketValue::Count(value),
        }
    }

    #[tokio::test]
    async fn test_series_survive_reopen() {
        let dir = create_temp_dir();
        let path = dir.path().join("series");
        {
            let store = SeriesStore::open(&path).unwrap();
            store.merge(&bucket("github", "prs_opened", "2024-02", 4), month("2024-04")).await.unwrap();
            store.merge(&bucket("github", "prs_opened", "2024-03", 6), month("2024-04")).await.unwrap();
        }

        let store = SeriesStore::open(&path).unwrap();
        let series = store.load(&source_key("github"), &metric_name("prs_opened")).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.value(month("2024-03")), Some(BucketValue::Count(6)));
        assert!(series.entry(month("2024-02")).unwrap().finalized);
    }

    #[tokio::test]
    async fn test_pairs_are_isolated() {
        let store = SeriesStore::temporary().unwrap();
        store.merge(&bucket("github", "prs_opened", "2024-03", 6), month("2024-04")).await.unwrap();
        store.merge(&bucket("github", "prs_closed", "2024-03", 2), month("2024-04")).await.unwrap();
        store.merge(&bucket("github_mirror", "prs_opened", "2024-03", 1), month("2024-04")).await.unwrap();

        let series = store.load(&source_key("github"), &metric_name("prs_opened")).unwrap();
        assert_eq!(series.entries().count(), 1);
        assert_eq!(series.value(month("2024-03")), Some(BucketValue::Count(6)));
        assert!(store.load(&source_key("sumo"), &metric_name("prs_opened")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_merge_is_unchanged() {
        let store = SeriesStore::temporary().unwrap();
        let b = bucket("sumo", "questions", "2024-03", 11);
        let (first, _) = store.merge(&b, month("2024-04")).await.unwrap();
        let (second, outcome) = store.merge(&b, month("2024-04")).await.unwrap();
        assert_eq!(outcome.action, MergeAction::Unchanged);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_concurrent_writers_of_one_pair() {
        let store = SeriesStore::temporary().unwrap();
        let merges = (1..=6u32).map(|m| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .merge(&bucket("addons", "addons_updated", &format!("2024-{m:02}"), u64::from(m)), month("2024-12"))
                    .await
            })
        });
        for handle in merges.collect::<Vec<_>>() {
            handle.await.unwrap().unwrap();
        }

        let series = store.load(&source_key("addons"), &metric_name("addons_updated")).unwrap();
        assert_eq!(series.len(), 6);
        assert!(series.entries().all(|(_, e)| e.value.is_available()));
    }
}
