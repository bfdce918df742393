//! Report section model.

use serde::Serialize;
use tmetrics_common::{BucketValue, MetricSpec, Month, SourceKey, TimeSeries};
use tmetrics_graphs::{build_deltas, Chart, DataAnomaly, Delta};

/// One metric of an available source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricReport {
    /// Metric definition, for label and unit
    pub spec: MetricSpec,
    /// Value of the report month
    pub current: BucketValue,
    /// Deltas ending at the report month
    pub deltas: Vec<Delta>,
    /// Chart of the recent history
    pub chart: Option<Chart>,
    /// Warning annotations, such as a shrinking count
    pub warnings: Vec<String>,
}

impl MetricReport {
    /// Report `month` of a stored series
    pub fn from_series(spec: MetricSpec, series: &TimeSeries, month: Month) -> Self {
        Self {
            current: series.value(month).unwrap_or(BucketValue::Unavailable),
            deltas: build_deltas(series, month),
            spec,
            chart: None,
            warnings: Vec::new(),
        }
    }

    /// Attach the rendered chart
    #[must_use]
    pub fn with_chart(mut self, chart: Chart) -> Self {
        self.chart = Some(chart);
        self
    }

    /// Annotate with a data anomaly found while merging
    #[must_use]
    pub fn with_anomaly(mut self, anomaly: &DataAnomaly) -> Self {
        self.warnings.push(anomaly.to_string());
        self
    }
}

/// What a topic learned from one source
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SourceOutcome {
    /// The month was fetched and aggregated
    Available {
        /// Source key
        key: SourceKey,
        /// Human label
        label: String,
        /// Metrics in the adapter's order
        metrics: Vec<MetricReport>,
    },
    /// The source failed or was cancelled
    Unavailable {
        /// Source key
        key: SourceKey,
        /// Human label
        label: String,
        /// Short cause
        reason: String,
    },
}

impl SourceOutcome {
    /// Source key
    pub const fn key(&self) -> &SourceKey {
        match self {
            Self::Available { key, .. } | Self::Unavailable { key, .. } => key,
        }
    }

    /// Human label
    pub fn label(&self) -> &str {
        match self {
            Self::Available { label, .. } | Self::Unavailable { label, .. } => label,
        }
    }

    /// Whether real numbers are present
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }
}

/// Finished section of one topic; not changed after composition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSection {
    /// Topic key
    pub topic: String,
    /// Topic title
    pub title: String,
    /// Report month
    pub month: Month,
    /// One subsection per source, in the topic's order
    pub subsections: Vec<SourceOutcome>,
}

impl ReportSection {
    /// Sources with numbers
    pub fn available_count(&self) -> usize {
        self.subsections.iter().filter(|s| s.is_available()).count()
    }

    /// Sources marked unavailable
    pub fn unavailable_count(&self) -> usize {
        self.subsections.len() - self.available_count()
    }

    /// True when no source delivered data
    pub fn is_failed(&self) -> bool {
        self.available_count() == 0
    }

    /// Charts that have an image file
    pub fn charts(&self) -> Vec<&Chart> {
        self.subsections
            .iter()
            .filter_map(|s| match s {
                SourceOutcome::Available { metrics, .. } => Some(metrics),
                SourceOutcome::Unavailable { .. } => None,
            })
            .flatten()
            .filter_map(|m| m.chart.as_ref())
            .filter(|c| c.has_image())
            .collect()
    }

    /// Every warning annotation, prefixed with its source and metric
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        for subsection in &self.subsections {
            if let SourceOutcome::Available { label, metrics, .. } = subsection {
                for metric in metrics {
                    out.extend(metric.warnings.iter().map(|w| format!("{label} / {}: {w}", metric.spec.label)));
                }
            }
        }
        out
    }
}
