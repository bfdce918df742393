//! Core data model shared by fetchers, aggregation and reporting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MetricsError;
use crate::month::Month;

fn validate_identifier(value: &str, field: &str) -> Result<(), MetricsError> {
    let valid = !value.is_empty()
        && value.len() <= 64
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(MetricsError::validation_field(
            format!("'{value}' must be 1-64 characters of [a-z0-9_]"),
            field,
        ))
    }
}

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap an identifier
            pub fn new(value: impl Into<String>) -> Result<Self, MetricsError> {
                let value = value.into();
                validate_identifier(&value, $field)?;
                Ok(Self(value))
            }

            /// Borrow the identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = MetricsError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

identifier!(
    /// Unique key of a configured source, e.g. `bugzilla`
    SourceKey,
    "source"
);

identifier!(
    /// Name of a metric within a source, e.g. `bugs_created`
    MetricName,
    "metric"
);

/// Source-specific content of a raw data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// A numeric reading (crash count, download count, coverage in hundredths)
    Count(u64),
    /// A category label (e.g. "created", "resolved", "New translation")
    Category(String),
    /// Free text, such as a topic title
    Text(String),
}

/// One unnormalized record emitted by a source adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDataPoint {
    /// When the event happened at the source
    pub timestamp: DateTime<Utc>,
    /// What happened
    pub payload: Payload,
}

impl RawDataPoint {
    /// Numeric reading
    pub fn count(timestamp: DateTime<Utc>, value: u64) -> Self {
        Self {
            timestamp,
            payload: Payload::Count(value),
        }
    }

    /// Categorized event
    pub fn category(timestamp: DateTime<Utc>, label: impl Into<String>) -> Self {
        Self {
            timestamp,
            payload: Payload::Category(label.into()),
        }
    }

    /// Textual event
    pub fn text(timestamp: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            payload: Payload::Text(text.into()),
        }
    }

    /// Calendar month of the point, from its own timestamp
    pub fn month(&self) -> Month {
        Month::of(self.timestamp)
    }
}

/// How raw points turn into a monthly integer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule", content = "label")]
pub enum MetricRule {
    /// Number of category or text points
    Occurrences,
    /// Number of category points with the given label
    Category(String),
    /// Sum of numeric points
    Sum,
    /// Rounded mean of numeric points
    Average,
}

/// Display unit of a metric value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricUnit {
    /// Plain count
    #[default]
    Count,
    /// Percentage stored in hundredths (5432 = 54.32%)
    Percent,
}

/// Definition of one metric produced by a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Stable metric name
    pub name: MetricName,
    /// Human label used in reports and chart captions
    pub label: String,
    /// Counting rule
    pub rule: MetricRule,
    /// Display unit
    #[serde(default)]
    pub unit: MetricUnit,
}

impl MetricSpec {
    /// Build a count metric
    pub fn new(name: MetricName, label: impl Into<String>, rule: MetricRule) -> Self {
        Self {
            name,
            label: label.into(),
            rule,
            unit: MetricUnit::Count,
        }
    }

    /// Use a different display unit
    #[must_use]
    pub const fn with_unit(mut self, unit: MetricUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Evaluate the rule over points already restricted to one month.
    ///
    /// Counting rules always yield a value, zero included. An average over
    /// no samples has no value.
    pub fn evaluate<'a, I>(&self, points: I) -> Option<u64>
    where
        I: IntoIterator<Item = &'a RawDataPoint>,
    {
        let payloads = points.into_iter().map(|p| &p.payload);
        match &self.rule {
            MetricRule::Occurrences => Some(
                payloads
                    .filter(|p| matches!(p, Payload::Category(_) | Payload::Text(_)))
                    .count() as u64,
            ),
            MetricRule::Category(label) => Some(
                payloads
                    .filter(|p| matches!(p, Payload::Category(c) if c == label))
                    .count() as u64,
            ),
            MetricRule::Sum => Some(
                payloads
                    .filter_map(|p| match p {
                        Payload::Count(v) => Some(*v),
                        _ => None,
                    })
                    .fold(0u64, u64::saturating_add),
            ),
            MetricRule::Average => {
                let (sum, n) = payloads
                    .filter_map(|p| match p {
                        Payload::Count(v) => Some(*v),
                        _ => None,
                    })
                    .fold((0u64, 0u64), |(sum, n), v| (sum.saturating_add(v), n + 1));
                (n > 0).then(|| (sum + n / 2) / n)
            }
        }
    }
}

/// Value of one month in a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketValue {
    /// Counted value (zero is a real value)
    Count(u64),
    /// Explicit marker for a month with no usable data
    Unavailable,
}

impl BucketValue {
    /// The count, if available
    pub const fn count(self) -> Option<u64> {
        match self {
            Self::Count(v) => Some(v),
            Self::Unavailable => None,
        }
    }

    /// Whether the value is a real count
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Count(_))
    }
}

/// Canonical aggregated unit, unique per (source, month, metric)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    /// Source key
    pub source: SourceKey,
    /// Metric name
    pub metric: MetricName,
    /// Calendar month
    pub month: Month,
    /// Aggregated value
    pub value: BucketValue,
}
