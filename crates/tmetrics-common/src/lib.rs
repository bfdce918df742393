//! # tmetrics common
//!
//! Shared data model, error taxonomy and logging for the monthly metrics
//! pipeline.
//!
//! Every other crate in the workspace speaks in these types: a [`Month`],
//! raw points emitted by sources, [`MonthlyBucket`]s produced by aggregation
//! and the [`TimeSeries`] read by trends, charts and reports.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod logging;
pub mod month;
pub mod series;
pub mod types;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod test_utils;

pub use error::{BoxError, MetricsError, Result};
pub use logging::{init_logging, LoggingConfig};
pub use month::Month;
pub use series::{SeriesEntry, TimeSeries};
pub use types::*;
pub use utils::*;
