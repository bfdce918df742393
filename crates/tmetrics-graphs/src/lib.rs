//! # tmetrics graphs
//!
//! Everything between raw points and a finished chart: monthly
//! aggregation, the persisted series store, trend deltas and line chart
//! rendering with plotters.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregator;
pub mod renderer;
pub mod store;
pub mod trends;

pub use aggregator::{aggregate, aggregate_all, merge_into_series, DataAnomaly, MergeAction, MergeOutcome};
pub use renderer::{chart_file_name, Chart, ChartRenderer, ChartStatus, ChartStyle, LineChartRenderer};
pub use store::SeriesStore;
pub use trends::{build_deltas, sequential_deltas, Delta, DeltaKind, PercentChange};
