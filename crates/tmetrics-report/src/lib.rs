//! # tmetrics report
//!
//! Composes one report section per topic. Sources appear in the topic's
//! configured order whatever order they finished in, and a source that
//! failed is shown as unavailable instead of being dropped.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod composer;
pub mod markdown;
pub mod section;

pub use composer::compose;
pub use markdown::{render_markdown, CHART_DIR};
pub use section::{MetricReport, ReportSection, SourceOutcome};
