//! # tmetrics runner
//!
//! Runs the monthly pipeline for each topic: fetch every source of the
//! topic concurrently, aggregate into the persisted series, build deltas,
//! render charts and compose the report section.
//!
//! A source that fails or runs out of time is marked unavailable and the
//! rest of the topic carries on. A topic fails only when none of its
//! sources delivered data.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod state;

pub use context::RunContext;
pub use error::{RunnerError, RunnerResult};
pub use output::{chart_dir, month_dir, write_section};
pub use pipeline::{Pipeline, TopicRun};
pub use state::{PipelineState, StateTrace, TopicState};
