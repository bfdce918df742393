//! # tmetrics config
//!
//! Typed configuration for the metrics digest: sources, topics, fetch and
//! retry limits, chart styling and storage location.
//!
//! Configuration is read from YAML, overridden from `TMETRICS_*`
//! environment variables and validated before use.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod defaults;
pub mod loader;
pub mod schema;
pub mod validator;

pub use defaults::*;
pub use loader::*;
pub use schema::*;
pub use self::validator::*;
