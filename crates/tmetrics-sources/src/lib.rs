//! # tmetrics sources
//!
//! Talking to rate-limited, paginated community services.
//!
//! A [`Fetcher`] wraps one [`Source`] with its throttle and retry policy.
//! Adapters translate each service's paging idiom into a lazy stream of
//! [`RawDataPoint`](tmetrics_common::RawDataPoint)s through the shared
//! [`SourceAdapter`] contract, and the [`registry`] picks the adapter family
//! named in configuration.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod adapters;
pub mod fetcher;
pub mod registry;
pub mod source;
pub mod throttle;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod test_support;

pub use adapter::{collect_month, paginate_pages, Page, PageCursor, PageDecoder, SourceAdapter};
pub use fetcher::{AuthScheme, Credential, FetchEnvironment, Fetcher, RetryPolicy};
pub use registry::{build_adapter, build_source, check_adapters, AdapterContext};
pub use source::{Capabilities, PaginationStyle, RateCeiling, Source};
pub use throttle::{interval_for, Sleeper, Throttle, ThrottleClock, ThrottlePool, TokioSleeper};
pub use transport::{FetchRequest, FetchResponse, HttpTransport, ReqwestTransport, TransportError};
