//! Per-source pipeline states and the topic outcome.

use std::fmt;

use tmetrics_common::SourceKey;
use tracing::debug;

/// Where one source is in a topic run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Not started
    Idle,
    /// Paging through the source
    Fetching,
    /// Bucketing points and merging them into the store
    Aggregating,
    /// Computing deltas
    Trending,
    /// Drawing charts
    Rendering,
    /// Ready for the report
    Composed,
    /// Failed or cancelled while fetching or aggregating
    Unavailable,
}

impl PipelineState {
    /// Whether `next` may follow this state
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Fetching)
                | (Self::Fetching, Self::Aggregating)
                | (Self::Aggregating, Self::Trending)
                | (Self::Trending, Self::Rendering)
                | (Self::Rendering, Self::Composed)
                | (Self::Idle | Self::Fetching | Self::Aggregating, Self::Unavailable)
        )
    }

    /// Whether no further state follows
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Composed | Self::Unavailable)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Aggregating => "aggregating",
            Self::Trending => "trending",
            Self::Rendering => "rendering",
            Self::Composed => "composed",
            Self::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// Recorded state history of one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTrace {
    source: SourceKey,
    states: Vec<PipelineState>,
}

impl StateTrace {
    /// Trace starting in `Idle`
    pub fn new(source: SourceKey) -> Self {
        Self {
            source,
            states: vec![PipelineState::Idle],
        }
    }

    /// Source being traced
    pub const fn source(&self) -> &SourceKey {
        &self.source
    }

    /// Current state
    pub fn current(&self) -> PipelineState {
        self.states.last().copied().unwrap_or(PipelineState::Idle)
    }

    /// Every state visited, in order
    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }

    /// Move to `next`; an illegal transition is ignored and logged
    pub fn advance(&mut self, next: PipelineState) {
        let current = self.current();
        if current.can_advance_to(next) {
            debug!(source = %self.source, from = %current, to = %next, "source state changed");
            self.states.push(next);
        } else {
            debug!(source = %self.source, from = %current, to = %next, "ignored illegal state change");
        }
    }
}

/// Terminal state of a topic run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicState {
    /// A section was composed, possibly with unavailable sources
    Composed,
    /// Every source of the topic was unavailable
    Failed,
}
