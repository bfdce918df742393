//! Section composition.

use std::cmp::Ordering;

use tmetrics_common::Month;
use tmetrics_config::TopicConfig;
use tracing::{debug, warn};

use crate::section::{ReportSection, SourceOutcome};

/// Compose a topic's section from per-source outcomes.
///
/// Sources are ordered by their position in the topic's source list; any
/// source not in the list follows, ordered by key. The input order has no
/// effect on the result.
pub fn compose(topic: &TopicConfig, month: Month, mut outcomes: Vec<SourceOutcome>) -> ReportSection {
    let rank = |outcome: &SourceOutcome| {
        topic
            .sources
            .iter()
            .position(|s| s == outcome.key().as_str())
            .unwrap_or(usize::MAX)
    };
    outcomes.sort_by(|a, b| match rank(a).cmp(&rank(b)) {
        Ordering::Equal => a.key().cmp(b.key()),
        other => other,
    });

    for outcome in &outcomes {
        if rank(outcome) == usize::MAX {
            warn!(topic = %topic.key, source = %outcome.key(), "source is not listed for topic; placed last");
        }
    }

    let section = ReportSection {
        topic: topic.key.clone(),
        title: topic.title.clone(),
        month,
        subsections: outcomes,
    };
    debug!(
        topic = %section.topic,
        month = %month,
        available = section.available_count(),
        unavailable = section.unavailable_count(),
        "section composed"
    );
    section
}
