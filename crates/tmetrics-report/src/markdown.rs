//! Markdown rendering of a section.
//!
//! The layout is a fixed template so that two runs over the same data
//! produce the same bytes.

use std::fmt::Write;

use tmetrics_common::{format_change, format_value, BucketValue, MetricUnit};
use tmetrics_graphs::{ChartStatus, Delta};

use crate::section::{MetricReport, ReportSection, SourceOutcome};

/// Directory, relative to the report file, holding its charts
pub const CHART_DIR: &str = "charts";

/// Render a section as Markdown
pub fn render_markdown(section: &ReportSection) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}: {}", section.title, section.month.label());

    for subsection in &section.subsections {
        let _ = writeln!(out, "\n## {}\n", subsection.label());
        match subsection {
            SourceOutcome::Available { metrics, .. } if metrics.is_empty() => {
                out.push_str("No metrics reported.\n");
            }
            SourceOutcome::Available { metrics, .. } => {
                for (i, metric) in metrics.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    write_metric(&mut out, metric);
                }
            }
            SourceOutcome::Unavailable { label, reason, .. } => {
                let _ = writeln!(out, "**data unavailable for {label}** ({reason})");
            }
        }
    }
    out
}

fn write_metric(out: &mut String, metric: &MetricReport) {
    let unit = metric.spec.unit;
    let _ = writeln!(out, "### {}\n", metric.spec.label);
    let _ = writeln!(out, "Total: {}", value_text(unit, metric.current));
    for delta in &metric.deltas {
        let _ = writeln!(out, "- {}: {}", delta.kind.label(), delta_text(unit, delta));
    }
    if let Some(chart) = &metric.chart {
        match (&chart.status, chart.file_name()) {
            (ChartStatus::Rendered | ChartStatus::Placeholder { .. }, Some(file)) => {
                let _ = writeln!(out, "\n![{}]({CHART_DIR}/{file})", metric.spec.label);
            }
            _ => out.push_str("\n_chart unavailable_\n"),
        }
    }
    for warning in &metric.warnings {
        let _ = writeln!(out, "\n> Warning: {warning}");
    }
}

fn value_text(unit: MetricUnit, value: BucketValue) -> String {
    value
        .count()
        .map_or_else(|| "unavailable".to_string(), |v| format_value(unit, v))
}

fn delta_text(unit: MetricUnit, delta: &Delta) -> String {
    match delta.absolute {
        Some(change) => format!("{} ({})", format_change(unit, change), delta.percent),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tmetrics_common::test_utils::{category_metric, metric_name, month, source_key};
    use tmetrics_common::TimeSeries;
    use tmetrics_graphs::Chart;

    fn section(subsections: Vec<SourceOutcome>) -> ReportSection {
        ReportSection {
            topic: "bugs".to_string(),
            title: "Bugs".to_string(),
            month: month("2024-03"),
            subsections,
        }
    }

    fn chart(status: ChartStatus) -> Chart {
        Chart {
            source: source_key("bugzilla"),
            metric: metric_name("bugs_created"),
            path: PathBuf::from("/out/2024-03/charts/bugzilla_bugs_created.png"),
            status,
        }
    }

    fn bugs_report() -> MetricReport {
        // March 2023 through March 2024
        let mut counts = vec![1000];
        counts.extend([5; 10]);
        counts.extend([0, 1250]);
        let series = TimeSeries::from_counts(source_key("bugzilla"), metric_name("bugs_created"), month("2023-03"), &counts);
        MetricReport::from_series(category_metric("bugs_created", "created"), &series, month("2024-03"))
    }

    #[test]
    fn test_metric_block_template() {
        let report = bugs_report().with_chart(chart(ChartStatus::Rendered));
        let text = render_markdown(&section(vec![SourceOutcome::Available {
            key: source_key("bugzilla"),
            label: "Bugzilla".to_string(),
            metrics: vec![report],
        }]));

        assert_eq!(
            text,
            "# Bugs: March 2024\n\
             \n## Bugzilla\n\n\
             ### bugs created\n\n\
             Total: 1,250\n\
             - vs previous month: +1,250 (n/a)\n\
             - vs same month last year: +250 (+25.0%)\n\
             \n![bugs created](charts/bugzilla_bugs_created.png)\n"
        );
    }

    #[test]
    fn test_unavailable_source_line() {
        let text = render_markdown(&section(vec![SourceOutcome::Unavailable {
            key: source_key("crash_stats"),
            label: "Crash Stats".to_string(),
            reason: "rate limit exceeded".to_string(),
        }]));
        assert!(text.contains("**data unavailable for Crash Stats** (rate limit exceeded)"));
    }

    #[test]
    fn test_omitted_chart_and_warning() {
        let mut report = bugs_report().with_chart(chart(ChartStatus::Omitted {
            reason: "disk full".to_string(),
        }));
        report.warnings.push("final value for 2024-03 dropped from 100 to 90 on re-fetch".to_string());
        let text = render_markdown(&section(vec![SourceOutcome::Available {
            key: source_key("bugzilla"),
            label: "Bugzilla".to_string(),
            metrics: vec![report],
        }]));
        assert!(text.contains("_chart unavailable_"));
        assert!(text.contains("> Warning: final value for 2024-03 dropped"));
    }

    #[test]
    fn test_percent_metric_values() {
        assert_eq!(value_text(MetricUnit::Percent, BucketValue::Count(5432)), "54.32%");
        assert_eq!(value_text(MetricUnit::Count, BucketValue::Unavailable), "unavailable");
    }
}
