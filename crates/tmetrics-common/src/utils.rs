//! Formatting helpers for report text and file names.

use chrono::{DateTime, Utc};

use crate::types::MetricUnit;

/// Formats a timestamp for display.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Formats an integer with thousands separators, e.g. `12,345`.
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats a stored metric value in its unit.
pub fn format_value(unit: MetricUnit, value: u64) -> String {
    match unit {
        MetricUnit::Count => format_count(value),
        MetricUnit::Percent => format!("{}.{:02}%", value / 100, value % 100),
    }
}

/// Formats a signed change in a metric's unit, always with a sign.
pub fn format_change(unit: MetricUnit, change: i64) -> String {
    let sign = if change < 0 { '-' } else { '+' };
    let magnitude = change.unsigned_abs();
    match unit {
        MetricUnit::Count => format!("{sign}{}", format_count(magnitude)),
        MetricUnit::Percent => format!("{sign}{}.{:02} pts", magnitude / 100, magnitude % 100),
    }
}

/// Replaces characters that are unsafe in file names.
pub fn sanitize_file_stem(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

/// Truncates a string to a maximum number of characters with ellipsis.
pub fn truncate_string(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        input.to_string()
    } else {
        let kept: String = input.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
