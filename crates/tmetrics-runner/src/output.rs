//! Dated output layout: `<output>/<YYYY-MM>/<topic>.md` and
//! `<output>/<YYYY-MM>/charts/`.

use std::fs;
use std::path::{Path, PathBuf};

use tmetrics_common::{sanitize_file_stem, Month};
use tmetrics_report::{render_markdown, ReportSection, CHART_DIR};
use tracing::info;

use crate::error::RunnerResult;

/// Directory of one month's output
pub fn month_dir(output_dir: &Path, month: Month) -> PathBuf {
    output_dir.join(month.to_string())
}

/// Directory of one month's charts
pub fn chart_dir(output_dir: &Path, month: Month) -> PathBuf {
    month_dir(output_dir, month).join(CHART_DIR)
}

/// Write a section as Markdown, replacing an earlier run's file
pub fn write_section(output_dir: &Path, section: &ReportSection) -> RunnerResult<PathBuf> {
    let dir = month_dir(output_dir, section.month);
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.md", sanitize_file_stem(&section.topic)));
    fs::write(&path, render_markdown(section))?;
    info!(path = %path.display(), topic = %section.topic, "report written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tmetrics_common::test_utils::{create_temp_dir, month};

    #[test]
    fn test_layout() {
        let dir = create_temp_dir();
        let section = ReportSection {
            topic: "addons".to_string(),
            title: "Add-ons".to_string(),
            month: month("2024-03"),
            subsections: Vec::new(),
        };
        let path = write_section(dir.path(), &section).unwrap();
        assert_eq!(path, dir.path().join("2024-03").join("addons.md"));
        assert!(fs::read_to_string(&path).unwrap().starts_with("# Add-ons: March 2024"));
        assert_eq!(chart_dir(dir.path(), month("2024-03")), dir.path().join("2024-03/charts"));
    }
}
