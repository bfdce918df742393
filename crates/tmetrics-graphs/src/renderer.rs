//! Line charts of monthly series.
//!
//! A chart never fails the run: when drawing the series fails, a plain
//! placeholder image is written instead, and when even that fails the chart
//! is reported as omitted.

use std::fs;
use std::path::{Path, PathBuf};

use plotters::coord::Shift;
use plotters::prelude::*;
use serde::Serialize;
use tmetrics_common::{
    sanitize_file_stem, BucketValue, MetricName, MetricSpec, MetricUnit, Month, Result, SourceKey, TimeSeries,
};
use tmetrics_config::{ChartConfig, ChartFormat};
use tracing::{info, warn};

const PALETTE: [RGBColor; 8] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
];

const PLACEHOLDER_BACKGROUND: RGBColor = RGBColor(245, 245, 245);
const PLACEHOLDER_INK: RGBColor = RGBColor(190, 190, 190);

/// Outcome of rendering one chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChartStatus {
    /// The series was drawn
    Rendered,
    /// A placeholder image was written instead
    Placeholder {
        /// Why the series could not be drawn
        reason: String,
    },
    /// No image exists
    Omitted {
        /// Why nothing could be written
        reason: String,
    },
}

/// A chart file for one (source, metric) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chart {
    /// Source key
    pub source: SourceKey,
    /// Metric name
    pub metric: MetricName,
    /// Where the image is or would have been written
    pub path: PathBuf,
    /// Rendering outcome
    pub status: ChartStatus,
}

impl Chart {
    /// Whether an image file was written
    pub const fn has_image(&self) -> bool {
        !matches!(self.status, ChartStatus::Omitted { .. })
    }

    /// File name of the image
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// File name for a pair's chart, `<source>_<metric>.<ext>`
pub fn chart_file_name(source: &SourceKey, metric: &MetricName, format: ChartFormat) -> String {
    format!(
        "{}_{}.{}",
        sanitize_file_stem(source.as_str()),
        sanitize_file_stem(metric.as_str()),
        format.extension()
    )
}

/// Turns a series into an image file
pub trait ChartRenderer: Send + Sync {
    /// Render `series` into `dir`.
    ///
    /// Never fails; problems are reported through [`Chart::status`].
    fn render(&self, series: &TimeSeries, metric: &MetricSpec, title: &str, dir: &Path) -> Chart;
}

/// Size, format and font of rendered charts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartStyle {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Image format
    pub format: ChartFormat,
    /// Caption and label font
    pub font_family: String,
}

impl From<&ChartConfig> for ChartStyle {
    fn from(config: &ChartConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            format: config.format,
            font_family: config.font_family.clone(),
        }
    }
}

/// Line chart with one marker per month and a red cross for unavailable months
#[derive(Debug, Clone)]
pub struct LineChartRenderer {
    style: ChartStyle,
}

impl LineChartRenderer {
    /// Renderer drawing with `style`
    pub const fn new(style: ChartStyle) -> Self {
        Self { style }
    }

    /// The style in use
    pub const fn style(&self) -> &ChartStyle {
        &self.style
    }

    fn draw(&self, path: &Path, picture: &Picture<'_>) -> Result<()> {
        let size = (self.style.width, self.style.height);
        match self.style.format {
            ChartFormat::Png => paint(&BitMapBackend::new(path, size).into_drawing_area(), picture),
            ChartFormat::Svg => paint(&SVGBackend::new(path, size).into_drawing_area(), picture),
        }
    }
}

impl ChartRenderer for LineChartRenderer {
    fn render(&self, series: &TimeSeries, metric: &MetricSpec, title: &str, dir: &Path) -> Chart {
        let path = dir.join(chart_file_name(&series.source, &series.metric, self.style.format));
        let chart = |status| Chart {
            source: series.source.clone(),
            metric: series.metric.clone(),
            path: path.clone(),
            status,
        };

        if let Err(e) = fs::create_dir_all(dir) {
            warn!(dir = %dir.display(), error = %e, "chart directory unavailable");
            return chart(ChartStatus::Omitted {
                reason: e.to_string(),
            });
        }

        let points = series.filled();
        let failure = if points.iter().any(|(_, v)| v.is_available()) {
            let line = Picture::Line {
                points: &points,
                title,
                unit: metric.unit,
                color: series_color(&series.metric),
                font: &self.style.font_family,
            };
            match self.draw(&path, &line) {
                Ok(()) => {
                    info!(path = %path.display(), months = points.len(), "chart rendered");
                    return chart(ChartStatus::Rendered);
                }
                Err(e) => e.to_string(),
            }
        } else {
            "no data for this period".to_string()
        };

        warn!(source = %series.source, metric = %series.metric, reason = %failure, "drawing chart placeholder");
        match self.draw(&path, &Picture::Placeholder) {
            Ok(()) => chart(ChartStatus::Placeholder { reason: failure }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "chart omitted");
                let _ = fs::remove_file(&path);
                chart(ChartStatus::Omitted {
                    reason: format!("{failure}; placeholder failed: {e}"),
                })
            }
        }
    }
}

enum Picture<'a> {
    Line {
        points: &'a [(Month, BucketValue)],
        title: &'a str,
        unit: MetricUnit,
        color: RGBColor,
        font: &'a str,
    },
    Placeholder,
}

fn paint<DB>(root: &DrawingArea<DB, Shift>, picture: &Picture<'_>) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    match picture {
        Picture::Line {
            points,
            title,
            unit,
            color,
            font,
        } => paint_line(root, points, title, *unit, *color, font)?,
        Picture::Placeholder => paint_placeholder(root)?,
    }
    root.present()?;
    Ok(())
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn paint_line<DB>(
    root: &DrawingArea<DB, Shift>,
    points: &[(Month, BucketValue)],
    title: &str,
    unit: MetricUnit,
    color: RGBColor,
    font: &str,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;

    let max = points.iter().filter_map(|(_, v)| v.count()).max().unwrap_or(0);
    let y_max = (max as f64 * 1.1).max(1.0);
    let last_x = points.len() as f64 - 0.5;
    let labels: Vec<String> = points.iter().map(|(m, _)| m.short_label()).collect();

    let mut chart = ChartBuilder::on(root)
        .caption(title, (font, 24))
        .margin(16)
        .x_label_area_size(40)
        .y_label_area_size(64)
        .build_cartesian_2d(-0.5f64..last_x, 0f64..y_max)?;

    let x_label = |x: &f64| {
        let index = x.round();
        if (x - index).abs() > 1e-6 || index < 0.0 {
            return String::new();
        }
        labels.get(index as usize).cloned().unwrap_or_default()
    };
    let y_label = |y: &f64| match unit {
        MetricUnit::Count => format!("{y:.0}"),
        MetricUnit::Percent => format!("{:.0}%", y / 100.0),
    };
    chart
        .configure_mesh()
        .x_labels(points.len().min(13))
        .x_label_formatter(&x_label)
        .y_label_formatter(&y_label)
        .label_style((font, 14))
        .draw()?;

    for segment in available_segments(points) {
        chart.draw_series(LineSeries::new(segment, color.stroke_width(2)))?;
    }
    chart.draw_series(
        points
            .iter()
            .enumerate()
            .filter_map(|(i, (_, v))| v.count().map(|c| (i as f64, c as f64)))
            .map(|p| Circle::new(p, 4, color.filled())),
    )?;
    chart.draw_series(
        points
            .iter()
            .enumerate()
            .filter(|(_, (_, v))| !v.is_available())
            .map(|(i, _)| Cross::new((i as f64, 0.0), 6, RED.stroke_width(2))),
    )?;
    Ok(())
}

/// Text-free image so that a missing font cannot break it
fn paint_placeholder<DB>(root: &DrawingArea<DB, Shift>) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&PLACEHOLDER_BACKGROUND)?;
    let (width, height) = root.dim_in_pixel();
    let (w, h) = (i32::try_from(width).unwrap_or(i32::MAX), i32::try_from(height).unwrap_or(i32::MAX));
    let ink = PLACEHOLDER_INK.stroke_width(3);
    root.draw(&Rectangle::new([(8, 8), (w - 8, h - 8)], ink))?;
    root.draw(&PathElement::new(vec![(8, 8), (w - 8, h - 8)], ink))?;
    root.draw(&PathElement::new(vec![(8, h - 8), (w - 8, 8)], ink))?;
    Ok(())
}

/// Runs of consecutive available months as plot coordinates
#[allow(clippy::cast_precision_loss)]
fn available_segments(points: &[(Month, BucketValue)]) -> Vec<Vec<(f64, f64)>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for (i, (_, value)) in points.iter().enumerate() {
        if let Some(count) = value.count() {
            current.push((i as f64, count as f64));
        } else if !current.is_empty() {
            segments.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Stable palette colour for a metric
fn series_color(metric: &MetricName) -> RGBColor {
    // FNV-1a keeps the colour stable across runs and platforms
    let hash = metric
        .as_str()
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3));
    PALETTE[usize::try_from(hash % PALETTE.len() as u64).unwrap_or(0)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tmetrics_common::test_utils::{category_metric, create_temp_dir, metric_name, month, source_key};
    use tmetrics_common::SeriesEntry;

    fn style(format: ChartFormat) -> ChartStyle {
        ChartStyle {
            width: 480,
            height: 320,
            format,
            font_family: "sans-serif".to_string(),
        }
    }

    fn series(counts: &[u64]) -> TimeSeries {
        TimeSeries::from_counts(source_key("github"), metric_name("prs_opened"), month("2024-01"), counts)
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            chart_file_name(&source_key("github"), &metric_name("prs_opened"), ChartFormat::Svg),
            "github_prs_opened.svg"
        );
    }

    #[test]
    fn test_segments_break_at_unavailable_months() {
        let points = vec![
            (month("2024-01"), BucketValue::Count(1)),
            (month("2024-02"), BucketValue::Count(2)),
            (month("2024-03"), BucketValue::Unavailable),
            (month("2024-04"), BucketValue::Count(4)),
        ];
        let segments = available_segments(&points);
        assert_eq!(segments, vec![vec![(0.0, 1.0), (1.0, 2.0)], vec![(3.0, 4.0)]]);
    }

    #[test]
    fn test_color_is_stable() {
        let name = metric_name("bugs_created");
        assert_eq!(series_color(&name), series_color(&name));
        assert!(PALETTE.contains(&series_color(&name)));
    }

    #[test]
    fn test_render_writes_a_file() {
        let dir = create_temp_dir();
        let mut s = series(&[4, 9, 2, 11]);
        s.insert(
            month("2024-05"),
            SeriesEntry {
                value: BucketValue::Unavailable,
                finalized: true,
            },
        );
        let renderer = LineChartRenderer::new(style(ChartFormat::Svg));
        let chart = renderer.render(&s, &category_metric("prs_opened", "pr"), "Pull requests", dir.path());

        // Fonts may be missing on build machines; a placeholder is still a file
        assert!(matches!(chart.status, ChartStatus::Rendered | ChartStatus::Placeholder { .. }));
        assert!(chart.path.exists());
        assert_eq!(chart.file_name(), Some("github_prs_opened.svg"));
    }

    #[test]
    fn test_empty_series_gets_placeholder() {
        let dir = create_temp_dir();
        let empty = TimeSeries::new(source_key("sumo"), metric_name("questions"));
        let renderer = LineChartRenderer::new(style(ChartFormat::Png));
        let chart = renderer.render(&empty, &category_metric("questions", "question"), "Questions", dir.path());

        match &chart.status {
            ChartStatus::Placeholder { reason } => assert!(reason.contains("no data")),
            ChartStatus::Omitted { .. } => {}
            ChartStatus::Rendered => panic!("empty series must not render"),
        }
    }

    #[test]
    fn test_unwritable_directory_is_omitted() {
        let dir = create_temp_dir();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();

        let renderer = LineChartRenderer::new(style(ChartFormat::Png));
        let chart = renderer.render(&series(&[1, 2]), &category_metric("prs_opened", "pr"), "PRs", &blocker.join("charts"));
        assert!(matches!(chart.status, ChartStatus::Omitted { .. }));
        assert!(!chart.has_image());
    }
}
