//! Scatter plan (label groups and colors) and PNG rendering.

use std::collections::{BTreeMap, HashSet};
use std::f64::consts::PI;
use std::path::Path;

use ndarray::Array2;
use plotters::prelude::{
    BLACK, BitMapBackend, ChartBuilder, Circle, Color, IntoDrawingArea, IntoFont, RGBColor,
    SeriesLabelPosition, Text, WHITE,
};
use tracing::debug;
use vecport_settings::VisualizeSettings;

use crate::errors::{Result, VisualizeError};

/// Legend label for rows whose department is NULL.
pub const NO_LABEL: &str = "(none)";

/// Horizontal axis label.
pub const X_LABEL: &str = "Semantic Dimension 1 (PCA)";

/// Vertical axis label.
pub const Y_LABEL: &str = "Semantic Dimension 2 (PCA)";

/// Heading drawn above the legend.
pub const LEGEND_TITLE: &str = "Department";

/// 8-bit RGB color.
pub type Rgb = (u8, u8, u8);

fn channel(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// The rainbow colormap: violet at 0, red at 1.
pub fn rainbow(x: f64) -> Rgb {
    let x = x.clamp(0.0, 1.0);
    (
        channel((2.0 * x - 0.5).abs()),
        channel((PI * x).sin()),
        channel((PI * x / 2.0).cos()),
    )
}

/// `k` colors sampled evenly over the rainbow colormap, endpoints included.
///
/// Neighboring samples can round to the same 8-bit color once `k` reaches a
/// few hundred; later duplicates move to the nearest unused color so every
/// label keeps its own marker.
pub fn palette(k: usize) -> Vec<Rgb> {
    let samples: Vec<Rgb> = match k {
        0 => Vec::new(),
        1 => vec![rainbow(0.0)],
        _ => (0..k).map(|i| rainbow(i as f64 / (k - 1) as f64)).collect(),
    };
    let mut seen = HashSet::with_capacity(k);
    samples.into_iter().map(|c| unused_near(c, &mut seen)).collect()
}

/// `color` if unused, else the closest free color one channel away.
fn unused_near(color: Rgb, seen: &mut HashSet<Rgb>) -> Rgb {
    if seen.insert(color) {
        return color;
    }
    let (r, g, b) = color;
    for step in 1..=255i16 {
        for delta in [step, -step] {
            let shift = |c: u8| u8::try_from(i16::from(c) + delta).ok();
            let candidates = [
                shift(b).map(|b| (r, g, b)),
                shift(g).map(|g| (r, g, b)),
                shift(r).map(|r| (r, g, b)),
            ];
            for candidate in candidates.into_iter().flatten() {
                if seen.insert(candidate) {
                    return candidate;
                }
            }
        }
    }
    color
}

/// Points sharing one label.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelGroup {
    /// Legend text.
    pub label: String,
    /// Marker color.
    pub color: Rgb,
    /// Projected coordinates.
    pub points: Vec<(f64, f64)>,
}

/// Everything needed to draw the scatter plot, groups in label order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScatterPlan {
    /// One entry per distinct label.
    pub groups: Vec<LabelGroup>,
}

impl ScatterPlan {
    /// Group the rows of `points` (`[n, 2]`) by label and assign colors.
    pub fn build(labels: &[Option<String>], points: &Array2<f64>) -> Self {
        assert_eq!(labels.len(), points.nrows(), "one label per point");
        let mut by_label: BTreeMap<&str, Vec<(f64, f64)>> = BTreeMap::new();
        for (label, row) in labels.iter().zip(points.rows()) {
            by_label
                .entry(label.as_deref().unwrap_or(NO_LABEL))
                .or_default()
                .push((row[0], row[1]));
        }
        let colors = palette(by_label.len());
        let groups = by_label
            .into_iter()
            .zip(colors)
            .map(|((label, points), color)| LabelGroup {
                label: label.to_string(),
                color,
                points,
            })
            .collect();
        Self { groups }
    }

    /// Total number of points.
    pub fn point_count(&self) -> usize {
        self.groups.iter().map(|g| g.points.len()).sum()
    }

    /// Axis ranges covering every point with a 5% margin.
    pub fn bounds(&self) -> Option<((f64, f64), (f64, f64))> {
        let mut points = self.groups.iter().flat_map(|g| g.points.iter().copied());
        let (x, y) = points.next()?;
        let (mut x0, mut x1, mut y0, mut y1) = (x, x, y, y);
        for (x, y) in points {
            x0 = x0.min(x);
            x1 = x1.max(x);
            y0 = y0.min(y);
            y1 = y1.max(y);
        }
        let pad = |lo: f64, hi: f64| {
            let margin = ((hi - lo) * 0.05).max(1e-3);
            (lo - margin, hi + margin)
        };
        Some((pad(x0, x1), pad(y0, y1)))
    }
}

/// Text and size of the figure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlotStyle {
    /// Figure title.
    pub title: String,
    /// Horizontal axis label.
    pub x_label: String,
    /// Vertical axis label.
    pub y_label: String,
    /// Heading above the legend.
    pub legend_title: String,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
}

impl PlotStyle {
    /// Style from the visualizer settings.
    pub fn from_settings(settings: &VisualizeSettings) -> Self {
        Self {
            title: settings.title.clone(),
            x_label: X_LABEL.to_string(),
            y_label: Y_LABEL.to_string(),
            legend_title: LEGEND_TITLE.to_string(),
            width: settings.width,
            height: settings.height,
        }
    }
}

/// Turns a [`ScatterPlan`] into an image file.
pub trait PlotRenderer {
    /// Fail early when [`render`](Self::render) cannot succeed, before any
    /// vectors are fetched or projected.
    fn prepare(&mut self, _style: &PlotStyle) -> Result<()> {
        Ok(())
    }

    /// Draw `plan` to `path`.
    fn render(&mut self, plan: &ScatterPlan, style: &PlotStyle, path: &Path) -> Result<()>;
}

/// PNG output through `plotters`' bitmap backend.
///
/// Text uses the system `sans-serif` font, resolved through fontconfig.
/// [`prepare`](PlotRenderer::prepare) reports [`VisualizeError::Fonts`] when
/// none can be loaded.
#[derive(Clone, Copy, Debug, Default)]
pub struct PngRenderer;

impl PlotRenderer for PngRenderer {
    fn prepare(&mut self, style: &PlotStyle) -> Result<()> {
        check_fonts(style).map_err(|e| VisualizeError::Fonts(e.to_string()))
    }

    fn render(&mut self, plan: &ScatterPlan, style: &PlotStyle, path: &Path) -> Result<()> {
        draw_png(plan, style, path).map_err(|e| VisualizeError::Render {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), points = plan.point_count(), "plot written");
        Ok(())
    }
}

/// Draw the figure text into a scratch buffer, surfacing font lookup errors.
fn check_fonts(style: &PlotStyle) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let (width, height) = (64, 32);
    let mut buffer = vec![0u8; (width * height * 3) as usize];
    let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
    for (text, size) in [(&style.title, 30), (&style.x_label, 15)] {
        root.draw(&Text::new(text.clone(), (0, 0), ("sans-serif", size).into_font()))?;
    }
    root.present()?;
    Ok(())
}

fn draw_png(
    plan: &ScatterPlan,
    style: &PlotStyle,
    path: &Path,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let ((x0, x1), (y0, y1)) = plan.bounds().unwrap_or(((-1.0, 1.0), (-1.0, 1.0)));
    let mut chart = ChartBuilder::on(&root)
        .caption(&style.title, ("sans-serif", 30).into_font())
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x0..x1, y0..y1)?;
    chart
        .configure_mesh()
        .x_desc(style.x_label.as_str())
        .y_desc(style.y_label.as_str())
        .draw()?;

    for group in &plan.groups {
        let (r, g, b) = group.color;
        let color = RGBColor(r, g, b);
        let _ = chart
            .draw_series(
                group
                    .points
                    .iter()
                    .map(move |&(x, y)| Circle::new((x, y), 5, color.mix(0.7).filled())),
            )?
            .label(group.label.as_str())
            .legend(move |(x, y)| Circle::new((x, y), 5, color.filled()));
    }
    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK)
        .draw()?;

    let legend_x = i32::try_from(style.width).unwrap_or(i32::MAX).saturating_sub(220);
    root.draw(&Text::new(
        style.legend_title.clone(),
        (legend_x, 48),
        ("sans-serif", 18).into_font(),
    ))?;
    root.present()?;
    Ok(())
}
