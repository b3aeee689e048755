use anyhow::Result;
use plotters::prelude::*;
use rrkit_lib::{
    error::Error,
    io::OutputSink,
    pipeline::Analysis,
    plot::{figure_from_peaks, figure_from_poincare, Figure, PlotBackend, Series},
};
use std::{
    ops::Range,
    path::{Path, PathBuf},
};

/// Most trace points drawn in the ECG overview.
const ECG_MAX_POINTS: usize = 4_000;

/// PNG file rendered through the plotters bitmap backend.
pub struct PngFile {
    pub path: PathBuf,
    pub size: (u32, u32),
}

impl PlotBackend for PngFile {
    fn draw(&mut self, fig: &Figure) -> rrkit_lib::Result<()> {
        draw_plotters_figure(&self.path, self.size, fig)
            .map_err(|e| Error::Render(format!("{}: {e:#}", self.path.display())))
    }
}

/// Square Poincaré scatter next to the CSV outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoincarePngSink;

impl OutputSink for PoincarePngSink {
    fn file_name(&self, stem: &str) -> String {
        format!("poincare_plot_{stem}.png")
    }

    fn write(&self, run: &Analysis, path: &Path) -> rrkit_lib::Result<()> {
        PngFile {
            path: path.to_path_buf(),
            size: (600, 600),
        }
        .draw(&figure_from_poincare(&run.cleaning.cleaned))
    }
}

/// Filtered trace with its R-peaks as `ecg_with_peaks_<stem>.png`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcgPngSink;

impl OutputSink for EcgPngSink {
    fn file_name(&self, stem: &str) -> String {
        format!("ecg_with_peaks_{stem}.png")
    }

    fn write(&self, run: &Analysis, path: &Path) -> rrkit_lib::Result<()> {
        let fig = figure_from_peaks(&run.filtered, &run.detection.events, ECG_MAX_POINTS);
        PngFile {
            path: path.to_path_buf(),
            size: (1200, 400),
        }
        .draw(&fig)
    }
}

fn draw_plotters_figure(path: &Path, size: (u32, u32), fig: &Figure) -> Result<()> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    let (x_range, y_range) = chart_ranges(fig.bounds());
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Plot".into()),
            ("sans-serif", 22),
        )
        .x_label_area_size(35)
        .y_label_area_size(55)
        .build_cartesian_2d(x_range, y_range)?;
    chart
        .configure_mesh()
        .x_desc(fig.x.label.clone().unwrap_or_default())
        .y_desc(fig.y.label.clone().unwrap_or_default())
        .draw()?;

    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let (r, g, b) = line.style.color.rgb();
                let color = RGBColor(r, g, b);
                chart
                    .draw_series(LineSeries::new(
                        line.points.iter().map(|p| (p[0], p[1])),
                        color.stroke_width(line.style.width.max(1.0) as u32),
                    ))?
                    .label(line.name.clone())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            }
            Series::Scatter(scatter) => {
                let (r, g, b) = scatter.color.rgb();
                let color = RGBColor(r, g, b);
                chart
                    .draw_series(
                        scatter
                            .points
                            .iter()
                            .map(|p| Circle::new((p[0], p[1]), scatter.radius, color.filled())),
                    )?
                    .label(scatter.name.clone())
                    .legend(move |(x, y)| Circle::new((x + 10, y), 3, color.filled()));
            }
        }
    }
    if fig.series.len() > 1 {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }
    root.present()?;
    Ok(())
}

/// Data bounds widened by 5%; an empty or single-valued axis still gets a span.
fn chart_ranges(bounds: Option<(f64, f64, f64, f64)>) -> (Range<f64>, Range<f64>) {
    let (x0, x1, y0, y1) = bounds.unwrap_or((0.0, 1.0, 0.0, 1.0));
    (pad(x0, x1), pad(y0, y1))
}

fn pad(lo: f64, hi: f64) -> Range<f64> {
    let span = hi - lo;
    let margin = if span > 0.0 {
        span * 0.05
    } else {
        lo.abs().max(1.0) * 0.05
    };
    (lo - margin)..(hi + margin)
}
