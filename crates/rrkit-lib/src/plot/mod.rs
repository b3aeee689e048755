use crate::{
    error::Result,
    signal::{Events, RRSeries, TimeSeries},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

impl Axis {
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(&self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScatterSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub radius: u32,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Scatter(ScatterSeries),
}

impl Series {
    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(line) => &line.points,
            Series::Scatter(scatter) => &scatter.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    /// Force identical x and y ranges (square aspect).
    pub equal_axes: bool,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis::default(),
            y: Axis::default(),
            equal_axes: false,
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// Data bounds as `(x_min, x_max, y_min, y_max)`, `None` when there are no points.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.series.iter().flat_map(|s| s.points().iter());
        let first = points.next()?;
        let init = (first[0], first[0], first[1], first[1]);
        let (mut x0, mut x1, mut y0, mut y1) = points.fold(init, |(x0, x1, y0, y1), p| {
            (x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1]))
        });
        if self.equal_axes {
            let lo = x0.min(y0);
            let hi = x1.max(y1);
            (x0, x1, y0, y1) = (lo, hi, lo, hi);
        }
        Some((x0, x1, y0, y1))
    }
}

pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> Result<()>;
}

/// Reduce `points` to at most `max_points` by keeping the lowest and highest
/// sample of each bucket, in their original order, so narrow spikes survive.
pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points || max_points < 2 {
        return points.to_vec();
    }
    let bucket = points.len().div_ceil(max_points / 2);
    let mut out = Vec::with_capacity(max_points);
    for chunk in points.chunks(bucket) {
        let (mut lo, mut hi) = (0, 0);
        for (i, p) in chunk.iter().enumerate() {
            if p[1] < chunk[lo][1] {
                lo = i;
            }
            if p[1] > chunk[hi][1] {
                hi = i;
            }
        }
        match lo.cmp(&hi) {
            std::cmp::Ordering::Less => out.extend([chunk[lo], chunk[hi]]),
            std::cmp::Ordering::Greater => out.extend([chunk[hi], chunk[lo]]),
            std::cmp::Ordering::Equal => out.push(chunk[lo]),
        }
    }
    out
}

/// Scatter of (RR[n], RR[n+1]) in milliseconds.
pub fn figure_from_poincare(rr: &RRSeries) -> Figure {
    let mut fig = Figure::new(Some("Poincaré plot".into()));
    fig.x = Axis::labeled("RR(n) (ms)");
    fig.y = Axis::labeled("RR(n+1) (ms)");
    fig.equal_axes = true;
    let points = rr
        .pairs()
        .map(|(current, next)| [current * 1000.0, next * 1000.0])
        .collect();
    fig.add_series(Series::Scatter(ScatterSeries {
        name: "RR".into(),
        points,
        radius: 2,
        color: Color(0x0000FF),
    }));
    fig
}

/// Filtered ECG trace with the detected R-peaks marked on top.
pub fn figure_from_peaks(series: &TimeSeries, peaks: &Events, max_points: usize) -> Figure {
    let dt = 1.0 / series.fs.max(1.0);
    let points: Vec<[f64; 2]> = series
        .data
        .iter()
        .enumerate()
        .map(|(i, value)| [i as f64 * dt, *value])
        .collect();
    let mut fig = Figure::new(Some("ECG with R-peaks".into()));
    fig.x = Axis::labeled("time (s)");
    fig.add_series(Series::Line(LineSeries {
        name: "ECG".into(),
        points: decimate_points(&points, max_points),
        style: Style {
            width: 1.0,
            dash: None,
            color: Color(0x1F77B4),
        },
    }));
    fig.add_series(Series::Scatter(ScatterSeries {
        name: "R-peaks".into(),
        points: peaks
            .indices
            .iter()
            .filter_map(|&i| points.get(i).copied())
            .collect(),
        radius: 3,
        color: Color(0xFF0000),
    }));
    fig
}
