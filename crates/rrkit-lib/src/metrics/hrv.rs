use crate::signal::RRSeries;
use serde::{Deserialize, Serialize};
use std::f64::consts::SQRT_2;

/// Descriptive statistics of an RR series (seconds, population std).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RrSummary {
    pub n: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Short- and long-axis dispersion of the (RR[n], RR[n+1]) scatter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoincareDescriptors {
    pub sd1: f64,
    pub sd2: f64,
}

pub fn rr_summary(rr: &RRSeries) -> RrSummary {
    let values = &rr.rr;
    if values.is_empty() {
        return RrSummary {
            n: 0,
            mean: 0.0,
            std: 0.0,
            min: 0.0,
            max: 0.0,
        };
    }
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    RrSummary {
        n: values.len(),
        mean: values.iter().sum::<f64>() / values.len() as f64,
        std: population_std(values),
        min,
        max,
    }
}

/// SD1/SD2 as the population spread of the pairs projected onto the
/// identity line's normal and the identity line itself.
pub fn poincare_descriptors(rr: &RRSeries) -> PoincareDescriptors {
    let (across, along): (Vec<f64>, Vec<f64>) = rr
        .pairs()
        .map(|(x, y)| ((y - x) / SQRT_2, (y + x) / SQRT_2))
        .unzip();
    PoincareDescriptors {
        sd1: population_std(&across),
        sd2: population_std(&along),
    }
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}
