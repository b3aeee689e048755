//! RR-interval artifact rejection.
//!
//! Stage 1 keeps values strictly inside `(min_rr, max_rr)`. Stage 2 scans the
//! survivors left to right against an `anchor`: the first value seeds the
//! anchor without any check, every later value within `max_diff` of the
//! anchor is accepted and becomes the new anchor, anything else is dropped
//! and leaves the anchor untouched.
//!
//! Because a rejected value never moves the anchor, a lone outlier is simply
//! skipped, but a sustained level shift larger than `max_diff` is rejected
//! value after value until something lands near the old anchor again.

use crate::{
    error::{Error, Result},
    signal::RRSeries,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Exclusive lower bound (seconds).
    pub min_rr: f64,
    /// Exclusive upper bound (seconds).
    pub max_rr: f64,
    /// Largest accepted jump from the last accepted interval (seconds).
    pub max_diff: f64,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            min_rr: 0.0,
            max_rr: 1.0,
            max_diff: 0.3,
        }
    }
}

impl CleaningConfig {
    pub fn check(&self) -> Result<()> {
        if !self.min_rr.is_finite() || !self.max_rr.is_finite() || self.min_rr < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "RR bounds must be finite and non-negative, got {}..{}",
                self.min_rr, self.max_rr
            )));
        }
        if self.min_rr >= self.max_rr {
            return Err(Error::InvalidParameter(format!(
                "min_rr {} must be below max_rr {}",
                self.min_rr, self.max_rr
            )));
        }
        if !self.max_diff.is_finite() || self.max_diff <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "max_diff must be positive, got {}",
                self.max_diff
            )));
        }
        Ok(())
    }
}

/// Outcome of offering one value to the continuity scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected,
}

/// State of the continuity scan. `Seeded` holds the unchecked first value;
/// the scan moves to `Accepting` once a later value has been accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Continuity {
    Seeded { anchor: f64 },
    Accepting { anchor: f64 },
}

impl Continuity {
    pub fn seed(value: f64) -> Self {
        Continuity::Seeded { anchor: value }
    }

    pub fn anchor(&self) -> f64 {
        match *self {
            Continuity::Seeded { anchor } | Continuity::Accepting { anchor } => anchor,
        }
    }

    /// Compare `value` with the anchor. Only an accepted value replaces it.
    pub fn offer(&mut self, value: f64, max_diff: f64) -> Verdict {
        if (value - self.anchor()).abs() <= max_diff {
            *self = Continuity::Accepting { anchor: value };
            Verdict::Accepted
        } else {
            Verdict::Rejected
        }
    }
}

/// Cleaned series plus how many values each stage let through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningReport {
    pub cleaned: RRSeries,
    pub raw_count: usize,
    /// Values surviving the range filter.
    pub range_kept: usize,
    /// Values dropped by the continuity filter.
    pub continuity_rejected: usize,
}

/// Stage 1: keep values strictly between the bounds, in order.
pub fn range_filter(rr: &[f64], min_rr: f64, max_rr: f64) -> Vec<f64> {
    rr.iter()
        .copied()
        .filter(|&v| v > min_rr && v < max_rr)
        .collect()
}

/// Stage 2: anchored continuity scan over an already range-filtered series.
pub fn continuity_filter(rr: &[f64], max_diff: f64) -> Result<Vec<f64>> {
    let (&seed, rest) = rr
        .split_first()
        .ok_or_else(|| Error::EmptyInput("no RR interval to seed the continuity scan".into()))?;
    let mut state = Continuity::seed(seed);
    let mut out = Vec::with_capacity(rr.len());
    out.push(seed);
    for &value in rest {
        if state.offer(value, max_diff) == Verdict::Accepted {
            out.push(value);
        }
    }
    Ok(out)
}

/// Run both stages over raw RR intervals.
pub fn clean_rr_intervals(raw: &RRSeries, cfg: &CleaningConfig) -> Result<CleaningReport> {
    if raw.is_empty() {
        return Err(Error::EmptyInput("no raw RR intervals to clean".into()));
    }
    let in_range = range_filter(&raw.rr, cfg.min_rr, cfg.max_rr);
    if in_range.is_empty() {
        return Err(Error::EmptyInput(format!(
            "none of {} RR intervals lies within ({}, {}) s",
            raw.len(),
            cfg.min_rr,
            cfg.max_rr
        )));
    }
    let cleaned = continuity_filter(&in_range, cfg.max_diff)?;
    Ok(CleaningReport {
        raw_count: raw.len(),
        range_kept: in_range.len(),
        continuity_rejected: in_range.len() - cleaned.len(),
        cleaned: RRSeries::new(cleaned),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(min_rr: f64, max_rr: f64, max_diff: f64) -> CleaningConfig {
        CleaningConfig {
            min_rr,
            max_rr,
            max_diff,
        }
    }

    fn clean(raw: &[f64], cfg: &CleaningConfig) -> Vec<f64> {
        clean_rr_intervals(&RRSeries::new(raw.to_vec()), cfg)
            .unwrap()
            .cleaned
            .rr
    }

    #[test]
    fn out_of_range_value_is_dropped_before_scan() {
        let raw = [0.8, 0.82, 0.79, 2.5, 0.81, 0.80];
        let out = clean(&raw, &cfg(0.0, 2.0, 0.3));
        assert_eq!(out, vec![0.8, 0.82, 0.79, 0.81, 0.80]);
    }

    #[test]
    fn isolated_outlier_does_not_move_anchor() {
        let raw = [1.0, 1.0, 1.0, 5.0, 1.05, 1.03];
        let report =
            clean_rr_intervals(&RRSeries::new(raw.to_vec()), &cfg(0.0, 10.0, 0.3)).unwrap();
        assert_eq!(report.cleaned.rr, vec![1.0, 1.0, 1.0, 1.05, 1.03]);
        assert_eq!(report.range_kept, 6);
        assert_eq!(report.continuity_rejected, 1);
    }

    #[test]
    fn sustained_shift_is_rejected_against_stale_anchor() {
        let raw = [0.6, 0.62, 1.0, 1.02, 1.01, 0.99, 0.7];
        let out = clean(&raw, &cfg(0.0, 2.0, 0.3));
        assert_eq!(out, vec![0.6, 0.62, 0.7]);
    }

    #[test]
    fn seed_is_accepted_without_validation() {
        let raw = [1.9, 0.8, 0.81, 0.79];
        let out = clean(&raw, &cfg(0.0, 2.0, 0.3));
        assert_eq!(out, vec![1.9]);
    }

    #[test]
    fn bounds_are_exclusive() {
        let out = range_filter(&[0.3, 0.5, 1.0, 1.2], 0.3, 1.2);
        assert_eq!(out, vec![0.5, 1.0]);
    }

    #[test]
    fn empty_input_is_an_error() {
        let err =
            clean_rr_intervals(&RRSeries::default(), &CleaningConfig::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyInput(_)));
        assert!(matches!(continuity_filter(&[], 0.3), Err(Error::EmptyInput(_))));
    }

    #[test]
    fn nothing_in_range_is_an_error() {
        let raw = RRSeries::new(vec![1.5, 2.0]);
        let err = clean_rr_intervals(&raw, &CleaningConfig::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyInput(_)));
    }

    #[test]
    fn state_machine_tracks_last_accepted_value() {
        let mut state = Continuity::seed(0.8);
        assert_eq!(state, Continuity::Seeded { anchor: 0.8 });
        assert_eq!(state.offer(1.5, 0.3), Verdict::Rejected);
        assert_eq!(state, Continuity::Seeded { anchor: 0.8 });
        assert_eq!(state.offer(0.9, 0.3), Verdict::Accepted);
        assert_eq!(state, Continuity::Accepting { anchor: 0.9 });
        assert_eq!(state.offer(1.15, 0.3), Verdict::Accepted);
        assert_eq!(state.anchor(), 1.15);
    }

    #[test]
    fn output_respects_bounds_and_anchor_tolerance() {
        let raw: Vec<f64> = (0..200)
            .map(|i| {
                let spike = if i % 17 == 0 { 1.1 } else { 0.0 };
                0.8 + 0.5 * (i as f64 * 0.37).sin() + spike
            })
            .collect();
        let config = cfg(0.4, 1.6, 0.25);
        let out = clean(&raw, &config);
        assert!(out.iter().all(|&v| v > config.min_rr && v < config.max_rr));
        assert!(out.windows(2).all(|w| (w[1] - w[0]).abs() <= config.max_diff));
    }

    #[test]
    fn random_series_keep_invariants() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        let config = cfg(0.3, 1.5, 0.15);
        for _ in 0..50 {
            let raw: Vec<f64> = (0..120).map(|_| rng.gen_range(0.1..2.0)).collect();
            let report = match clean_rr_intervals(&RRSeries::new(raw.clone()), &config) {
                Ok(report) => report,
                Err(Error::EmptyInput(_)) => continue,
                Err(other) => panic!("unexpected error {other}"),
            };
            let out = &report.cleaned.rr;
            assert!(out.len() <= report.range_kept && report.range_kept <= raw.len());
            assert!(out.iter().all(|&v| v > config.min_rr && v < config.max_rr));
            assert!(out.windows(2).all(|w| (w[1] - w[0]).abs() <= config.max_diff));
            let mut cursor = raw.iter();
            assert!(out.iter().all(|v| cursor.any(|r| r == v)));
        }
    }

    #[test]
    fn cleaning_is_idempotent() {
        let raw = [0.8, 0.95, 1.4, 0.82, 0.3, 0.85, 0.2, 0.9, 0.88];
        let config = cfg(0.25, 1.2, 0.2);
        let once = clean(&raw, &config);
        let twice = clean(&once, &config);
        assert_eq!(once, twice);
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(cfg(0.5, 0.5, 0.3).check().is_err());
        assert!(cfg(-0.1, 1.0, 0.3).check().is_err());
        assert!(cfg(0.0, 1.0, 0.0).check().is_err());
        assert!(CleaningConfig::default().check().is_ok());
    }
}
