use crate::{
    error::{Error, Result},
    signal::{Events, RRSeries},
};
use serde::{Deserialize, Serialize};

/// Acceptance criteria for R-peak candidates.
///
/// Height and prominence thresholds are global statistics of the whole
/// filtered signal, so detection degrades on recordings with strong
/// amplitude drift.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakCriteria {
    /// Minimum peak height as a percentile (0..=100) of all samples.
    pub height_percentile: f64,
    /// Refractory period / minimum distance between accepted peaks (seconds).
    pub refractory_s: f64,
    /// Minimum prominence as a multiple of the signal's standard deviation.
    pub prominence_factor: f64,
}

impl Default for PeakCriteria {
    fn default() -> Self {
        Self {
            height_percentile: 90.0,
            refractory_s: 0.25,
            prominence_factor: 0.8,
        }
    }
}

impl PeakCriteria {
    pub fn check(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.height_percentile) {
            return Err(Error::InvalidParameter(format!(
                "height percentile must be within 0..=100, got {}",
                self.height_percentile
            )));
        }
        if !self.refractory_s.is_finite() || self.refractory_s <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "refractory period must be positive, got {} s",
                self.refractory_s
            )));
        }
        if !self.prominence_factor.is_finite() || self.prominence_factor < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "prominence factor must be non-negative, got {}",
                self.prominence_factor
            )));
        }
        Ok(())
    }

    /// Refractory distance in whole samples (truncated, at least one).
    pub fn refractory_samples(&self, fs: f64) -> usize {
        ((self.refractory_s * fs) as usize).max(1)
    }
}

/// Peaks found in one signal together with the thresholds that selected them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakDetection {
    pub events: Events,
    pub rr: RRSeries,
    pub height_threshold: f64,
    pub prominence_threshold: f64,
    pub refractory_samples: usize,
}

/// Detect R-peaks in a filtered ECG and derive raw RR intervals.
///
/// Local maxima are visited in index order. A candidate is accepted only if
/// its height reaches the percentile threshold, it lies at least the
/// refractory distance after the previously accepted peak, and its
/// prominence reaches the standard-deviation threshold. Fewer than two
/// peaks produce an empty RR series; that is not an error.
pub fn detect_r_peaks(signal: &[f64], fs: f64, criteria: &PeakCriteria) -> Result<PeakDetection> {
    if !fs.is_finite() || fs <= 0.0 {
        return Err(Error::InvalidParameter(format!(
            "sampling rate must be positive, got {fs}"
        )));
    }
    criteria.check()?;
    let refractory = criteria.refractory_samples(fs);

    if signal.is_empty() {
        return Ok(PeakDetection {
            events: Events::default(),
            rr: RRSeries::default(),
            height_threshold: f64::NAN,
            prominence_threshold: f64::NAN,
            refractory_samples: refractory,
        });
    }

    let height_threshold = percentile(signal, criteria.height_percentile);
    let prominence_threshold = criteria.prominence_factor * std_dev(signal);

    let mut peaks: Vec<usize> = Vec::new();
    for idx in LocalMaxima::new(signal) {
        if signal[idx] < height_threshold {
            continue;
        }
        if let Some(&last) = peaks.last() {
            if idx - last < refractory {
                continue;
            }
        }
        if prominence(signal, idx) < prominence_threshold {
            continue;
        }
        peaks.push(idx);
    }

    let events = Events::from_indices(peaks);
    let rr = RRSeries::from_events(&events, fs);
    Ok(PeakDetection {
        events,
        rr,
        height_threshold,
        prominence_threshold,
        refractory_samples: refractory,
    })
}

/// Indices of strict local maxima. Flat tops report their middle sample
/// (rounded down); a plateau touching either end of the signal is not a peak.
struct LocalMaxima<'a> {
    data: &'a [f64],
    i: usize,
}

impl<'a> LocalMaxima<'a> {
    fn new(data: &'a [f64]) -> Self {
        Self { data, i: 1 }
    }
}

impl Iterator for LocalMaxima<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let x = self.data;
        let last = x.len().checked_sub(1)?;
        while self.i < last {
            let i = self.i;
            if x[i - 1] < x[i] {
                let mut ahead = i + 1;
                while ahead < last && x[ahead] == x[i] {
                    ahead += 1;
                }
                if x[ahead] < x[i] {
                    self.i = ahead;
                    return Some((i + ahead - 1) / 2);
                }
            }
            self.i += 1;
        }
        None
    }
}

/// Height of `x[peak]` above the higher of its two bounding valleys. Each
/// valley is the minimum reached before the signal rises above the peak or ends.
fn prominence(x: &[f64], peak: usize) -> f64 {
    let height = x[peak];
    let left_min = x[..=peak]
        .iter()
        .rev()
        .take_while(|&&v| v <= height)
        .fold(height, |acc, &v| acc.min(v));
    let right_min = x[peak..]
        .iter()
        .take_while(|&&v| v <= height)
        .fold(height, |acc, &v| acc.min(v));
    height - left_min.max(right_min)
}

/// Linearly interpolated percentile (`q` in 0..=100).
pub fn percentile(data: &[f64], q: f64) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = (q / 100.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Population standard deviation.
pub fn std_dev(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    (data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn impulses(len: usize, positions: &[usize]) -> Vec<f64> {
        let mut data = vec![0.0; len];
        for &p in positions {
            data[p] = 1.0;
        }
        data
    }

    #[test]
    fn recovers_evenly_spaced_impulses() {
        let fs = 500.0;
        let positions: Vec<usize> = (0..10).map(|k| 150 + k * 300).collect();
        let data = impulses(3_200, &positions);
        let detection = detect_r_peaks(&data, fs, &PeakCriteria::default()).unwrap();
        assert_eq!(detection.events.indices, positions);
        assert_eq!(detection.rr.len(), positions.len() - 1);
        assert!(detection.rr.rr.iter().all(|&rr| (rr - 0.6).abs() < 1e-12));
        assert_eq!(detection.refractory_samples, 125);
    }

    #[test]
    fn detects_regular_beats() {
        let fs = 250.0;
        let rr = [0.82, 0.78, 0.8, 0.79, 0.81, 0.77, 0.84, 0.88];
        let data = synthetic_ecg(fs, &rr);
        let detection = detect_r_peaks(&data, fs, &PeakCriteria::default()).unwrap();
        assert_eq!(detection.events.len(), rr.len() + 1);
        for (got, want) in detection.rr.rr.iter().zip(rr) {
            assert!((got - want).abs() <= 1.0 / fs + 1e-9, "{got} vs {want}");
        }
    }

    #[test]
    fn refractory_keeps_first_candidate() {
        let mut data = vec![0.0; 1_000];
        data[100] = 1.0;
        data[150] = 2.0;
        data[400] = 1.5;
        let detection = detect_r_peaks(&data, 500.0, &PeakCriteria::default()).unwrap();
        assert_eq!(detection.events.indices, vec![100, 400]);
    }

    #[test]
    fn shallow_shoulder_fails_prominence() {
        let mut data = vec![0.0; 3_000];
        for i in 0..=60 {
            data[1_500 + i] = i as f64 * 0.1;
        }
        data[1_561] = 5.9;
        for j in 0..=60 {
            data[1_562 + j] = 6.05 - j as f64 * 0.1;
        }
        let detection = detect_r_peaks(&data, 500.0, &PeakCriteria::default()).unwrap();
        assert_eq!(detection.events.indices, vec![1_562]);
    }

    #[test]
    fn plateau_reports_middle_sample() {
        let data = [0.0, 1.0, 3.0, 3.0, 3.0, 3.0, 1.0, 0.0];
        let maxima: Vec<usize> = LocalMaxima::new(&data).collect();
        assert_eq!(maxima, vec![3]);
    }

    #[test]
    fn flat_signal_has_no_intervals() {
        let data = vec![0.5; 2_000];
        let detection = detect_r_peaks(&data, 500.0, &PeakCriteria::default()).unwrap();
        assert!(detection.events.is_empty());
        assert!(detection.rr.is_empty());
    }

    #[test]
    fn percentile_interpolates() {
        let data = [4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(percentile(&data, 0.0), 1.0);
        assert_eq!(percentile(&data, 100.0), 5.0);
        assert!((percentile(&data, 90.0) - 4.6).abs() < 1e-12);
        assert!((std_dev(&data) - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn random_signals_respect_refractory_distance() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..40 {
            let fs = [100.0, 250.0, 360.0, 500.0][rng.gen_range(0..4)];
            let criteria = PeakCriteria {
                refractory_s: rng.gen_range(0.05..0.6),
                ..PeakCriteria::default()
            };
            let len = rng.gen_range(200..3_000);
            let mut signal: Vec<f64> = (0..len).map(|_| rng.gen_range(-0.2..0.2)).collect();
            for _ in 0..rng.gen_range(0..30) {
                let at = rng.gen_range(0..len);
                signal[at] += rng.gen_range(0.5..2.0);
            }

            let found = detect_r_peaks(&signal, fs, &criteria).unwrap();
            let peaks = &found.events.indices;
            assert_eq!(found.refractory_samples, criteria.refractory_samples(fs));
            assert!(peaks
                .windows(2)
                .all(|w| w[1] - w[0] >= found.refractory_samples));
            for &p in peaks {
                assert!(signal[p] >= found.height_threshold);
                assert!(prominence(&signal, p) >= found.prominence_threshold);
            }
            // A qualifying maximum is dropped only for sitting too close to the
            // peak accepted before it.
            for idx in LocalMaxima::new(&signal) {
                let qualifies = signal[idx] >= found.height_threshold
                    && prominence(&signal, idx) >= found.prominence_threshold;
                if !qualifies || peaks.contains(&idx) {
                    continue;
                }
                let previous = peaks.iter().rev().find(|&&p| p < idx);
                assert!(matches!(previous, Some(&p) if idx - p < found.refractory_samples));
            }
            assert_eq!(found.rr.len(), peaks.len().saturating_sub(1));
        }
    }

    fn synthetic_ecg(fs: f64, rr: &[f64]) -> Vec<f64> {
        let mut beats = Vec::with_capacity(rr.len() + 1);
        let mut t = 0.5;
        beats.push(t);
        for &interval in rr {
            t += interval;
            beats.push(t);
        }
        let duration = beats.last().copied().unwrap_or(1.0) + 1.0;
        let samples = (duration * fs) as usize;
        (0..samples)
            .map(|i| {
                let time = i as f64 / fs;
                let mut v = 0.05 * (2.0 * PI * time).sin();
                for &bt in &beats {
                    let width = 0.02;
                    v += 1.2 * (-0.5 * ((time - bt) / width).powi(2)).exp();
                }
                v
            })
            .collect()
    }
}
