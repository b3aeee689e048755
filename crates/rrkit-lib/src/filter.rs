//! Zero-phase Butterworth bandpass.
//!
//! The design follows the classic analog-prototype route: Butterworth
//! lowpass poles, lowpass-to-bandpass transform, then the bilinear
//! transform with pre-warped band edges. The resulting `2 * order` poles
//! are grouped into `order` second-order sections, each carrying one zero
//! at `z = 1` and one at `z = -1`.
//!
//! Filtering runs the cascade forward, reverses, runs it again and
//! reverses back, after odd-extending both signal ends by
//! [`Bandpass::padlen`] samples and seeding every section with its
//! steady-state response to the edge value.

use crate::error::{Error, Result};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Cutoffs and order of the bandpass stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandpassConfig {
    /// Lower -3 dB edge (Hz).
    pub low_cut_hz: f64,
    /// Upper -3 dB edge (Hz).
    pub high_cut_hz: f64,
    /// Butterworth prototype order; the bandpass has twice as many poles.
    pub order: usize,
}

impl Default for BandpassConfig {
    fn default() -> Self {
        Self {
            low_cut_hz: 1.0,
            high_cut_hz: 45.0,
            order: 4,
        }
    }
}

impl BandpassConfig {
    /// Check cutoffs and order against the sampling rate.
    pub fn check(&self, fs: f64) -> Result<()> {
        if !fs.is_finite() || fs <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "sampling rate must be positive, got {fs}"
            )));
        }
        let nyquist = 0.5 * fs;
        let (low, high) = (self.low_cut_hz, self.high_cut_hz);
        if !low.is_finite() || !high.is_finite() || low <= 0.0 || high <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "cutoffs must be positive, got {low}..{high} Hz"
            )));
        }
        if low >= high {
            return Err(Error::InvalidParameter(format!(
                "low cutoff {low} Hz must be below high cutoff {high} Hz"
            )));
        }
        if high >= nyquist {
            return Err(Error::InvalidParameter(format!(
                "high cutoff {high} Hz must be below Nyquist ({nyquist} Hz)"
            )));
        }
        if self.order == 0 {
            return Err(Error::InvalidParameter("filter order must be >= 1".into()));
        }
        Ok(())
    }
}

/// Second-order section, Direct Form II Transposed.
///
/// H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    /// Denominator [a1, a2]; a0 is normalized to 1
    pub a: [f64; 2],
}

impl Biquad {
    pub fn new(b: [f64; 3], a: [f64; 2]) -> Self {
        Self { b, a }
    }

    pub fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1] + self.b[2]) / (1.0 + self.a[0] + self.a[1])
    }

    /// Internal state reached after an infinitely long unit-step input.
    fn step_state(&self) -> [f64; 2] {
        let g = self.dc_gain();
        [g - self.b[0], self.b[2] - self.a[1] * g]
    }

    /// Poles strictly inside the unit circle.
    pub fn is_stable(&self) -> bool {
        self.a[1].abs() < 1.0 && self.a[0].abs() < 1.0 + self.a[1]
    }

    fn response(&self, z_inv: Complex64) -> Complex64 {
        let num = self.b[0] + self.b[1] * z_inv + self.b[2] * z_inv * z_inv;
        let den = 1.0 + self.a[0] * z_inv + self.a[1] * z_inv * z_inv;
        num / den
    }
}

/// Butterworth bandpass as a cascade of biquads.
#[derive(Debug, Clone)]
pub struct Bandpass {
    sections: Vec<Biquad>,
    order: usize,
}

impl Bandpass {
    pub fn butterworth(cfg: &BandpassConfig, fs: f64) -> Result<Self> {
        cfg.check(fs)?;
        let nyquist = 0.5 * fs;
        let order = cfg.order;

        // Bilinear transform is done at an internal rate of 2 (normalized frequency).
        let fs2 = 4.0;
        let wl = prewarp(cfg.low_cut_hz / nyquist);
        let wh = prewarp(cfg.high_cut_hz / nyquist);
        let bw = wh - wl;
        let w0_sq = wl * wh;

        let mut analog = Vec::with_capacity(2 * order);
        for p in butterworth_poles(order) {
            let p_lp = p * (bw / 2.0);
            let root = (p_lp * p_lp - w0_sq).sqrt();
            analog.push(p_lp + root);
            analog.push(p_lp - root);
        }

        // All `order` analog zeros sit at s = 0 and map to z = 1; the rest go to z = -1.
        let denom: Complex64 = analog.iter().map(|&p| fs2 - p).product();
        let gain = ((bw * fs2).powi(order as i32) / denom).re;
        if !gain.is_finite() || gain <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "degenerate bandpass gain {gain}"
            )));
        }
        let digital: Vec<Complex64> = analog.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();

        let sections = pair_sections(&digital, gain.powf(1.0 / order as f64));
        if sections.len() != order || sections.iter().any(|s| !s.is_stable()) {
            return Err(Error::InvalidParameter(format!(
                "unstable bandpass design for {}..{} Hz at {fs} Hz",
                cfg.low_cut_hz, cfg.high_cut_hz
            )));
        }
        Ok(Self { sections, order })
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Edge padding used on each side by [`Bandpass::filtfilt`]: three times the
    /// length of the transfer-function coefficient vectors.
    pub fn padlen(&self) -> usize {
        3 * (2 * self.order + 1)
    }

    /// Forward-backward filtering. The output has the input's length and no phase delay.
    pub fn filtfilt(&self, data: &[f64]) -> Result<Vec<f64>> {
        let padlen = self.padlen();
        if data.len() <= padlen {
            return Err(Error::InsufficientData(format!(
                "signal has {} samples, zero-phase filtering needs more than {padlen}",
                data.len()
            )));
        }
        let zi = self.step_states();

        let extended = odd_extend(data, padlen);
        let mut forward = self.run(&extended, &zi, extended[0]);
        forward.reverse();
        let first = forward[0];
        let mut backward = self.run(&forward, &zi, first);
        backward.reverse();

        Ok(backward[padlen..padlen + data.len()].to_vec())
    }

    /// Complex response at `freq_hz`.
    pub fn frequency_response(&self, freq_hz: f64, fs: f64) -> Complex64 {
        let w = 2.0 * PI * freq_hz / fs;
        let z_inv = Complex64::from_polar(1.0, -w);
        self.sections
            .iter()
            .map(|s| s.response(z_inv))
            .product()
    }

    fn step_states(&self) -> Vec<[f64; 2]> {
        let mut scale = 1.0;
        self.sections
            .iter()
            .map(|s| {
                let [z1, z2] = s.step_state();
                let zi = [z1 * scale, z2 * scale];
                scale *= s.dc_gain();
                zi
            })
            .collect()
    }

    fn run(&self, data: &[f64], zi: &[[f64; 2]], x0: f64) -> Vec<f64> {
        let mut state: Vec<[f64; 2]> = zi.iter().map(|z| [z[0] * x0, z[1] * x0]).collect();
        let mut out = Vec::with_capacity(data.len());
        for &x in data {
            let mut v = x;
            for (s, st) in self.sections.iter().zip(state.iter_mut()) {
                let y = s.b[0] * v + st[0];
                st[0] = s.b[1] * v - s.a[0] * y + st[1];
                st[1] = s.b[2] * v - s.a[1] * y;
                v = y;
            }
            out.push(v);
        }
        out
    }
}

/// Design the bandpass and apply it forward and backward over `data`.
pub fn bandpass_filter(data: &[f64], fs: f64, cfg: &BandpassConfig) -> Result<Vec<f64>> {
    Bandpass::butterworth(cfg, fs)?.filtfilt(data)
}

fn prewarp(normalized: f64) -> f64 {
    4.0 * (PI * normalized / 2.0).tan()
}

/// Left-half-plane poles of the unit-cutoff Butterworth prototype.
fn butterworth_poles(order: usize) -> Vec<Complex64> {
    let n = order as f64;
    (0..order)
        .map(|k| {
            let m = 2.0 * k as f64 - n + 1.0;
            -Complex64::from_polar(1.0, PI * m / (2.0 * n))
        })
        .collect()
}

/// Group conjugate pole pairs (and leftover real poles two at a time) into sections.
fn pair_sections(poles: &[Complex64], gain: f64) -> Vec<Biquad> {
    const IMAG_TOL: f64 = 1e-12;
    let numerator = [gain, 0.0, -gain];
    let mut sections = Vec::with_capacity(poles.len() / 2);

    for p in poles.iter().filter(|p| p.im > IMAG_TOL) {
        sections.push(Biquad::new(numerator, [-2.0 * p.re, p.norm_sqr()]));
    }

    let mut reals: Vec<f64> = poles
        .iter()
        .filter(|p| p.im.abs() <= IMAG_TOL)
        .map(|p| p.re)
        .collect();
    reals.sort_by(f64::total_cmp);
    for pair in reals.chunks(2) {
        if let [r1, r2] = pair {
            sections.push(Biquad::new(numerator, [-(r1 + r2), r1 * r2]));
        }
    }
    sections
}

fn odd_extend(data: &[f64], padlen: usize) -> Vec<f64> {
    let n = data.len();
    let first = data[0];
    let last = data[n - 1];
    let mut out = Vec::with_capacity(n + 2 * padlen);
    out.extend((1..=padlen).rev().map(|i| 2.0 * first - data[i]));
    out.extend_from_slice(data);
    out.extend((1..=padlen).map(|i| 2.0 * last - data[n - 1 - i]));
    out
}
