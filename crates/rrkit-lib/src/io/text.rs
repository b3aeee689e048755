use crate::{
    error::{Error, MalformedRecord, Result},
    signal::Sample,
};
use std::path::Path;

/// Rows parsed from one ECG log, plus the lines that had to be skipped.
#[derive(Debug, Clone, Default)]
pub struct EcgLog {
    pub samples: Vec<Sample>,
    pub skipped: Vec<MalformedRecord>,
}

impl EcgLog {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn amplitudes(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.amplitude).collect()
    }
}

/// Parse an ECG log of `<timestamp>: <adc> [extra integer fields]` lines.
///
/// The first line is a header and always skipped. Blank lines are ignored;
/// any other line that does not match the format is recorded in
/// [`EcgLog::skipped`] and the scan continues.
pub fn parse_ecg_log(text: &str) -> Result<EcgLog> {
    let mut log = EcgLog::default();
    for (idx, line) in text.lines().enumerate().skip(1) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_sample(trimmed) {
            Ok(sample) => log.samples.push(sample),
            Err(reason) => log.skipped.push(MalformedRecord {
                line: idx + 1,
                reason,
            }),
        }
    }
    if log.samples.is_empty() {
        return Err(Error::EmptyInput(format!(
            "no ECG samples parsed ({} malformed lines)",
            log.skipped.len()
        )));
    }
    Ok(log)
}

/// Read and parse an ECG log from disk.
pub fn read_ecg_log(path: &Path) -> Result<EcgLog> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;
    parse_ecg_log(&text)
}

fn parse_sample(line: &str) -> std::result::Result<Sample, String> {
    let mut fields = line.split_whitespace();
    let stamp = fields.next().ok_or("missing timestamp")?;
    let stamp = stamp
        .strip_suffix(':')
        .ok_or_else(|| format!("timestamp '{stamp}' lacks trailing ':'"))?;
    let timestamp: f64 = stamp
        .parse()
        .map_err(|_| format!("timestamp '{stamp}' is not a number"))?;
    let adc = fields.next().ok_or("missing ADC value")?;
    let amplitude: i64 = adc
        .parse()
        .map_err(|_| format!("ADC value '{adc}' is not an integer"))?;
    for extra in fields {
        extra
            .parse::<i64>()
            .map_err(|_| format!("extra field '{extra}' is not an integer"))?;
    }
    Ok(Sample {
        timestamp,
        amplitude: amplitude as f64,
    })
}

/// Values of a newline-delimited numeric list, plus the lines that were not numbers.
#[derive(Debug, Clone, Default)]
pub struct F64Series {
    pub values: Vec<f64>,
    pub skipped: Vec<MalformedRecord>,
}

impl F64Series {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Parse one float per line. Blank and `#` comment lines are ignored; any
/// other non-numeric line is recorded in [`F64Series::skipped`].
pub fn parse_f64_series(text: &str) -> Result<F64Series> {
    let mut series = F64Series::default();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match trimmed.parse::<f64>() {
            Ok(value) => series.values.push(value),
            Err(_) => series.skipped.push(MalformedRecord {
                line: idx + 1,
                reason: format!("'{trimmed}' is not a number"),
            }),
        }
    }
    if series.values.is_empty() {
        return Err(Error::EmptyInput(format!(
            "no numeric values found ({} malformed lines)",
            series.skipped.len()
        )));
    }
    Ok(series)
}
