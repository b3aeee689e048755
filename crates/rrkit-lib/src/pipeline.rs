//! End-to-end processing of one ECG log: load, bandpass, detect, clean, write.
//!
//! A [`Pipeline`] is built once from a validated [`PipelineConfig`] and can
//! then process any number of files. It owns no shared mutable state, so
//! independent pipelines may run on separate threads.

use crate::{
    cleaning::{clean_rr_intervals, CleaningConfig, CleaningReport},
    detectors::ecg::{detect_r_peaks, PeakCriteria, PeakDetection},
    error::{AtStage, Error, MalformedRecord, Result, Stage, StageError},
    filter::{Bandpass, BandpassConfig},
    io::{csv::RrCsvSink, text::read_ecg_log, OutputSink},
    metrics::hrv::{poincare_descriptors, rr_summary, PoincareDescriptors, RrSummary},
    signal::{RRSeries, Sample, TimeSeries},
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
};

/// Every tunable of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sampling frequency of the log (Hz).
    pub sampling_rate: f64,
    pub filter: BandpassConfig,
    pub peaks: PeakCriteria,
    pub cleaning: CleaningConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 500.0,
            filter: BandpassConfig::default(),
            peaks: PeakCriteria::default(),
            cleaning: CleaningConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.sampling_rate.is_finite() || self.sampling_rate <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "sampling_rate must be positive, got {}",
                self.sampling_rate
            )));
        }
        self.filter
            .check(self.sampling_rate)
            .map_err(into_config_error)?;
        self.peaks.check().map_err(into_config_error)?;
        self.cleaning.check().map_err(into_config_error)?;
        Ok(())
    }
}

fn into_config_error(err: Error) -> Error {
    match err {
        Error::InvalidParameter(msg) => Error::InvalidConfig(msg),
        other => other,
    }
}

/// What a finished stage produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageSummary {
    Loaded { samples: usize, skipped: usize },
    Filtered { samples: usize },
    Detected { peaks: usize, intervals: usize },
    Cleaned {
        kept: usize,
        in_range: usize,
        raw: usize,
        rr: RrSummary,
    },
    Written { artifacts: usize },
}

impl fmt::Display for StageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageSummary::Loaded { samples, skipped } => {
                write!(f, "{samples} samples loaded, {skipped} malformed lines skipped")
            }
            StageSummary::Filtered { samples } => write!(f, "{samples} samples filtered"),
            StageSummary::Detected { peaks, intervals } => {
                write!(f, "{peaks} R-peaks, {intervals} raw RR intervals")
            }
            StageSummary::Cleaned {
                kept,
                in_range,
                raw,
                rr,
            } => write!(
                f,
                "RR intervals {raw} -> {in_range} in range -> {kept} kept \
                 (mean {:.3} s, std {:.3} s, range {:.3}..{:.3} s)",
                rr.mean, rr.std, rr.min, rr.max
            ),
            StageSummary::Written { artifacts } => write!(f, "{artifacts} artifacts written"),
        }
    }
}

/// Checkpoint callbacks. Every method defaults to a no-op.
pub trait PipelineObserver: Send + Sync {
    fn run_started(&self, _input: &Path) {}
    fn stage_started(&self, _stage: Stage) {}
    fn stage_finished(&self, _stage: Stage, _summary: &StageSummary) {}
    fn records_skipped(&self, _records: &[MalformedRecord]) {}
    fn artifact_written(&self, _path: &Path) {}
    fn run_failed(&self, _error: &StageError) {}
}

/// Drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl PipelineObserver for NullObserver {}

/// Forwards checkpoints to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl PipelineObserver for LogObserver {
    fn run_started(&self, input: &Path) {
        info!("processing {}", input.display());
    }

    fn stage_started(&self, stage: Stage) {
        debug!("{stage}: started");
    }

    fn stage_finished(&self, stage: Stage, summary: &StageSummary) {
        info!("{stage}: {summary}");
    }

    fn records_skipped(&self, records: &[MalformedRecord]) {
        warn!("skipped {} malformed lines", records.len());
        for record in records.iter().take(5) {
            debug!("malformed {record}");
        }
    }

    fn artifact_written(&self, path: &Path) {
        info!("wrote {}", path.display());
    }

    fn run_failed(&self, error: &StageError) {
        warn!("{error}");
    }
}

/// Intermediate results of the in-memory stages.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub filtered: TimeSeries,
    pub detection: PeakDetection,
    pub cleaning: CleaningReport,
}

/// Outcome of one successfully processed file.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub input: PathBuf,
    pub sample_count: usize,
    pub skipped_records: usize,
    pub peak_count: usize,
    pub raw_rr_count: usize,
    pub range_kept: usize,
    pub cleaned: RRSeries,
    pub summary: RrSummary,
    pub poincare: PoincareDescriptors,
    pub artifacts: Vec<PathBuf>,
}

pub struct Pipeline {
    config: PipelineConfig,
    bandpass: Bandpass,
    sinks: Vec<Box<dyn OutputSink>>,
    observer: Box<dyn PipelineObserver>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl Pipeline {
    /// Validate `config` and design the filter. Writes `rr_intervals_<name>.csv`
    /// and logs through [`LogObserver`] unless configured otherwise.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let bandpass =
            Bandpass::butterworth(&config.filter, config.sampling_rate).map_err(into_config_error)?;
        Ok(Self {
            config,
            bandpass,
            sinks: vec![Box::new(RrCsvSink)],
            observer: Box::new(LogObserver),
        })
    }

    pub fn with_observer(mut self, observer: impl PipelineObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn with_sink(mut self, sink: impl OutputSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Replace the default sinks entirely.
    pub fn with_sinks(mut self, sinks: Vec<Box<dyn OutputSink>>) -> Self {
        self.sinks = sinks;
        self
    }

    /// Filter, detect and clean in-memory samples. Touches no files.
    pub fn run_signal(&self, samples: &[Sample]) -> std::result::Result<Analysis, StageError> {
        self.analyse(samples).inspect_err(|err| self.observer.run_failed(err))
    }

    /// Load `input`, run every stage, and commit the sink outputs to `out_dir`
    /// (created if absent). On failure no output file is left behind.
    pub fn process_file(
        &self,
        input: &Path,
        out_dir: &Path,
    ) -> std::result::Result<RunReport, StageError> {
        self.process(input, out_dir)
            .inspect_err(|err| self.observer.run_failed(err))
    }

    fn process(&self, input: &Path, out_dir: &Path) -> std::result::Result<RunReport, StageError> {
        self.observer.run_started(input);
        self.observer.stage_started(Stage::Load);
        let log = read_ecg_log(input).at(Stage::Load)?;
        if !log.skipped.is_empty() {
            self.observer.records_skipped(&log.skipped);
        }
        self.observer.stage_finished(
            Stage::Load,
            &StageSummary::Loaded {
                samples: log.samples.len(),
                skipped: log.skipped_count(),
            },
        );

        let analysis = self.analyse(&log.samples)?;

        self.observer.stage_started(Stage::Output);
        let artifacts = self.write_outputs(input, out_dir, &analysis).at(Stage::Output)?;
        for path in &artifacts {
            self.observer.artifact_written(path);
        }
        self.observer.stage_finished(
            Stage::Output,
            &StageSummary::Written {
                artifacts: artifacts.len(),
            },
        );

        let cleaned = analysis.cleaning.cleaned;
        Ok(RunReport {
            input: input.to_path_buf(),
            sample_count: log.samples.len(),
            skipped_records: log.skipped_count(),
            peak_count: analysis.detection.events.len(),
            raw_rr_count: analysis.cleaning.raw_count,
            range_kept: analysis.cleaning.range_kept,
            summary: rr_summary(&cleaned),
            poincare: poincare_descriptors(&cleaned),
            cleaned,
            artifacts,
        })
    }

    fn analyse(&self, samples: &[Sample]) -> std::result::Result<Analysis, StageError> {
        let fs = self.config.sampling_rate;

        self.observer.stage_started(Stage::Filter);
        let raw = TimeSeries::from_samples(samples, fs);
        let filtered = TimeSeries {
            fs,
            data: self.bandpass.filtfilt(&raw.data).at(Stage::Filter)?,
        };
        self.observer.stage_finished(
            Stage::Filter,
            &StageSummary::Filtered {
                samples: filtered.len(),
            },
        );

        self.observer.stage_started(Stage::Detect);
        let detection = detect_r_peaks(&filtered.data, fs, &self.config.peaks).at(Stage::Detect)?;
        if detection.rr.is_empty() {
            return Err(StageError::new(
                Stage::Detect,
                Error::InsufficientData(format!(
                    "{} R-peaks found, at least two are needed for an RR interval",
                    detection.events.len()
                )),
            ));
        }
        self.observer.stage_finished(
            Stage::Detect,
            &StageSummary::Detected {
                peaks: detection.events.len(),
                intervals: detection.rr.len(),
            },
        );

        self.observer.stage_started(Stage::Clean);
        let cleaning = clean_rr_intervals(&detection.rr, &self.config.cleaning).at(Stage::Clean)?;
        self.observer.stage_finished(
            Stage::Clean,
            &StageSummary::Cleaned {
                kept: cleaning.cleaned.len(),
                in_range: cleaning.range_kept,
                raw: cleaning.raw_count,
                rr: rr_summary(&cleaning.cleaned),
            },
        );

        Ok(Analysis {
            filtered,
            detection,
            cleaning,
        })
    }

    /// Every sink writes into a temp file inside `out_dir`; the files are
    /// renamed to their final names only after all sinks succeeded.
    fn write_outputs(&self, input: &Path, out_dir: &Path, run: &Analysis) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(out_dir)?;
        let stem = output_stem(input);

        let mut staged = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            let target = out_dir.join(sink.file_name(&stem));
            let suffix = target
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_default();
            let tmp = tempfile::Builder::new()
                .prefix(".rrkit-")
                .suffix(&suffix)
                .tempfile_in(out_dir)?;
            sink.write(run, tmp.path())?;
            publish_permissions(tmp.path())?;
            staged.push((tmp, target));
        }

        let mut written: Vec<PathBuf> = Vec::with_capacity(staged.len());
        for (tmp, target) in staged {
            if let Err(err) = tmp.persist(&target) {
                for path in &written {
                    let _ = std::fs::remove_file(path);
                }
                return Err(Error::Io(err.error));
            }
            written.push(target);
        }
        Ok(written)
    }
}

/// Temp files are created owner-only; committed outputs are world-readable.
#[cfg(unix)]
fn publish_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))?;
    Ok(())
}

#[cfg(not(unix))]
fn publish_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Base name of the input without its extension.
pub fn output_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ecg".into())
}
