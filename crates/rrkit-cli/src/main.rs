mod render;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use rrkit_lib::{
    cleaning::{clean_rr_intervals, CleaningConfig, CleaningReport},
    detectors::ecg::{detect_r_peaks, PeakDetection},
    filter::bandpass_filter,
    io::{
        csv::{PoincarePairsCsvSink, RrCsvSink},
        text as text_io, OutputSink,
    },
    pipeline::{Pipeline, PipelineConfig},
    signal::RRSeries,
};
use serde::Serialize;
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
    process::ExitCode,
};

#[derive(Parser)]
#[command(
    name = "rrkit",
    version,
    about = "rrkit: ECG logs to cleaned RR intervals"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the sampling rate and bandpass design.
#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Sampling frequency (Hz)
    #[arg(long)]
    fs: Option<f64>,
    /// Lower bandpass edge (Hz)
    #[arg(long)]
    lowcut: Option<f64>,
    /// Upper bandpass edge (Hz)
    #[arg(long)]
    highcut: Option<f64>,
    /// Butterworth order
    #[arg(long)]
    order: Option<usize>,
}

impl FilterArgs {
    fn apply(&self, cfg: &mut PipelineConfig) {
        if let Some(fs) = self.fs {
            cfg.sampling_rate = fs;
        }
        if let Some(low) = self.lowcut {
            cfg.filter.low_cut_hz = low;
        }
        if let Some(high) = self.highcut {
            cfg.filter.high_cut_hz = high;
        }
        if let Some(order) = self.order {
            cfg.filter.order = order;
        }
    }
}

/// Overrides for the RR cleaning thresholds (seconds).
#[derive(Args, Debug, Default)]
struct CleanArgs {
    #[arg(long)]
    min_rr: Option<f64>,
    #[arg(long)]
    max_rr: Option<f64>,
    #[arg(long)]
    max_diff: Option<f64>,
}

impl CleanArgs {
    fn apply(&self, cfg: &mut CleaningConfig) {
        if let Some(min_rr) = self.min_rr {
            cfg.min_rr = min_rr;
        }
        if let Some(max_rr) = self.max_rr {
            cfg.max_rr = max_rr;
        }
        if let Some(max_diff) = self.max_diff {
            cfg.max_diff = max_diff;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run load → bandpass → R-peaks → cleaning → outputs for each ECG log
    Process {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
        /// TOML file with pipeline settings; flags take precedence
        #[arg(long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        cleaning: CleanArgs,
        /// Also write (RR[n], RR[n+1]) pairs as CSV
        #[arg(long)]
        pairs_csv: bool,
        /// Skip the Poincaré PNG
        #[arg(long)]
        no_plot: bool,
        /// Also render the filtered ECG with detected R-peaks
        #[arg(long)]
        plot_ecg: bool,
    },
    /// Clean newline-delimited RR intervals (seconds) from stdin or --input file
    CleanRr {
        #[arg(long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        cleaning: CleanArgs,
    },
    /// Bandpass an ECG log from stdin or --input file and report R-peaks
    Detect {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        filter: FilterArgs,
    },
}

fn main() -> Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Process {
            inputs,
            out_dir,
            config,
            filter,
            cleaning,
            pairs_csv,
            no_plot,
            plot_ecg,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            filter.apply(&mut cfg);
            cleaning.apply(&mut cfg.cleaning);
            let outputs = Outputs {
                pairs_csv,
                poincare_png: !no_plot,
                ecg_png: plot_ecg,
            };
            cmd_process(cfg, &inputs, &out_dir, outputs)
        }
        Commands::CleanRr { input, cleaning } => {
            let mut cfg = CleaningConfig::default();
            cleaning.apply(&mut cfg);
            cmd_clean_rr(input.as_deref(), &cfg)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Detect {
            input,
            config,
            filter,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            filter.apply(&mut cfg);
            cmd_detect(input.as_deref(), &cfg)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Outputs {
    pairs_csv: bool,
    poincare_png: bool,
    ecg_png: bool,
}

impl Outputs {
    fn sinks(&self) -> Vec<Box<dyn OutputSink>> {
        let mut sinks: Vec<Box<dyn OutputSink>> = vec![Box::new(RrCsvSink)];
        if self.pairs_csv {
            sinks.push(Box::new(PoincarePairsCsvSink));
        }
        if self.poincare_png {
            sinks.push(Box::new(render::PoincarePngSink));
        }
        if self.ecg_png {
            sinks.push(Box::new(render::EcgPngSink));
        }
        sinks
    }
}

fn cmd_process(
    cfg: PipelineConfig,
    inputs: &[PathBuf],
    out_dir: &Path,
    outputs: Outputs,
) -> Result<ExitCode> {
    let pipeline = Pipeline::new(cfg)
        .context("invalid pipeline configuration")?
        .with_sinks(outputs.sinks());

    let mut failed = 0usize;
    for input in inputs {
        match pipeline.process_file(input, out_dir) {
            Ok(report) => println!("{}", serde_json::to_string(&report)?),
            Err(err) => {
                error!("{}: {err}", input.display());
                failed += 1;
            }
        }
    }

    if failed > 0 {
        error!("{failed} of {} inputs failed", inputs.len());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
struct CleanRrReport<'a> {
    skipped_records: usize,
    #[serde(flatten)]
    cleaning: &'a CleaningReport,
}

fn cmd_clean_rr(input: Option<&Path>, cfg: &CleaningConfig) -> Result<()> {
    cfg.check().context("invalid cleaning thresholds")?;
    let series = text_io::parse_f64_series(&read_input(input)?)?;
    for record in &series.skipped {
        warn!("skipped {record}");
    }
    let skipped_records = series.skipped_count();
    let cleaning = clean_rr_intervals(&RRSeries::new(series.values), cfg)?;
    let report = CleanRrReport {
        skipped_records,
        cleaning: &cleaning,
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

#[derive(Serialize)]
struct DetectReport<'a> {
    sample_count: usize,
    skipped_records: usize,
    #[serde(flatten)]
    detection: &'a PeakDetection,
}

fn cmd_detect(input: Option<&Path>, cfg: &PipelineConfig) -> Result<()> {
    cfg.validate()?;
    let log = text_io::parse_ecg_log(&read_input(input)?)?;
    let filtered = bandpass_filter(&log.amplitudes(), cfg.sampling_rate, &cfg.filter)?;
    let detection = detect_r_peaks(&filtered, cfg.sampling_rate, &cfg.peaks)?;
    info!(
        "{} R-peaks in {} samples",
        detection.events.len(),
        log.samples.len()
    );
    let report = DetectReport {
        sample_count: log.samples.len(),
        skipped_records: log.skipped_count(),
        detection: &detection,
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
