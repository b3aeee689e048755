//! ECG log to cleaned RR intervals: zero-phase bandpass, R-peak detection,
//! range and continuity cleaning, and the pipeline that chains them.

pub mod cleaning;
pub mod detectors;
pub mod error;
pub mod filter;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod plot;
pub mod signal;

pub use cleaning::{clean_rr_intervals, CleaningConfig, CleaningReport};
pub use detectors::ecg::{detect_r_peaks, PeakCriteria, PeakDetection};
pub use error::{Error, Result, Stage, StageError};
pub use filter::{bandpass_filter, BandpassConfig};
pub use pipeline::{Pipeline, PipelineConfig, RunReport};
pub use signal::*;
