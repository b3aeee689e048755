use super::OutputSink;
use crate::{error::Result, pipeline::Analysis, signal::RRSeries};
use csv::WriterBuilder;
use std::path::Path;

/// One `RR_interval_s` column, one row per interval.
pub fn write_rr_csv(series: &RRSeries, path: &Path) -> Result<()> {
    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record(["RR_interval_s"])?;
    for value in &series.rr {
        writer.write_record([value.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Adjacent `RR(n),RR(n+1)` pairs with six decimals, the data behind a Poincaré plot.
pub fn write_pairs_csv(series: &RRSeries, path: &Path) -> Result<()> {
    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record(["RR(n)", "RR(n+1)"])?;
    for (current, next) in series.pairs() {
        writer.write_record([format!("{current:.6}"), format!("{next:.6}")])?;
    }
    writer.flush()?;
    Ok(())
}

/// Cleaned intervals as `rr_intervals_<stem>.csv`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RrCsvSink;

impl OutputSink for RrCsvSink {
    fn file_name(&self, stem: &str) -> String {
        format!("rr_intervals_{stem}.csv")
    }

    fn write(&self, run: &Analysis, path: &Path) -> Result<()> {
        write_rr_csv(&run.cleaning.cleaned, path)
    }
}

/// Cleaned adjacent pairs as `rr_pairs_<stem>.csv`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoincarePairsCsvSink;

impl OutputSink for PoincarePairsCsvSink {
    fn file_name(&self, stem: &str) -> String {
        format!("rr_pairs_{stem}.csv")
    }

    fn write(&self, run: &Analysis, path: &Path) -> Result<()> {
        write_pairs_csv(&run.cleaning.cleaned, path)
    }
}
