pub mod csv;
pub mod text;

use crate::{error::Result, pipeline::Analysis};
use std::path::Path;

/// Destination for the results of one run. The pipeline picks the directory,
/// the sink picks the file name and writes the content.
pub trait OutputSink: Send + Sync {
    /// File name for an input whose base name is `stem`.
    fn file_name(&self, stem: &str) -> String;

    /// Write the run's outputs to `path`. The path is a temporary file that is
    /// renamed to [`OutputSink::file_name`] only once every sink succeeded.
    fn write(&self, run: &Analysis, path: &Path) -> Result<()>;
}
