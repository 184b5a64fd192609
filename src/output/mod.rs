//! Artifact writers for consolidated datasets
//!
//! Every artifact is written to a temp file in its final directory and
//! renamed over the previous artifact, so readers never observe a partial
//! file. A failure in one format never affects the others.

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn};

use crate::consolidate::ConsolidatedDataset;
use crate::identifier::Module;
use crate::metrics;

pub mod binary;
pub mod columnar;
pub mod csv;
pub mod path;
pub mod spreadsheet;

pub use binary::load_binary;
pub use path::{discover_report_files, is_staged_report, StagingLayout};

/// Default rows per batch for columnar and binary writers
pub const DEFAULT_BATCH_SIZE: usize = 65_536;

/// Writer-level errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Arrow, Parquet, or IPC encoding error
    #[error("columnar encoding error: {0}")]
    ColumnarError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Spreadsheet encoding error
    #[error("spreadsheet error: {0}")]
    SpreadsheetError(String),

    /// Dataset exceeds a hard limit of the format
    #[error("{0}")]
    LimitExceeded(String),
}

impl From<std::io::Error> for OutputError {
    fn from(e: std::io::Error) -> Self {
        OutputError::IoError(e.to_string())
    }
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Target encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactFormat {
    /// Styled xlsx workbook
    SpreadsheetStyled,
    /// Parquet with snappy compression
    Columnar,
    /// Arrow IPC file (Feather v2)
    ColumnarIpc,
    /// bincode records inside a gzip stream
    CompactBinary,
    /// Semicolon-separated UTF-8 CSV with BOM
    DelimitedText,
    /// Comma-separated CSV, gzip-compressed
    DelimitedTextGzip,
}

impl ArtifactFormat {
    /// Every format, in output order
    pub const ALL: [ArtifactFormat; 6] = [
        ArtifactFormat::SpreadsheetStyled,
        ArtifactFormat::Columnar,
        ArtifactFormat::ColumnarIpc,
        ArtifactFormat::CompactBinary,
        ArtifactFormat::DelimitedText,
        ArtifactFormat::DelimitedTextGzip,
    ];

    /// Canonical name used on the command line and in metrics
    pub fn name(&self) -> &'static str {
        match self {
            ArtifactFormat::SpreadsheetStyled => "xlsx",
            ArtifactFormat::Columnar => "parquet",
            ArtifactFormat::ColumnarIpc => "feather",
            ArtifactFormat::CompactBinary => "binary",
            ArtifactFormat::DelimitedText => "csv",
            ArtifactFormat::DelimitedTextGzip => "csv-gzip",
        }
    }

    /// File extension, without the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::SpreadsheetStyled => "xlsx",
            ArtifactFormat::Columnar => "parquet",
            ArtifactFormat::ColumnarIpc => "feather",
            ArtifactFormat::CompactBinary => "bin.gz",
            ArtifactFormat::DelimitedText => "csv",
            ArtifactFormat::DelimitedTextGzip => "csv.gz",
        }
    }

    /// Parse a comma-separated list, keeping unknown names as errors
    pub fn parse_list(list: &str) -> Vec<Result<ArtifactFormat, OptimizationError>> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArtifactFormat {
    type Err = OptimizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xlsx" | "excel" | "spreadsheet" => Ok(ArtifactFormat::SpreadsheetStyled),
            "parquet" | "columnar" => Ok(ArtifactFormat::Columnar),
            "feather" | "ipc" | "arrow" => Ok(ArtifactFormat::ColumnarIpc),
            "binary" | "bincode" | "bin" => Ok(ArtifactFormat::CompactBinary),
            "csv" | "delimited" => Ok(ArtifactFormat::DelimitedText),
            "csv-gzip" | "csv.gz" | "gzip" => Ok(ArtifactFormat::DelimitedTextGzip),
            other => Err(OptimizationError::UnsupportedFormat {
                format: other.to_string(),
                reason: "unknown format name".to_string(),
            }),
        }
    }
}

/// Failure to produce one artifact
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptimizationError {
    /// Unknown format, or the dataset exceeds one of its hard limits
    #[error("unsupported format {format}: {reason}")]
    UnsupportedFormat {
        /// Requested format name
        format: String,
        /// Why it cannot be produced
        reason: String,
    },

    /// Encoding or filesystem failure while writing
    #[error("failed to write {format}: {cause}")]
    WriteFailure {
        /// Format being written
        format: String,
        /// Underlying error text
        cause: String,
    },
}

/// A written artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizedArtifact {
    /// Encoding
    pub format: ArtifactFormat,
    /// Final location
    pub path: PathBuf,
    /// Source module
    pub module: Module,
    /// Rows encoded
    pub rows: usize,
    /// Size on disk
    pub bytes: u64,
    /// Time spent encoding and writing
    pub duration: Duration,
}

/// Result of one requested format
pub type ArtifactResult = Result<OptimizedArtifact, OptimizationError>;

/// Writes datasets into `<output_root>/<MODULE>/<module>_consolidated.<ext>`
#[derive(Debug, Clone)]
pub struct Optimizer {
    layout: StagingLayout,
    batch_size: usize,
}

impl Optimizer {
    /// Optimizer writing under `layout`'s output root
    pub fn new(layout: StagingLayout) -> Self {
        Self {
            layout,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Rows per batch (at least one)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Configured batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Write `dataset` in every format, one result per format in request order
    pub fn optimize(
        &self,
        dataset: &ConsolidatedDataset,
        formats: &[ArtifactFormat],
    ) -> Vec<ArtifactResult> {
        let _span = info_span!(
            "optimize",
            module = %dataset.module,
            rows = dataset.row_count(),
            formats = formats.len()
        )
        .entered();

        formats
            .iter()
            .map(|format| self.optimize_one(dataset, *format))
            .collect()
    }

    /// Like [`optimize`](Self::optimize) but takes format names
    ///
    /// Unknown names produce [`OptimizationError::UnsupportedFormat`] in
    /// their slot instead of failing the whole call.
    pub fn optimize_named(
        &self,
        dataset: &ConsolidatedDataset,
        names: &[String],
    ) -> Vec<ArtifactResult> {
        names
            .iter()
            .map(|name| {
                name.parse::<ArtifactFormat>()
                    .and_then(|format| self.optimize_one(dataset, format))
            })
            .collect()
    }

    fn optimize_one(&self, dataset: &ConsolidatedDataset, format: ArtifactFormat) -> ArtifactResult {
        if let Err(reason) = check_limits(dataset, format) {
            warn!(format = %format, reason = %reason, "Dataset exceeds format limits");
            return Err(OptimizationError::UnsupportedFormat {
                format: format.name().to_string(),
                reason,
            });
        }

        let started = Instant::now();
        let path = self.layout.artifact_path(&dataset.module, format);
        let batch_size = self.batch_size;

        let written = write_atomically(&path, |file| match format {
            ArtifactFormat::SpreadsheetStyled => spreadsheet::write_xlsx(dataset, file),
            ArtifactFormat::Columnar => columnar::write_parquet(dataset, batch_size, file),
            ArtifactFormat::ColumnarIpc => columnar::write_ipc(dataset, batch_size, file),
            ArtifactFormat::CompactBinary => binary::write_binary(dataset, batch_size, file),
            ArtifactFormat::DelimitedText => csv::write_semicolon_bom(dataset, file),
            ArtifactFormat::DelimitedTextGzip => csv::write_gzip(dataset, file),
        });

        match written {
            Ok(bytes) => {
                let artifact = OptimizedArtifact {
                    format,
                    path,
                    module: dataset.module.clone(),
                    rows: dataset.row_count(),
                    bytes,
                    duration: started.elapsed(),
                };
                metrics::record_artifact(dataset.module.as_str(), format.name(), bytes);
                info!(
                    format = %format,
                    path = %artifact.path.display(),
                    bytes,
                    duration_ms = artifact.duration.as_millis() as u64,
                    "Artifact written"
                );
                Ok(artifact)
            }
            Err(OutputError::LimitExceeded(reason)) => Err(OptimizationError::UnsupportedFormat {
                format: format.name().to_string(),
                reason,
            }),
            Err(e) => {
                warn!(format = %format, error = %e, "Artifact write failed");
                Err(OptimizationError::WriteFailure {
                    format: format.name().to_string(),
                    cause: e.to_string(),
                })
            }
        }
    }
}

fn check_limits(dataset: &ConsolidatedDataset, format: ArtifactFormat) -> Result<(), String> {
    match format {
        ArtifactFormat::SpreadsheetStyled => spreadsheet::check_limits(dataset),
        _ => Ok(()),
    }
}

/// Write via `write` into a temp file beside `path`, then rename it into place
///
/// Returns the final size. On any error the temp file is removed and the
/// previous artifact, if any, is left untouched.
pub fn write_atomically<F>(path: &Path, write: F) -> OutputResult<u64>
where
    F: FnOnce(&mut File) -> OutputResult<()>,
{
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)
        .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| OutputError::IoError(format!("Failed to create temp file: {e}")))?;

    write(temp.as_file_mut())?;

    temp.as_file_mut().flush()?;
    temp.as_file().sync_all()?;
    let bytes = temp.as_file().metadata()?.len();
    temp.persist(path)
        .map_err(|e| OutputError::IoError(format!("Failed to persist artifact: {}", e.error)))?;
    Ok(bytes)
}
