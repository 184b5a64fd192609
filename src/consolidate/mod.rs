//! Consolidation of staged report files into one dataset per module
//!
//! The first readable file fixes the reference schema (column names and
//! order). Later files with a different header are excluded and reported as
//! [`ConsolidationWarning::SchemaMismatch`]; unreadable files are excluded
//! and reported as [`ConsolidationWarning::Unreadable`]. Rows keep file order,
//! then row order. Column types are inferred once all rows are collected.

pub mod dataset;
pub mod reader;

pub use dataset::{
    Column, ColumnType, ConsolidatedDataset, ConsolidationWarning, SourceFile, Value,
};
pub use reader::{read_table, CsvFormat, RawTable, ReadError};

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;
use tracing::{info, info_span, warn};

use crate::identifier::Module;
use crate::metrics;

/// Keep only rows whose `column` starts with `prefix`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    /// Header of the column to test
    pub column: String,
    /// Required prefix
    pub prefix: String,
}

impl FromStr for RowFilter {
    type Err = String;

    /// Parse `COLUMN=PREFIX`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((column, prefix)) if !column.trim().is_empty() => Ok(Self {
                column: column.trim().to_string(),
                prefix: prefix.to_string(),
            }),
            _ => Err(format!("expected COLUMN=PREFIX, got '{s}'")),
        }
    }
}

/// Consolidation settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidateOptions {
    /// Delimited-text layout
    pub csv: CsvFormat,
    /// Optional row filter applied per file
    pub row_filter: Option<RowFilter>,
    /// When set, append a column with this name holding each row's file name
    pub source_column: Option<String>,
}

/// Fatal consolidation errors for one module
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsolidationError {
    /// Not a single file could be read
    #[error("no readable files for {module} ({attempted} attempted)")]
    NoReadableFiles {
        /// Module being consolidated
        module: Module,
        /// Files tried
        attempted: usize,
    },

    /// The row filter names a column the reference schema lacks
    #[error("filter column '{column}' not found in {module} header")]
    UnknownFilterColumn {
        /// Module being consolidated
        module: Module,
        /// Missing column
        column: String,
    },

    /// The module's staging directory could not be listed
    #[error("cannot list staged files for {module}: {reason}")]
    Staging {
        /// Module being consolidated
        module: Module,
        /// Underlying error text
        reason: String,
    },

    /// Processing stopped unexpectedly
    #[error("processing of {module} stopped: {reason}")]
    Interrupted {
        /// Module being consolidated
        module: Module,
        /// What happened
        reason: String,
    },
}

/// Merges staged files of one module
#[derive(Debug, Clone, Default)]
pub struct Consolidator {
    options: ConsolidateOptions,
}

impl Consolidator {
    /// Consolidator with the given options
    pub fn new(options: ConsolidateOptions) -> Self {
        Self { options }
    }

    /// Active options
    pub fn options(&self) -> &ConsolidateOptions {
        &self.options
    }

    /// Merge `files` in order into one typed dataset
    pub fn consolidate(
        &self,
        module: &Module,
        files: &[PathBuf],
    ) -> Result<ConsolidatedDataset, ConsolidationError> {
        let _span = info_span!("consolidate", module = %module, files = files.len()).entered();
        let started = Instant::now();

        let mut reference: Option<Vec<String>> = None;
        let mut filter_index: Option<usize> = None;
        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut sources = Vec::new();
        let mut warnings = Vec::new();

        for path in files {
            let table = match read_table(path, &self.options.csv) {
                Ok(table) => table,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Excluding unreadable file");
                    warnings.push(ConsolidationWarning::Unreadable {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match &reference {
                None => {
                    if let Some(filter) = &self.options.row_filter {
                        filter_index = Some(
                            table
                                .headers
                                .iter()
                                .position(|h| *h == filter.column)
                                .ok_or_else(|| ConsolidationError::UnknownFilterColumn {
                                    module: module.clone(),
                                    column: filter.column.clone(),
                                })?,
                        );
                    }
                    reference = Some(table.headers.clone());
                }
                Some(expected) if *expected != table.headers => {
                    warn!(
                        path = %path.display(),
                        expected = expected.len(),
                        found = table.headers.len(),
                        "Excluding file with mismatched schema"
                    );
                    warnings.push(ConsolidationWarning::SchemaMismatch {
                        path: path.clone(),
                        expected: expected.clone(),
                        found: table.headers,
                    });
                    continue;
                }
                Some(_) => {}
            }

            let before = rows.len();
            self.append_rows(path, table.rows, filter_index, &mut rows);
            sources.push(SourceFile {
                path: path.clone(),
                rows: rows.len() - before,
                malformed_rows: table.malformed_rows,
            });
        }

        let Some(mut headers) = reference else {
            return Err(ConsolidationError::NoReadableFiles {
                module: module.clone(),
                attempted: files.len(),
            });
        };
        if let Some(name) = &self.options.source_column {
            headers.push(name.clone());
        }

        let mut dataset = ConsolidatedDataset::from_text_rows(module.clone(), headers, rows);
        dataset.sources = sources;
        dataset.warnings = warnings;

        metrics::record_consolidation(module.as_str(), dataset.row_count());
        info!(
            rows = dataset.row_count(),
            columns = dataset.column_count(),
            included = dataset.sources.len(),
            excluded = dataset.warnings.len(),
            malformed = dataset.malformed_rows(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Consolidation complete"
        );
        Ok(dataset)
    }

    fn append_rows(
        &self,
        path: &Path,
        table_rows: Vec<Vec<String>>,
        filter_index: Option<usize>,
        rows: &mut Vec<Vec<String>>,
    ) {
        let prefix = self.options.row_filter.as_ref().map(|f| f.prefix.as_str());
        let source_name = self.options.source_column.as_ref().map(|_| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        for mut row in table_rows {
            if let (Some(index), Some(prefix)) = (filter_index, prefix) {
                if !row.get(index).is_some_and(|cell| cell.trim().starts_with(prefix)) {
                    continue;
                }
            }
            if let Some(name) = &source_name {
                row.push(name.clone());
            }
            rows.push(row);
        }
    }
}
