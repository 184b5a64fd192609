//! Delimited-text artifact writers

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use tracing::debug;

use super::{OutputError, OutputResult};
use crate::consolidate::ConsolidatedDataset;

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Semicolon-separated UTF-8 with a BOM, the layout spreadsheet tools in
/// comma-decimal locales open directly
pub fn write_semicolon_bom(dataset: &ConsolidatedDataset, file: &mut File) -> OutputResult<()> {
    let mut buffered = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);
    buffered.write_all(UTF8_BOM)?;
    write_rows(dataset, b';', &mut buffered)?;
    buffered.flush()?;
    Ok(())
}

/// Comma-separated, gzip-compressed
pub fn write_gzip(dataset: &ConsolidatedDataset, file: &mut File) -> OutputResult<()> {
    let buffered = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);
    let mut encoder = GzEncoder::new(buffered, Compression::default());
    write_rows(dataset, b',', &mut encoder)?;
    let mut buffered = encoder.finish()?;
    buffered.flush()?;
    Ok(())
}

fn write_rows<W: Write>(dataset: &ConsolidatedDataset, delimiter: u8, out: W) -> OutputResult<()> {
    let mut writer = ::csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(out);

    writer
        .write_record(dataset.column_names())
        .map_err(|e| OutputError::CsvError(format!("Failed to write header: {e}")))?;

    for row in &dataset.rows {
        writer
            .write_record(row.iter().map(|value| value.to_text()))
            .map_err(|e| OutputError::CsvError(format!("Failed to write row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| OutputError::CsvError(format!("Failed to flush: {e}")))?;
    debug!(rows = dataset.row_count(), "Delimited rows written");
    Ok(())
}
