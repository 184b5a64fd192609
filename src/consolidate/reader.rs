//! Raw table readers for staged report files
//!
//! CSV exports from the report server carry a few preamble lines before the
//! header, may start with a UTF-8 BOM, and are not always valid UTF-8. Excel
//! workbooks are read from their first sheet.

use calamine::{open_workbook_auto, Data, DataType, Reader};
use std::path::Path;
use tracing::debug;

/// Header plus string cells of one file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTable {
    /// Trimmed header cells
    pub headers: Vec<String>,
    /// Data rows, each exactly `headers.len()` cells
    pub rows: Vec<Vec<String>>,
    /// Rows dropped because their field count differed from the header
    pub malformed_rows: usize,
}

/// How to read a delimited file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvFormat {
    /// Lines to discard before the header
    pub skip_rows: usize,
    /// Field delimiter
    pub delimiter: u8,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            skip_rows: 3,
            delimiter: b',',
        }
    }
}

/// Reader failures; the file is excluded from consolidation
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// File could not be opened or read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Workbook could not be opened or has no sheets
    #[error("workbook error: {0}")]
    Workbook(String),

    /// Nothing left after the preamble
    #[error("no header row")]
    NoHeader,
}

/// Whether `path` names a spreadsheet rather than delimited text
pub fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            matches!(
                e.to_ascii_lowercase().as_str(),
                "xlsx" | "xlsm" | "xlsb" | "xls" | "ods"
            )
        })
        .unwrap_or(false)
}

/// Read a staged file, choosing the reader by extension
pub fn read_table(path: &Path, format: &CsvFormat) -> Result<RawTable, ReadError> {
    if is_workbook(path) {
        read_workbook(path)
    } else {
        let bytes = std::fs::read(path)?;
        read_csv_bytes(&bytes, format)
    }
}

/// Decode bytes as UTF-8 (BOM stripped), falling back to Latin-1
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Parse delimited text held in memory
pub fn read_csv_bytes(bytes: &[u8], format: &CsvFormat) -> Result<RawTable, ReadError> {
    let text = decode_text(bytes);
    let body = skip_lines(&text, format.skip_rows);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(format.delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(ReadError::NoHeader);
    }

    let mut table = RawTable {
        headers,
        ..RawTable::default()
    };
    for record in reader.records() {
        match record {
            Ok(record) if record.len() == table.headers.len() => {
                table.rows.push(record.iter().map(str::to_string).collect());
            }
            Ok(record) if record.iter().all(|f| f.trim().is_empty()) => {}
            Ok(_) | Err(_) => table.malformed_rows += 1,
        }
    }

    if table.malformed_rows > 0 {
        debug!(malformed = table.malformed_rows, "Dropped malformed rows");
    }
    Ok(table)
}

fn skip_lines(text: &str, count: usize) -> &str {
    let mut rest = text;
    for _ in 0..count {
        match rest.find('\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return "",
        }
    }
    rest
}

/// Read the first sheet of a workbook; the first row is the header
pub fn read_workbook(path: &Path) -> Result<RawTable, ReadError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| ReadError::Workbook(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ReadError::Workbook("workbook has no sheets".to_string()))?
        .map_err(|e| ReadError::Workbook(e.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or(ReadError::NoHeader)?
        .iter()
        .map(|cell| cell_text(cell).trim().to_string())
        .collect();

    let mut table = RawTable {
        headers,
        ..RawTable::default()
    };
    for row in rows {
        let cells: Vec<String> = row.iter().map(cell_text).collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        table.rows.push(cells);
    }
    Ok(table)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(v) => v.to_string(),
        Data::Float(v) if v.fract() == 0.0 && v.abs() < 1e15 => (*v as i64).to_string(),
        Data::Float(v) => v.to_string(),
        Data::Bool(v) => v.to_string(),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
    }
}
