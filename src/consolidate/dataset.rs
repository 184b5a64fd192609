//! Typed, in-memory consolidated dataset

use bincode::{Decode, Encode};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::identifier::Module;

/// Date and datetime layouts recognized in report cells, most specific first
pub const DATE_FORMATS: &[&str] = &["%d/%m/%Y %H:%M", "%Y-%m-%d %H:%M:%S"];

/// Date-only layouts, read as midnight
pub const DAY_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d"];

/// Logical column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// 64-bit signed integer
    Integer,
    /// 64-bit float
    Float,
    /// true/false
    Boolean,
    /// Naive timestamp, millisecond precision
    DateTime,
    /// Anything else
    Text,
}

impl ColumnType {
    /// Narrowest type every non-empty cell parses as
    ///
    /// Integer cells also satisfy Float, so a mix of both is Float. A numeric
    /// type is only chosen when every cell renders back to its original text.
    /// Columns with no non-empty cells are Text.
    pub fn infer<'a>(cells: impl IntoIterator<Item = &'a str>) -> Self {
        let mut integer = true;
        let mut float = true;
        let mut boolean = true;
        let mut datetime = true;
        let mut seen = false;

        for cell in cells {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            seen = true;
            if integer && parse_integer(cell).is_none() {
                integer = false;
            }
            if float && parse_float(cell).is_none() {
                float = false;
            }
            if boolean && parse_bool(cell).is_none() {
                boolean = false;
            }
            if datetime && parse_datetime(cell).is_none() {
                datetime = false;
            }
            if !(integer || float || boolean || datetime) {
                return ColumnType::Text;
            }
        }

        match (seen, integer, float, boolean, datetime) {
            (false, ..) => ColumnType::Text,
            (_, true, ..) => ColumnType::Integer,
            (_, _, true, ..) => ColumnType::Float,
            (_, _, _, true, _) => ColumnType::Boolean,
            (_, _, _, _, true) => ColumnType::DateTime,
            _ => ColumnType::Text,
        }
    }

    /// Lowercase name used in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::DateTime => "datetime",
            ColumnType::Text => "text",
        }
    }
}

/// One typed cell
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum Value {
    /// Empty cell
    Null,
    /// Integer cell
    Integer(i64),
    /// Float cell
    Float(f64),
    /// Boolean cell
    Boolean(bool),
    /// Milliseconds since the Unix epoch, naive local time
    DateTime(i64),
    /// Text cell
    Text(String),
}

impl Value {
    /// Parse `cell` as `column_type`
    ///
    /// Cells that do not parse fall back to text so no data is lost; inference
    /// guarantees this only happens for hand-built datasets.
    pub fn parse(cell: &str, column_type: ColumnType) -> Self {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        let parsed = match column_type {
            ColumnType::Integer => parse_integer(trimmed).map(Value::Integer),
            ColumnType::Float => parse_float(trimmed).map(Value::Float),
            ColumnType::Boolean => parse_bool(trimmed).map(Value::Boolean),
            ColumnType::DateTime => parse_datetime(trimmed)
                .map(|dt| Value::DateTime(dt.and_utc().timestamp_millis())),
            ColumnType::Text => None,
        };
        parsed.unwrap_or_else(|| Value::Text(cell.to_string()))
    }

    /// Whether the cell is empty
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render for delimited text output
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Boolean(v) => v.to_string(),
            Value::DateTime(ms) => match chrono::DateTime::from_timestamp_millis(*ms) {
                Some(dt) => dt.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string(),
                None => ms.to_string(),
            },
            Value::Text(v) => v.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

fn parse_integer(cell: &str) -> Option<i64> {
    cell.parse::<i64>().ok().filter(|v| v.to_string() == cell)
}

/// Plain decimal notation only, and only when the f64 renders back to the
/// same text; anything lossy (long codes, exponents, trailing zeros) is text
fn parse_float(cell: &str) -> Option<f64> {
    if !cell.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '-')) {
        return None;
    }
    cell.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.to_string() == cell)
}

fn parse_bool(cell: &str) -> Option<bool> {
    if cell.eq_ignore_ascii_case("true") {
        Some(true)
    } else if cell.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Parse a report date or datetime cell
pub fn parse_datetime(cell: &str) -> Option<NaiveDateTime> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(cell, format).ok())
        .or_else(|| {
            DAY_FORMATS.iter().find_map(|format| {
                NaiveDate::parse_from_str(cell, format)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
        })
}

/// Named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Column {
    /// Header text
    pub name: String,
    /// Inferred type
    pub column_type: ColumnType,
}

/// A file that contributed rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Staged file path
    pub path: PathBuf,
    /// Rows taken from the file after filtering
    pub rows: usize,
    /// Rows dropped because their field count differed from the header
    pub malformed_rows: usize,
}

/// Non-fatal consolidation problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsolidationWarning {
    /// Header differs from the reference schema; file excluded
    SchemaMismatch {
        /// Excluded file
        path: PathBuf,
        /// Reference header
        expected: Vec<String>,
        /// Header found in the file
        found: Vec<String>,
    },
    /// File could not be read or parsed; file excluded
    Unreadable {
        /// Excluded file
        path: PathBuf,
        /// Reader error text
        reason: String,
    },
}

impl fmt::Display for ConsolidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsolidationWarning::SchemaMismatch {
                path,
                expected,
                found,
            } => write!(
                f,
                "{}: schema mismatch ({} columns, expected {})",
                path.display(),
                found.len(),
                expected.len()
            ),
            ConsolidationWarning::Unreadable { path, reason } => {
                write!(f, "{}: unreadable ({reason})", path.display())
            }
        }
    }
}

/// Rows from many same-schema files, typed per column
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedDataset {
    /// Module the rows belong to
    pub module: Module,
    /// Shared schema
    pub columns: Vec<Column>,
    /// Rows in file-then-row order; every row has `columns.len()` cells
    pub rows: Vec<Vec<Value>>,
    /// Files that contributed rows, in order
    pub sources: Vec<SourceFile>,
    /// Files excluded and why
    pub warnings: Vec<ConsolidationWarning>,
}

impl ConsolidatedDataset {
    /// Build a dataset by typing string rows
    ///
    /// Rows shorter than the header are padded with nulls; longer rows are
    /// truncated.
    pub fn from_text_rows(
        module: Module,
        headers: Vec<String>,
        text_rows: Vec<Vec<String>>,
    ) -> Self {
        let columns: Vec<Column> = headers
            .into_iter()
            .enumerate()
            .map(|(index, name)| Column {
                column_type: ColumnType::infer(
                    text_rows
                        .iter()
                        .map(|row| row.get(index).map(String::as_str).unwrap_or("")),
                ),
                name,
            })
            .collect();

        let rows = text_rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(index, column)| {
                        row.get(index)
                            .map(|cell| Value::parse(cell, column.column_type))
                            .unwrap_or(Value::Null)
                    })
                    .collect()
            })
            .collect();

        Self {
            module,
            columns,
            rows,
            sources: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Row count
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column count
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Column names in order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Total malformed rows dropped across sources
    pub fn malformed_rows(&self) -> usize {
        self.sources.iter().map(|s| s.malformed_rows).sum()
    }

    /// Number of files excluded for a schema mismatch
    pub fn schema_mismatches(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, ConsolidationWarning::SchemaMismatch { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_narrowest_type() {
        assert_eq!(ColumnType::infer(["1", "-2", ""]), ColumnType::Integer);
        assert_eq!(ColumnType::infer(["1", "2.5"]), ColumnType::Float);
        assert_eq!(ColumnType::infer(["true", "FALSE"]), ColumnType::Boolean);
        assert_eq!(
            ColumnType::infer(["05/03/2024 10:30", "2024-03-06"]),
            ColumnType::DateTime
        );
        assert_eq!(ColumnType::infer(["LM123", "1"]), ColumnType::Text);
        assert_eq!(ColumnType::infer(["", " "]), ColumnType::Text);
    }

    #[test]
    fn test_leading_zeros_stay_text() {
        assert_eq!(ColumnType::infer(["007", "12"]), ColumnType::Text);
        assert_eq!(ColumnType::infer(["0", "0.5"]), ColumnType::Float);
        assert_eq!(Value::parse("007", ColumnType::Text), Value::Text("007".into()));
    }

    #[test]
    fn test_lossy_numbers_stay_text() {
        assert_eq!(ColumnType::infer(["12345678901234567891"]), ColumnType::Text);
        assert_eq!(ColumnType::infer(["1E5", "2e3"]), ColumnType::Text);
        assert_eq!(ColumnType::infer(["2.50"]), ColumnType::Text);
        assert_eq!(ColumnType::infer(["+5"]), ColumnType::Text);

        let dataset = ConsolidatedDataset::from_text_rows(
            Module::Ccm,
            vec!["Expediente".into(), "Codigo".into()],
            vec![vec!["12345678901234567891".into(), "1E5".into()]],
        );
        assert_eq!(
            dataset.rows[0],
            vec![
                Value::Text("12345678901234567891".into()),
                Value::Text("1E5".into())
            ]
        );
    }

    #[test]
    fn test_non_numeric_words_are_not_floats() {
        assert_eq!(ColumnType::infer(["NaN", "inf"]), ColumnType::Text);
    }

    #[test]
    fn test_day_first_dates() {
        let dt = parse_datetime("05/03/2024").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-03-05");
        let value = Value::parse("05/03/2024 10:30", ColumnType::DateTime);
        assert_eq!(value.to_text(), "2024-03-05 10:30:00");
    }

    #[test]
    fn test_from_text_rows_pads_short_rows() {
        let dataset = ConsolidatedDataset::from_text_rows(
            Module::Ccm,
            vec!["id".into(), "amount".into()],
            vec![vec!["1".into(), "2.5".into()], vec!["2".into()]],
        );
        assert_eq!(dataset.columns[0].column_type, ColumnType::Integer);
        assert_eq!(dataset.columns[1].column_type, ColumnType::Float);
        assert_eq!(dataset.rows[1], vec![Value::Integer(2), Value::Null]);
    }
}
