//! Styled xlsx workbook writer

use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook, XlsxError};
use std::fs::File;

use super::{OutputError, OutputResult};
use crate::consolidate::{ConsolidatedDataset, Value};

/// Rows per worksheet, header included
pub const MAX_ROWS: usize = 1_048_576;
/// Columns per worksheet
pub const MAX_COLUMNS: usize = 16_384;

const MAX_SHEET_NAME: usize = 31;
const MAX_COLUMN_WIDTH: usize = 50;
const MIN_COLUMN_WIDTH: usize = 8;
const HEADER_BACKGROUND: u32 = 0xD9E1F2;

/// Days between the Excel epoch (1899-12-30) and the Unix epoch
const EXCEL_UNIX_EPOCH_DAYS: f64 = 25_569.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Reject datasets a single worksheet cannot hold
pub fn check_limits(dataset: &ConsolidatedDataset) -> Result<(), String> {
    if dataset.row_count() + 1 > MAX_ROWS {
        return Err(format!(
            "{} rows exceed the worksheet limit of {}",
            dataset.row_count(),
            MAX_ROWS - 1
        ));
    }
    if dataset.column_count() > MAX_COLUMNS {
        return Err(format!(
            "{} columns exceed the worksheet limit of {MAX_COLUMNS}",
            dataset.column_count()
        ));
    }
    Ok(())
}

fn xlsx_error(e: XlsxError) -> OutputError {
    OutputError::SpreadsheetError(e.to_string())
}

/// One worksheet named after the module: bold filled header, frozen header
/// row, autofilter, and column widths fitted to content
pub fn write_xlsx(dataset: &ConsolidatedDataset, file: &mut File) -> OutputResult<()> {
    check_limits(dataset).map_err(OutputError::LimitExceeded)?;

    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(HEADER_BACKGROUND))
        .set_border(FormatBorder::Thin);
    let datetime_format = Format::new().set_num_format("dd/mm/yyyy hh:mm");

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let sheet_name: String = dataset.module.as_str().chars().take(MAX_SHEET_NAME).collect();
    sheet.set_name(sheet_name).map_err(xlsx_error)?;

    let mut widths: Vec<usize> = dataset
        .columns
        .iter()
        .map(|c| c.name.chars().count().max(MIN_COLUMN_WIDTH))
        .collect();

    for (col, column) in dataset.columns.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, &column.name, &header_format)
            .map_err(xlsx_error)?;
    }

    for (index, row) in dataset.rows.iter().enumerate() {
        let row_num = (index + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            let col_num = col as u16;
            match value {
                Value::Null => continue,
                Value::Integer(i) => sheet.write_number(row_num, col_num, *i as f64),
                Value::Float(f) => sheet.write_number(row_num, col_num, *f),
                Value::Boolean(b) => sheet.write_boolean(row_num, col_num, *b),
                Value::DateTime(ms) => sheet.write_number_with_format(
                    row_num,
                    col_num,
                    *ms as f64 / MILLIS_PER_DAY + EXCEL_UNIX_EPOCH_DAYS,
                    &datetime_format,
                ),
                Value::Text(text) => sheet.write_string(row_num, col_num, text),
            }
            .map_err(xlsx_error)?;

            if let Some(width) = widths.get_mut(col) {
                let len = match value {
                    Value::DateTime(_) => 16,
                    other => other.to_text().chars().count(),
                };
                *width = (*width).max(len);
            }
        }
    }

    for (col, width) in widths.iter().enumerate() {
        sheet
            .set_column_width(col as u16, (*width).min(MAX_COLUMN_WIDTH) as f64 + 2.0)
            .map_err(xlsx_error)?;
    }

    if !dataset.columns.is_empty() {
        sheet.set_freeze_panes(1, 0).map_err(xlsx_error)?;
        sheet
            .autofilter(
                0,
                0,
                dataset.row_count() as u32,
                (dataset.column_count() - 1) as u16,
            )
            .map_err(xlsx_error)?;
    }

    workbook.save_to_writer(file).map_err(xlsx_error)?;
    Ok(())
}
