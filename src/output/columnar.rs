//! Parquet and Arrow IPC writers
//!
//! Datasets are converted to Arrow record batches of `batch_size` rows. The
//! Arrow schema mirrors the dataset's column types; every field is nullable.

use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, TimestampMillisecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use std::fs::File;
use std::sync::Arc;

use super::{OutputError, OutputResult};
use crate::consolidate::{ColumnType, ConsolidatedDataset, Value};

static NULL: Value = Value::Null;

/// Arrow schema for a dataset
pub fn arrow_schema(dataset: &ConsolidatedDataset) -> SchemaRef {
    let fields: Vec<Field> = dataset
        .columns
        .iter()
        .map(|column| Field::new(&column.name, arrow_type(column.column_type), true))
        .collect();
    Arc::new(Schema::new(fields))
}

fn arrow_type(column_type: ColumnType) -> DataType {
    match column_type {
        ColumnType::Integer => DataType::Int64,
        ColumnType::Float => DataType::Float64,
        ColumnType::Boolean => DataType::Boolean,
        ColumnType::DateTime => DataType::Timestamp(TimeUnit::Millisecond, None),
        ColumnType::Text => DataType::Utf8,
    }
}

/// Convert `rows` (a slice of the dataset) into one record batch
pub fn record_batch(
    dataset: &ConsolidatedDataset,
    schema: &SchemaRef,
    rows: &[Vec<Value>],
) -> OutputResult<RecordBatch> {
    let arrays: Vec<ArrayRef> = dataset
        .columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let cells = rows.iter().map(move |row| row.get(index).unwrap_or(&NULL));
            column_array(column.column_type, cells)
        })
        .collect();

    RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| OutputError::ColumnarError(format!("Failed to build record batch: {e}")))
}

fn column_array<'a>(column_type: ColumnType, cells: impl Iterator<Item = &'a Value>) -> ArrayRef {
    match column_type {
        ColumnType::Integer => Arc::new(Int64Array::from_iter(cells.map(|v| match v {
            Value::Integer(i) => Some(*i),
            _ => None,
        }))),
        ColumnType::Float => Arc::new(Float64Array::from_iter(cells.map(|v| match v {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }))),
        ColumnType::Boolean => Arc::new(BooleanArray::from_iter(cells.map(|v| match v {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }))),
        ColumnType::DateTime => Arc::new(TimestampMillisecondArray::from_iter(cells.map(
            |v| match v {
                Value::DateTime(ms) => Some(*ms),
                _ => None,
            },
        ))),
        ColumnType::Text => Arc::new(StringArray::from_iter(cells.map(|v| match v {
            Value::Null => None,
            other => Some(other.to_text()),
        }))),
    }
}

fn writer_properties(dataset: &ConsolidatedDataset, batch_size: usize) -> WriterProperties {
    let module = KeyValue {
        key: "module".to_string(),
        value: Some(dataset.module.to_string()),
    };
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_size(batch_size)
        .set_key_value_metadata(Some(vec![module]))
        .build()
}

/// Parquet, snappy-compressed, one row group per batch
pub fn write_parquet(
    dataset: &ConsolidatedDataset,
    batch_size: usize,
    file: &mut File,
) -> OutputResult<()> {
    let schema = arrow_schema(dataset);
    let props = writer_properties(dataset, batch_size.max(1));

    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props)).map_err(|e| {
        OutputError::ColumnarError(format!("parquet writer init failed: {e}"))
    })?;

    for rows in dataset.rows.chunks(batch_size.max(1)) {
        let batch = record_batch(dataset, &schema, rows)?;
        writer
            .write(&batch)
            .map_err(|e| OutputError::ColumnarError(format!("parquet write failed: {e}")))?;
    }

    writer
        .close()
        .map_err(|e| OutputError::ColumnarError(format!("parquet close failed: {e}")))?;
    Ok(())
}

/// Arrow IPC file format (Feather v2)
pub fn write_ipc(
    dataset: &ConsolidatedDataset,
    batch_size: usize,
    file: &mut File,
) -> OutputResult<()> {
    let schema = arrow_schema(dataset);
    let mut writer = FileWriter::try_new(file, &schema)
        .map_err(|e| OutputError::ColumnarError(format!("IPC writer init failed: {e}")))?;

    for rows in dataset.rows.chunks(batch_size.max(1)) {
        let batch = record_batch(dataset, &schema, rows)?;
        writer
            .write(&batch)
            .map_err(|e| OutputError::ColumnarError(format!("IPC write failed: {e}")))?;
    }

    writer
        .finish()
        .map_err(|e| OutputError::ColumnarError(format!("IPC finish failed: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::Module;
    use arrow::array::Array;
    use arrow::ipc::reader::FileReader;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn dataset() -> ConsolidatedDataset {
        ConsolidatedDataset::from_text_rows(
            Module::Prr,
            vec!["id".into(), "fecha".into(), "estado".into()],
            (0..5)
                .map(|i| {
                    vec![
                        i.to_string(),
                        format!("0{}/03/2024", i + 1),
                        if i % 2 == 0 { "A".to_string() } else { String::new() },
                    ]
                })
                .collect(),
        )
    }

    #[test]
    fn test_schema_types() {
        let schema = arrow_schema(&dataset());
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(
            schema.field(1).data_type(),
            &DataType::Timestamp(TimeUnit::Millisecond, None)
        );
        assert_eq!(schema.field(2).data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_parquet_readback() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.parquet");
        let mut file = File::create(&path).unwrap();
        write_parquet(&dataset(), 2, &mut file).unwrap();
        drop(file);

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|batch| batch.unwrap().num_rows()).sum();
        assert_eq!(rows, 5);
    }

    #[test]
    fn test_ipc_readback_preserves_nulls() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.feather");
        let mut file = File::create(&path).unwrap();
        write_ipc(&dataset(), 3, &mut file).unwrap();
        drop(file);

        let reader = FileReader::try_new(File::open(&path).unwrap(), None).unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].column(2).null_count(), 1);
    }
}
