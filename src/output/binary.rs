//! Compact binary artifact: bincode records in a gzip stream
//!
//! Layout inside the gzip stream: one [`BinaryHeader`], then row batches
//! (`Vec<Vec<Value>>`) of at most `batch_size` rows until `rows` rows have
//! been written. Values keep their exact types, so a reload reproduces the
//! dataset value for value.

use bincode::{Decode, Encode};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use super::{OutputError, OutputResult};
use crate::consolidate::{Column, ConsolidatedDataset, Value};
use crate::identifier::Module;

const MAGIC: [u8; 4] = *b"RPTB";
const FORMAT_VERSION: u16 = 1;
/// Upper bound on rows reserved up front when reloading
const PREALLOCATE_ROWS: usize = 65_536;
/// Largest single bincode record accepted when reloading
const READ_LIMIT: usize = 1 << 30;

#[derive(Debug, Encode, Decode)]
struct BinaryHeader {
    magic: [u8; 4],
    version: u16,
    module: String,
    columns: Vec<Column>,
    rows: u64,
}

fn config() -> bincode::config::Configuration {
    bincode::config::standard()
}

fn read_config() -> impl bincode::config::Config {
    config().with_limit::<READ_LIMIT>()
}

/// Write `dataset` as gzip-compressed bincode
pub fn write_binary(
    dataset: &ConsolidatedDataset,
    batch_size: usize,
    file: &mut File,
) -> OutputResult<()> {
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());

    let header = BinaryHeader {
        magic: MAGIC,
        version: FORMAT_VERSION,
        module: dataset.module.to_string(),
        columns: dataset.columns.clone(),
        rows: dataset.row_count() as u64,
    };
    bincode::encode_into_std_write(&header, &mut encoder, config())
        .map_err(|e| OutputError::SerializationError(format!("header: {e}")))?;

    for batch in dataset.rows.chunks(batch_size.max(1)) {
        bincode::encode_into_std_write(batch, &mut encoder, config())
            .map_err(|e| OutputError::SerializationError(format!("batch: {e}")))?;
    }

    let mut inner = encoder.finish()?;
    inner.flush()?;
    Ok(())
}

/// Reload a compact binary artifact
///
/// Provenance (source files and warnings) is not stored and comes back empty.
pub fn load_binary(path: &Path) -> OutputResult<ConsolidatedDataset> {
    let file = File::open(path)?;
    let mut decoder = BufReader::new(GzDecoder::new(file));

    let header: BinaryHeader = bincode::decode_from_std_read(&mut decoder, read_config())
        .map_err(|e| OutputError::SerializationError(format!("header: {e}")))?;
    if header.magic != MAGIC {
        return Err(OutputError::SerializationError(
            "not a compact binary artifact".to_string(),
        ));
    }
    if header.version != FORMAT_VERSION {
        return Err(OutputError::SerializationError(format!(
            "unsupported binary format version {}",
            header.version
        )));
    }
    let module: Module = header
        .module
        .parse()
        .map_err(|e| OutputError::SerializationError(format!("module: {e}")))?;

    let expected = usize::try_from(header.rows).map_err(|_| {
        OutputError::SerializationError(format!("row count {} too large", header.rows))
    })?;
    // The header is untrusted; rows are only reserved as batches arrive
    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(expected.min(PREALLOCATE_ROWS));
    while rows.len() < expected {
        let batch: Vec<Vec<Value>> = bincode::decode_from_std_read(&mut decoder, read_config())
            .map_err(|e| OutputError::SerializationError(format!("batch: {e}")))?;
        if batch.is_empty() {
            return Err(OutputError::SerializationError(
                "empty batch before all rows were read".to_string(),
            ));
        }
        rows.extend(batch);
    }

    Ok(ConsolidatedDataset {
        module,
        columns: header.columns,
        rows,
        sources: Vec::new(),
        warnings: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_is_value_exact() {
        let dataset = ConsolidatedDataset::from_text_rows(
            Module::Sol,
            vec!["n".into(), "x".into(), "flag".into(), "when".into(), "code".into()],
            vec![
                vec!["1".into(), "0.1".into(), "true".into(), "05/03/2024 08:15".into(), "007".into()],
                vec!["2".into(), "".into(), "false".into(), "2024-03-06".into(), "LM9".into()],
                vec!["3".into(), "2.5".into(), "".into(), "".into(), "".into()],
            ],
        );

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sol.bin.gz");
        let mut file = File::create(&path).unwrap();
        write_binary(&dataset, 2, &mut file).unwrap();
        drop(file);

        let loaded = load_binary(&path).unwrap();
        assert_eq!(loaded.module, Module::Sol);
        assert_eq!(loaded.columns, dataset.columns);
        assert_eq!(loaded.rows, dataset.rows);
    }

    #[test]
    fn test_inflated_row_count_fails_cleanly() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("forged.bin.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        let header = BinaryHeader {
            magic: MAGIC,
            version: FORMAT_VERSION,
            module: "CCM".to_string(),
            columns: Vec::new(),
            rows: u64::MAX,
        };
        bincode::encode_into_std_write(&header, &mut encoder, config()).unwrap();
        encoder.finish().unwrap();

        assert!(matches!(
            load_binary(&path),
            Err(OutputError::SerializationError(_))
        ));
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("junk.bin.gz");
        std::fs::write(&path, b"not gzip").unwrap();
        assert!(load_binary(&path).is_err());
    }
}
