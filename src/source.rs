use std::path::Path;

use encoding_rs::Encoding;
use log::{debug, info};

use crate::{
    data::{Value, parse_raw_cell},
    error::{IngestError, IngestResult},
    io_utils,
    record::RecordSet,
};

pub const DEFAULT_SOURCE_COLUMN: &str = "Carrier";

/// Reads a headered CSV/TSV export into a raw record set.
pub fn read_record_set(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> IngestResult<RecordSet> {
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)?;
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(IngestError::Schema(format!(
            "source {path:?} has no header row"
        )));
    }
    let mut records = RecordSet::new(headers);
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record?;
        let decoded = io_utils::decode_record(&record, encoding)?;
        records
            .push_row(decoded.iter().map(|field| parse_raw_cell(field)).collect())
            .map_err(|err| {
                IngestError::Schema(format!("{path:?} line {}: {err}", row_idx + 2))
            })?;
    }
    info!(
        "Read {} row(s) x {} column(s) from {path:?}",
        records.len(),
        records.headers().len()
    );
    Ok(records)
}

/// Label for a source file: the file stem up to the first `%`, trimmed,
/// lower-cased, with spaces replaced by underscores.
pub fn source_label(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let head = stem.split('%').next().unwrap_or_default();
    head.trim().to_lowercase().replace(' ', "_")
}

/// Appends `column` holding `label` on every row unless the source already
/// has such a column.
pub fn tag_source(records: &mut RecordSet, column: &str, label: &str) -> IngestResult<bool> {
    if records.has_column(column) {
        debug!("Source already carries '{column}'; leaving it untouched");
        return Ok(false);
    }
    let value = if label.is_empty() {
        None
    } else {
        Some(Value::String(label.to_string()))
    };
    records.fill_column(column, value)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::UTF_8;
    use std::io::Write;

    #[test]
    fn source_label_trims_encoded_suffix() {
        assert_eq!(
            source_label(Path::new("data/Healthfirst%2006.2024%20Commission.xlsx")),
            "healthfirst"
        );
        assert_eq!(
            source_label(Path::new("/tmp/Blue Cross June.csv")),
            "blue_cross_june"
        );
    }

    #[test]
    fn read_record_set_nulls_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Rep,Amount").unwrap();
        writeln!(file, "Jane,100").unwrap();
        writeln!(file, "Bob,N/A").unwrap();
        drop(file);

        let records = read_record_set(&path, b',', UTF_8).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.cell(1, "Amount"), Some(&None));
    }

    #[test]
    fn tag_source_respects_existing_column() {
        let mut records = RecordSet::from_rows(
            vec!["Carrier".into()],
            vec![vec![Some(Value::String("emblem".into()))]],
        )
        .unwrap();
        assert!(!tag_source(&mut records, "Carrier", "centene").unwrap());
        assert!(tag_source(&mut records, "Source", "centene").unwrap());
        assert_eq!(
            records.cell(0, "Source"),
            Some(&Some(Value::String("centene".into())))
        );
    }
}
