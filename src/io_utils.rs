//! CSV reader/writer construction, delimiter resolution, and input decoding.
//!
//! Every file the crate touches goes through here:
//!
//! - **Delimiters**: `.tsv` inputs default to tab, everything else to comma;
//!   an explicit `--delimiter` always wins.
//! - **Encoding**: source exports are decoded with `encoding_rs` (default
//!   UTF-8). The store and every export are written as UTF-8.
//! - **Writers**: output fields are always quoted so values containing the
//!   delimiter or line breaks survive a reload.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Stdout, Write},
    path::Path,
};

use anyhow::{Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::error::IngestResult;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false)
        .from_reader(reader)
}

pub fn open_csv_reader_from_path(
    path: &Path,
    delimiter: u8,
) -> IngestResult<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        let file = File::open(path)
            .map_err(|err| std::io::Error::new(err.kind(), format!("opening {path:?}: {err}")))?;
        Box::new(BufReader::new(file))
    };
    Ok(open_csv_reader(reader, delimiter))
}

pub fn csv_writer<W: Write>(writer: W, delimiter: u8) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Always)
        .double_quote(true)
        .from_writer(writer)
}

/// CSV writer on stdout for report output.
pub fn stdout_csv_writer(delimiter: u8) -> csv::Writer<BufWriter<Stdout>> {
    csv_writer(BufWriter::new(std::io::stdout()), delimiter)
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> IngestResult<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to decode text with encoding {}", encoding.name()),
        )
        .into())
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
) -> IngestResult<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> IngestResult<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    let mut decoded = decode_record(&headers, encoding)?;
    if let Some(first) = decoded.first_mut() {
        // Spreadsheet exports often lead with a UTF-8 byte order mark.
        *first = first.trim_start_matches('\u{feff}').to_string();
    }
    Ok(decoded)
}
