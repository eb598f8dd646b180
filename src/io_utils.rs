//! CSV reader/writer construction and UTF-8 field decoding.
//!
//! Inference and filtering both run on the UTF-8 intermediate file, so
//! fields are decoded strictly as UTF-8. Readers are built `flexible` so that
//! ragged rows surface as [`StageError::MalformedRow`] with a line number
//! rather than as a generic parser error.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use csv::QuoteStyle;

use crate::error::{Result, StageError};

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(
    path: &Path,
    delimiter: u8,
) -> Result<csv::Reader<BufReader<File>>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(open_csv_reader(reader, delimiter))
}

pub fn open_csv_writer(path: &Path, delimiter: u8) -> Result<csv::Writer<BufWriter<File>>> {
    let writer = BufWriter::new(File::create(path)?);
    Ok(csv_writer(writer, delimiter))
}

pub fn csv_writer<W: Write>(writer: W, delimiter: u8) -> csv::Writer<W> {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    builder.from_writer(writer)
}

pub fn decode_field(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes)
        .map_err(|err| StageError::Encoding(format!("field is not valid UTF-8: {err}")))
}

pub fn decode_bytes(bytes: &[u8]) -> Result<String> {
    decode_field(bytes).map(str::to_owned)
}

pub fn decode_record(record: &csv::ByteRecord) -> Result<Vec<String>> {
    record.iter().map(decode_bytes).collect()
}

pub fn reader_headers<R>(reader: &mut csv::Reader<R>) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    if headers.is_empty() {
        return Err(StageError::EmptyInput);
    }
    decode_record(&headers)
}

/// Line number of a record for error reporting (1-based, header is line 1).
pub fn record_line(record: &csv::ByteRecord, fallback: u64) -> u64 {
    record
        .position()
        .map(|position| position.line())
        .unwrap_or(fallback)
}

pub fn ensure_width(record: &csv::ByteRecord, expected: usize, line: u64) -> Result<()> {
    if record.len() != expected {
        return Err(StageError::MalformedRow {
            line,
            expected,
            found: record.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_has_no_headers() {
        let mut reader = open_csv_reader("".as_bytes(), b',');
        assert!(matches!(
            reader_headers(&mut reader),
            Err(StageError::EmptyInput)
        ));
    }

    #[test]
    fn invalid_utf8_field_is_an_encoding_error() {
        let err = decode_bytes(&[0xCF, 0x28]).unwrap_err();
        assert!(matches!(err, StageError::Encoding(_)));
    }

    #[test]
    fn writer_quotes_only_when_needed() {
        let mut writer = csv_writer(Vec::new(), b';');
        writer.write_record(["plain", "semi;colon"]).unwrap();
        let bytes = writer.into_inner().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "plain;\"semi;colon\"\n");
    }

    #[test]
    fn ragged_record_reports_counts() {
        let mut reader = open_csv_reader("a,b,c\n1,2\n".as_bytes(), b',');
        let headers = reader_headers(&mut reader).unwrap();
        let mut record = csv::ByteRecord::new();
        assert!(reader.read_byte_record(&mut record).unwrap());
        let line = record_line(&record, 0);
        match ensure_width(&record, headers.len(), line) {
            Err(StageError::MalformedRow {
                line,
                expected,
                found,
            }) => {
                assert_eq!((line, expected, found), (2, 3, 2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
