use std::path::Path;

use csv::ByteRecord;
use log::info;

use crate::{error::Result, io_utils, schema::SchemaDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSummary {
    pub kept_columns: usize,
    pub dropped_columns: usize,
    pub rows_written: usize,
}

/// Rewrites `path` in place keeping only the columns the schema includes.
///
/// A file column is kept when its header text equals the `original_name` of
/// an included schema column. Canonical names are not consulted, so editing
/// `original_name` in the side-car without editing the file drops the column.
pub fn filter_excluded_columns(
    path: &Path,
    schema: &SchemaDescriptor,
    delimiter: u8,
) -> Result<FilterSummary> {
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader)?;
    let keep: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, header)| schema.includes_header(header))
        .map(|(idx, _)| idx)
        .collect();

    let mut records = Vec::new();
    let mut record = ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        let line = io_utils::record_line(&record, records.len() as u64 + 2);
        io_utils::ensure_width(&record, headers.len(), line)?;
        records.push(record.clone());
    }
    drop(reader);

    let mut writer = io_utils::open_csv_writer(path, delimiter)?;
    writer.write_record(keep.iter().map(|&idx| headers[idx].as_bytes()))?;
    for record in &records {
        writer.write_record(keep.iter().map(|&idx| &record[idx]))?;
    }
    writer.flush()?;

    let summary = FilterSummary {
        kept_columns: keep.len(),
        dropped_columns: headers.len() - keep.len(),
        rows_written: records.len(),
    };
    info!(
        "Filtered {:?}: kept {} column(s), dropped {}, {} row(s)",
        path, summary.kept_columns, summary.dropped_columns, summary.rows_written
    );
    Ok(summary)
}
