//! Single-pass schema inference.
//!
//! Every column starts as `NUMBER` and is demoted to `VARCHAR2` the first time
//! it sees a value that is not a plain integer of at most
//! [`NUMERIC_DIGIT_LIMIT`] digits. Demotion never reverses. Widths only grow,
//! starting from [`MIN_WIDTH`].

use std::{collections::HashMap, path::Path};

use csv::ByteRecord;
use log::{debug, info};

use super::{ColumnDescriptor, ColumnType, SchemaDescriptor, SchemaMetadata};
use crate::{
    error::{Result, StageError},
    headers::normalize_headers,
    io_utils,
};

pub const NUMERIC_DIGIT_LIMIT: usize = 11;
pub const MIN_WIDTH: usize = 1;

/// Running type/width estimate for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnAccumulator {
    column_type: ColumnType,
    width: usize,
    observed: usize,
}

impl ColumnAccumulator {
    pub const fn new() -> Self {
        Self {
            column_type: ColumnType::Number,
            width: MIN_WIDTH,
            observed: 0,
        }
    }

    pub fn observe(self, value: &str) -> Self {
        let column_type = match self.column_type {
            ColumnType::Number if is_numeric_value(value) => ColumnType::Number,
            _ => ColumnType::Varchar2,
        };
        Self {
            column_type,
            width: self.width.max(value.chars().count()),
            observed: self.observed + 1,
        }
    }

    /// Type to record for the column. A column that never saw a value has
    /// nothing backing the optimistic `NUMBER` and is reported as `VARCHAR2`.
    pub fn column_type(&self) -> ColumnType {
        if self.observed == 0 {
            ColumnType::Varchar2
        } else {
            self.column_type
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn observed(&self) -> usize {
        self.observed
    }
}

impl Default for ColumnAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Folds a column's values into its final estimate without touching files.
pub fn infer_column<'a, I>(values: I) -> ColumnAccumulator
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .fold(ColumnAccumulator::new(), ColumnAccumulator::observe)
}

/// Integer literal (optional sign, no fraction or exponent) with at most
/// [`NUMERIC_DIGIT_LIMIT`] digits. Empty strings are not numeric.
pub fn is_numeric_value(value: &str) -> bool {
    value.parse::<i64>().is_ok()
        && value.bytes().filter(u8::is_ascii_digit).count() <= NUMERIC_DIGIT_LIMIT
}

pub fn infer_schema(path: &Path, table_name: &str, delimiter: u8) -> Result<SchemaDescriptor> {
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let raw_headers = io_utils::reader_headers(&mut reader)?;
    let names = normalize_headers(&raw_headers);
    ensure_unique(&names)?;
    debug!("Normalized headers for {:?}: {:?}", path, names);

    let mut accumulators = vec![ColumnAccumulator::new(); names.len()];
    let mut record = ByteRecord::new();
    let mut rows = 0usize;
    while reader.read_byte_record(&mut record)? {
        let line = io_utils::record_line(&record, rows as u64 + 2);
        io_utils::ensure_width(&record, names.len(), line)?;
        for (accumulator, field) in accumulators.iter_mut().zip(record.iter()) {
            let value = io_utils::decode_field(field)?;
            *accumulator = accumulator.observe(value);
        }
        rows += 1;
    }

    let columns = names
        .iter()
        .zip(raw_headers.iter())
        .zip(accumulators.iter())
        .map(|((name, original), accumulator)| {
            (
                name.clone(),
                ColumnDescriptor {
                    original_name: original.clone(),
                    column_type: accumulator.column_type(),
                    width: accumulator.width(),
                    include: !original.is_empty(),
                },
            )
        })
        .collect();

    info!(
        "Inferred {} column(s) from {} row(s) of {:?}",
        names.len(),
        rows,
        path
    );
    Ok(SchemaDescriptor {
        columns,
        metadata: SchemaMetadata {
            row_count: rows,
            table_name: table_name.to_string(),
        },
        columns_order: names,
    })
}

fn ensure_unique(names: &[String]) -> Result<()> {
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(names.len());
    for (idx, name) in names.iter().enumerate() {
        if let Some(first) = positions.insert(name.as_str(), idx + 1) {
            return Err(StageError::DuplicateColumnName {
                name: name.clone(),
                first,
                second: idx + 1,
            });
        }
    }
    Ok(())
}
