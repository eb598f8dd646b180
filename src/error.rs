use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures raised by the staging core. Every variant is fatal for the run.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error(
        "Unable to detect delimiter from the first line \
         (commas: {commas}, semicolons: {semicolons}, tabs: {tabs})"
    )]
    AmbiguousDelimiter {
        commas: usize,
        semicolons: usize,
        tabs: usize,
    },

    #[error("Input is empty: no header row found")]
    EmptyInput,

    #[error("Malformed row at line {line}: expected {expected} field(s) but found {found}")]
    MalformedRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error(
        "Columns {first} and {second} both normalize to '{name}'; rename one of the headers"
    )]
    DuplicateColumnName {
        name: String,
        first: usize,
        second: usize,
    },

    #[error("Schema file {path:?} is corrupt: {reason}")]
    CorruptSchema { path: PathBuf, reason: String },

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Encoding '{0}' is not a supported single-byte legacy codepage")]
    UnsupportedEncoding(String),

    #[error("Bulk loader failed: {reason}\n{output}")]
    LoaderFailed { reason: String, output: String },

    #[error("Table creation failed: {reason}\n{output}")]
    TableCreationFailed { reason: String, output: String },
}

pub type Result<T> = std::result::Result<T, StageError>;
