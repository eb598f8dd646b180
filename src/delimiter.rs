use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use log::debug;

use crate::error::{Result, StageError};

pub const CANDIDATES: [u8; 3] = [b',', b';', b'\t'];

/// Picks the delimiter from the first line of `path`.
///
/// Only the first line is inspected, so a header that under-represents the
/// real delimiter (a single-column header, say) is detected wrongly or
/// reported as ambiguous.
pub fn detect_delimiter(path: &Path) -> Result<u8> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = Vec::new();
    let read = reader.read_until(b'\n', &mut line)?;
    if read == 0 {
        return Err(StageError::EmptyInput);
    }
    let delimiter = detect_in_line(&line)?;
    debug!(
        "Detected delimiter '{}' in {:?}",
        crate::printable_delimiter(delimiter),
        path
    );
    Ok(delimiter)
}

/// Returns the candidate whose count strictly exceeds the other two.
pub fn detect_in_line(line: &[u8]) -> Result<u8> {
    let count = |needle: u8| line.iter().filter(|byte| **byte == needle).count();
    let commas = count(b',');
    let semicolons = count(b';');
    let tabs = count(b'\t');

    if commas > semicolons && commas > tabs {
        Ok(b',')
    } else if semicolons > commas && semicolons > tabs {
        Ok(b';')
    } else if tabs > commas && tabs > semicolons {
        Ok(b'\t')
    } else {
        Err(StageError::AmbiguousDelimiter {
            commas,
            semicolons,
            tabs,
        })
    }
}
