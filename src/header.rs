use std::io::Read;

use crate::error::ImportError;

/// Reads the first record as the header row. A file without any record is
/// reported as [`ImportError::EmptyFile`].
pub fn read_header<R: Read>(reader: &mut csv::Reader<R>) -> Result<Vec<String>, ImportError> {
    let mut record = csv::StringRecord::new();
    if !reader.read_record(&mut record)? {
        return Err(ImportError::EmptyFile);
    }
    Ok(record.iter().map(str::to_string).collect())
}

/// Strict comparison: same headers, same order, same text.
pub fn validate_headers(expected: &[String], actual: &[String]) -> Result<(), ImportError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ImportError::HeaderMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}
