//! Error taxonomy for the import engine.
//!
//! [`ImportError`] covers failures that stop a whole import: file-level
//! problems (encoding, empty file, header mismatch, CSV syntax) and
//! configuration-level problems (unknown data type or field, missing update
//! key, duplicate mappings). Row-level problems never surface as an
//! `ImportError`; they are collected as strings on the outcome.
//!
//! [`StoreError`] is what a [`RecordStore`](crate::store::RecordStore) reports
//! for a single write. The orchestrator treats it as a row-level failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid file type '{0}': expected a .csv file")]
    InvalidFileType(String),
    #[error("invalid encoding: input is neither UTF-8 nor Shift_JIS")]
    Encoding,
    #[error("the CSV file is empty")]
    EmptyFile,
    #[error(
        "invalid CSV header. expected: {}. actual: {}",
        expected.join(", "),
        actual.join(", ")
    )]
    HeaderMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },
    #[error("csv parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error("unknown data type '{0}'")]
    UnknownDataType(String),
    #[error("field '{field}' does not exist on data type '{data_type}'")]
    UnknownField { data_type: String, field: String },
    #[error("data type '{0}' has no active update-key mapping")]
    NoUpdateKey(String),
    #[error("data type '{data_type}' maps header '{header}' more than once")]
    DuplicateHeader { data_type: String, header: String },
    #[error("data type '{data_type}' maps field '{field}' from more than one column")]
    DuplicateField { data_type: String, field: String },
    #[error("default value '{value}' for field '{field}' is invalid: {reason}")]
    InvalidDefault {
        field: String,
        value: String,
        reason: String,
    },
}

impl ImportError {
    /// Configuration errors point at a broken mapping or schema rather than
    /// at the uploaded data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ImportError::UnknownDataType(_)
                | ImportError::UnknownField { .. }
                | ImportError::NoUpdateKey(_)
                | ImportError::DuplicateHeader { .. }
                | ImportError::DuplicateField { .. }
                | ImportError::InvalidDefault { .. }
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("unexpected store error: {0}")]
    Unexpected(String),
}
