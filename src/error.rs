//! Typed errors for the mapping engine.
//!
//! Only [`ConfigurationError`] propagates out of a load: everything raised
//! while binding or reading a sheet is turned into a recorded message.

use std::path::PathBuf;

use thiserror::Error;

use crate::value::ValueType;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Multiple key fields configured in schema '{schema}': '{first}' and '{second}'")]
    MultipleKeyFields {
        schema: String,
        first: String,
        second: String,
    },
    #[error("Multiple catch-all fields configured in schema '{schema}': '{first}' and '{second}'")]
    MultipleCatchAllFields {
        schema: String,
        first: String,
        second: String,
    },
    #[error("Multiple post-row hooks configured in schema '{schema}'")]
    MultiplePostRowHooks { schema: String },
    #[error("Column title '{title}' is declared more than once in schema '{schema}'")]
    DuplicateTitle { schema: String, title: String },
    #[error("Column '{title}' in schema '{schema}' has an invalid layout: {reason}")]
    InvalidLayout {
        schema: String,
        title: String,
        reason: String,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    #[error("No converter registered for {value_type}")]
    Unsupported { value_type: ValueType },
    #[error("Can't convert '{value}' to {value_type}: {reason}")]
    Invalid {
        value: String,
        value_type: ValueType,
        reason: String,
    },
}

impl ConversionError {
    pub fn invalid(value: impl Into<String>, value_type: ValueType, reason: impl Into<String>) -> Self {
        ConversionError::Invalid {
            value: value.into(),
            value_type,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("Cell at row {row}, column {column} can't be read as {expected}: found '{found}'")]
    UnreadableCell {
        row: usize,
        column: usize,
        expected: &'static str,
        found: String,
    },
    #[error("Merged region rows {first_row}..={last_row}, columns {first_column}..={last_column} is invalid")]
    InvalidMergedRegion {
        first_row: usize,
        last_row: usize,
        first_column: usize,
        last_column: usize,
    },
    #[error("Merged region at row {row}, column {column} overlaps an existing region")]
    OverlappingMergedRegion { row: usize, column: usize },
    #[error("No cell style named '{0}' has been defined")]
    UnknownStyle(String),
}

#[derive(Debug, Error)]
#[error("Failed to open {path:?} as a workbook: {reasons}")]
pub struct StorageOpenError {
    pub path: PathBuf,
    pub reasons: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct MessageRecorderError(pub String);
