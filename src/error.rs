//! Error types for loading the pool, validating forms, and persisting
//! annotations.

use std::path::PathBuf;

use thiserror::Error;

/// The input pool could not be turned into a sequence of items.
#[derive(Error, Debug)]
pub enum DataFormatError {
    #[error("pool file not found: {}", .path.display())]
    Missing { path: PathBuf },

    #[error("failed to read pool file {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in pool file {}: {source}", .path.display())]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("pool file {} must be an array or an object with a `speeches` array", .path.display())]
    UnexpectedShape { path: PathBuf },

    #[error("item {index} in {}: {message}", .path.display())]
    InvalidItem {
        path: PathBuf,
        index: usize,
        message: String,
    },

    #[error("duplicate item id `{id}` at index {index} in {}", .path.display())]
    DuplicateId {
        path: PathBuf,
        index: usize,
        id: String,
    },

    #[error("pool file {} contains no items", .path.display())]
    Empty { path: PathBuf },
}

/// A form field that can fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    RaterId,
    Score,
    Justification,
}

impl FormField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RaterId => "rater_id",
            Self::Score => "score",
            Self::Justification => "justification",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: FormField,
    pub message: String,
}

/// Every field that failed validation for one submission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid submission ({})", summarize(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn message_for(&self, field: FormField) -> Option<&str> {
        self.errors
            .iter()
            .find(|error| error.field == field)
            .map(|error| error.message.as_str())
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|error| format!("{}: {}", error.field.as_str(), error.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Writing to or reading from the annotation store failed.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("unsupported header in {}: {reason}", .path.display())]
    Header { path: PathBuf, reason: String },

    #[error("malformed row {line} in {}: {reason}", .path.display())]
    Row {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a submission was not recorded.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("annotation not saved: {0}")]
    Storage(#[from] StorageError),

    #[error("all items have been annotated")]
    Finished,
}
