//! Append-only persistence for completed annotations.
//!
//! Rows are never rewritten. When a rater annotates the same item twice the
//! later row wins on read.

use std::collections::HashSet;
use std::path::Path;

use crate::cli::StoreKind;
use crate::error::StorageError;
use crate::model::Annotation;

mod csv;
mod csv_codec;
mod sqlite;

pub use self::csv::CsvAnnotationStore;
pub use self::sqlite::SqliteAnnotationStore;

pub trait AnnotationStore: Send {
    /// Adds exactly one row, or fails without touching existing rows.
    fn append(&mut self, record: &Annotation) -> Result<(), StorageError>;

    /// All stored annotations in write order.
    fn annotations(&self) -> Result<Vec<Annotation>, StorageError>;

    fn location(&self) -> &Path;

    fn row_count(&self) -> Result<usize, StorageError> {
        Ok(self.annotations()?.len())
    }

    fn latest_for(
        &self,
        item_id: &str,
        rater_id: &str,
    ) -> Result<Option<Annotation>, StorageError> {
        Ok(self
            .annotations()?
            .into_iter()
            .rev()
            .find(|row| row.item_id == item_id && row.rater_id == rater_id))
    }

    fn completed_item_ids(&self, rater_id: &str) -> Result<HashSet<String>, StorageError> {
        Ok(self
            .annotations()?
            .into_iter()
            .filter(|row| row.rater_id == rater_id)
            .map(|row| row.item_id)
            .collect())
    }
}

pub fn open_store(kind: StoreKind, path: &Path) -> Result<Box<dyn AnnotationStore>, StorageError> {
    match kind {
        StoreKind::Csv => Ok(Box::new(CsvAnnotationStore::open(path)?)),
        StoreKind::Sqlite => Ok(Box::new(SqliteAnnotationStore::open(path)?)),
    }
}
