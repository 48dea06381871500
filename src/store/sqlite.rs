use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, Row, params};

use super::AnnotationStore;
use crate::error::StorageError;
use crate::model::Annotation;

const DB_SCHEMA_VERSION: &str = "0.1.0";

const SELECT_COLUMNS: &str =
    "item_id, rater_id, score, justification, context, statement, timestamp";

/// Annotation log kept as an append-only SQLite table.
pub struct SqliteAnnotationStore {
    connection: Connection,
    path: PathBuf,
}

impl SqliteAnnotationStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| StorageError::io(parent, err))?;
            }
        }

        let connection = Connection::open(path)?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;

        Ok(Self {
            connection,
            path: path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let connection = Connection::open_in_memory()?;
        ensure_schema(&connection)?;
        Ok(Self {
            connection,
            path: PathBuf::from(":memory:"),
        })
    }
}

fn configure_connection(connection: &Connection) -> Result<(), StorageError> {
    connection.pragma_update(None, "journal_mode", "WAL")?;
    connection.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<(), StorageError> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS annotations (
          row_id INTEGER PRIMARY KEY AUTOINCREMENT,
          item_id TEXT NOT NULL,
          rater_id TEXT NOT NULL,
          score INTEGER NOT NULL,
          justification TEXT NOT NULL,
          context TEXT NOT NULL,
          statement TEXT NOT NULL,
          timestamp TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_annotations_rater_item
          ON annotations(rater_id, item_id);
        ",
    )?;

    connection.execute(
        "INSERT OR IGNORE INTO metadata(key, value) VALUES('schema_version', ?1)",
        params![DB_SCHEMA_VERSION],
    )?;

    Ok(())
}

fn annotation_from_row(row: &Row<'_>) -> rusqlite::Result<Annotation> {
    Ok(Annotation {
        item_id: row.get(0)?,
        rater_id: row.get(1)?,
        score: row.get(2)?,
        justification: row.get(3)?,
        context: row.get(4)?,
        statement: row.get(5)?,
        timestamp: row.get(6)?,
    })
}

impl AnnotationStore for SqliteAnnotationStore {
    fn append(&mut self, record: &Annotation) -> Result<(), StorageError> {
        let tx = self.connection.transaction()?;
        tx.execute(
            "
            INSERT INTO annotations(item_id, rater_id, score, justification, context, statement, timestamp)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                record.item_id,
                record.rater_id,
                record.score,
                record.justification,
                record.context,
                record.statement,
                record.timestamp,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn annotations(&self) -> Result<Vec<Annotation>, StorageError> {
        let mut statement = self.connection.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM annotations ORDER BY row_id ASC"
        ))?;
        let rows = statement.query_map([], annotation_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn location(&self) -> &Path {
        &self.path
    }

    fn row_count(&self) -> Result<usize, StorageError> {
        let count: i64 =
            self.connection
                .query_row("SELECT COUNT(*) FROM annotations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn latest_for(
        &self,
        item_id: &str,
        rater_id: &str,
    ) -> Result<Option<Annotation>, StorageError> {
        let row = self
            .connection
            .query_row(
                &format!(
                    "
                    SELECT {SELECT_COLUMNS}
                    FROM annotations
                    WHERE item_id = ?1 AND rater_id = ?2
                    ORDER BY row_id DESC
                    LIMIT 1
                    "
                ),
                params![item_id, rater_id],
                annotation_from_row,
            )
            .optional()?;
        Ok(row)
    }

    fn completed_item_ids(&self, rater_id: &str) -> Result<HashSet<String>, StorageError> {
        let mut statement = self
            .connection
            .prepare("SELECT DISTINCT item_id FROM annotations WHERE rater_id = ?1")?;
        let rows = statement.query_map(params![rater_id], |row| row.get::<_, String>(0))?;

        let mut out = HashSet::new();
        for row in rows {
            out.insert(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(item_id: &str, rater_id: &str, score: u32) -> Annotation {
        Annotation {
            item_id: item_id.to_string(),
            rater_id: rater_id.to_string(),
            score,
            justification: format!("score {score}"),
            context: String::new(),
            statement: "statement".to_string(),
            timestamp: "2026-01-02T03:04:05Z".to_string(),
        }
    }

    #[test]
    fn append_adds_rows_in_order() {
        let mut store = SqliteAnnotationStore::open_in_memory().expect("open");
        store.append(&annotation("a", "r1", 1)).expect("append");
        store.append(&annotation("b", "r1", 2)).expect("append");

        assert_eq!(store.row_count().expect("count"), 2);
        let rows = store.annotations().expect("rows");
        assert_eq!(rows[0], annotation("a", "r1", 1));
        assert_eq!(rows[1], annotation("b", "r1", 2));
    }

    #[test]
    fn latest_for_and_completed_ids_follow_rater() {
        let mut store = SqliteAnnotationStore::open_in_memory().expect("open");
        store.append(&annotation("a", "r1", 1)).expect("append");
        store.append(&annotation("a", "r2", 3)).expect("append");
        store.append(&annotation("a", "r1", 4)).expect("append");

        let latest = store.latest_for("a", "r1").expect("lookup").expect("row");
        assert_eq!(latest.score, 4);
        assert!(store.latest_for("b", "r1").expect("lookup").is_none());

        let completed = store.completed_item_ids("r1").expect("completed");
        assert_eq!(completed, HashSet::from(["a".to_string()]));
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("annotations.sqlite");

        {
            let mut store = SqliteAnnotationStore::open(&path).expect("open");
            store.append(&annotation("a", "r1", 5)).expect("append");
        }

        let store = SqliteAnnotationStore::open(&path).expect("reopen");
        assert_eq!(store.row_count().expect("count"), 1);
        assert_eq!(store.location(), path.as_path());
    }
}
