use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::AnnotationStore;
use super::csv_codec::{Record, encode_record, parse_records};
use crate::error::StorageError;
use crate::model::Annotation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    ItemId,
    RaterId,
    Score,
    Justification,
    Context,
    Statement,
    Timestamp,
}

impl Column {
    const ALL: [Column; 7] = [
        Column::ItemId,
        Column::RaterId,
        Column::Score,
        Column::Justification,
        Column::Context,
        Column::Statement,
        Column::Timestamp,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::ItemId => "item_id",
            Self::RaterId => "rater_id",
            Self::Score => "score",
            Self::Justification => "justification",
            Self::Context => "context",
            Self::Statement => "statement",
            Self::Timestamp => "timestamp",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|column| column.name() == name.trim())
    }

    fn is_required(self) -> bool {
        self != Self::Timestamp
    }

    fn value(self, record: &Annotation) -> String {
        match self {
            Self::ItemId => record.item_id.clone(),
            Self::RaterId => record.rater_id.clone(),
            Self::Score => record.score.to_string(),
            Self::Justification => record.justification.clone(),
            Self::Context => record.context.clone(),
            Self::Statement => record.statement.clone(),
            Self::Timestamp => record.timestamp.clone(),
        }
    }
}

/// Annotation log kept as a CSV file.
///
/// Files produced without a `timestamp` column keep their layout: new rows
/// follow whatever column order the existing header declares.
#[derive(Debug)]
pub struct CsvAnnotationStore {
    path: PathBuf,
}

impl CsvAnnotationStore {
    /// Opens the log, checking the header of an existing file up front.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let store = Self {
            path: path.to_path_buf(),
        };
        if let Some(columns) = store.read_header()? {
            debug!(
                path = %store.path.display(),
                columns = columns.len(),
                "opened existing annotation log"
            );
        }
        Ok(store)
    }

    fn read_header(&self) -> Result<Option<Vec<Column>>, StorageError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::io(&self.path, err)),
        };

        // Blank lines before the header are skipped, matching `parse_records`.
        let mut reader = BufReader::new(file);
        let mut first_line = String::new();
        loop {
            first_line.clear();
            let count = reader
                .read_line(&mut first_line)
                .map_err(|err| StorageError::io(&self.path, err))?;
            if count == 0 {
                return Ok(None);
            }
            if !first_line.trim_start_matches('\u{feff}').trim().is_empty() {
                break;
            }
        }

        let records = parse_records(&first_line).map_err(|(_, reason)| self.header_error(reason))?;
        let header = records
            .into_iter()
            .next()
            .ok_or_else(|| self.header_error("empty header".to_string()))?;

        self.columns_from_header(&header.fields).map(Some)
    }

    fn columns_from_header(&self, names: &[String]) -> Result<Vec<Column>, StorageError> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let column = Column::from_name(name)
                .ok_or_else(|| self.header_error(format!("unknown column `{name}`")))?;
            if columns.contains(&column) {
                return Err(self.header_error(format!("duplicate column `{name}`")));
            }
            columns.push(column);
        }

        if let Some(missing) = Column::ALL
            .into_iter()
            .find(|column| column.is_required() && !columns.contains(column))
        {
            return Err(self.header_error(format!("missing column `{}`", missing.name())));
        }

        Ok(columns)
    }

    fn header_error(&self, reason: String) -> StorageError {
        StorageError::Header {
            path: self.path.clone(),
            reason,
        }
    }

    fn row_error(&self, line: usize, reason: String) -> StorageError {
        StorageError::Row {
            path: self.path.clone(),
            line,
            reason,
        }
    }

    fn decode_row(&self, columns: &[Column], record: Record) -> Result<Annotation, StorageError> {
        if record.fields.len() != columns.len() {
            return Err(self.row_error(
                record.line,
                format!(
                    "expected {} fields, found {}",
                    columns.len(),
                    record.fields.len()
                ),
            ));
        }

        let mut annotation = Annotation {
            item_id: String::new(),
            rater_id: String::new(),
            score: 0,
            justification: String::new(),
            context: String::new(),
            statement: String::new(),
            timestamp: String::new(),
        };

        for (column, value) in columns.iter().zip(record.fields) {
            match column {
                Column::ItemId => annotation.item_id = value,
                Column::RaterId => annotation.rater_id = value,
                Column::Score => {
                    annotation.score = parse_score(&value).ok_or_else(|| {
                        self.row_error(record.line, format!("invalid score `{value}`"))
                    })?
                }
                Column::Justification => annotation.justification = value,
                Column::Context => annotation.context = value,
                Column::Statement => annotation.statement = value,
                Column::Timestamp => annotation.timestamp = value,
            }
        }

        Ok(annotation)
    }
}

/// Scores written by a dataframe may carry a `.0` suffix.
fn parse_score(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    raw.parse::<u32>().ok().or_else(|| {
        let value = raw.parse::<f64>().ok()?;
        (value.fract() == 0.0 && value >= 0.0 && value <= f64::from(u32::MAX))
            .then_some(value as u32)
    })
}

fn ends_with_newline(file: &mut File, len: u64) -> std::io::Result<bool> {
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0_u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn write_and_sync(file: &mut File, payload: &[u8]) -> std::io::Result<()> {
    file.write_all(payload)?;
    file.flush()?;
    file.sync_data()
}

impl AnnotationStore for CsvAnnotationStore {
    fn append(&mut self, record: &Annotation) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| StorageError::io(parent, err))?;
            }
        }

        let existing_columns = self.read_header()?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| StorageError::io(&self.path, err))?;
        let original_len = file
            .metadata()
            .map_err(|err| StorageError::io(&self.path, err))?
            .len();

        let mut payload = String::new();
        let columns = match existing_columns {
            Some(columns) => {
                if !ends_with_newline(&mut file, original_len)
                    .map_err(|err| StorageError::io(&self.path, err))?
                {
                    payload.push('\n');
                }
                columns
            }
            None => {
                if original_len > 0 {
                    // Whitespace-only file: start the log fresh after it.
                    payload.push('\n');
                }
                payload.push_str(&encode_record(Column::ALL.iter().map(|column| column.name())));
                Column::ALL.to_vec()
            }
        };

        let values: Vec<String> = columns.iter().map(|column| column.value(record)).collect();
        payload.push_str(&encode_record(values.iter().map(String::as_str)));

        if let Err(err) = write_and_sync(&mut file, payload.as_bytes()) {
            if let Err(rollback) = file.set_len(original_len) {
                warn!(
                    path = %self.path.display(),
                    error = %rollback,
                    "failed to roll back partial annotation write"
                );
            }
            return Err(StorageError::io(&self.path, err));
        }

        Ok(())
    }

    fn annotations(&self) -> Result<Vec<Annotation>, StorageError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::io(&self.path, err)),
        };

        let mut records = parse_records(&text)
            .map_err(|(line, reason)| self.row_error(line, reason))?
            .into_iter();

        let Some(header) = records.next() else {
            return Ok(Vec::new());
        };
        let columns = self.columns_from_header(&header.fields)?;

        records
            .map(|record| self.decode_row(&columns, record))
            .collect()
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(item_id: &str, rater_id: &str, score: u32, justification: &str) -> Annotation {
        Annotation {
            item_id: item_id.to_string(),
            rater_id: rater_id.to_string(),
            score,
            justification: justification.to_string(),
            context: "first | second".to_string(),
            statement: "We should, \"clearly\", act.".to_string(),
            timestamp: "2026-01-02T03:04:05Z".to_string(),
        }
    }

    #[test]
    fn append_creates_file_with_header_and_parent_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data").join("annotations.csv");
        let mut store = CsvAnnotationStore::open(&path).expect("open");

        assert_eq!(store.row_count().expect("count"), 0);
        store
            .append(&annotation("s-1", "r1", 4, "Uses technical terms."))
            .expect("append");

        let text = fs::read_to_string(&path).expect("read");
        assert!(text.starts_with(
            "item_id,rater_id,score,justification,context,statement,timestamp\n"
        ));
        assert_eq!(store.row_count().expect("count"), 1);
        assert_eq!(
            store.annotations().expect("rows")[0],
            annotation("s-1", "r1", 4, "Uses technical terms.")
        );
    }

    #[test]
    fn append_preserves_existing_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("annotations.csv");
        let mut store = CsvAnnotationStore::open(&path).expect("open");

        store
            .append(&annotation("s-1", "r1", 2, "line one\nline two"))
            .expect("first append");
        let before = fs::read(&path).expect("read before");

        store
            .append(&annotation("s-2", "r1", 5, "cites data, precise"))
            .expect("second append");
        let after = fs::read(&path).expect("read after");

        assert!(after.len() > before.len());
        assert_eq!(&after[..before.len()], before.as_slice());
        assert_eq!(store.row_count().expect("count"), 2);
    }

    #[test]
    fn legacy_header_without_timestamp_keeps_its_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("annotations.csv");
        fs::write(
            &path,
            "item_id,rater_id,score,justification,context,statement\ns-1,r1,3.0,ok,,text",
        )
        .expect("seed");

        let mut store = CsvAnnotationStore::open(&path).expect("open");
        store
            .append(&annotation("s-2", "r1", 1, "vague"))
            .expect("append");

        let text = fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "s-1,r1,3.0,ok,,text");
        assert_eq!(
            lines[2],
            "s-2,r1,1,vague,first | second,\"We should, \"\"clearly\"\", act.\""
        );

        let rows = store.annotations().expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].score, 3);
        assert_eq!(rows[0].timestamp, "");
        assert_eq!(rows[1].timestamp, "");
    }

    #[test]
    fn unknown_header_is_rejected_and_file_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("annotations.csv");
        let original = "id,who,value\n1,2,3\n";
        fs::write(&path, original).expect("seed");

        assert!(matches!(
            CsvAnnotationStore::open(&path),
            Err(StorageError::Header { .. })
        ));

        let mut store = CsvAnnotationStore { path: path.clone() };
        assert!(matches!(
            store.append(&annotation("s-1", "r1", 3, "x")),
            Err(StorageError::Header { .. })
        ));
        assert_eq!(fs::read_to_string(&path).expect("read"), original);
    }

    #[test]
    fn append_to_directory_path_fails_with_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = CsvAnnotationStore {
            path: dir.path().to_path_buf(),
        };

        assert!(matches!(
            store.append(&annotation("s-1", "r1", 3, "x")),
            Err(StorageError::Io { .. })
        ));
    }

    #[test]
    fn latest_for_prefers_most_recent_row() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("annotations.csv");
        let mut store = CsvAnnotationStore::open(&path).expect("open");

        store.append(&annotation("s-1", "r1", 2, "first")).expect("append");
        store.append(&annotation("s-1", "r2", 4, "other rater")).expect("append");
        store.append(&annotation("s-1", "r1", 5, "revised")).expect("append");

        let latest = store
            .latest_for("s-1", "r1")
            .expect("lookup")
            .expect("present");
        assert_eq!(latest.score, 5);
        assert_eq!(latest.justification, "revised");
        assert!(store.latest_for("s-2", "r1").expect("lookup").is_none());

        let completed = store.completed_item_ids("r2").expect("completed");
        assert_eq!(completed.len(), 1);
        assert!(completed.contains("s-1"));
    }

    #[test]
    fn leading_blank_lines_do_not_duplicate_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("annotations.csv");
        fs::write(
            &path,
            "\n\nitem_id,rater_id,score,justification,context,statement\ns-1,r1,3,ok,,text\n",
        )
        .expect("seed");

        let mut store = CsvAnnotationStore::open(&path).expect("open");
        assert_eq!(store.row_count().expect("count before"), 1);

        store
            .append(&annotation("s-2", "r1", 4, "structured"))
            .expect("append");

        let text = fs::read_to_string(&path).expect("read");
        assert_eq!(text.matches("item_id,rater_id").count(), 1);

        let rows = store.annotations().expect("log stays readable");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].item_id, "s-2");
        assert_eq!(rows[1].timestamp, "");
    }

    #[test]
    fn malformed_row_is_reported_with_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("annotations.csv");
        fs::write(
            &path,
            "item_id,rater_id,score,justification,context,statement\ns-1,r1,high,ok,,text\n",
        )
        .expect("seed");

        let store = CsvAnnotationStore::open(&path).expect("open");
        assert!(matches!(
            store.annotations(),
            Err(StorageError::Row { line: 2, .. })
        ));
    }
}
