use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::DataFormatError;
use crate::model::SampledItem;

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(alias = "id")]
    speech_id: Option<RawId>,
    #[serde(alias = "statement")]
    text: Option<String>,
    context: Option<RawContext>,
    topic: Option<String>,
    speaker: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContext {
    Many(Vec<String>),
    One(String),
}

/// Loads the ordered pool of items from a JSON file.
///
/// Accepts either `{"speeches": [...]}` or a bare array. Every item is
/// validated before `limit` truncates the pool, so a malformed file fails
/// regardless of how many items a session would show.
pub fn load_pool(path: &Path, limit: Option<usize>) -> Result<Vec<SampledItem>, DataFormatError> {
    let raw = fs::read(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => DataFormatError::Missing {
            path: path.to_path_buf(),
        },
        _ => DataFormatError::Unreadable {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let document: Value =
        serde_json::from_slice(&raw).map_err(|source| DataFormatError::InvalidJson {
            path: path.to_path_buf(),
            source,
        })?;

    let entries = match document {
        Value::Array(entries) => entries,
        Value::Object(mut object) => match object.remove("speeches") {
            Some(Value::Array(entries)) => entries,
            _ => {
                return Err(DataFormatError::UnexpectedShape {
                    path: path.to_path_buf(),
                });
            }
        },
        _ => {
            return Err(DataFormatError::UnexpectedShape {
                path: path.to_path_buf(),
            });
        }
    };

    if entries.is_empty() {
        return Err(DataFormatError::Empty {
            path: path.to_path_buf(),
        });
    }

    let mut seen = HashSet::with_capacity(entries.len());
    let mut items = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let item = parse_item(entry).map_err(|message| DataFormatError::InvalidItem {
            path: path.to_path_buf(),
            index,
            message,
        })?;

        if !seen.insert(item.id.clone()) {
            return Err(DataFormatError::DuplicateId {
                path: path.to_path_buf(),
                index,
                id: item.id,
            });
        }

        items.push(item);
    }

    if let Some(limit) = limit {
        items.truncate(limit);
        if items.is_empty() {
            return Err(DataFormatError::Empty {
                path: path.to_path_buf(),
            });
        }
    }

    Ok(items)
}

fn parse_item(entry: Value) -> Result<SampledItem, String> {
    let raw: RawItem = serde_json::from_value(entry).map_err(|err| err.to_string())?;

    let id = match raw.speech_id {
        Some(RawId::Text(text)) => text.trim().to_string(),
        Some(RawId::Number(number)) => number.to_string(),
        None => return Err("missing field `speech_id`".to_string()),
    };
    if id.is_empty() {
        return Err("`speech_id` is empty".to_string());
    }

    let statement = raw
        .text
        .ok_or_else(|| "missing field `text`".to_string())?;
    if statement.trim().is_empty() {
        return Err("`text` is empty".to_string());
    }

    let context = match raw.context {
        Some(RawContext::Many(entries)) => entries,
        Some(RawContext::One(entry)) if entry.trim().is_empty() => Vec::new(),
        Some(RawContext::One(entry)) => vec![entry],
        None => Vec::new(),
    };

    Ok(SampledItem {
        id,
        topic: non_blank(raw.topic),
        speaker: non_blank(raw.speaker),
        context,
        statement,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn write_pool(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("sampled_speeches.json");
        fs::write(&path, body).expect("write pool");
        path
    }

    #[test]
    fn load_pool_reads_wrapped_speeches_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_pool(
            &dir,
            r#"{
              "speeches": [
                {"speech_id": "s-1", "topic": "Energy", "speaker": "A", "text": "First.", "context": ["c1", "c2"]},
                {"speech_id": 7, "text": "Second.", "context": []}
              ]
            }"#,
        );

        let pool = load_pool(&path, None).expect("pool loads");
        assert_eq!(pool.len(), 2);
        assert_eq!(pool[0].id, "s-1");
        assert_eq!(pool[0].topic.as_deref(), Some("Energy"));
        assert_eq!(pool[0].context_column(), "c1 | c2");
        assert_eq!(pool[1].id, "7");
        assert!(pool[1].speaker.is_none());
        assert_eq!(pool[1].context_column(), "");
    }

    #[test]
    fn load_pool_accepts_bare_array_and_aliases() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_pool(
            &dir,
            r#"[{"id": "x", "statement": "Stated.", "context": "single context"}]"#,
        );

        let pool = load_pool(&path, None).expect("pool loads");
        assert_eq!(pool[0].id, "x");
        assert_eq!(pool[0].statement, "Stated.");
        assert_eq!(pool[0].context, vec!["single context".to_string()]);
    }

    #[test]
    fn load_pool_applies_limit_after_validation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_pool(
            &dir,
            r#"[{"id": "a", "text": "1"}, {"id": "b", "text": "2"}, {"id": "c", "text": "3"}, {"id": "d", "text": "4"}]"#,
        );

        let pool = load_pool(&path, Some(3)).expect("pool loads");
        let ids: Vec<&str> = pool.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let bad = write_pool(
            &dir,
            r#"[{"id": "a", "text": "1"}, {"id": "b"}]"#,
        );
        assert!(matches!(
            load_pool(&bad, Some(1)),
            Err(DataFormatError::InvalidItem { index: 1, .. })
        ));
    }

    #[test]
    fn load_pool_rejects_zero_limit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_pool(&dir, r#"[{"id": "a", "text": "1"}]"#);

        assert!(matches!(
            load_pool(&path, Some(0)),
            Err(DataFormatError::Empty { .. })
        ));
    }

    #[test]
    fn load_pool_is_idempotent_for_unchanged_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_pool(
            &dir,
            r#"{"speeches": [{"speech_id": "a", "text": "1", "context": ["x"]}, {"speech_id": "b", "text": "2"}]}"#,
        );

        let first = load_pool(&path, None).expect("first load");
        let second = load_pool(&path, None).expect("second load");
        assert_eq!(first, second);
    }

    #[test]
    fn load_pool_reports_missing_required_field_with_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_pool(&dir, r#"{"speeches": [{"speech_id": "a", "text": "ok"}, {"speech_id": "b"}]}"#);

        let err = load_pool(&path, None).expect_err("missing text must fail");
        match err {
            DataFormatError::InvalidItem { index, message, .. } => {
                assert_eq!(index, 1);
                assert!(message.contains("text"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_pool_rejects_duplicate_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_pool(&dir, r#"[{"id": "a", "text": "1"}, {"id": "a", "text": "2"}]"#);

        assert!(matches!(
            load_pool(&path, None),
            Err(DataFormatError::DuplicateId { index: 1, .. })
        ));
    }

    #[test]
    fn load_pool_distinguishes_missing_invalid_and_empty_files() {
        let dir = tempfile::tempdir().expect("tempdir");

        let missing = dir.path().join("absent.json");
        assert!(matches!(
            load_pool(&missing, None),
            Err(DataFormatError::Missing { .. })
        ));

        let invalid = write_pool(&dir, "{ not json");
        assert!(matches!(
            load_pool(&invalid, None),
            Err(DataFormatError::InvalidJson { .. })
        ));

        let empty = write_pool(&dir, r#"{"speeches": []}"#);
        assert!(matches!(
            load_pool(&empty, None),
            Err(DataFormatError::Empty { .. })
        ));

        let wrong_shape = write_pool(&dir, r#"{"items": []}"#);
        assert!(matches!(
            load_pool(&wrong_shape, None),
            Err(DataFormatError::UnexpectedShape { .. })
        ));
    }
}
