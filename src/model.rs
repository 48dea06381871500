use serde::{Deserialize, Serialize};

/// Separator used when a list of context speeches is stored as one column.
pub const CONTEXT_SEPARATOR: &str = " | ";

/// One speech to annotate, loaded from the input pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampledItem {
    pub id: String,
    pub topic: Option<String>,
    pub speaker: Option<String>,
    pub context: Vec<String>,
    pub statement: String,
}

impl SampledItem {
    pub fn context_column(&self) -> String {
        self.context.join(CONTEXT_SEPARATOR)
    }
}

/// One rater's judgment for one item, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub item_id: String,
    pub rater_id: String,
    pub score: u32,
    pub justification: String,
    pub context: String,
    pub statement: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolItemEntry {
    pub id: String,
    pub topic: Option<String>,
    pub speaker: Option<String>,
    pub context_len: usize,
    pub statement_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub pool_path: String,
    pub sha256: String,
    pub item_limit: Option<usize>,
    pub item_count: usize,
    pub items: Vec<PoolItemEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub rater_id: String,
    pub completed: usize,
    pub total: usize,
    pub current_index: usize,
    pub done: bool,
}
