use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::{Annotation, SampledItem};
use crate::pool::load_pool;
use crate::store::open_store;

pub fn run(args: StatusArgs) -> Result<()> {
    let output_path = args
        .output_path
        .clone()
        .unwrap_or_else(|| args.store.default_output_path());

    info!(
        pool = %args.pool_path.display(),
        output = %output_path.display(),
        store = args.store.as_str(),
        "status requested"
    );

    let pool = load_pool(&args.pool_path, args.limit)
        .with_context(|| format!("failed to load pool {}", args.pool_path.display()))?;

    if !output_path.exists() {
        warn!(path = %output_path.display(), "annotation store missing");
        return Ok(());
    }

    let store = open_store(args.store, &output_path)
        .with_context(|| format!("failed to open {}", output_path.display()))?;
    let rows = store
        .annotations()
        .with_context(|| format!("failed to read {}", output_path.display()))?;

    info!(
        path = %output_path.display(),
        rows = rows.len(),
        items = pool.len(),
        "annotation store status"
    );

    let summaries = summarize(&pool, &rows, args.rater_id.as_deref());
    if summaries.is_empty() {
        warn!(rater_id = ?args.rater_id, "no annotations found");
    }
    for summary in summaries {
        info!(
            rater_id = %summary.rater_id,
            completed = summary.completed,
            total = pool.len(),
            rows = summary.rows,
            outside_pool = summary.outside_pool,
            "rater progress"
        );
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
struct RaterSummary {
    rater_id: String,
    completed: usize,
    rows: usize,
    outside_pool: usize,
}

fn summarize(pool: &[SampledItem], rows: &[Annotation], only: Option<&str>) -> Vec<RaterSummary> {
    let pool_ids: HashSet<&str> = pool.iter().map(|item| item.id.as_str()).collect();

    let mut by_rater: BTreeMap<&str, (HashSet<&str>, usize)> = BTreeMap::new();
    for row in rows {
        if only.is_some_and(|rater_id| rater_id != row.rater_id) {
            continue;
        }
        let entry = by_rater.entry(row.rater_id.as_str()).or_default();
        entry.0.insert(row.item_id.as_str());
        entry.1 += 1;
    }

    by_rater
        .into_iter()
        .map(|(rater_id, (items, rows))| RaterSummary {
            rater_id: rater_id.to_string(),
            completed: items.iter().filter(|id| pool_ids.contains(*id)).count(),
            rows,
            outside_pool: items.iter().filter(|id| !pool_ids.contains(*id)).count(),
        })
        .collect()
}
