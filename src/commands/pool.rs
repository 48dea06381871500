use anyhow::{Context, Result};
use tracing::info;

use crate::cli::PoolArgs;
use crate::model::{PoolItemEntry, PoolManifest};
use crate::pool::load_pool;
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

pub fn run(args: PoolArgs) -> Result<()> {
    let manifest = build_manifest(&args)?;

    info!(
        pool = %manifest.pool_path,
        items = manifest.item_count,
        sha256 = %manifest.sha256,
        "pool validated"
    );

    if args.dry_run {
        info!("pool dry-run complete");
        return Ok(());
    }

    let Some(manifest_path) = args.manifest_path else {
        return Ok(());
    };

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote pool manifest");

    Ok(())
}

pub fn build_manifest(args: &PoolArgs) -> Result<PoolManifest> {
    let pool = load_pool(&args.pool_path, args.limit)
        .with_context(|| format!("failed to load pool {}", args.pool_path.display()))?;
    let sha256 = sha256_file(&args.pool_path)?;

    let items: Vec<PoolItemEntry> = pool
        .iter()
        .map(|item| PoolItemEntry {
            id: item.id.clone(),
            topic: item.topic.clone(),
            speaker: item.speaker.clone(),
            context_len: item.context.len(),
            statement_chars: item.statement.chars().count(),
        })
        .collect();

    Ok(PoolManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        pool_path: args.pool_path.display().to_string(),
        sha256,
        item_limit: args.limit,
        item_count: items.len(),
        items,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn run_writes_manifest_with_limit_applied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool_path = dir.path().join("sampled_speeches.json");
        fs::write(
            &pool_path,
            r#"{"speeches": [
                {"speech_id": "a", "text": "One.", "context": ["x", "y"], "topic": "Tax"},
                {"speech_id": "b", "text": "Two."}
            ]}"#,
        )
        .expect("write pool");
        let manifest_path = dir.path().join("manifests").join("pool.json");

        run(PoolArgs {
            pool_path: pool_path.clone(),
            manifest_path: Some(manifest_path.clone()),
            limit: Some(1),
            dry_run: false,
        })
        .expect("pool command succeeds");

        let raw = fs::read(&manifest_path).expect("manifest written");
        let manifest: PoolManifest = serde_json::from_slice(&raw).expect("manifest parses");
        assert_eq!(manifest.item_count, 1);
        assert_eq!(manifest.item_limit, Some(1));
        assert_eq!(manifest.items[0].id, "a");
        assert_eq!(manifest.items[0].context_len, 2);
        assert_eq!(manifest.items[0].topic.as_deref(), Some("Tax"));
        assert_eq!(manifest.sha256.len(), 64);
    }

    #[test]
    fn dry_run_skips_manifest_and_malformed_pool_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool_path = dir.path().join("sampled_speeches.json");
        fs::write(&pool_path, r#"[{"id": "a", "text": "One."}]"#).expect("write pool");
        let manifest_path = dir.path().join("pool.json");

        run(PoolArgs {
            pool_path: pool_path.clone(),
            manifest_path: Some(manifest_path.clone()),
            limit: None,
            dry_run: true,
        })
        .expect("dry run succeeds");
        assert!(!manifest_path.exists());

        fs::write(&pool_path, r#"[{"id": "a"}]"#).expect("write pool");
        let err = run(PoolArgs {
            pool_path,
            manifest_path: None,
            limit: None,
            dry_run: false,
        })
        .expect_err("malformed pool fails");
        assert!(format!("{err:#}").contains("missing field `text`"));
    }
}
