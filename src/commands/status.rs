use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::inventory;
use crate::manifest::IngestRunSummary;
use pf_normas::store::ChunkStore;
use pf_normas::util::read_json;

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = args.cache_root.join("manifests");
    let inventory_path = inventory::default_manifest_path(&args.cache_root);
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join("pf_normas.sqlite"));

    info!(cache_root = %args.cache_root.display(), "status requested");

    match inventory::load_manifest(&inventory_path)? {
        Some(inventory) => info!(
            generated_at = %inventory.generated_at,
            source_count = inventory.source_count,
            "loaded inventory manifest"
        ),
        None => warn!(path = %inventory_path.display(), "inventory manifest missing"),
    }

    match latest_ingest_manifest(&manifest_dir)? {
        Some(path) => {
            let summary: IngestRunSummary = read_json(&path)?;
            info!(
                run_id = %summary.run_id,
                status = %summary.status,
                updated_at = %summary.updated_at,
                parser_version = %summary.parser_version,
                warnings = summary.warnings.len(),
                "loaded latest ingest manifest"
            );
        }
        None => warn!(path = %manifest_dir.display(), "no ingest run manifest found"),
    }

    if db_path.exists() {
        let store = ChunkStore::open(&db_path)?;
        let counts = store.counts()?;
        info!(
            path = %db_path.display(),
            schema_version = %store.schema_version()?.unwrap_or_default(),
            docs = counts.docs,
            nodes = counts.nodes,
            chunks = counts.chunks,
            "database status"
        );
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    Ok(())
}

/// `ingest_run_<timestamp>.json` with the greatest timestamp.
fn latest_ingest_manifest(manifest_dir: &Path) -> Result<Option<PathBuf>> {
    if !manifest_dir.exists() {
        return Ok(None);
    }

    let mut latest: Option<PathBuf> = None;
    let entries = fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to read {}", manifest_dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to read entry in {}", manifest_dir.display()))?
            .path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !(name.starts_with("ingest_run_") && name.ends_with(".json")) {
            continue;
        }
        if latest
            .as_ref()
            .and_then(|current| current.file_name())
            .is_none_or(|current| current < OsStr::new(name))
        {
            latest = Some(path);
        }
    }

    Ok(latest)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn latest_ingest_manifest_picks_newest_timestamp() {
        let dir = tempdir().expect("tempdir");
        assert!(
            latest_ingest_manifest(&dir.path().join("missing"))
                .expect("missing dir is fine")
                .is_none()
        );

        for name in [
            "ingest_run_20240101T000000Z.json",
            "ingest_run_20240315T120000Z.json",
            "source_inventory.json",
            "calibration.json",
        ] {
            fs::write(dir.path().join(name), "{}").expect("write manifest");
        }

        let latest = latest_ingest_manifest(dir.path())
            .expect("scan succeeds")
            .expect("manifest found");
        assert_eq!(
            latest.file_name().and_then(|name| name.to_str()),
            Some("ingest_run_20240315T120000Z.json")
        );
    }
}
