use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::InventoryArgs;
use crate::manifest::{InventoryDiff, SourceEntry, SourceInventoryManifest};
use pf_normas::util::{now_utc_string, read_json, sha256_file, write_json_pretty};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Text,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(|ext| ext.to_str())?;
        if ext.eq_ignore_ascii_case("pdf") {
            Some(Self::Pdf)
        } else if ext.eq_ignore_ascii_case("txt") {
            Some(Self::Text)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "txt",
        }
    }
}

pub fn run(args: InventoryArgs) -> Result<()> {
    let manifest_path = args
        .manifest_path
        .clone()
        .unwrap_or_else(|| default_manifest_path(&args.cache_root));

    let manifest = build_manifest(&args.source_dir)?;
    let previous = load_manifest(&manifest_path)?;
    let diff = diff_inventory(previous.as_ref(), &manifest);

    if diff.is_empty() {
        info!("inventory unchanged since previous manifest");
    } else {
        info!(
            added = diff.added.len(),
            modified = diff.modified.len(),
            removed = diff.removed.len(),
            "inventory diff against previous manifest"
        );
    }

    if args.dry_run {
        info!(
            source_count = manifest.source_count,
            source = %manifest.source_directory,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote inventory manifest");
    info!(source_count = manifest.source_count, "inventory completed");

    Ok(())
}

pub fn default_manifest_path(cache_root: &Path) -> PathBuf {
    cache_root.join("manifests").join("source_inventory.json")
}

pub fn build_manifest(source_dir: &Path) -> Result<SourceInventoryManifest> {
    let mut paths = discover_sources(source_dir)?;
    paths.sort();

    if paths.is_empty() {
        bail!("no PDF or TXT sources found in {}", source_dir.display());
    }

    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;
        let Some(kind) = SourceKind::from_path(&path) else {
            continue;
        };
        let size_bytes = fs::metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();

        sources.push(SourceEntry {
            filename,
            kind: kind.as_str().to_string(),
            size_bytes,
            sha256: sha256_file(&path)?,
        });
    }

    Ok(SourceInventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_directory: source_dir.display().to_string(),
        source_count: sources.len(),
        sources,
    })
}

/// `.pdf` and `.txt` files directly inside `source_dir`.
pub fn discover_sources(source_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();

    let entries = fs::read_dir(source_dir)
        .with_context(|| format!("failed to read {}", source_dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", source_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        if SourceKind::from_path(&path).is_some() {
            sources.push(path);
        }
    }

    Ok(sources)
}

pub fn load_manifest(path: &Path) -> Result<Option<SourceInventoryManifest>> {
    if !path.exists() {
        return Ok(None);
    }
    read_json(path).map(Some)
}

/// Filenames added, re-hashed or gone since `previous`. Without a previous
/// manifest every current source counts as added.
pub fn diff_inventory(
    previous: Option<&SourceInventoryManifest>,
    current: &SourceInventoryManifest,
) -> InventoryDiff {
    let before = previous
        .map(|manifest| {
            manifest
                .sources
                .iter()
                .map(|entry| (entry.filename.as_str(), entry.sha256.as_str()))
                .collect::<BTreeMap<&str, &str>>()
        })
        .unwrap_or_default();
    let after = current
        .sources
        .iter()
        .map(|entry| (entry.filename.as_str(), entry.sha256.as_str()))
        .collect::<BTreeMap<&str, &str>>();

    let mut diff = InventoryDiff::default();
    for (filename, sha256) in &after {
        match before.get(filename) {
            None => diff.added.push(filename.to_string()),
            Some(old) if old != sha256 => diff.modified.push(filename.to_string()),
            Some(_) => {}
        }
    }
    diff.removed = before
        .keys()
        .filter(|filename| !after.contains_key(*filename))
        .map(|filename| filename.to_string())
        .collect();
    diff
}
