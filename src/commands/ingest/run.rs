use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tracing::{info, warn};

use super::extract::{command_version_optional, load_layout, load_pages};
use crate::cli::IngestArgs;
use crate::commands::inventory;
use crate::manifest::{
    ChunkerSettings, DocumentEntry, IngestCounts, IngestPaths, IngestRunManifest, InventoryDiff,
    SourceEntry, SourceInventoryManifest, ToolVersions,
};
use pf_normas::chunker::ChunkerConfig;
use pf_normas::export::write_chunks_jsonl;
use pf_normas::model::{Chunk, PARSER_VERSION};
use pf_normas::normalize::NormalizationStats;
use pf_normas::patterns::PatternLibrary;
use pf_normas::pipeline::{DocumentOutput, process_document};
use pf_normas::store::{ChunkStore, DB_SCHEMA_VERSION, StoredDocument};
use pf_normas::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

struct ProcessedSource {
    output: DocumentOutput,
    page_count: usize,
    layout_sidecar: bool,
}

pub fn run(args: IngestArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let cache_root = args.cache_root.clone();
    let manifest_dir = cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;

    let inventory_manifest_path = args
        .inventory_manifest_path
        .clone()
        .unwrap_or_else(|| inventory::default_manifest_path(&cache_root));
    let ingest_manifest_path = args.ingest_manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!(
            "ingest_run_{}.json",
            utc_compact_string(started_ts)
        ))
    });
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| cache_root.join("pf_normas.sqlite"));
    let chunks_jsonl_path = args.export_jsonl.then(|| {
        args.chunks_jsonl
            .clone()
            .unwrap_or_else(|| cache_root.join("exports").join("chunks.jsonl"))
    });

    info!(
        source_dir = %args.source_dir.display(),
        cache_root = %cache_root.display(),
        run_id = %run_id,
        "starting ingest"
    );

    let (inventory, inventory_diff) = load_or_refresh_inventory(
        &args.source_dir,
        &inventory_manifest_path,
        args.refresh_inventory,
    )?;

    let tool_versions = ToolVersions {
        pdftotext: command_version_optional("pdftotext", &["-v"]),
    };

    let patterns = PatternLibrary::new()?;
    let config = args.chunking.chunker_config();
    let pool = ThreadPoolBuilder::new()
        .num_threads(args.jobs.unwrap_or(0))
        .build()
        .context("failed to build ingest worker pool")?;

    let results: Vec<(&SourceEntry, Result<ProcessedSource>)> = pool.install(|| {
        inventory
            .sources
            .par_iter()
            .map(|entry| {
                let result = process_source(
                    &patterns,
                    &args.source_dir,
                    entry,
                    args.max_pages_per_doc,
                    &config,
                );
                (entry, result)
            })
            .collect()
    });

    let mut store = ChunkStore::open(&db_path)?;
    let mut counts = IngestCounts {
        source_count: inventory.source_count,
        ..IngestCounts::default()
    };
    let mut documents = Vec::new();
    let mut warnings = Vec::new();
    let mut exported: Vec<Vec<Chunk>> = Vec::new();
    let mut export_slots: HashMap<String, usize> = HashMap::new();
    let mut doc_sources: HashMap<String, String> = HashMap::new();

    for removed in &inventory_diff.removed {
        let chunks = store.remove_source(removed)?;
        counts.chunks_removed += chunks;
        info!(source = %removed, chunks, "removed vanished source from store");
    }

    for (entry, result) in results {
        let processed = match result {
            Ok(processed) => processed,
            Err(err) => {
                warn!(source = %entry.filename, error = %format!("{err:#}"), "failed to process source");
                warnings.push(format!("{}: {err:#}", entry.filename));
                counts.failed_count += 1;
                continue;
            }
        };
        let output = processed.output;

        if let Some(previous) =
            doc_sources.insert(output.metadata.doc_id.clone(), entry.filename.clone())
        {
            let message = format!(
                "{} and {} resolve to the same doc_id {}; the later source replaces the earlier",
                previous, entry.filename, output.metadata.doc_id
            );
            warn!("{message}");
            warnings.push(message);
        }

        let outcome = store.replace_document(&StoredDocument {
            source_file: &entry.filename,
            source_sha256: &entry.sha256,
            metadata: &output.metadata,
            tree: &output.tree,
            chunks: &output.chunks,
        })?;

        counts.processed_count += 1;
        counts.chunks_inserted += outcome.inserted;
        counts.chunks_unchanged += outcome.unchanged;
        counts.chunks_changed += outcome.changed;
        counts.chunks_removed += outcome.removed;
        counts.chunks_below_token_min += output
            .chunks
            .iter()
            .filter(|chunk| chunk.tokens_estimated < args.chunking.token_min)
            .count();
        counts.chunks_above_token_max += output
            .chunks
            .iter()
            .filter(|chunk| chunk.tokens_estimated > args.chunking.token_max)
            .count();
        accumulate_normalization(&mut counts.normalization, &output.normalization);

        info!(
            source = %entry.filename,
            doc_id = %output.metadata.doc_id,
            chunks = output.chunks.len(),
            inserted = outcome.inserted,
            changed = outcome.changed,
            unchanged = outcome.unchanged,
            removed = outcome.removed,
            "document ingested"
        );

        documents.push(DocumentEntry {
            source_file: entry.filename.clone(),
            doc_id: output.metadata.doc_id.clone(),
            page_count: processed.page_count,
            node_count: output.tree.node_count(),
            chunk_count: output.chunks.len(),
            layout_sidecar: processed.layout_sidecar,
        });

        if chunks_jsonl_path.is_some() {
            // Same slot per doc_id so the export mirrors what the store keeps.
            match export_slots.get(&output.metadata.doc_id) {
                Some(slot) => exported[*slot] = output.chunks,
                None => {
                    export_slots.insert(output.metadata.doc_id.clone(), exported.len());
                    exported.push(output.chunks);
                }
            }
        }
    }

    if let Some(path) = &chunks_jsonl_path {
        counts.chunks_exported = write_chunks_jsonl(path, exported.iter().flatten())?;
        info!(path = %path.display(), chunks = counts.chunks_exported, "exported chunks jsonl");
    }

    let totals = store.counts()?;
    counts.docs_total = totals.docs;
    counts.nodes_total = totals.nodes;
    counts.chunks_total = totals.chunks;

    let manifest = IngestRunManifest {
        manifest_version: 1,
        run_id,
        parser_version: PARSER_VERSION.to_string(),
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: if counts.failed_count == 0 {
            "completed".to_string()
        } else {
            "completed_with_failures".to_string()
        },
        started_at,
        updated_at: now_utc_string(),
        command: render_ingest_command(&args),
        tool_versions,
        paths: IngestPaths {
            source_dir: args.source_dir.display().to_string(),
            cache_root: cache_root.display().to_string(),
            manifest_dir: manifest_dir.display().to_string(),
            inventory_manifest_path: inventory_manifest_path.display().to_string(),
            db_path: db_path.display().to_string(),
            chunks_jsonl_path: chunks_jsonl_path
                .as_ref()
                .map(|path| path.display().to_string()),
        },
        chunker: ChunkerSettings {
            token_max: args.chunking.token_max,
            token_min: args.chunking.token_min,
            chars_per_token: args.chunking.chars_per_token,
        },
        counts,
        inventory_diff,
        documents,
        source_hashes: inventory.sources,
        warnings,
    };

    write_json_pretty(&ingest_manifest_path, &manifest)?;

    info!(path = %ingest_manifest_path.display(), "wrote ingest run manifest");
    info!(
        docs = manifest.counts.docs_total,
        chunks = manifest.counts.chunks_total,
        failed = manifest.counts.failed_count,
        "ingest completed"
    );

    Ok(())
}

fn process_source(
    patterns: &PatternLibrary,
    source_dir: &Path,
    entry: &SourceEntry,
    max_pages_per_doc: Option<usize>,
    config: &ChunkerConfig,
) -> Result<ProcessedSource> {
    let path = source_dir.join(&entry.filename);
    let pages = load_pages(&path, max_pages_per_doc)?;
    let layout = load_layout(&path)?;
    let output = process_document(patterns, &entry.filename, &pages, layout.as_ref(), config);

    Ok(ProcessedSource {
        page_count: pages.len(),
        layout_sidecar: layout.is_some(),
        output,
    })
}

/// Uses the stored inventory unless it is missing or a refresh is requested;
/// the diff is only non-empty when a new inventory was built.
fn load_or_refresh_inventory(
    source_dir: &Path,
    inventory_manifest_path: &Path,
    refresh_inventory: bool,
) -> Result<(SourceInventoryManifest, InventoryDiff)> {
    let previous = inventory::load_manifest(inventory_manifest_path)?;

    match previous {
        Some(manifest) if !refresh_inventory => {
            info!(
                path = %inventory_manifest_path.display(),
                source_count = manifest.source_count,
                "loaded existing inventory manifest"
            );
            Ok((manifest, InventoryDiff::default()))
        }
        previous => {
            let manifest = inventory::build_manifest(source_dir)?;
            let diff = inventory::diff_inventory(previous.as_ref(), &manifest);
            write_json_pretty(inventory_manifest_path, &manifest)?;
            info!(
                path = %inventory_manifest_path.display(),
                source_count = manifest.source_count,
                added = diff.added.len(),
                modified = diff.modified.len(),
                removed = diff.removed.len(),
                "refreshed inventory manifest"
            );
            Ok((manifest, diff))
        }
    }
}

fn accumulate_normalization(total: &mut NormalizationStats, stats: &NormalizationStats) {
    total.header_lines_removed += stats.header_lines_removed;
    total.footer_lines_removed += stats.footer_lines_removed;
    total.dehyphenation_merges += stats.dehyphenation_merges;
    total.marker_joins += stats.marker_joins;
}

pub(super) fn render_ingest_command(args: &IngestArgs) -> String {
    let mut command = vec![
        "pf-normas".to_string(),
        "ingest".to_string(),
        "--source-dir".to_string(),
        args.source_dir.display().to_string(),
        "--cache-root".to_string(),
        args.cache_root.display().to_string(),
    ];

    if let Some(path) = &args.inventory_manifest_path {
        command.push("--inventory-manifest-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.ingest_manifest_path {
        command.push("--ingest-manifest-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.db_path {
        command.push("--db-path".to_string());
        command.push(path.display().to_string());
    }
    if args.refresh_inventory {
        command.push("--refresh-inventory".to_string());
    }
    command.push("--export-jsonl".to_string());
    command.push(args.export_jsonl.to_string());
    if let Some(path) = &args.chunks_jsonl {
        command.push("--chunks-jsonl".to_string());
        command.push(path.display().to_string());
    }
    if let Some(jobs) = args.jobs {
        command.push("--jobs".to_string());
        command.push(jobs.to_string());
    }
    if let Some(max_pages) = args.max_pages_per_doc {
        command.push("--max-pages-per-doc".to_string());
        command.push(max_pages.to_string());
    }
    command.push("--token-max".to_string());
    command.push(args.chunking.token_max.to_string());
    command.push("--token-min".to_string());
    command.push(args.chunking.token_min.to_string());
    command.push("--chars-per-token".to_string());
    command.push(args.chunking.chars_per_token.to_string());

    command.join(" ")
}
