use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use pf_normas::normalize::NormalizationStats;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub filename: String,
    pub kind: String,
    pub size_bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directory: String,
    pub source_count: usize,
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDiff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl InventoryDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolVersions {
    pub pdftotext: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestPaths {
    pub source_dir: String,
    pub cache_root: String,
    pub manifest_dir: String,
    pub inventory_manifest_path: String,
    pub db_path: String,
    pub chunks_jsonl_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkerSettings {
    pub token_max: usize,
    pub token_min: usize,
    pub chars_per_token: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestCounts {
    pub source_count: usize,
    pub processed_count: usize,
    pub failed_count: usize,
    pub docs_total: i64,
    pub nodes_total: i64,
    pub chunks_total: i64,
    pub chunks_inserted: usize,
    pub chunks_unchanged: usize,
    pub chunks_changed: usize,
    pub chunks_removed: usize,
    pub chunks_exported: usize,
    pub chunks_below_token_min: usize,
    pub chunks_above_token_max: usize,
    pub normalization: NormalizationStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentEntry {
    pub source_file: String,
    pub doc_id: String,
    pub page_count: usize,
    pub node_count: usize,
    pub chunk_count: usize,
    pub layout_sidecar: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub parser_version: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub tool_versions: ToolVersions,
    pub paths: IngestPaths,
    pub chunker: ChunkerSettings,
    pub counts: IngestCounts,
    pub inventory_diff: InventoryDiff,
    pub documents: Vec<DocumentEntry>,
    pub source_hashes: Vec<SourceEntry>,
    pub warnings: Vec<String>,
}

/// Minimal view of an ingest manifest, enough for `status`.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRunSummary {
    pub run_id: String,
    pub status: String,
    pub updated_at: String,
    pub parser_version: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TokenDistribution {
    pub count: usize,
    pub min: usize,
    pub p50: usize,
    pub p90: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationFileReport {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenDistribution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestedThresholds {
    pub token_min: usize,
    pub token_max: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationReport {
    pub manifest_version: u32,
    pub generated_at: String,
    pub parser_version: String,
    pub source_directory: String,
    pub files: usize,
    pub pattern_hits: BTreeMap<String, usize>,
    pub examples: BTreeMap<String, Vec<String>>,
    pub reports: Vec<CalibrationFileReport>,
    pub tokens: Option<TokenDistribution>,
    pub suggested_thresholds: Option<SuggestedThresholds>,
}
