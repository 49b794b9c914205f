//! Layout blocks supplied by an upstream layout-aware extractor.
//!
//! Blocks arrive grouped by page number with absolute offsets into the full
//! document text. The chunker only consumes `table` blocks.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::PageSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Text,
    Table,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutBlock {
    #[serde(rename = "type")]
    pub kind: BlockKind,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
    pub page_no: u32,
    #[serde(default)]
    pub start: Option<usize>,
    #[serde(default)]
    pub end: Option<usize>,
}

impl LayoutBlock {
    /// `None` when the block lacks offsets and cannot be placed.
    pub fn overlaps(&self, start: usize, end: usize) -> Option<bool> {
        let block_start = self.start?;
        let block_end = self.end?;
        Some(!(block_end <= start || block_start >= end))
    }
}

pub type LayoutMap = BTreeMap<u32, Vec<LayoutBlock>>;

/// Sidecar path for a source document: `portaria.pdf` -> `portaria.pdf.layout.json`.
pub fn sidecar_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_os_string();
    name.push(".layout.json");
    PathBuf::from(name)
}

pub fn load_layout_map(path: &Path) -> Result<LayoutMap> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let map: LayoutMap = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse layout blocks in {}", path.display()))?;
    Ok(map)
}

/// Table blocks on `pages` whose span intersects `[start, end)`.
///
/// Blocks without offsets are skipped; table enrichment never blocks a chunk.
pub fn overlapping_tables(
    layout: &LayoutMap,
    pages: &[u32],
    start: usize,
    end: usize,
) -> Vec<LayoutBlock> {
    let mut refs = Vec::new();
    for page in pages {
        let Some(blocks) = layout.get(page) else {
            continue;
        };
        for block in blocks.iter().filter(|block| block.kind == BlockKind::Table) {
            match block.overlaps(start, end) {
                Some(true) => refs.push(block.clone()),
                Some(false) => {}
                None => {
                    debug!(page = block.page_no, "skipping table block without offsets");
                }
            }
        }
    }
    refs
}

/// Page indices whose span touches `[start, end)`.
pub fn pages_touching(spans: &[PageSpan], start: usize, end: usize) -> Vec<u32> {
    spans
        .iter()
        .filter(|span| span.overlaps(start, end))
        .map(|span| span.index)
        .collect()
}
