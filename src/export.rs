use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::model::Chunk;
use crate::util::ensure_directory;

/// Writes one compact JSON record per line and returns how many were written.
pub fn write_chunks_jsonl<'a>(
    path: &Path,
    chunks: impl IntoIterator<Item = &'a Chunk>,
) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }

    let file = File::create(path)
        .with_context(|| format!("failed to create jsonl file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0usize;

    for chunk in chunks {
        serde_json::to_writer(&mut writer, chunk)
            .with_context(|| format!("failed to serialize chunk {}", chunk.anchor_id))?;
        writer
            .write_all(b"\n")
            .with_context(|| format!("failed to write {}", path.display()))?;
        written += 1;
    }

    writer
        .flush()
        .with_context(|| format!("failed to flush jsonl file: {}", path.display()))?;
    Ok(written)
}
