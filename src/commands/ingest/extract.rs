use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::commands::inventory::SourceKind;
use pf_normas::layout::{LayoutMap, load_layout_map, sidecar_path};
use pf_normas::model::NormalizedPage;

/// Raw pages of a source, numbered from 1. PDFs go through `pdftotext`;
/// text files are split on form feeds the same way.
pub fn load_pages(path: &Path, max_pages_per_doc: Option<usize>) -> Result<Vec<NormalizedPage>> {
    let Some(kind) = SourceKind::from_path(path) else {
        bail!("unsupported source type: {}", path.display());
    };

    let pages = match kind {
        SourceKind::Pdf => extract_pages_with_pdftotext(path, max_pages_per_doc)?,
        SourceKind::Text => {
            let raw = fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let mut pages = split_pages(&String::from_utf8_lossy(&raw));
            if let Some(max_pages) = max_pages_per_doc {
                pages.truncate(max_pages);
            }
            pages
        }
    };

    debug!(path = %path.display(), pages = pages.len(), "extracted pages");
    Ok(numbered_pages(pages))
}

/// Layout blocks from the `<source>.layout.json` sidecar, when one exists.
pub fn load_layout(path: &Path) -> Result<Option<LayoutMap>> {
    let sidecar = sidecar_path(path);
    if !sidecar.exists() {
        return Ok(None);
    }
    let layout = load_layout_map(&sidecar)?;
    info!(path = %sidecar.display(), pages = layout.len(), "loaded layout sidecar");
    Ok(Some(layout))
}

fn extract_pages_with_pdftotext(
    pdf_path: &Path,
    max_pages_per_doc: Option<usize>,
) -> Result<Vec<String>> {
    let mut command = Command::new("pdftotext");
    command.arg("-enc").arg("UTF-8").arg("-f").arg("1");
    if let Some(max_pages) = max_pages_per_doc {
        command.arg("-l").arg(max_pages.to_string());
    }
    command.arg(pdf_path).arg("-");

    let output = command
        .output()
        .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    Ok(split_pages(&String::from_utf8_lossy(&output.stdout)))
}

/// Splits on form feeds, drops NUL bytes and trailing blank pages.
pub(super) fn split_pages(raw: &str) -> Vec<String> {
    let mut pages: Vec<String> = raw
        .split('\u{000C}')
        .map(|chunk| chunk.replace('\u{0000}', ""))
        .collect();

    while pages.last().is_some_and(|page| page.trim().is_empty()) {
        pages.pop();
    }

    pages
}

fn numbered_pages(pages: Vec<String>) -> Vec<NormalizedPage> {
    pages
        .into_iter()
        .zip(1u32..)
        .map(|(text, index)| NormalizedPage { index, text })
        .collect()
}

pub fn command_version_optional(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let source = if stdout.trim().is_empty() {
        stderr.trim()
    } else {
        stdout.trim()
    };

    source
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
}
