use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::CalibrateArgs;
use crate::commands::ingest::load_pages;
use crate::commands::inventory::discover_sources;
use crate::manifest::{
    CalibrationFileReport, CalibrationReport, SuggestedThresholds, TokenDistribution,
};
use pf_normas::chunker::ChunkerConfig;
use pf_normas::model::{Level, PARSER_VERSION};
use pf_normas::patterns::PatternLibrary;
use pf_normas::pipeline::process_document;
use pf_normas::util::{now_utc_string, write_json_pretty};

const SCANNED_LINES: usize = 2000;
const EXAMPLES_PER_LEVEL: usize = 5;
const EXAMPLE_CHARS: usize = 180;
const ERROR_CHARS: usize = 120;

pub fn run(args: CalibrateArgs) -> Result<()> {
    let report_path = args
        .report_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join("manifests").join("calibration.json"));

    let report = build_report(
        &args.source_dir,
        args.max_pages_per_doc,
        &args.chunking.chunker_config(),
    )?;

    for (level, hits) in &report.pattern_hits {
        info!(level = %level, hits, "pattern hits");
    }
    if let Some(tokens) = &report.tokens {
        info!(
            chunks = tokens.count,
            min = tokens.min,
            p50 = tokens.p50,
            p90 = tokens.p90,
            max = tokens.max,
            "token distribution"
        );
    }
    if let Some(suggested) = &report.suggested_thresholds {
        info!(
            token_min = suggested.token_min,
            token_max = suggested.token_max,
            "suggested chunk thresholds"
        );
    }

    write_json_pretty(&report_path, &report)?;
    info!(path = %report_path.display(), files = report.files, "wrote calibration report");
    Ok(())
}

pub fn build_report(
    source_dir: &Path,
    max_pages_per_doc: Option<usize>,
    config: &ChunkerConfig,
) -> Result<CalibrationReport> {
    let patterns = PatternLibrary::new()?;
    let mut paths: Vec<PathBuf> = discover_sources(source_dir)?;
    paths.sort();

    let mut pattern_hits: BTreeMap<String, usize> = BTreeMap::new();
    let mut examples: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut reports = Vec::with_capacity(paths.len());
    let mut all_tokens = Vec::new();

    for path in &paths {
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let pages = match load_pages(path, max_pages_per_doc) {
            Ok(pages) => pages,
            Err(err) => {
                warn!(file = %file, error = %err, "calibration skipped source");
                reports.push(CalibrationFileReport {
                    file,
                    chunks: None,
                    tokens: None,
                    error: Some(truncate_chars(&format!("{err:#}"), ERROR_CHARS)),
                });
                continue;
            }
        };

        let output = process_document(&patterns, &file, &pages, None, config);

        for line in output.text.lines().take(SCANNED_LINES) {
            for level in patterns.matching_levels(line) {
                let key = level_key(level);
                *pattern_hits.entry(key.clone()).or_default() += 1;
                let bucket = examples.entry(key).or_default();
                if bucket.len() < EXAMPLES_PER_LEVEL {
                    bucket.push(shorten(line, EXAMPLE_CHARS));
                }
            }
        }

        let tokens: Vec<usize> = output
            .chunks
            .iter()
            .map(|chunk| chunk.tokens_estimated)
            .collect();
        reports.push(CalibrationFileReport {
            file,
            chunks: Some(tokens.len()),
            tokens: distribution(&tokens),
            error: None,
        });
        all_tokens.extend(tokens);
    }

    Ok(CalibrationReport {
        manifest_version: 1,
        generated_at: now_utc_string(),
        parser_version: PARSER_VERSION.to_string(),
        source_directory: source_dir.display().to_string(),
        files: paths.len(),
        pattern_hits,
        examples,
        reports,
        tokens: distribution(&all_tokens),
        suggested_thresholds: suggest_thresholds(&all_tokens),
    })
}

fn level_key(level: Level) -> String {
    level.as_str().to_uppercase()
}

fn distribution(tokens: &[usize]) -> Option<TokenDistribution> {
    let mut sorted = tokens.to_vec();
    sorted.sort_unstable();
    Some(TokenDistribution {
        count: sorted.len(),
        min: *sorted.first()?,
        p50: percentile(&sorted, 50),
        p90: percentile(&sorted, 90),
        max: *sorted.last()?,
    })
}

/// Nearest-rank percentile over an ascending slice.
fn percentile(sorted: &[usize], pct: usize) -> usize {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (pct * sorted.len()).div_ceil(100).clamp(1, sorted.len());
    sorted[rank - 1]
}

/// Third and ninth deciles; small samples fall back to floors of 200/800.
fn suggest_thresholds(tokens: &[usize]) -> Option<SuggestedThresholds> {
    let mut sorted = tokens.to_vec();
    sorted.sort_unstable();
    let min = *sorted.first()?;
    let max = *sorted.last()?;

    if sorted.len() < 10 {
        return Some(SuggestedThresholds {
            token_min: min.max(200),
            token_max: max.max(800),
        });
    }

    Some(SuggestedThresholds {
        token_min: percentile(&sorted, 30),
        token_max: percentile(&sorted, 90),
    })
}

fn shorten(line: &str, max_chars: usize) -> String {
    let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut short: String = collapsed.chars().take(max_chars.saturating_sub(3)).collect();
    short.push_str("...");
    short
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
