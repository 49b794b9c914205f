//! Page cleanup ahead of structure detection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{NormalizedPage, PageSpan};

const STRUCTURAL_PREFIXES: [&str; 6] = ["CAPÍTULO", "CAPITULO", "SEÇÃO", "SECAO", "TÍTULO", "TITULO"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub header_lines_removed: usize,
    pub footer_lines_removed: usize,
    pub dehyphenation_merges: usize,
    pub marker_joins: usize,
}

/// Cleans every page and returns the joined full text, the cleaned pages and
/// what was changed. Pages are joined with a single `\n`.
pub fn clean_pages(pages: &[NormalizedPage]) -> (String, Vec<NormalizedPage>, NormalizationStats) {
    let headers = repeated_edge_lines(pages, true);
    let footers = repeated_edge_lines(pages, false);
    let mut stats = NormalizationStats::default();

    let cleaned = pages
        .iter()
        .map(|page| {
            let mut lines = page.text.lines().map(str::to_string).collect::<Vec<String>>();

            if let Some(index) = lines.iter().position(|line| !line.trim().is_empty()) {
                if headers.contains_key(lines[index].trim()) {
                    lines.remove(index);
                    stats.header_lines_removed += 1;
                }
            }
            if let Some(index) = lines.iter().rposition(|line| !line.trim().is_empty()) {
                if footers.contains_key(lines[index].trim()) {
                    lines.remove(index);
                    stats.footer_lines_removed += 1;
                }
            }

            let (lines, merges) = merge_hyphenated_lines(lines);
            stats.dehyphenation_merges += merges;

            let lines = lines
                .iter()
                .map(|line| collapse_spaces(line))
                .collect::<Vec<String>>();

            let (lines, joins) = join_dangling_markers(lines);
            stats.marker_joins += joins;

            NormalizedPage {
                index: page.index,
                text: lines.join("\n"),
            }
        })
        .collect::<Vec<NormalizedPage>>();

    let full_text = cleaned
        .iter()
        .map(|page| page.text.as_str())
        .collect::<Vec<&str>>()
        .join("\n");

    debug!(
        pages = cleaned.len(),
        headers = stats.header_lines_removed,
        footers = stats.footer_lines_removed,
        merges = stats.dehyphenation_merges,
        joins = stats.marker_joins,
        "pages normalized"
    );

    (full_text, cleaned, stats)
}

/// Byte range of every page inside the `\n`-joined full text.
pub fn page_spans(pages: &[NormalizedPage]) -> Vec<PageSpan> {
    let mut cursor = 0_usize;
    pages
        .iter()
        .map(|page| {
            let span = PageSpan {
                index: page.index,
                start: cursor,
                end: cursor + page.text.len(),
            };
            cursor = span.end + 1;
            span
        })
        .collect()
}

/// First (or last) non-blank lines that repeat often enough to be running
/// headers (or footers). Headings that open a chapter, section or title are kept.
fn repeated_edge_lines(pages: &[NormalizedPage], header: bool) -> HashMap<String, usize> {
    let mut counts = HashMap::<String, usize>::new();
    for page in pages {
        let mut lines = page.text.lines().map(str::trim).filter(|line| !line.is_empty());
        let candidate = if header { lines.next() } else { lines.next_back() };
        if let Some(candidate) = candidate {
            *counts.entry(candidate.to_string()).or_insert(0) += 1;
        }
    }

    let max_count = counts.values().copied().max().unwrap_or(0);
    let threshold = if header {
        3_usize.max((max_count as f64 * 0.7) as usize)
    } else {
        2_usize.max((max_count as f64 * 0.5) as usize)
    };

    counts.retain(|line, count| *count >= threshold && !is_structural_heading(line));
    counts
}

fn is_structural_heading(line: &str) -> bool {
    let upper = line.to_uppercase();
    STRUCTURAL_PREFIXES
        .iter()
        .any(|prefix| upper.starts_with(prefix))
}

fn merge_hyphenated_lines(lines: Vec<String>) -> (Vec<String>, usize) {
    let mut merged = Vec::<String>::with_capacity(lines.len());
    let mut merges = 0usize;
    let mut iter = lines.into_iter().peekable();

    while let Some(current) = iter.next() {
        let mut current = current;
        while let Some(next) = iter.peek() {
            if !should_merge_hyphenated_pair(&current, next) {
                break;
            }
            let joined = format!(
                "{}{}",
                current.trim_end().trim_end_matches('-'),
                next.trim_start()
            );
            current = joined;
            merges += 1;
            iter.next();
        }
        merged.push(current);
    }

    (merged, merges)
}

fn should_merge_hyphenated_pair(current: &str, next: &str) -> bool {
    let left = current.trim_end();
    let Some(stem) = left.strip_suffix('-') else {
        return false;
    };

    let word_before = stem.chars().last().is_some_and(char::is_alphanumeric);
    let word_after = next
        .chars()
        .next()
        .is_some_and(|character| character.is_alphanumeric());
    word_before && word_after
}

fn collapse_spaces(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_run = false;
    for character in line.chars() {
        if character == ' ' || character == '\t' {
            if !in_run {
                out.push(' ');
            }
            in_run = true;
        } else {
            out.push(character);
            in_run = false;
        }
    }
    out
}

/// Joins a line holding only a dispositivo marker with the next non-blank line.
fn join_dangling_markers(lines: Vec<String>) -> (Vec<String>, usize) {
    let mut out = Vec::<String>::with_capacity(lines.len());
    let mut joins = 0usize;
    let mut pending: Option<String> = None;

    for line in lines {
        if let Some(marker) = pending.take() {
            if line.trim().is_empty() {
                pending = Some(marker);
                continue;
            }
            out.push(format!("{} {}", marker.trim_end(), line.trim_start()));
            joins += 1;
            continue;
        }
        if is_dangling_marker(&line) {
            pending = Some(line);
        } else {
            out.push(line);
        }
    }
    if let Some(marker) = pending {
        out.push(marker);
    }

    (out, joins)
}

fn is_dangling_marker(line: &str) -> bool {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("Art") {
        let rest = rest.trim_start_matches('.').trim_start();
        return strip_numeral(rest)
            .map(|tail| {
                tail.trim_start_matches('-')
                    .trim_start_matches(|c: char| c.is_ascii_uppercase())
            })
            .is_some_and(|tail| tail.trim_matches('.').is_empty());
    }
    if let Some(rest) = line.strip_prefix('§') {
        return strip_numeral(rest.trim_start()).is_some_and(|tail| tail.trim_matches('.').is_empty());
    }
    if let Some(numeral) = line
        .strip_suffix(['-', '–', '—'])
        .map(str::trim_end)
        .filter(|numeral| !numeral.is_empty())
    {
        return numeral.chars().all(|c| "IVXLCDM".contains(c));
    }
    let mut chars = line.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some(letter), Some(')'), None) if letter.is_ascii_lowercase()
    )
}

/// Strips leading digits plus an optional ordinal mark; `None` without digits.
fn strip_numeral(input: &str) -> Option<&str> {
    let digits = input.len() - input.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let rest = &input[digits..];
    Some(rest.trim_start_matches(['º', 'o', '°']))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(index: u32, text: &str) -> NormalizedPage {
        NormalizedPage {
            index,
            text: text.to_string(),
        }
    }

    #[test]
    fn removes_running_headers_and_footers() {
        let pages = (1..=4)
            .map(|index| {
                page(
                    index,
                    &format!("SERVIÇO PÚBLICO FEDERAL\nArt. {index}º Texto.\nBoletim de Serviço"),
                )
            })
            .collect::<Vec<_>>();

        let (text, cleaned, stats) = clean_pages(&pages);
        assert_eq!(stats.header_lines_removed, 4);
        assert_eq!(stats.footer_lines_removed, 4);
        assert_eq!(cleaned[0].text, "Art. 1º Texto.");
        assert!(!text.contains("SERVIÇO PÚBLICO FEDERAL"));
    }

    #[test]
    fn keeps_structural_headings_even_when_repeated() {
        let pages = (1..=4)
            .map(|index| page(index, "CAPÍTULO I\nArt. 1º Texto."))
            .collect::<Vec<_>>();
        let (_, cleaned, stats) = clean_pages(&pages);
        assert_eq!(stats.header_lines_removed, 0);
        assert!(cleaned[3].text.starts_with("CAPÍTULO I"));
    }

    #[test]
    fn rare_first_lines_are_not_headers() {
        let pages = vec![page(1, "Cabeçalho\nA"), page(2, "Cabeçalho\nB")];
        let (_, _, stats) = clean_pages(&pages);
        assert_eq!(stats.header_lines_removed, 0);
    }

    #[test]
    fn merges_hyphenation_and_collapses_spaces() {
        let pages = vec![page(1, "Art. 1º A adminis-\ntração   pública\tfederal.")];
        let (text, _, stats) = clean_pages(&pages);
        assert_eq!(text, "Art. 1º A administração pública federal.");
        assert_eq!(stats.dehyphenation_merges, 1);
    }

    #[test]
    fn joins_lines_holding_only_a_marker() {
        let pages = vec![page(1, "Art. 5º\n\nO servidor deverá:\nI -\ncomparecer;\na)\nno prazo;")];
        let (text, _, stats) = clean_pages(&pages);
        assert_eq!(
            text,
            "Art. 5º O servidor deverá:\nI - comparecer;\na) no prazo;"
        );
        assert_eq!(stats.marker_joins, 3);
    }

    #[test]
    fn headings_with_text_are_not_markers() {
        assert!(!is_dangling_marker("Art. 5º O servidor"));
        assert!(!is_dangling_marker("CAPÍTULO I"));
        assert!(!is_dangling_marker("INTRODUÇÃO -"));
        assert!(is_dangling_marker("§ 2º"));
        assert!(is_dangling_marker("Art. 7-A"));
        assert!(is_dangling_marker("XIV –"));
    }

    #[test]
    fn page_spans_index_into_joined_text() {
        let pages = vec![page(1, "Art. 1º Um."), page(2, "Art. 2º Dois."), page(3, "")];
        let (text, cleaned, _) = clean_pages(&pages);
        let spans = page_spans(&cleaned);

        assert_eq!(spans.len(), 3);
        assert_eq!(&text[spans[0].start..spans[0].end], "Art. 1º Um.");
        assert_eq!(&text[spans[1].start..spans[1].end], "Art. 2º Dois.");
        assert_eq!(spans[2].start, spans[2].end);
        assert_eq!(spans[2].end, text.len());
    }
}
