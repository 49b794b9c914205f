//! Turns a detected hierarchy into ordered retrieval chunks.
//!
//! Nodes are visited by `(start, depth priority)`. A node over the token
//! budget that has children is replaced by its direct children, which are
//! then accepted as they are. Every emitted chunk carries its breadcrumb,
//! parent anchor and sibling links within its parent scope.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::layout::{LayoutMap, overlapping_tables, pages_touching};
use crate::model::{
    BreadcrumbEntry, Chunk, DocumentTree, Level, PARSER_VERSION, PageSpan, PfDocumentMetadata,
    SourceProvenance, AMBITO, ORGAO, PAIS, SIGLA_ORGAO,
};
use crate::util::{sha256_hex, slug_join, slugify};

#[cfg(test)]
mod tests;

const WHOLE_DOCUMENT_LABEL: &str = "Documento";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkerConfig {
    pub max_tokens: usize,
    /// Characters per token; 4.0 fits Portuguese prose.
    pub chars_per_token: f64,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1200,
            chars_per_token: 4.0,
        }
    }
}

pub fn estimate_tokens(text: &str, chars_per_token: f64) -> usize {
    let ratio = if chars_per_token > 0.0 {
        chars_per_token
    } else {
        1.0
    };
    let chars = text.chars().count() as f64;
    ((chars / ratio) as usize).max(1)
}

/// Canonical comparable token for a label: `"5"` for `Art. 5º`, `"7-a"` for
/// `Art. 7-A`, `"unico"` for `Parágrafo Único`, `"i"` for `CAPÍTULO I`.
pub fn ordinal_normalized(level: Level, label: &str) -> String {
    match level {
        Level::Artigo => {
            let digits = leading_digits(label);
            if digits.is_empty() {
                return slugify(label);
            }
            let suffix = label
                .rsplit_once('-')
                .map(|(_, tail)| tail.trim().to_lowercase())
                .filter(|tail| tail.len() == 1 && tail.chars().all(|ch| ch.is_ascii_alphabetic()));
            match suffix {
                Some(letter) => format!("{digits}-{letter}"),
                None => digits,
            }
        }
        Level::Paragrafo => {
            let digits = leading_digits(label);
            if !digits.is_empty() {
                return digits;
            }
            let lowered = label.to_lowercase();
            if lowered.contains("único") || lowered.contains("unico") {
                "unico".to_string()
            } else {
                slugify(label)
            }
        }
        Level::Inciso | Level::Alinea | Level::Item => label
            .trim_matches(|ch: char| matches!(ch, '.' | ')' | ' '))
            .to_string(),
        Level::Documento => slugify(label),
        _ => {
            let numeral = label
                .split_once(char::is_whitespace)
                .map(|(_, rest)| rest)
                .unwrap_or(label)
                .replace(['º', '°'], "");
            slugify(&numeral)
        }
    }
}

fn leading_digits(label: &str) -> String {
    label
        .chars()
        .skip_while(|ch| !ch.is_ascii_digit())
        .take_while(|ch| ch.is_ascii_digit())
        .collect()
}

/// Per-document inputs shared by every chunk.
struct ChunkContext<'a> {
    text: &'a str,
    meta: &'a PfDocumentMetadata,
    source_file: &'a str,
    pages: &'a [PageSpan],
    layout: Option<&'a LayoutMap>,
    config: &'a ChunkerConfig,
}

struct Unit {
    level: Level,
    label: String,
    anchor_id: String,
    parent_id: Option<String>,
    breadcrumb: Vec<BreadcrumbEntry>,
    start: usize,
    end: usize,
}

impl ChunkContext<'_> {
    fn build(&self, unit: Unit) -> Option<Chunk> {
        let text = self.text.get(unit.start..unit.end)?.trim();
        if text.is_empty() {
            return None;
        }

        let source_pages = pages_touching(self.pages, unit.start, unit.end);
        let table_refs = self
            .layout
            .map(|layout| overlapping_tables(layout, &source_pages, unit.start, unit.end))
            .unwrap_or_default();
        let meta = self.meta;

        Some(Chunk {
            doc_id: meta.doc_id.clone(),
            anchor_id: unit.anchor_id,
            level: unit.level,
            ordinal_normalized: ordinal_normalized(unit.level, &unit.label),
            label: unit.label,
            breadcrumb: unit.breadcrumb,
            text: text.to_string(),
            tokens_estimated: estimate_tokens(text, self.config.chars_per_token),
            parent_id: unit.parent_id,
            siblings_prev_id: None,
            siblings_next_id: None,
            provenance: SourceProvenance {
                source_file: self.source_file.to_string(),
                source_pages,
            },
            content_hash: sha256_hex(text),
            texto_limpo: true,
            versao_parser: PARSER_VERSION.to_string(),
            start: unit.start,
            end: unit.end,
            orgao: ORGAO.to_string(),
            sigla_orgao: SIGLA_ORGAO.to_string(),
            ambito: AMBITO.to_string(),
            pais: PAIS.to_string(),
            publicacao_publica: true,
            especie_normativa: meta.especie_normativa.clone(),
            numero: meta.numero.clone(),
            ano: meta.ano.clone(),
            numero_completo: meta.numero_completo.clone(),
            data_publicacao: meta.data_publicacao.clone(),
            data_vigencia: meta.data_vigencia.clone(),
            situacao: meta.situacao.clone(),
            fonte_publicacao: meta.fonte_publicacao.clone(),
            processo_ref: meta.processo_ref.clone(),
            unidade_emitente: meta.unidade_emitente.clone(),
            ementa: meta.ementa.clone(),
            preambulo: meta.preambulo.clone(),
            considerandos: meta.considerandos.clone(),
            anexos_presentes: meta.anexos_presentes.clone(),
            table_refs,
        })
    }
}

/// Emits chunks in document order with per-parent sibling links.
///
/// A tree holding only the root produces a single whole-document chunk
/// anchored at `doc_id`; empty text produces nothing.
pub fn build_chunks(
    tree: &DocumentTree,
    text: &str,
    meta: &PfDocumentMetadata,
    source_file: &str,
    pages: &[PageSpan],
    layout: Option<&LayoutMap>,
    config: &ChunkerConfig,
) -> Vec<Chunk> {
    let context = ChunkContext {
        text,
        meta,
        source_file,
        pages,
        layout,
        config,
    };

    if tree.node_count() <= 1 {
        let unit = Unit {
            level: Level::Documento,
            label: WHOLE_DOCUMENT_LABEL.to_string(),
            anchor_id: meta.doc_id.clone(),
            parent_id: None,
            breadcrumb: vec![BreadcrumbEntry {
                level: Level::Documento,
                label: WHOLE_DOCUMENT_LABEL.to_string(),
            }],
            start: 0,
            end: text.len(),
        };
        return context.build(unit).into_iter().collect();
    }

    let mut order = (0..tree.node_count())
        .filter(|index| *index != DocumentTree::ROOT)
        .collect::<Vec<usize>>();
    order.sort_by_key(|index| {
        let node = &tree.nodes[*index];
        (node.start, node.level.depth_priority())
    });

    let mut anchors: Vec<Option<String>> = vec![None; tree.node_count()];
    let mut split = vec![false; tree.node_count()];
    let mut used_anchors: HashSet<String> = HashSet::new();
    let mut last_in_scope: HashMap<Option<String>, usize> = HashMap::new();
    let mut chunks: Vec<Chunk> = Vec::new();

    for index in order {
        let node = &tree.nodes[index];
        let parent = node.parent.filter(|parent| *parent != DocumentTree::ROOT);
        let parent_anchor = parent.and_then(|parent| anchors[parent].clone());

        let base = slug_join([
            parent_anchor.as_deref().unwrap_or(meta.doc_id.as_str()),
            node.level.as_str(),
            ordinal_normalized(node.level, &node.label).as_str(),
        ]);
        let anchor_id = unique_anchor(&mut used_anchors, base);
        anchors[index] = Some(anchor_id.clone());

        let parent_was_split = parent.is_some_and(|parent| split[parent]);
        if !parent_was_split && !node.children.is_empty() {
            let span = text.get(node.start..node.end).unwrap_or_default().trim();
            let tokens = estimate_tokens(span, config.chars_per_token);
            if tokens > config.max_tokens {
                debug!(
                    anchor = %anchor_id,
                    tokens,
                    children = node.children.len(),
                    "splitting oversized node into children"
                );
                split[index] = true;
                continue;
            }
        }

        let unit = Unit {
            level: node.level,
            label: node.label.clone(),
            anchor_id,
            parent_id: parent_anchor,
            breadcrumb: tree
                .lineage(index)
                .into_iter()
                .filter_map(|ancestor| tree.get(ancestor))
                .map(|ancestor| BreadcrumbEntry {
                    level: ancestor.level,
                    label: ancestor.label.clone(),
                })
                .collect(),
            start: node.start,
            end: node.end,
        };
        let Some(mut chunk) = context.build(unit) else {
            continue;
        };

        let position = chunks.len();
        if let Some(previous) = last_in_scope.insert(chunk.parent_id.clone(), position) {
            chunk.siblings_prev_id = Some(chunks[previous].anchor_id.clone());
            chunks[previous].siblings_next_id = Some(chunk.anchor_id.clone());
        }
        chunks.push(chunk);
    }

    debug!(doc_id = %meta.doc_id, chunks = chunks.len(), "chunks built");
    chunks
}

/// `base`, or `base-2`, `base-3`, ... when already taken in this document.
fn unique_anchor(used: &mut HashSet<String>, base: String) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut suffix = 2_usize;
    loop {
        let candidate = format!("{base}-{suffix}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        suffix += 1;
    }
}
