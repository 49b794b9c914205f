//! One document end to end: normalize, detect, extract, chunk.

use std::path::Path;

use tracing::debug;

use crate::chunker::{ChunkerConfig, build_chunks};
use crate::layout::LayoutMap;
use crate::metadata::extract_metadata;
use crate::model::{
    Chunk, DEFAULT_DOC_ID, DocumentTree, HeadingBlock, NormalizedPage, PageSpan,
    PfDocumentMetadata,
};
use crate::normalize::{NormalizationStats, clean_pages, page_spans};
use crate::patterns::PatternLibrary;
use crate::structure::detect_structure;
use crate::util::slug_join;

#[derive(Debug, Clone)]
pub struct DocumentOutput {
    pub text: String,
    pub pages: Vec<NormalizedPage>,
    pub page_spans: Vec<PageSpan>,
    pub tree: DocumentTree,
    pub heading: HeadingBlock,
    pub metadata: PfDocumentMetadata,
    pub chunks: Vec<Chunk>,
    pub normalization: NormalizationStats,
}

/// Runs the whole core over the raw extracted pages of one source.
///
/// When no numbering line is found the default document id is suffixed with
/// the source file stem so that documents in one batch stay distinguishable.
pub fn process_document(
    patterns: &PatternLibrary,
    source_file: &str,
    raw_pages: &[NormalizedPage],
    layout: Option<&LayoutMap>,
    config: &ChunkerConfig,
) -> DocumentOutput {
    let (text, pages, normalization) = clean_pages(raw_pages);
    let spans = page_spans(&pages);

    let (tree, heading) = detect_structure(patterns, &text);
    let mut metadata = extract_metadata(patterns, &text, &heading, source_file);
    if metadata.doc_id == DEFAULT_DOC_ID {
        let stem = Path::new(source_file)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        metadata.doc_id = slug_join([DEFAULT_DOC_ID, stem.as_str()]);
    }

    let chunks = build_chunks(&tree, &text, &metadata, source_file, &spans, layout, config);
    debug!(
        source = source_file,
        doc_id = %metadata.doc_id,
        nodes = tree.node_count(),
        chunks = chunks.len(),
        "document processed"
    );

    DocumentOutput {
        text,
        pages,
        page_spans: spans,
        tree,
        heading,
        metadata,
        chunks,
        normalization,
    }
}
