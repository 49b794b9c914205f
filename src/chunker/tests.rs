use std::collections::{HashMap, HashSet};

use proptest::prelude::*;

use super::*;
use crate::layout::{BlockKind, LayoutBlock};
use crate::patterns::PatternLibrary;
use crate::structure::detect_structure;

const SAMPLE: &str = "CAPÍTULO I - DAS DISPOSIÇÕES GERAIS
Art. 1º Esta Portaria dispõe...
§ 1º Para fins desta Portaria...
I - primeiro inciso;
a) primeira alínea;
Art. 2º Outras disposições.
Parágrafo Único As exceções...
ANEXO I – Formulário
";

fn meta() -> PfDocumentMetadata {
    PfDocumentMetadata {
        doc_id: "portaria-1-2024-dg-dpf".to_string(),
        numero: Some("1".to_string()),
        ..PfDocumentMetadata::default()
    }
}

fn single_page(text: &str) -> Vec<PageSpan> {
    vec![PageSpan {
        index: 1,
        start: 0,
        end: text.len(),
    }]
}

fn chunk_text(text: &str, config: &ChunkerConfig, layout: Option<&LayoutMap>) -> Vec<Chunk> {
    let patterns = PatternLibrary::new().expect("patterns compile");
    let (tree, _) = detect_structure(&patterns, text);
    build_chunks(
        &tree,
        text,
        &meta(),
        "portaria.pdf",
        &single_page(text),
        layout,
        config,
    )
}

fn by_label<'a>(chunks: &'a [Chunk], label: &str) -> &'a Chunk {
    chunks
        .iter()
        .find(|chunk| chunk.label == label)
        .unwrap_or_else(|| panic!("missing chunk {label}"))
}

#[test]
fn sample_document_chunks_follow_the_hierarchy() {
    let chunks = chunk_text(SAMPLE, &ChunkerConfig::default(), None);

    let labels = chunks
        .iter()
        .map(|chunk| chunk.label.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        labels,
        vec![
            "CAPÍTULO I",
            "Art. 1º",
            "§ 1º",
            "I",
            "a)",
            "Art. 2º",
            "Parágrafo Único",
            "ANEXO I"
        ]
    );

    let chapter = by_label(&chunks, "CAPÍTULO I");
    assert_eq!(chapter.anchor_id, "portaria-1-2024-dg-dpf-capitulo-i");
    assert_eq!(chapter.parent_id, None);
    assert_eq!(
        chapter.siblings_next_id.as_deref(),
        Some("portaria-1-2024-dg-dpf-anexo-i")
    );

    let alinea = by_label(&chunks, "a)");
    assert_eq!(
        alinea.anchor_id,
        "portaria-1-2024-dg-dpf-capitulo-i-artigo-1-paragrafo-1-inciso-i-alinea-a"
    );
    assert_eq!(
        alinea.parent_id.as_deref(),
        Some("portaria-1-2024-dg-dpf-capitulo-i-artigo-1-paragrafo-1-inciso-i")
    );
    assert_eq!(alinea.ordinal_normalized, "a");
    assert_eq!(alinea.text, "a) primeira alínea;");
    assert_eq!(
        alinea
            .breadcrumb
            .iter()
            .map(|entry| entry.label.as_str())
            .collect::<Vec<_>>(),
        vec!["CAPÍTULO I", "Art. 1º", "§ 1º", "I", "a)"]
    );

    let unico = by_label(&chunks, "Parágrafo Único");
    assert_eq!(unico.ordinal_normalized, "unico");
    assert_eq!(
        unico.parent_id.as_deref(),
        Some("portaria-1-2024-dg-dpf-capitulo-i-artigo-2")
    );

    let first = by_label(&chunks, "Art. 1º");
    let second = by_label(&chunks, "Art. 2º");
    assert_eq!(first.siblings_prev_id, None);
    assert_eq!(first.siblings_next_id.as_deref(), Some(second.anchor_id.as_str()));
    assert_eq!(second.siblings_prev_id.as_deref(), Some(first.anchor_id.as_str()));
    assert_eq!(second.siblings_next_id, None);

    for chunk in &chunks {
        assert_eq!(chunk.doc_id, "portaria-1-2024-dg-dpf");
        assert_eq!(chunk.numero.as_deref(), Some("1"));
        assert_eq!(chunk.versao_parser, PARSER_VERSION);
        assert_eq!(chunk.provenance.source_pages, vec![1]);
        assert!(chunk.table_refs.is_empty());
    }
}

#[test]
fn oversized_node_is_replaced_by_its_children() {
    let config = ChunkerConfig {
        max_tokens: 20,
        chars_per_token: 4.0,
    };
    let chunks = chunk_text(SAMPLE, &config, None);

    assert!(chunks.iter().all(|chunk| chunk.level != Level::Capitulo));

    let first = by_label(&chunks, "Art. 1º");
    assert!(first.tokens_estimated > config.max_tokens);
    assert_eq!(
        first.parent_id.as_deref(),
        Some("portaria-1-2024-dg-dpf-capitulo-i")
    );
    assert_eq!(
        first.breadcrumb.first().map(|entry| entry.level),
        Some(Level::Capitulo)
    );

    let second = by_label(&chunks, "Art. 2º");
    assert_eq!(first.siblings_next_id.as_deref(), Some(second.anchor_id.as_str()));

    let annex = by_label(&chunks, "ANEXO I");
    assert_eq!(annex.parent_id, None);
    assert_eq!(annex.siblings_prev_id, None);
}

#[test]
fn oversized_leaf_is_emitted_whole() {
    let text = format!("Art. 1º {}\n", "palavra ".repeat(200));
    let config = ChunkerConfig {
        max_tokens: 10,
        chars_per_token: 4.0,
    };
    let chunks = chunk_text(&text, &config, None);
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].tokens_estimated > 10);
}

#[test]
fn text_without_structure_becomes_one_document_chunk() {
    let text = "Comunicado interno sem artigos.\nSegunda linha.\n";
    let chunks = chunk_text(text, &ChunkerConfig::default(), None);

    assert_eq!(chunks.len(), 1);
    let chunk = &chunks[0];
    assert_eq!(chunk.level, Level::Documento);
    assert_eq!(chunk.anchor_id, "portaria-1-2024-dg-dpf");
    assert_eq!(chunk.parent_id, None);
    assert_eq!(chunk.text, text.trim());

    assert!(chunk_text("   \n\n", &ChunkerConfig::default(), None).is_empty());
}

#[test]
fn repeated_labels_get_distinct_anchors() {
    let text = "Art. 1º Primeira redação.\nArt. 1º Redação repetida.\nArt. 1º Terceira.\n";
    let chunks = chunk_text(text, &ChunkerConfig::default(), None);
    let anchors = chunks
        .iter()
        .map(|chunk| chunk.anchor_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        anchors,
        vec![
            "portaria-1-2024-dg-dpf-artigo-1",
            "portaria-1-2024-dg-dpf-artigo-1-2",
            "portaria-1-2024-dg-dpf-artigo-1-3"
        ]
    );
}

#[test]
fn editing_a_dispositivo_rehashes_every_chunk_covering_it() {
    let config = ChunkerConfig::default();
    let before = chunk_text(SAMPLE, &config, None);
    let edited = SAMPLE.replace("primeiro inciso", "primeira inciso");
    let after = chunk_text(&edited, &config, None);

    assert_eq!(before.len(), after.len());
    let again = chunk_text(SAMPLE, &config, None);
    for (left, right) in before.iter().zip(&again) {
        assert_eq!(left.content_hash, right.content_hash);
    }

    let changed = before
        .iter()
        .zip(&after)
        .filter(|(left, right)| left.content_hash != right.content_hash)
        .map(|(left, _)| left.label.as_str())
        .collect::<Vec<_>>();
    assert_eq!(changed, vec!["CAPÍTULO I", "Art. 1º", "§ 1º", "I"]);
}

#[test]
fn table_blocks_attach_to_every_overlapping_chunk() {
    let alinea_start = SAMPLE.find("a) primeira").expect("alinea present");
    let mut layout = LayoutMap::new();
    layout.insert(
        1,
        vec![LayoutBlock {
            kind: BlockKind::Table,
            text: "campo\tvalor".to_string(),
            bbox: Some([10.0, 20.0, 300.0, 80.0]),
            page_no: 1,
            start: Some(alinea_start + 3),
            end: Some(alinea_start + 10),
        }],
    );

    let chunks = chunk_text(SAMPLE, &ChunkerConfig::default(), Some(&layout));
    assert_eq!(by_label(&chunks, "a)").table_refs.len(), 1);
    assert_eq!(by_label(&chunks, "Art. 1º").table_refs.len(), 1);
    assert!(by_label(&chunks, "Art. 2º").table_refs.is_empty());
    assert!(by_label(&chunks, "ANEXO I").table_refs.is_empty());
}

#[test]
fn source_pages_follow_page_spans() {
    let patterns = PatternLibrary::new().expect("patterns compile");
    let (tree, _) = detect_structure(&patterns, SAMPLE);
    let split_at = SAMPLE.find("Art. 2º").expect("second article");
    let pages = vec![
        PageSpan {
            index: 1,
            start: 0,
            end: split_at,
        },
        PageSpan {
            index: 2,
            start: split_at,
            end: SAMPLE.len(),
        },
    ];
    let chunks = build_chunks(
        &tree,
        SAMPLE,
        &meta(),
        "portaria.pdf",
        &pages,
        None,
        &ChunkerConfig::default(),
    );

    assert_eq!(by_label(&chunks, "CAPÍTULO I").provenance.source_pages, vec![1, 2]);
    assert_eq!(by_label(&chunks, "Art. 1º").provenance.source_pages, vec![1]);
    assert_eq!(by_label(&chunks, "ANEXO I").provenance.source_pages, vec![2]);
}

#[test]
fn ordinals_are_canonical() {
    assert_eq!(ordinal_normalized(Level::Artigo, "Art. 5º"), "5");
    assert_eq!(ordinal_normalized(Level::Artigo, "Art. 7-A"), "7-a");
    assert_eq!(ordinal_normalized(Level::Paragrafo, "§ 2º"), "2");
    assert_eq!(ordinal_normalized(Level::Paragrafo, "Parágrafo Único"), "unico");
    assert_eq!(ordinal_normalized(Level::Inciso, "XIV"), "XIV");
    assert_eq!(ordinal_normalized(Level::Alinea, "b)"), "b");
    assert_eq!(ordinal_normalized(Level::Item, "3"), "3");
    assert_eq!(ordinal_normalized(Level::Capitulo, "CAPÍTULO IV"), "iv");
    assert_eq!(ordinal_normalized(Level::Anexo, "ANEXO ÚNICO"), "unico");
    assert_eq!(ordinal_normalized(Level::Titulo, "TÍTULO 2º"), "2");
}

#[test]
fn token_estimate_is_length_based_and_never_zero() {
    assert_eq!(estimate_tokens("", 4.0), 1);
    assert_eq!(estimate_tokens("abcdefgh", 4.0), 2);
    assert_eq!(estimate_tokens("ação", 1.0), 4);
    assert_eq!(estimate_tokens("abc", 0.0), 3);
}

#[test]
fn chunk_serializes_with_contract_field_names() {
    let chunks = chunk_text(SAMPLE, &ChunkerConfig::default(), None);
    let value = serde_json::to_value(&chunks[1]).expect("chunk serializes");

    assert_eq!(value["nivel"], "artigo");
    assert_eq!(value["rotulo"], "Art. 1º");
    assert_eq!(value["ordinal_normalizado"], "1");
    assert_eq!(value["caminho_hierarquico"][0]["nivel"], "capitulo");
    assert_eq!(value["origem_pdf"]["arquivo"], "portaria.pdf");
    assert_eq!(value["orgao"], "Polícia Federal");
    assert!(value.get("hash_conteudo").is_some());
    assert!(value.get("layout_refs").is_none());
    assert!(value.get("start").is_none());
}

fn line_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (1_u32..4).prop_map(|n| format!("CAPÍTULO {}", "I".repeat(n as usize))),
        (1_u32..6).prop_map(|n| format!("Art. {n}º Texto do artigo.")),
        (1_u32..4).prop_map(|n| format!("§ {n}º Texto do parágrafo.")),
        (1_u32..4).prop_map(|n| format!("{} - inciso;", "I".repeat(n as usize))),
        (0_u8..4).prop_map(|n| format!("{}) alínea;", (b'a' + n) as char)),
        (1_u32..4).prop_map(|n| format!("{n}. item")),
        Just("texto corrido".to_string()),
    ]
}

proptest! {
    #[test]
    fn anchors_are_unique_and_sibling_lists_are_complete(
        lines in prop::collection::vec(line_strategy(), 1..40),
        max_tokens in 5_usize..400,
    ) {
        let text = lines.join("\n");
        let config = ChunkerConfig { max_tokens, chars_per_token: 4.0 };
        let chunks = chunk_text(&text, &config, None);

        let mut seen = HashSet::new();
        for chunk in &chunks {
            prop_assert!(seen.insert(chunk.anchor_id.clone()));
        }

        let mut scopes: HashMap<Option<String>, Vec<&Chunk>> = HashMap::new();
        for chunk in &chunks {
            scopes.entry(chunk.parent_id.clone()).or_default().push(chunk);
        }
        let by_anchor = chunks
            .iter()
            .map(|chunk| (chunk.anchor_id.as_str(), chunk))
            .collect::<HashMap<_, _>>();

        for members in scopes.values() {
            let heads = members
                .iter()
                .filter(|chunk| chunk.siblings_prev_id.is_none())
                .collect::<Vec<_>>();
            prop_assert_eq!(heads.len(), 1);

            let mut walked = Vec::new();
            let mut cursor = Some(*heads[0]);
            while let Some(chunk) = cursor {
                walked.push(chunk.anchor_id.as_str());
                cursor = chunk
                    .siblings_next_id
                    .as_deref()
                    .and_then(|next| by_anchor.get(next).copied());
            }
            let expected = members
                .iter()
                .map(|chunk| chunk.anchor_id.as_str())
                .collect::<Vec<_>>();
            prop_assert_eq!(walked, expected);
            for pair in members.windows(2) {
                prop_assert!(pair[0].start < pair[1].start);
            }
        }
    }
}
