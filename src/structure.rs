//! Stack-based recovery of the legal hierarchy from normalized text.

use tracing::debug;

use crate::model::{DocumentTree, HeadingBlock, HierarchyNode, Level};
use crate::patterns::{DISPOSITIVO_ORDER, LineMatch, PatternLibrary};
use crate::util::{lead_window, sha256_hex};


const ROOT_LABEL: &str = "ROOT";
const ROOT_TITLE: &str = "Documento";

const EMENTA_LINE_WINDOW: usize = 20;
const PREAMBLE_SEARCH_BYTES: usize = 2000;
const PREAMBLE_CAPTURE_BYTES: usize = 600;
const CONSIDERANDO_LINE_WINDOW: usize = 200;

/// Levels an `artigo` may nest under.
const ARTIGO_SCOPES: [Level; 7] = [
    Level::Documento,
    Level::Parte,
    Level::Livro,
    Level::Titulo,
    Level::Capitulo,
    Level::Secao,
    Level::Subsecao,
];

/// First 16 hex chars of SHA-256 over `level-label-start`.
pub fn node_id(level: Level, label: &str, start: usize) -> String {
    let digest = sha256_hex(&format!("{}-{}-{}", level.as_str(), label, start));
    digest[..16].to_string()
}

/// Scans `text` once and returns the hierarchy tree plus the heading block.
///
/// Never fails: text with no recognisable markers yields a tree holding only
/// the synthetic root.
pub fn detect_structure(patterns: &PatternLibrary, text: &str) -> (DocumentTree, HeadingBlock) {
    let mut heading = find_heading_block(patterns, text);
    let mut builder = TreeBuilder::new();

    let mut offset = 0_usize;
    for raw_line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += raw_line.len();

        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(found) = patterns.match_macro(line) {
            builder.close_to_root(line_start);
            builder.push(found, line_start);
            continue;
        }

        if let Some(found) = builder.match_dispositivo(patterns, line) {
            builder.close_for(found.level, line_start);
            builder.push(found, line_start);
        }
    }

    let tree = builder.finish(text.len());
    heading.anexos_presentes = tree
        .nodes
        .iter()
        .filter(|node| node.level == Level::Anexo)
        .map(|node| node.label.clone())
        .collect();

    debug!(
        nodes = tree.node_count(),
        artigos = tree.count_level(Level::Artigo),
        anexos = heading.anexos_presentes.len(),
        "structure detected"
    );

    (tree, heading)
}

/// Ementa, preamble and considerandos from the top of the document.
pub fn find_heading_block(patterns: &PatternLibrary, text: &str) -> HeadingBlock {
    let lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<&str>>();

    let ementa = lines
        .iter()
        .take(EMENTA_LINE_WINDOW)
        .find(|line| patterns.is_ementa_line(line))
        .map(|line| line.to_string());

    let preambulo = patterns
        .preamble_start(lead_window(text, PREAMBLE_SEARCH_BYTES))
        .and_then(|start| {
            let captured = lead_window(&text[start..], PREAMBLE_CAPTURE_BYTES);
            let first_block = captured.split("\n\n").next().unwrap_or_default().trim();
            (!first_block.is_empty()).then(|| first_block.to_string())
        });

    let considerandos = lines
        .iter()
        .take(CONSIDERANDO_LINE_WINDOW)
        .filter(|line| line.to_lowercase().starts_with("considerando"))
        .map(|line| line.to_string())
        .collect();

    HeadingBlock {
        ementa,
        preambulo,
        considerandos,
        anexos_presentes: Vec::new(),
    }
}

fn scopes_for(level: Level) -> &'static [Level] {
    match level {
        Level::Artigo => &ARTIGO_SCOPES,
        Level::Paragrafo => &[Level::Artigo],
        Level::Inciso => &[Level::Paragrafo, Level::Artigo],
        Level::Alinea => &[Level::Inciso, Level::Paragrafo, Level::Artigo],
        Level::Item => &[Level::Alinea, Level::Inciso, Level::Paragrafo, Level::Artigo],
        _ => &[Level::Documento],
    }
}

struct TreeBuilder {
    tree: DocumentTree,
    stack: Vec<usize>,
}

impl TreeBuilder {
    fn new() -> Self {
        let root = HierarchyNode {
            id: node_id(Level::Documento, ROOT_LABEL, 0),
            level: Level::Documento,
            label: ROOT_LABEL.to_string(),
            title: Some(ROOT_TITLE.to_string()),
            start: 0,
            end: 0,
            parent: None,
            parent_id: None,
            children: Vec::new(),
        };

        Self {
            tree: DocumentTree { nodes: vec![root] },
            stack: vec![DocumentTree::ROOT],
        }
    }

    fn top_level(&self) -> Level {
        self.stack
            .last()
            .and_then(|index| self.tree.get(*index))
            .map(|node| node.level)
            .unwrap_or(Level::Documento)
    }

    fn has_open(&self, levels: &[Level]) -> bool {
        self.stack.iter().any(|index| {
            self.tree
                .get(*index)
                .is_some_and(|node| levels.contains(&node.level))
        })
    }

    /// Dispositivo matchers in priority order. A bare Roman numeral only
    /// counts as an inciso while an artigo or paragrafo is open.
    fn match_dispositivo(&self, patterns: &PatternLibrary, line: &str) -> Option<LineMatch> {
        DISPOSITIVO_ORDER.iter().find_map(|level| {
            if *level == Level::Inciso && !self.has_open(&[Level::Artigo, Level::Paragrafo]) {
                return None;
            }
            patterns.match_dispositivo(*level, line)
        })
    }

    fn pop(&mut self, end: usize) {
        if let Some(index) = self.stack.pop() {
            if let Some(node) = self.tree.nodes.get_mut(index) {
                node.end = end;
            }
        }
    }

    fn close_to_root(&mut self, at: usize) {
        while self.stack.len() > 1 {
            self.pop(at);
        }
    }

    /// Closes open nodes until a valid parent for `level` is on top.
    ///
    /// An artigo closes everything up to its nearest heading ancestor, an
    /// open anexo included. Other dispositivos without an open target stop
    /// at the nearest macro heading or the root.
    fn close_for(&mut self, level: Level, at: usize) {
        let targets = scopes_for(level);
        while self.stack.len() > 1 {
            let top = self.top_level();
            if targets.contains(&top) || (top.is_macro() && level != Level::Artigo) {
                break;
            }
            self.pop(at);
        }
    }

    fn push(&mut self, found: LineMatch, start: usize) {
        let parent = self.stack.last().copied().unwrap_or(DocumentTree::ROOT);
        let index = self.tree.nodes.len();
        let parent_id = self.tree.get(parent).map(|node| node.id.clone());

        self.tree.nodes.push(HierarchyNode {
            id: node_id(found.level, &found.label, start),
            level: found.level,
            label: found.label,
            title: found.title,
            start,
            end: start,
            parent: Some(parent),
            parent_id,
            children: Vec::new(),
        });
        if let Some(parent_node) = self.tree.nodes.get_mut(parent) {
            parent_node.children.push(index);
        }
        self.stack.push(index);
    }

    fn finish(mut self, len: usize) -> DocumentTree {
        while !self.stack.is_empty() {
            self.pop(len);
        }
        self.tree
    }
}
