use serde::{Deserialize, Serialize};

use crate::layout::LayoutBlock;

pub const PARSER_VERSION: &str = "1.0.0";
pub const DEFAULT_DOC_ID: &str = "documento-pf";

pub const ORGAO: &str = "Polícia Federal";
pub const SIGLA_ORGAO: &str = "DPF";
pub const AMBITO: &str = "federal";
pub const PAIS: &str = "Brasil";

/// Hierarchy levels in drafting order, shallowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Documento,
    Parte,
    Livro,
    Titulo,
    Capitulo,
    Secao,
    Subsecao,
    Artigo,
    Paragrafo,
    Inciso,
    Alinea,
    Item,
    Anexo,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Documento => "documento",
            Level::Parte => "parte",
            Level::Livro => "livro",
            Level::Titulo => "titulo",
            Level::Capitulo => "capitulo",
            Level::Secao => "secao",
            Level::Subsecao => "subsecao",
            Level::Artigo => "artigo",
            Level::Paragrafo => "paragrafo",
            Level::Inciso => "inciso",
            Level::Alinea => "alinea",
            Level::Item => "item",
            Level::Anexo => "anexo",
        }
    }

    /// Declaration order, shallowest first; used as the tie-breaker when two nodes share an offset.
    pub fn depth_priority(self) -> usize {
        self as usize
    }

    /// Headings that open a macro scope (everything except dispositivos and the root).
    pub fn is_macro(self) -> bool {
        matches!(
            self,
            Level::Parte
                | Level::Livro
                | Level::Titulo
                | Level::Capitulo
                | Level::Secao
                | Level::Subsecao
                | Level::Anexo
        )
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPage {
    pub index: u32,
    pub text: String,
}

/// Byte range a page occupies inside the joined document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpan {
    pub index: u32,
    pub start: usize,
    pub end: usize,
}

impl PageSpan {
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        !(self.end <= start || self.start >= end)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingBlock {
    pub ementa: Option<String>,
    pub preambulo: Option<String>,
    pub considerandos: Vec<String>,
    pub anexos_presentes: Vec<String>,
}

/// One structural unit. Lives in a [`DocumentTree`] arena and refers to
/// relatives by index; `parent_id` mirrors the parent's content id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyNode {
    pub id: String,
    pub level: Level,
    pub label: String,
    pub title: Option<String>,
    pub start: usize,
    pub end: usize,
    #[serde(skip)]
    pub parent: Option<usize>,
    pub parent_id: Option<String>,
    #[serde(skip)]
    pub children: Vec<usize>,
}

/// Arena of nodes in push order. Index 0 is always the synthetic `documento` root.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DocumentTree {
    pub nodes: Vec<HierarchyNode>,
}

impl DocumentTree {
    pub const ROOT: usize = 0;

    pub fn get(&self, index: usize) -> Option<&HierarchyNode> {
        self.nodes.get(index)
    }

    /// Node count, the synthetic root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn children_of(&self, index: usize) -> impl Iterator<Item = (usize, &HierarchyNode)> {
        self.nodes
            .get(index)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.nodes.get(*child).map(|node| (*child, node)))
    }

    /// Ancestor indices from the top-most non-root ancestor down to `index` itself.
    pub fn lineage(&self, index: usize) -> Vec<usize> {
        let mut path = Vec::new();
        let mut cursor = Some(index);
        while let Some(current) = cursor {
            let Some(node) = self.nodes.get(current) else {
                break;
            };
            if node.level != Level::Documento {
                path.push(current);
            }
            cursor = node.parent;
        }
        path.reverse();
        path
    }

    pub fn count_level(&self, level: Level) -> usize {
        self.nodes.iter().filter(|node| node.level == level).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PfDocumentMetadata {
    pub doc_id: String,
    pub especie_normativa: Option<String>,
    pub numero: Option<String>,
    pub ano: Option<String>,
    pub numero_completo: Option<String>,
    pub data_publicacao: Option<String>,
    pub data_vigencia: Option<String>,
    pub situacao: Option<String>,
    pub fonte_publicacao: Option<String>,
    pub processo_ref: Option<String>,
    pub unidade_emitente: Option<String>,
    pub ementa: Option<String>,
    pub preambulo: Option<String>,
    pub considerandos: Vec<String>,
    pub anexos_presentes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreadcrumbEntry {
    #[serde(rename = "nivel")]
    pub level: Level,
    #[serde(rename = "rotulo")]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProvenance {
    #[serde(rename = "arquivo")]
    pub source_file: String,
    #[serde(rename = "paginas")]
    pub source_pages: Vec<u32>,
}

/// Retrieval unit. Serialized field names are the export contract consumed
/// by the indexer; renaming any of them requires a `versao_parser` bump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_id: String,
    pub anchor_id: String,
    #[serde(rename = "nivel")]
    pub level: Level,
    #[serde(rename = "rotulo")]
    pub label: String,
    #[serde(rename = "ordinal_normalizado")]
    pub ordinal_normalized: String,
    #[serde(rename = "caminho_hierarquico")]
    pub breadcrumb: Vec<BreadcrumbEntry>,
    #[serde(rename = "texto")]
    pub text: String,
    #[serde(rename = "tokens_estimados")]
    pub tokens_estimated: usize,
    pub parent_id: Option<String>,
    pub siblings_prev_id: Option<String>,
    pub siblings_next_id: Option<String>,
    #[serde(rename = "origem_pdf")]
    pub provenance: SourceProvenance,
    #[serde(rename = "hash_conteudo")]
    pub content_hash: String,
    pub texto_limpo: bool,
    pub versao_parser: String,
    #[serde(skip)]
    pub start: usize,
    #[serde(skip)]
    pub end: usize,

    pub orgao: String,
    pub sigla_orgao: String,
    pub ambito: String,
    pub pais: String,
    pub publicacao_publica: bool,
    pub especie_normativa: Option<String>,
    pub numero: Option<String>,
    pub ano: Option<String>,
    pub numero_completo: Option<String>,
    pub data_publicacao: Option<String>,
    pub data_vigencia: Option<String>,
    pub situacao: Option<String>,
    pub fonte_publicacao: Option<String>,
    pub processo_ref: Option<String>,
    pub unidade_emitente: Option<String>,
    pub ementa: Option<String>,
    pub preambulo: Option<String>,
    pub considerandos: Vec<String>,
    pub anexos_presentes: Vec<String>,

    #[serde(rename = "layout_refs", default, skip_serializing_if = "Vec::is_empty")]
    pub table_refs: Vec<LayoutBlock>,
}
