//! Structural parser and chunker for Polícia Federal normative documents.
//!
//! The core runs in four steps over already-extracted page text:
//! [`normalize`] cleans pages, [`structure`] recovers the legal hierarchy,
//! [`metadata`] reads document identity fields and [`chunker`] emits
//! retrieval chunks. [`pipeline::process_document`] chains them for one
//! document; [`store`] and [`export`] persist the result.

pub mod chunker;
pub mod export;
pub mod layout;
pub mod metadata;
pub mod model;
pub mod normalize;
pub mod patterns;
pub mod pipeline;
pub mod store;
pub mod structure;
pub mod util;

pub use chunker::{ChunkerConfig, build_chunks};
pub use metadata::extract_metadata;
pub use model::{Chunk, DocumentTree, HeadingBlock, HierarchyNode, Level, PfDocumentMetadata};
pub use patterns::PatternLibrary;
pub use pipeline::{DocumentOutput, process_document};
pub use structure::detect_structure;
