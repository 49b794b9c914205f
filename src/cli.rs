use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use pf_normas::ChunkerConfig;

#[derive(Parser, Debug)]
#[command(
    name = "pf-normas",
    version,
    about = "Structural parsing and chunking of Polícia Federal normative documents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fingerprint the source folder and diff it against the last inventory.
    Inventory(InventoryArgs),
    /// Parse, chunk and store every source document.
    Ingest(IngestArgs),
    /// Report pattern hits and chunk-size distribution per source.
    Calibrate(CalibrateArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ChunkingArgs {
    #[arg(long, env = "PF_RAG_TOKEN_MAX", default_value_t = 1200)]
    pub token_max: usize,

    /// Chunks below this estimate are only counted in reports.
    #[arg(long, env = "PF_RAG_TOKEN_MIN", default_value_t = 400)]
    pub token_min: usize,

    #[arg(long, env = "PF_RAG_CHARS_PER_TOKEN", default_value_t = 4.0)]
    pub chars_per_token: f64,
}

impl ChunkingArgs {
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            max_tokens: self.token_max,
            chars_per_token: self.chars_per_token,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[arg(long, env = "PF_RAG_PDF_FOLDER", default_value = "SGP")]
    pub source_dir: PathBuf,

    #[arg(long, env = "PF_RAG_CACHE_ROOT", default_value = ".cache/pf-normas")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(long, env = "PF_RAG_PDF_FOLDER", default_value = "SGP")]
    pub source_dir: PathBuf,

    #[arg(long, env = "PF_RAG_CACHE_ROOT", default_value = ".cache/pf-normas")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub inventory_manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub ingest_manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub refresh_inventory: bool,

    #[arg(
        long,
        env = "PF_RAG_EXPORT_JSONL",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub export_jsonl: bool,

    #[arg(long, env = "PF_RAG_CHUNKS_JSONL")]
    pub chunks_jsonl: Option<PathBuf>,

    /// Worker threads; defaults to the number of logical CPUs.
    #[arg(long)]
    pub jobs: Option<usize>,

    #[arg(long)]
    pub max_pages_per_doc: Option<usize>,

    #[command(flatten)]
    pub chunking: ChunkingArgs,
}

#[derive(Args, Debug, Clone)]
pub struct CalibrateArgs {
    #[arg(long, env = "PF_RAG_PDF_FOLDER", default_value = "SGP")]
    pub source_dir: PathBuf,

    #[arg(long, env = "PF_RAG_CACHE_ROOT", default_value = ".cache/pf-normas")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long)]
    pub max_pages_per_doc: Option<usize>,

    #[command(flatten)]
    pub chunking: ChunkingArgs,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, env = "PF_RAG_CACHE_ROOT", default_value = ".cache/pf-normas")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ingest_defaults_match_documented_values() {
        let cli = Cli::try_parse_from(["pf-normas", "ingest", "--export-jsonl", "false"])
            .expect("ingest args parse");
        let Commands::Ingest(args) = cli.command else {
            panic!("expected ingest command");
        };
        assert!(!args.export_jsonl);
        assert_eq!(args.chunking.chunker_config().max_tokens, 1200);
        assert_eq!(args.chunking.token_min, 400);
    }
}
