//! SQLite persistence for documents, nodes and chunks.
//!
//! Each document is replaced wholesale inside one transaction. Before the
//! old rows go, their content hashes are compared by `anchor_id` so callers
//! learn which chunks actually changed since the previous run.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::debug;

use crate::model::{Chunk, DocumentTree, PfDocumentMetadata};
use crate::util::{ensure_directory, now_utc_string};

pub const DB_SCHEMA_VERSION: &str = "1.0.0";

/// Everything stored for one source document.
pub struct StoredDocument<'a> {
    pub source_file: &'a str,
    pub source_sha256: &'a str,
    pub metadata: &'a PfDocumentMetadata,
    pub tree: &'a DocumentTree,
    pub chunks: &'a [Chunk],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceOutcome {
    pub inserted: usize,
    pub unchanged: usize,
    pub changed: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub docs: i64,
    pub nodes: i64,
    pub chunks: i64,
}

pub struct ChunkStore {
    connection: Connection,
}

impl ChunkStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            ensure_directory(parent)?;
        }
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        configure_connection(&connection)?;

        let store = Self { connection };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn ensure_schema(&self) -> Result<()> {
        self.connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS metadata (
                  key TEXT PRIMARY KEY,
                  value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS docs (
                  doc_id TEXT PRIMARY KEY,
                  source_file TEXT NOT NULL,
                  sha256 TEXT NOT NULL,
                  especie_normativa TEXT,
                  numero TEXT,
                  ano TEXT,
                  data_publicacao TEXT,
                  situacao TEXT,
                  metadata_json TEXT NOT NULL,
                  updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS nodes (
                  doc_id TEXT NOT NULL,
                  node_id TEXT NOT NULL,
                  parent_node_id TEXT,
                  level TEXT NOT NULL,
                  label TEXT NOT NULL,
                  title TEXT,
                  start_offset INTEGER NOT NULL,
                  end_offset INTEGER NOT NULL,
                  order_index INTEGER NOT NULL,
                  PRIMARY KEY (doc_id, node_id),
                  FOREIGN KEY(doc_id) REFERENCES docs(doc_id)
                );

                CREATE TABLE IF NOT EXISTS chunks (
                  doc_id TEXT NOT NULL,
                  anchor_id TEXT NOT NULL,
                  chunk_seq INTEGER NOT NULL,
                  level TEXT NOT NULL,
                  label TEXT NOT NULL,
                  ordinal TEXT NOT NULL,
                  parent_id TEXT,
                  siblings_prev_id TEXT,
                  siblings_next_id TEXT,
                  text TEXT NOT NULL,
                  tokens INTEGER NOT NULL,
                  content_hash TEXT NOT NULL,
                  record_json TEXT NOT NULL,
                  PRIMARY KEY (doc_id, anchor_id),
                  FOREIGN KEY(doc_id) REFERENCES docs(doc_id)
                );

                CREATE INDEX IF NOT EXISTS idx_nodes_doc_parent ON nodes(doc_id, parent_node_id);
                CREATE INDEX IF NOT EXISTS idx_chunks_doc_seq ON chunks(doc_id, chunk_seq);
                CREATE INDEX IF NOT EXISTS idx_chunks_doc_parent ON chunks(doc_id, parent_id);
                ",
            )
            .context("failed to create chunk store schema")?;

        upsert_metadata(&self.connection, "db_schema_version", DB_SCHEMA_VERSION)?;
        upsert_metadata(&self.connection, "db_updated_at", &now_utc_string())?;
        Ok(())
    }

    /// Replaces every node and chunk of `doc` and reports how the chunk set
    /// moved relative to what was stored before.
    ///
    /// Rows of the same source file stored under another doc_id are dropped
    /// in the same transaction and counted as removed.
    pub fn replace_document(&mut self, doc: &StoredDocument<'_>) -> Result<ReplaceOutcome> {
        let doc_id = doc.metadata.doc_id.as_str();
        let previous = self.stored_hashes(doc_id)?;

        let mut outcome = ReplaceOutcome::default();
        let mut current = HashSet::with_capacity(doc.chunks.len());
        for chunk in doc.chunks {
            current.insert(chunk.anchor_id.as_str());
            match previous.get(&chunk.anchor_id) {
                None => outcome.inserted += 1,
                Some(hash) if *hash == chunk.content_hash => outcome.unchanged += 1,
                Some(_) => outcome.changed += 1,
            }
        }
        outcome.removed = previous
            .keys()
            .filter(|anchor| !current.contains(anchor.as_str()))
            .count();

        let metadata_json =
            serde_json::to_string(doc.metadata).context("failed to serialize document metadata")?;
        let now = now_utc_string();

        let tx = self.connection.transaction()?;

        // Rows left behind when the same source now resolves to another doc_id.
        let stale_chunks = tx.execute(
            "DELETE FROM chunks WHERE doc_id IN
               (SELECT doc_id FROM docs WHERE source_file = ?1 AND doc_id <> ?2)",
            params![doc.source_file, doc_id],
        )?;
        tx.execute(
            "DELETE FROM nodes WHERE doc_id IN
               (SELECT doc_id FROM docs WHERE source_file = ?1 AND doc_id <> ?2)",
            params![doc.source_file, doc_id],
        )?;
        tx.execute(
            "DELETE FROM docs WHERE source_file = ?1 AND doc_id <> ?2",
            params![doc.source_file, doc_id],
        )?;
        outcome.removed += stale_chunks;

        tx.execute("DELETE FROM chunks WHERE doc_id = ?1", [doc_id])?;
        tx.execute("DELETE FROM nodes WHERE doc_id = ?1", [doc_id])?;
        tx.execute(
            "
            INSERT INTO docs(doc_id, source_file, sha256, especie_normativa, numero, ano,
                             data_publicacao, situacao, metadata_json, updated_at)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(doc_id) DO UPDATE SET
              source_file=excluded.source_file,
              sha256=excluded.sha256,
              especie_normativa=excluded.especie_normativa,
              numero=excluded.numero,
              ano=excluded.ano,
              data_publicacao=excluded.data_publicacao,
              situacao=excluded.situacao,
              metadata_json=excluded.metadata_json,
              updated_at=excluded.updated_at
            ",
            params![
                doc_id,
                doc.source_file,
                doc.source_sha256,
                doc.metadata.especie_normativa,
                doc.metadata.numero,
                doc.metadata.ano,
                doc.metadata.data_publicacao,
                doc.metadata.situacao,
                metadata_json,
                now
            ],
        )?;

        {
            let mut node_statement = tx.prepare(
                "
                INSERT INTO nodes(doc_id, node_id, parent_node_id, level, label, title,
                                  start_offset, end_offset, order_index)
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ",
            )?;
            for (order_index, node) in doc.tree.nodes.iter().enumerate() {
                node_statement.execute(params![
                    doc_id,
                    node.id,
                    node.parent_id,
                    node.level.as_str(),
                    node.label,
                    node.title,
                    node.start as i64,
                    node.end as i64,
                    order_index as i64
                ])?;
            }

            let mut chunk_statement = tx.prepare(
                "
                INSERT INTO chunks(doc_id, anchor_id, chunk_seq, level, label, ordinal, parent_id,
                                   siblings_prev_id, siblings_next_id, text, tokens,
                                   content_hash, record_json)
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                ",
            )?;
            for (seq, chunk) in doc.chunks.iter().enumerate() {
                let record_json = serde_json::to_string(chunk)
                    .with_context(|| format!("failed to serialize chunk {}", chunk.anchor_id))?;
                chunk_statement.execute(params![
                    doc_id,
                    chunk.anchor_id,
                    seq as i64,
                    chunk.level.as_str(),
                    chunk.label,
                    chunk.ordinal_normalized,
                    chunk.parent_id,
                    chunk.siblings_prev_id,
                    chunk.siblings_next_id,
                    chunk.text,
                    chunk.tokens_estimated as i64,
                    chunk.content_hash,
                    record_json
                ])?;
            }
        }

        tx.commit()
            .with_context(|| format!("failed to commit document {doc_id}"))?;

        debug!(
            doc_id,
            inserted = outcome.inserted,
            unchanged = outcome.unchanged,
            changed = outcome.changed,
            removed = outcome.removed,
            "document stored"
        );
        Ok(outcome)
    }

    /// Drops every document that came from `source_file`. Returns the number
    /// of chunks deleted.
    pub fn remove_source(&mut self, source_file: &str) -> Result<usize> {
        let tx = self.connection.transaction()?;
        let removed = tx.execute(
            "DELETE FROM chunks WHERE doc_id IN (SELECT doc_id FROM docs WHERE source_file = ?1)",
            [source_file],
        )?;
        tx.execute(
            "DELETE FROM nodes WHERE doc_id IN (SELECT doc_id FROM docs WHERE source_file = ?1)",
            [source_file],
        )?;
        tx.execute("DELETE FROM docs WHERE source_file = ?1", [source_file])?;
        tx.commit()
            .with_context(|| format!("failed to remove source {source_file}"))?;

        debug!(source_file, chunks = removed, "source removed");
        Ok(removed)
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        Ok(StoreCounts {
            docs: query_count(&self.connection, "SELECT COUNT(*) FROM docs")?,
            nodes: query_count(&self.connection, "SELECT COUNT(*) FROM nodes")?,
            chunks: query_count(&self.connection, "SELECT COUNT(*) FROM chunks")?,
        })
    }

    pub fn schema_version(&self) -> Result<Option<String>> {
        self.connection
            .query_row(
                "SELECT value FROM metadata WHERE key = 'db_schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read schema version")
    }

    fn stored_hashes(&self, doc_id: &str) -> Result<HashMap<String, String>> {
        let mut statement = self
            .connection
            .prepare("SELECT anchor_id, content_hash FROM chunks WHERE doc_id = ?1")?;
        let rows = statement.query_map([doc_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut hashes = HashMap::new();
        for row in rows {
            let (anchor, hash) = row?;
            hashes.insert(anchor, hash);
        }
        Ok(hashes)
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn upsert_metadata(connection: &Connection, key: &str, value: &str) -> Result<()> {
    connection
        .execute(
            "INSERT INTO metadata(key, value) VALUES(?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            [key, value],
        )
        .with_context(|| format!("failed to write metadata key {key}"))?;
    Ok(())
}

fn query_count(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection
        .query_row(sql, [], |row| row.get(0))
        .with_context(|| format!("failed to run count query: {sql}"))?;
    Ok(count)
}
