//! Active corpus lifecycle.
//!
//! [`ActiveCorpus`] owns the single active document's vector index and the
//! process-wide replacement semantics: each ingestion fully supersedes the
//! previous document. The index handle sits behind a `RwLock` so queries run
//! concurrently with each other but never observe a half-replaced index, and
//! a separate ingest mutex serializes ingestions against each other.
//!
//! Replacement ordering is build-new-then-swap: the new index is written to
//! a staging file while queries keep being served from the old one, then
//! renamed over the live path under the write lock. A failure anywhere
//! before the swap leaves the previous corpus intact and active.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::chunk::split_document;
use crate::config::{ChunkingConfig, Config};
use crate::embedding::Embedder;
use crate::extract::extract_pages;
use crate::index::{Hit, VectorIndex};
use crate::models::{Document, IngestReport};

pub struct ActiveCorpus {
    index_dir: PathBuf,
    chunking: ChunkingConfig,
    batch_size: usize,
    embedder: Arc<dyn Embedder>,
    index: RwLock<Option<VectorIndex>>,
    /// Held across a whole ingestion; the `index` write lock is only taken
    /// for the final swap.
    ingest_lock: Mutex<()>,
}

impl ActiveCorpus {
    /// Reopen a persisted index from a prior process if one exists;
    /// otherwise start with an empty corpus.
    pub async fn load_or_create(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let index_dir = config.storage.index_dir.clone();
        std::fs::create_dir_all(&index_dir)
            .with_context(|| format!("Failed to create index dir: {}", index_dir.display()))?;

        let live = VectorIndex::live_path(&index_dir);
        let index = VectorIndex::open(&live).await?;
        if index.is_some() {
            tracing::info!(path = %live.display(), "reopened persisted vector index");
        }

        Ok(Self {
            index_dir,
            chunking: config.chunking.clone(),
            batch_size: config.embedding.batch_size,
            embedder,
            index: RwLock::new(index),
            ingest_lock: Mutex::new(()),
        })
    }

    /// Ingest one document: extract, chunk, embed, build a new index, and
    /// swap it in as the active corpus. Synchronous and single-shot; on
    /// failure the previously active corpus stays in place.
    pub async fn ingest(&self, path: &Path) -> Result<IngestReport> {
        let _serialize = self.ingest_lock.lock().await;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();

        let pages = extract_pages(path)?;
        let document = Document {
            file_name: file_name.clone(),
            pages,
        };

        let chunks = split_document(
            &document,
            self.chunking.max_chars,
            self.chunking.overlap_chars,
        );
        if chunks.is_empty() {
            bail!("no text could be extracted from {}", file_name);
        }
        tracing::info!(file = %file_name, chunks = chunks.len(), "chunked document");

        // Embed in batches; any batch failure aborts the whole ingestion.
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let batch_vectors = self.embedder.embed(&texts).await?;
            if batch_vectors.len() != texts.len() {
                bail!(
                    "embedder returned {} vectors for {} texts",
                    batch_vectors.len(),
                    texts.len()
                );
            }
            vectors.extend(batch_vectors);
        }

        // Build the replacement index at the staging path while queries
        // keep being served from the current one.
        let staging = VectorIndex::staging_path(&self.index_dir);
        let built = VectorIndex::build(
            &staging,
            &chunks,
            &vectors,
            self.embedder.model_name(),
            &file_name,
        )
        .await?;
        built.close().await;

        // Swap: close the old handle, rename the staging file over the
        // live path, reopen. Readers are excluded for this window only.
        let live = VectorIndex::live_path(&self.index_dir);
        self.activate(&staging, &live).await?;

        tracing::info!(file = %file_name, chunks = chunks.len(), "corpus replaced");
        Ok(IngestReport {
            file_name,
            chunk_count: chunks.len(),
        })
    }

    /// Rename the staging file over the live path and refresh the in-memory
    /// handle under the write lock. If the swap fails, whatever still sits
    /// at the live path (normally the previous index, untouched by the
    /// failed rename) is put back in service before the error propagates.
    async fn activate(&self, staging: &Path, live: &Path) -> Result<()> {
        let mut guard = self.index.write().await;
        if let Some(old) = guard.take() {
            old.close().await;
        }
        remove_sidecars(live);

        let swapped = async {
            std::fs::rename(staging, live)
                .with_context(|| format!("Failed to activate new index at {}", live.display()))?;
            VectorIndex::open(live)
                .await?
                .context("freshly built index missing after swap")
        }
        .await;

        match swapped {
            Ok(index) => {
                *guard = Some(index);
                Ok(())
            }
            Err(err) => {
                match VectorIndex::open(live).await {
                    Ok(previous) => *guard = previous,
                    Err(e) => {
                        tracing::warn!(path = %live.display(), error = %e, "could not reopen index after failed swap");
                    }
                }
                Err(err)
            }
        }
    }

    /// Similarity search against the active index. An empty corpus (nothing
    /// ever ingested, or the last ingestion failed before a corpus ever
    /// existed) returns no hits.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        let guard = self.index.read().await;
        match guard.as_ref() {
            Some(index) => index.search(query, k).await,
            None => Ok(Vec::new()),
        }
    }

    /// File name of the currently active document, if any.
    pub async fn active_file(&self) -> Result<Option<String>> {
        let guard = self.index.read().await;
        match guard.as_ref() {
            Some(index) => index.file_name().await,
            None => Ok(None),
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_none()
    }
}

/// Remove WAL sidecar files left next to a closed index. Failure is
/// non-fatal: ingestion must not be blocked by cleanup, so it is logged
/// and the swap proceeds.
fn remove_sidecars(live: &Path) {
    for suffix in ["-wal", "-shm"] {
        let mut os = live.as_os_str().to_owned();
        os.push(suffix);
        let sidecar = PathBuf::from(os);
        if sidecar.exists() {
            if let Err(e) = std::fs::remove_file(&sidecar) {
                tracing::warn!(path = %sidecar.display(), error = %e, "could not remove stale index sidecar");
            }
        }
    }
}
