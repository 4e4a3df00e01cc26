//! SQLite-backed vector index.
//!
//! A thin façade over similarity search: chunk text, metadata, and embedding
//! BLOBs live in one SQLite file. Cosine similarity is computed in Rust over
//! all stored vectors (a single document's chunks, small by construction).
//!
//! The index file is immutable once built. Replacement happens at the file
//! level: [`VectorIndex::build`] writes a complete new index at a staging
//! path and the corpus manager atomically renames it over the live path, so
//! readers never observe a partially built index.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::Chunk;

/// One retrieval hit: chunk text plus source metadata and similarity score.
#[derive(Debug, Clone)]
pub struct Hit {
    pub text: String,
    pub source: String,
    /// Zero-indexed source page.
    pub page: usize,
    pub score: f64,
}

pub struct VectorIndex {
    pool: SqlitePool,
}

impl VectorIndex {
    /// Path of the live index file inside the configured index directory.
    pub fn live_path(index_dir: &Path) -> PathBuf {
        index_dir.join("index.sqlite")
    }

    /// Path used while building a replacement index.
    pub fn staging_path(index_dir: &Path) -> PathBuf {
        index_dir.join("index.sqlite.new")
    }

    /// Reopen a persisted index. Returns `None` when no index file exists
    /// (empty corpus, nothing ever ingested).
    pub async fn open(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let pool = connect(path, false).await?;
        Ok(Some(Self { pool }))
    }

    /// Build a complete new index at `path` from chunk/vector pairs.
    /// `chunks` and `vectors` are positionally paired.
    pub async fn build(
        path: &Path,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        model: &str,
        file_name: &str,
    ) -> Result<Self> {
        debug_assert_eq!(chunks.len(), vectors.len());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // A stale staging file from an interrupted build must not leak rows.
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let pool = connect(path, true).await?;

        sqlx::query(
            r#"
            CREATE TABLE meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
            CREATE TABLE chunks (
                id          TEXT PRIMARY KEY,
                chunk_index INTEGER NOT NULL,
                text        TEXT NOT NULL,
                source      TEXT NOT NULL,
                page        INTEGER NOT NULL,
                hash        TEXT NOT NULL,
                embedding   BLOB NOT NULL
            );
            "#,
        )
        .execute(&pool)
        .await?;

        let mut tx = pool.begin().await?;
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                "INSERT INTO chunks (id, chunk_index, text, source, page, hash, embedding) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.source)
            .bind(chunk.page as i64)
            .bind(&chunk.hash)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        let now = chrono::Utc::now().timestamp();
        for (key, value) in [
            ("model", model.to_string()),
            ("file_name", file_name.to_string()),
            ("ingested_at", now.to_string()),
        ] {
            sqlx::query("INSERT INTO meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(Self { pool })
    }

    /// Nearest-neighbor search: hits ordered by descending cosine
    /// similarity, at most `k` of them.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        let rows = sqlx::query("SELECT text, source, page, embedding FROM chunks")
            .fetch_all(&self.pool)
            .await?;

        let mut hits: Vec<Hit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                let page: i64 = row.get("page");
                Hit {
                    text: row.get("text"),
                    source: row.get("source"),
                    page: page as usize,
                    score: cosine_similarity(query, &vector) as f64,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }

    pub async fn chunk_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// Source file name recorded at build time, if present.
    pub async fn file_name(&self) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM meta WHERE key = 'file_name'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    /// Close the underlying pool. Must be called before the index file is
    /// renamed or removed.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

async fn connect(path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(create)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(text: &str, source: &str, page: usize, index: i64) -> Chunk {
        Chunk {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_string(),
            source: source.to_string(),
            page,
            chunk_index: index,
            hash: format!("{:x}", {
                use sha2::{Digest, Sha256};
                let mut h = Sha256::new();
                h.update(text.as_bytes());
                h.finalize()
            }),
        }
    }

    #[tokio::test]
    async fn open_missing_index_is_none() {
        let tmp = TempDir::new().unwrap();
        let path = VectorIndex::live_path(tmp.path());
        assert!(VectorIndex::open(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_orders_by_similarity_and_truncates() {
        let tmp = TempDir::new().unwrap();
        let path = VectorIndex::live_path(tmp.path());

        let chunks = vec![
            chunk("exact match", "doc.pdf", 0, 0),
            chunk("close match", "doc.pdf", 1, 1),
            chunk("unrelated", "doc.pdf", 2, 2),
        ];
        let vectors = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.8, 0.6, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        let index = VectorIndex::build(&path, &chunks, &vectors, "fake", "doc.pdf")
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "exact match");
        assert_eq!(hits[1].text, "close match");
        assert!(hits[0].score > hits[1].score);

        let all = index.search(&[1.0, 0.0, 0.0], 10).await.unwrap();
        assert_eq!(all.len(), 3, "k larger than corpus returns all chunks");
    }

    #[tokio::test]
    async fn persist_then_reopen_gives_identical_results() {
        let tmp = TempDir::new().unwrap();
        let path = VectorIndex::live_path(tmp.path());

        let chunks = vec![
            chunk("alpha", "doc.pdf", 0, 0),
            chunk("beta", "doc.pdf", 3, 1),
        ];
        let vectors = vec![vec![0.9, 0.1], vec![0.1, 0.9]];
        let index = VectorIndex::build(&path, &chunks, &vectors, "fake", "doc.pdf")
            .await
            .unwrap();

        let query = [0.7f32, 0.3];
        let before: Vec<(String, usize)> = index
            .search(&query, 5)
            .await
            .unwrap()
            .into_iter()
            .map(|h| (h.text, h.page))
            .collect();
        index.close().await;

        let reopened = VectorIndex::open(&path).await.unwrap().unwrap();
        let after: Vec<(String, usize)> = reopened
            .search(&query, 5)
            .await
            .unwrap()
            .into_iter()
            .map(|h| (h.text, h.page))
            .collect();

        assert_eq!(before, after);
        assert_eq!(reopened.chunk_count().await.unwrap(), 2);
        assert_eq!(
            reopened.file_name().await.unwrap().as_deref(),
            Some("doc.pdf")
        );
    }

    #[tokio::test]
    async fn rebuild_discards_stale_staging_file() {
        let tmp = TempDir::new().unwrap();
        let path = VectorIndex::staging_path(tmp.path());

        let first = vec![chunk("old", "old.pdf", 0, 0)];
        let index = VectorIndex::build(&path, &first, &[vec![1.0]], "fake", "old.pdf")
            .await
            .unwrap();
        index.close().await;

        let second = vec![chunk("new", "new.pdf", 0, 0)];
        let index = VectorIndex::build(&path, &second, &[vec![1.0]], "fake", "new.pdf")
            .await
            .unwrap();
        assert_eq!(index.chunk_count().await.unwrap(), 1);
        let hits = index.search(&[1.0], 10).await.unwrap();
        assert_eq!(hits[0].source, "new.pdf");
    }
}
