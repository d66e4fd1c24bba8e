//! Vector similarity backend
//!
//! Similarity search is best effort. The store talks to a [`VectorBackend`]
//! and falls back to a recency scan when the backend is missing, fails or
//! times out. The bundled [`SqliteVectorIndex`] keeps embeddings in the
//! `memory_embeddings` table (little-endian f32 blobs) reached through
//! `memory_embedding_link`, and scores them by brute-force cosine similarity.
//! Only the row copy runs under the shared connection lock; scoring happens
//! on a separate blocking task.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{LoreError, Result};
use crate::storage::sqlite::{SqlContext, format_ts, run_blocking};

/// One similarity hit from a backend
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub memory_id: String,
    pub similarity: f32,
}

/// Pluggable similarity index keyed by memory id
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Store or replace the embedding of a memory
    async fn upsert(&self, memory_id: &str, embedding: &[f32]) -> Result<()>;

    /// Best hits at or above `threshold`, most similar first
    async fn search(&self, query: &[f32], limit: usize, threshold: f32) -> Result<Vec<VectorHit>>;
}

/// Brute-force cosine index stored next to the memories
pub struct SqliteVectorIndex {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVectorIndex {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl VectorBackend for SqliteVectorIndex {
    fn name(&self) -> &str {
        "sqlite-cosine"
    }

    async fn upsert(&self, memory_id: &str, embedding: &[f32]) -> Result<()> {
        if embedding.is_empty() {
            return Err(LoreError::Validation("embedding must not be empty".to_string()));
        }
        let memory_id = memory_id.to_string();
        let blob = encode_embedding(embedding);
        let dimensions = embedding.len() as i64;

        run_blocking(&self.conn, "upsert embedding", move |conn| {
            let tx = conn.transaction().ctx("begin upsert embedding")?;
            let now = format_ts(&Utc::now());
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT embedding_id FROM memory_embedding_link WHERE memory_id = ?1",
                    params![memory_id],
                    |row| row.get(0),
                )
                .optional()
                .ctx("lookup embedding link")?;

            match existing {
                Some(embedding_id) => {
                    tx.execute(
                        "UPDATE memory_embeddings SET embedding = ?1, dimensions = ?2, updated_at = ?3
                         WHERE id = ?4",
                        params![blob, dimensions, now, embedding_id],
                    )
                    .ctx("update embedding")?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO memory_embeddings (embedding, dimensions, updated_at)
                         VALUES (?1, ?2, ?3)",
                        params![blob, dimensions, now],
                    )
                    .ctx("insert embedding")?;
                    let embedding_id = tx.last_insert_rowid();
                    tx.execute(
                        "INSERT INTO memory_embedding_link (memory_id, embedding_id) VALUES (?1, ?2)",
                        params![memory_id, embedding_id],
                    )
                    .ctx("link embedding")?;
                }
            }
            tx.commit().ctx("commit upsert embedding")
        })
        .await
    }

    async fn search(&self, query: &[f32], limit: usize, threshold: f32) -> Result<Vec<VectorHit>> {
        // Copy the candidate rows under the connection lock, then score them
        // without it so a timed-out scan does not stall other store calls.
        let dimensions = query.len() as i64;
        let rows = run_blocking(&self.conn, "vector search", move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT l.memory_id, e.embedding
                     FROM memory_embedding_link l
                     JOIN memory_embeddings e ON e.id = l.embedding_id
                     WHERE e.dimensions = ?1",
                )
                .ctx("prepare vector search")?;
            let rows = stmt
                .query_map(params![dimensions], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
                })
                .ctx("vector search")?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .ctx("read embedding row")
        })
        .await?;

        let query = query.to_vec();
        tokio::task::spawn_blocking(move || rank_embeddings(&query, rows, limit, threshold))
            .await
            .map_err(|e| LoreError::Task(format!("score embeddings: {e}")))
    }
}

/// Score `(memory_id, blob)` rows against `query`, best first
pub fn rank_embeddings(
    query: &[f32],
    rows: Vec<(String, Vec<u8>)>,
    limit: usize,
    threshold: f32,
) -> Vec<VectorHit> {
    let mut hits: Vec<VectorHit> = rows
        .into_iter()
        .filter_map(|(memory_id, blob)| {
            let similarity = cosine_similarity(query, &decode_embedding(&blob));
            (similarity >= threshold).then_some(VectorHit {
                memory_id,
                similarity,
            })
        })
        .collect();
    hits.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.memory_id.cmp(&b.memory_id))
    });
    hits.truncate(limit);
    hits
}

/// Little-endian f32 blob
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_rank_embeddings_orders_and_cuts() {
        let rows = vec![
            ("far".to_string(), encode_embedding(&[0.0, 1.0])),
            ("near".to_string(), encode_embedding(&[1.0, 0.1])),
            ("exact".to_string(), encode_embedding(&[1.0, 0.0])),
            ("short".to_string(), encode_embedding(&[1.0])),
        ];
        let hits = rank_embeddings(&[1.0, 0.0], rows, 2, 0.5);
        let ids: Vec<_> = hits.iter().map(|h| h.memory_id.as_str()).collect();
        assert_eq!(ids, ["exact", "near"]);
    }

    #[test]
    fn test_embedding_blob_encoding() {
        let embedding = vec![0.25f32, -1.5, 3.0];
        let blob = encode_embedding(&embedding);
        assert_eq!(blob.len(), 12);
        assert_eq!(decode_embedding(&blob), embedding);
    }
}
