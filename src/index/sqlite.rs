//! SQLite-backed [`VectorIndex`] and [`IndexBackend`].
//!
//! Every build writes its rows into `index_entries` under a fresh
//! `generation` id recorded in `index_generations`.
//! `index_meta.active_generation` names the published one.
//!
//! Publishing flips that pointer and collects superseded generations in a
//! single transaction. A generation survives collection while it is the
//! one just replaced, or while a [`SqliteIndex`] handle in this process
//! still refers to it. Readers in other processes sharing the file can
//! still lose theirs; a query against a collected generation fails with
//! [`Error::Index`] instead of returning an empty result, and callers
//! re-open the active generation.
//!
//! Vectors are stored as little-endian `f32` BLOBs and scored in process
//! with brute-force cosine similarity.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{Error, Result};
use crate::knowledge::Category;
use crate::migrate;
use crate::models::{Chunk, IndexEntry, IndexMatch};

use super::{check_dims, rank_matches, IndexBackend, VectorIndex};

const ACTIVE_KEY: &str = "active_generation";

/// Unpublished generations older than this are treated as abandoned builds.
const ABANDONED_BUILD_SECS: i64 = 60 * 60;

/// Live handle count per generation, shared by a backend and its indexes.
type Leases = Arc<Mutex<HashMap<String, usize>>>;

/// Keeps a generation from being collected while a handle holds it.
struct Lease {
    generation: String,
    leases: Leases,
}

impl Lease {
    fn acquire(leases: &Leases, generation: String) -> Self {
        *leases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(generation.clone())
            .or_insert(0) += 1;
        Self {
            generation,
            leases: Arc::clone(leases),
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = leases.get_mut(&self.generation) {
            *count -= 1;
            if *count == 0 {
                leases.remove(&self.generation);
            }
        }
    }
}

/// One generation's rows in the shared database.
pub struct SqliteIndex {
    pool: SqlitePool,
    lease: Lease,
}

impl SqliteIndex {
    fn new(pool: SqlitePool, leases: &Leases, generation: String) -> Self {
        Self {
            pool,
            lease: Lease::acquire(leases, generation),
        }
    }

    fn gone(&self) -> Error {
        Error::Index(format!(
            "generation {} is no longer available",
            self.lease.generation
        ))
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn generation(&self) -> &str {
        &self.lease.generation
    }

    async fn upsert(&self, entry: &IndexEntry) -> Result<()> {
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT dims FROM index_entries WHERE generation = ? AND id != ? LIMIT 1",
        )
        .bind(self.generation())
        .bind(&entry.chunk.id)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(dims) = existing {
            check_dims(dims as usize, entry.vector.len())?;
        }

        let chunk = &entry.chunk;
        sqlx::query(
            r#"
            INSERT INTO index_entries
                (generation, id, source_id, doc_type, chunk_index, text, overlap, hash, dims, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(generation, id) DO UPDATE SET
                source_id = excluded.source_id,
                doc_type = excluded.doc_type,
                chunk_index = excluded.chunk_index,
                text = excluded.text,
                overlap = excluded.overlap,
                hash = excluded.hash,
                dims = excluded.dims,
                embedding = excluded.embedding
            "#,
        )
        .bind(self.generation())
        .bind(&chunk.id)
        .bind(&chunk.source_id)
        .bind(chunk.doc_type.as_str())
        .bind(chunk.chunk_index as i64)
        .bind(&chunk.text)
        .bind(chunk.overlap as i64)
        .bind(&chunk.hash)
        .bind(entry.vector.len() as i64)
        .bind(vec_to_blob(&entry.vector))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM index_entries WHERE generation = ?")
            .bind(self.generation())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexMatch>> {
        // One read transaction, so the existence check and the rows agree.
        let mut tx = self.pool.begin().await?;
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM index_generations WHERE generation = ?")
                .bind(self.generation())
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(self.gone());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, source_id, doc_type, chunk_index, text, overlap, hash, dims, embedding
            FROM index_entries
            WHERE generation = ?
            "#,
        )
        .bind(self.generation())
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in &rows {
            let dims: i64 = row.get("dims");
            check_dims(dims as usize, vector.len())?;

            let blob: Vec<u8> = row.get("embedding");
            let doc_type: String = row.get("doc_type");
            let chunk_index: i64 = row.get("chunk_index");
            let overlap: i64 = row.get("overlap");
            matches.push(IndexMatch {
                score: cosine_similarity(vector, &blob_to_vec(&blob)),
                chunk: Chunk {
                    id: row.get("id"),
                    source_id: row.get("source_id"),
                    doc_type: Category::from_str(&doc_type)?,
                    chunk_index: chunk_index as usize,
                    text: row.get("text"),
                    overlap: overlap as usize,
                    hash: row.get("hash"),
                },
            });
        }

        Ok(rank_matches(matches, k))
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM index_entries WHERE generation = ?")
                .bind(self.generation())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }
}

/// Persistent backend over a single SQLite database file.
pub struct SqliteBackend {
    pool: SqlitePool,
    leases: Leases,
}

impl SqliteBackend {
    /// Open the database at `path`, creating it and its tables if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            leases: Leases::default(),
        })
    }

    /// Generations held by a live [`SqliteIndex`] in this process.
    fn leased(&self) -> HashSet<String> {
        self.leases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl IndexBackend for SqliteBackend {
    async fn active_generation(&self) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
                .bind(ACTIVE_KEY)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn open_active(&self) -> Result<Option<Arc<dyn VectorIndex>>> {
        Ok(self.active_generation().await?.map(|generation| {
            Arc::new(SqliteIndex::new(self.pool.clone(), &self.leases, generation))
                as Arc<dyn VectorIndex>
        }))
    }

    async fn create_generation(&self) -> Result<Arc<dyn VectorIndex>> {
        let generation = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO index_generations (generation, created_at) VALUES (?, ?)")
            .bind(&generation)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(Arc::new(SqliteIndex::new(
            self.pool.clone(),
            &self.leases,
            generation,
        )))
    }

    async fn publish(&self, generation: &Arc<dyn VectorIndex>) -> Result<()> {
        let new_generation = generation.generation();
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        let marked = sqlx::query(
            "UPDATE index_generations SET published_at = ? WHERE generation = ?",
        )
        .bind(now)
        .bind(new_generation)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if marked == 0 {
            return Err(Error::Index(format!(
                "generation {} was collected before it could be published",
                new_generation
            )));
        }

        let previous: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
                .bind(ACTIVE_KEY)
                .fetch_optional(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO index_meta (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(ACTIVE_KEY)
        .bind(new_generation)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let mut keep = self.leased();
        keep.insert(new_generation.to_string());
        keep.extend(previous);

        // Superseded generations, plus builds abandoned by a crashed process.
        let candidates: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT generation FROM index_generations
            WHERE published_at IS NOT NULL OR created_at < ?
            "#,
        )
        .bind(now - ABANDONED_BUILD_SECS)
        .fetch_all(&mut *tx)
        .await?;

        let mut removed = 0u64;
        for stale in candidates.iter().filter(|g| !keep.contains(g.as_str())) {
            removed += sqlx::query("DELETE FROM index_entries WHERE generation = ?")
                .bind(stale)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            sqlx::query("DELETE FROM index_generations WHERE generation = ?")
                .bind(stale)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            generation = new_generation,
            kept = keep.len(),
            removed_rows = removed,
            "published index generation"
        );
        Ok(())
    }

    async fn discard(&self, generation: &Arc<dyn VectorIndex>) -> Result<()> {
        if self.active_generation().await?.as_deref() == Some(generation.generation()) {
            return Err(Error::Index(
                "cannot discard the active generation".to_string(),
            ));
        }
        generation.clear().await?;
        sqlx::query("DELETE FROM index_generations WHERE generation = ?")
            .bind(generation.generation())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
