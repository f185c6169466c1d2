//! SQLite backend with FTS5 full-text search.
//!
//! Uses a single SQLite database file with two tables:
//! - `chunks`: stores the raw document chunks
//! - `chunks_fts`: FTS5 virtual table for ranked keyword search (BM25)
//!
//! Triggers keep the FTS index in sync on insert/delete/update.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use parley_core::error::IndexError;
use parley_core::{Chunk, ChunkId, ChunkIndex, ChunkRank};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::terms::terms;

pub struct SqliteChunkIndex {
    pool: SqlitePool,
}

impl SqliteChunkIndex {
    /// Open (or create) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| IndexError::Storage(format!("Cannot create {}: {e}", parent.display())))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| IndexError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let index = Self { pool };
        index.run_migrations().await?;
        info!("SQLite chunk index initialized at {}", path.display());
        Ok(index)
    }

    /// Ephemeral database on a single connection.
    pub async fn in_memory() -> Result<Self, IndexError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| IndexError::Storage(format!("Invalid SQLite options: {e}")))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| IndexError::Unavailable(format!("Failed to open SQLite: {e}")))?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, IndexError> {
        let index = Self { pool };
        index.run_migrations().await?;
        Ok(index)
    }

    async fn run_migrations(&self) -> Result<(), IndexError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                iid          INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id  TEXT NOT NULL,
                chunk_index  INTEGER NOT NULL,
                text         TEXT NOT NULL,
                token_count  INTEGER NOT NULL,
                UNIQUE(document_id, chunk_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexError::MigrationFailed(format!("chunks table: {e}")))?;

        // External-content FTS5 table; content_rowid maps to chunks.iid
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                text,
                content='chunks',
                content_rowid='iid',
                tokenize='unicode61'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexError::MigrationFailed(format!("FTS5 table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
                INSERT INTO chunks_fts(rowid, text) VALUES (new.iid, new.text);
            END
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexError::MigrationFailed(format!("insert trigger: {e}")))?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES ('delete', old.iid, old.text);
            END
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexError::MigrationFailed(format!("delete trigger: {e}")))?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES ('delete', old.iid, old.text);
                INSERT INTO chunks_fts(rowid, text) VALUES (new.iid, new.text);
            END
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexError::MigrationFailed(format!("update trigger: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Build a safe FTS5 query: each term quoted, OR-joined.
    fn sanitize_fts_query(text: &str) -> String {
        terms(text)
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    /// `?start, ?start+1, ...` for `count` bind parameters.
    fn placeholders(start: usize, count: usize) -> String {
        (start..start + count)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk, IndexError> {
        let document_id: String = row
            .try_get("document_id")
            .map_err(|e| IndexError::QueryFailed(format!("document_id column: {e}")))?;
        let chunk_index: i64 = row
            .try_get("chunk_index")
            .map_err(|e| IndexError::QueryFailed(format!("chunk_index column: {e}")))?;
        let text: String = row
            .try_get("text")
            .map_err(|e| IndexError::QueryFailed(format!("text column: {e}")))?;
        Ok(Chunk::new(document_id, chunk_index.max(0) as usize, text))
    }
}

#[async_trait]
impl ChunkIndex for SqliteChunkIndex {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn index_chunks(&self, chunks: &[Chunk]) -> Result<usize, IndexError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexError::Storage(format!("BEGIN failed: {e}")))?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (document_id, chunk_index, text, token_count)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(document_id, chunk_index) DO UPDATE SET
                    text = excluded.text,
                    token_count = excluded.token_count
                "#,
            )
            .bind(&chunk.source_document_id)
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.text)
            .bind(chunk.token_count() as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| IndexError::Storage(format!("INSERT failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| IndexError::Storage(format!("COMMIT failed: {e}")))?;
        debug!(count = chunks.len(), "Indexed chunks");
        Ok(chunks.len())
    }

    async fn rank(
        &self,
        query: &str,
        document_ids: &[String],
        limit: usize,
    ) -> Result<Vec<ChunkRank>, IndexError> {
        let fts_query = Self::sanitize_fts_query(query);
        if fts_query.is_empty() || document_ids.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT c.document_id, c.chunk_index, bm25(chunks_fts) AS rank
            FROM chunks_fts f
            JOIN chunks c ON c.iid = f.rowid
            WHERE chunks_fts MATCH ?1
              AND c.document_id IN ({})
            ORDER BY rank
            LIMIT ?2
            "#,
            Self::placeholders(3, document_ids.len())
        );

        let mut db_query = sqlx::query(&sql).bind(&fts_query).bind(limit as i64);
        for id in document_ids {
            db_query = db_query.bind(id);
        }

        let rows = db_query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexError::QueryFailed(format!("FTS5 search: {e}")))?;

        rows.iter()
            .map(|row| {
                let document_id: String = row
                    .try_get("document_id")
                    .map_err(|e| IndexError::QueryFailed(format!("document_id column: {e}")))?;
                let chunk_index: i64 = row
                    .try_get("chunk_index")
                    .map_err(|e| IndexError::QueryFailed(format!("chunk_index column: {e}")))?;
                // bm25() is negative, lower is better
                let rank: f64 = row.try_get("rank").unwrap_or(0.0);
                Ok(ChunkRank {
                    chunk_id: ChunkId::new(document_id, chunk_index.max(0) as usize),
                    rank: -rank,
                })
            })
            .collect()
    }

    async fn chunks_for_documents(&self, document_ids: &[String]) -> Result<Vec<Chunk>, IndexError> {
        if document_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT document_id, chunk_index, text FROM chunks WHERE document_id IN ({}) \
             ORDER BY document_id, chunk_index",
            Self::placeholders(1, document_ids.len())
        );
        let mut db_query = sqlx::query(&sql);
        for id in document_ids {
            db_query = db_query.bind(id);
        }
        let rows = db_query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexError::QueryFailed(format!("Chunk load: {e}")))?;
        rows.iter().map(Self::row_to_chunk).collect()
    }

    async fn count(&self) -> Result<usize, IndexError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IndexError::QueryFailed(format!("COUNT: {e}")))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| IndexError::QueryFailed(format!("count column: {e}")))?;
        Ok(n.max(0) as usize)
    }
}
