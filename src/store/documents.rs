//! Document and chunk rows.
//!
//! A document owns its chunks by identity only: chunks carry the
//! document id as a foreign key and never a reference back. The chunk
//! set for a document is always replaced wholesale inside one
//! transaction, so readers either see the previous complete set or the
//! new one, never a mix.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::core::errors::ChatbotError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub title: String,
    pub category: String,
    pub description: String,
    pub content: String,
    pub order_index: i64,
    pub is_active: bool,
    pub is_processed: bool,
    pub chunk_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRow {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub token_count: i64,
    pub point_id: String,
}

/// Chunk data staged for commit after a successful embed + upsert.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: i64,
    pub content: String,
    pub token_count: i64,
    pub point_id: String,
}

#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, ChatbotError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                document_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL,
                order_index INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                is_processed INTEGER NOT NULL DEFAULT 0,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(ChatbotError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(document_id) ON DELETE CASCADE,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                token_count INTEGER NOT NULL DEFAULT 0,
                point_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(document_id, chunk_index)
            )",
        )
        .execute(&pool)
        .await
        .map_err(ChatbotError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)")
            .execute(&pool)
            .await
            .map_err(ChatbotError::internal)?;

        Ok(Self { pool })
    }

    pub async fn create(
        &self,
        title: &str,
        category: &str,
        description: &str,
        content: &str,
    ) -> Result<Document, ChatbotError> {
        let document_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO documents
                (document_id, title, category, description, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        )
        .bind(&document_id)
        .bind(title)
        .bind(category)
        .bind(description)
        .bind(content)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ChatbotError::internal)?;

        self.get(&document_id)
            .await?
            .ok_or_else(|| ChatbotError::Internal("document vanished after insert".to_string()))
    }

    pub async fn get(&self, document_id: &str) -> Result<Option<Document>, ChatbotError> {
        let row = sqlx::query("SELECT * FROM documents WHERE document_id = ?1")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ChatbotError::internal)?;

        Ok(row.as_ref().map(row_to_document))
    }

    pub async fn list_active(&self) -> Result<Vec<Document>, ChatbotError> {
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE is_active = 1 ORDER BY order_index ASC, created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ChatbotError::internal)?;

        Ok(rows.iter().map(row_to_document).collect())
    }

    pub async fn list_by_category(&self, category: &str) -> Result<Vec<Document>, ChatbotError> {
        let rows = sqlx::query(
            "SELECT * FROM documents
             WHERE is_active = 1 AND category = ?1
             ORDER BY order_index ASC, created_at ASC",
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await
        .map_err(ChatbotError::internal)?;

        Ok(rows.iter().map(row_to_document).collect())
    }

    /// Edit content/metadata. Resets `is_processed` — the chunk set no
    /// longer matches the content until the next processing run.
    pub async fn update(
        &self,
        document_id: &str,
        title: &str,
        category: &str,
        description: &str,
        content: &str,
    ) -> Result<Document, ChatbotError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE documents
             SET title = ?2, category = ?3, description = ?4, content = ?5,
                 is_processed = 0, updated_at = ?6
             WHERE document_id = ?1",
        )
        .bind(document_id)
        .bind(title)
        .bind(category)
        .bind(description)
        .bind(content)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ChatbotError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ChatbotError::NotFound(format!("document {}", document_id)));
        }

        self.get(document_id)
            .await?
            .ok_or_else(|| ChatbotError::NotFound(format!("document {}", document_id)))
    }

    /// Toggle the active flag. Re-activation resets `is_processed` so
    /// the document is re-indexed before it serves retrieval again.
    pub async fn set_active(&self, document_id: &str, active: bool) -> Result<(), ChatbotError> {
        let now = Utc::now().to_rfc3339();
        let result = if active {
            sqlx::query(
                "UPDATE documents SET is_active = 1, is_processed = 0, updated_at = ?2
                 WHERE document_id = ?1",
            )
        } else {
            sqlx::query(
                "UPDATE documents SET is_active = 0, updated_at = ?2 WHERE document_id = ?1",
            )
        }
        .bind(document_id)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ChatbotError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ChatbotError::NotFound(format!("document {}", document_id)));
        }
        Ok(())
    }

    /// Flag a document as needing re-processing without touching its
    /// content. Set before the old chunk set is torn down, so a
    /// failure mid-replacement never leaves a processed document with
    /// missing chunks.
    pub async fn mark_unprocessed(&self, document_id: &str) -> Result<(), ChatbotError> {
        sqlx::query("UPDATE documents SET is_processed = 0 WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(ChatbotError::internal)?;
        Ok(())
    }

    pub async fn delete(&self, document_id: &str) -> Result<(), ChatbotError> {
        let result = sqlx::query("DELETE FROM documents WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(ChatbotError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ChatbotError::NotFound(format!("document {}", document_id)));
        }
        Ok(())
    }

    pub async fn chunks_for(&self, document_id: &str) -> Result<Vec<ChunkRow>, ChatbotError> {
        let rows = sqlx::query(
            "SELECT chunk_id, document_id, chunk_index, content, token_count, point_id
             FROM chunks WHERE document_id = ?1 ORDER BY chunk_index ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ChatbotError::internal)?;

        Ok(rows
            .iter()
            .map(|row| ChunkRow {
                chunk_id: row.get("chunk_id"),
                document_id: row.get("document_id"),
                chunk_index: row.get("chunk_index"),
                content: row.get("content"),
                token_count: row.get("token_count"),
                point_id: row.get("point_id"),
            })
            .collect())
    }

    /// Remove chunk rows without touching the document flags. Used in
    /// the delete-before-insert phase, after the vector entries for
    /// those chunks are gone.
    pub async fn clear_chunks(&self, document_id: &str) -> Result<usize, ChatbotError> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(ChatbotError::internal)?;

        Ok(result.rows_affected() as usize)
    }

    /// Commit a freshly embedded chunk set in one transaction: insert
    /// every row and flip the document to processed. Nothing here runs
    /// unless every vector already landed in the index.
    pub async fn commit_chunks(
        &self,
        document_id: &str,
        chunks: Vec<NewChunk>,
    ) -> Result<(), ChatbotError> {
        let now = Utc::now().to_rfc3339();
        let chunk_count = chunks.len() as i64;

        let mut tx = self.pool.begin().await.map_err(ChatbotError::internal)?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(ChatbotError::internal)?;

        for chunk in &chunks {
            sqlx::query(
                "INSERT INTO chunks
                    (chunk_id, document_id, chunk_index, content, token_count, point_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.token_count)
            .bind(&chunk.point_id)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(ChatbotError::internal)?;
        }

        sqlx::query(
            "UPDATE documents SET is_processed = 1, chunk_count = ?2, updated_at = ?3
             WHERE document_id = ?1",
        )
        .bind(document_id)
        .bind(chunk_count)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(ChatbotError::internal)?;

        tx.commit().await.map_err(ChatbotError::internal)?;
        Ok(())
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    Document {
        document_id: row.get("document_id"),
        title: row.get("title"),
        category: row.get("category"),
        description: row.get("description"),
        content: row.get("content"),
        order_index: row.get("order_index"),
        is_active: row.get::<i64, _>("is_active") != 0,
        is_processed: row.get::<i64, _>("is_processed") != 0,
        chunk_count: row.get("chunk_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
