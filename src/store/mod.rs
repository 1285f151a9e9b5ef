//! Sqlite persistence for documents, chunks, sessions and messages.

pub mod documents;
pub mod sessions;

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::core::errors::ChatbotError;

pub use documents::{ChunkRow, Document, DocumentStore, NewChunk};
pub use sessions::{Message, MessageRole, Session, SessionStore};

/// Open (and create if missing) the engine database at `db_path`.
pub async fn connect(db_path: &Path) -> Result<SqlitePool, ChatbotError> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(4)
        .connect_with(options)
        .await
        .map_err(ChatbotError::internal)
}

#[cfg(test)]
pub use testing::{test_pool, TestDb};
