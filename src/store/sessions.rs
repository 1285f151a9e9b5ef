//! Session and message rows.
//!
//! One live session per token: a partial unique index on
//! `session_token WHERE is_active = 1` lets the same token reappear on
//! a fresh row after its previous session went inactive, while
//! guaranteeing it never maps to two live sessions at once. Message
//! indices are gapless per session, enforced by
//! UNIQUE(session_id, message_index).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::core::errors::ChatbotError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    fn from_str(raw: &str) -> Self {
        match raw {
            "assistant" => MessageRole::Assistant,
            _ => MessageRole::User,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub session_token: String,
    pub user_ip: String,
    pub user_agent: String,
    pub is_active: bool,
    pub message_count: i64,
    pub last_activity_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub session_id: String,
    pub message_index: i64,
    pub role: MessageRole,
    pub content: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub referenced_document_ids: String,
    pub is_helpful: Option<bool>,
    pub created_at: String,
}

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, ChatbotError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                session_token TEXT NOT NULL,
                user_ip TEXT NOT NULL DEFAULT '',
                user_agent TEXT NOT NULL DEFAULT '',
                is_active INTEGER NOT NULL DEFAULT 1,
                message_count INTEGER NOT NULL DEFAULT 0,
                last_activity_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(ChatbotError::internal)?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_active_token
             ON sessions(session_token) WHERE is_active = 1",
        )
        .execute(&pool)
        .await
        .map_err(ChatbotError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                message_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
                message_index INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                input_tokens INTEGER NOT NULL DEFAULT 0,
                output_tokens INTEGER NOT NULL DEFAULT 0,
                referenced_document_ids TEXT NOT NULL DEFAULT '',
                is_helpful INTEGER,
                created_at TEXT NOT NULL,
                UNIQUE(session_id, message_index)
            )",
        )
        .execute(&pool)
        .await
        .map_err(ChatbotError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id)")
            .execute(&pool)
            .await
            .map_err(ChatbotError::internal)?;

        Ok(Self { pool })
    }

    /// Return the live session for `token`, refreshing its activity
    /// timestamp, or open a new one. An inactive token is not
    /// resurrected — it gets a brand-new session row.
    pub async fn open_session(
        &self,
        token: Option<&str>,
        user_ip: &str,
        user_agent: &str,
    ) -> Result<Session, ChatbotError> {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            if let Some(session) = self.find_active(token).await? {
                self.touch(&session.session_id).await?;
                return self.get(&session.session_id).await?.ok_or_else(|| {
                    ChatbotError::SessionExpired(token.to_string())
                });
            }
            return self.create_session(token, user_ip, user_agent).await;
        }

        let token = uuid::Uuid::new_v4().to_string();
        self.create_session(&token, user_ip, user_agent).await
    }

    async fn create_session(
        &self,
        token: &str,
        user_ip: &str,
        user_agent: &str,
    ) -> Result<Session, ChatbotError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO sessions
                (session_id, session_token, user_ip, user_agent, last_activity_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        )
        .bind(&session_id)
        .bind(token)
        .bind(user_ip)
        .bind(user_agent)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ChatbotError::internal)?;

        tracing::info!("session opened - session_id: {}", session_id);
        self.get(&session_id)
            .await?
            .ok_or_else(|| ChatbotError::Internal("session vanished after insert".to_string()))
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<Session>, ChatbotError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE session_id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ChatbotError::internal)?;

        Ok(row.as_ref().map(row_to_session))
    }

    pub async fn find_active(&self, token: &str) -> Result<Option<Session>, ChatbotError> {
        let row =
            sqlx::query("SELECT * FROM sessions WHERE session_token = ?1 AND is_active = 1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await
                .map_err(ChatbotError::internal)?;

        Ok(row.as_ref().map(row_to_session))
    }

    /// Next free message index for the session. Callers hold the
    /// per-session turn lock, so count-based allocation is gapless.
    pub async fn next_message_index(&self, session_id: &str) -> Result<i64, ChatbotError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE session_id = ?1")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await
                .map_err(ChatbotError::internal)?;
        Ok(count)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn append_message(
        &self,
        session_id: &str,
        message_index: i64,
        role: MessageRole,
        content: &str,
        input_tokens: i64,
        output_tokens: i64,
        referenced_document_ids: &str,
    ) -> Result<Message, ChatbotError> {
        let message_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(ChatbotError::internal)?;

        sqlx::query(
            "INSERT INTO messages
                (message_id, session_id, message_index, role, content,
                 input_tokens, output_tokens, referenced_document_ids, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&message_id)
        .bind(session_id)
        .bind(message_index)
        .bind(role.as_str())
        .bind(content)
        .bind(input_tokens)
        .bind(output_tokens)
        .bind(referenced_document_ids)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(ChatbotError::internal)?;

        sqlx::query(
            "UPDATE sessions
             SET message_count = (SELECT COUNT(*) FROM messages WHERE session_id = ?1),
                 last_activity_at = ?2
             WHERE session_id = ?1",
        )
        .bind(session_id)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(ChatbotError::internal)?;

        tx.commit().await.map_err(ChatbotError::internal)?;

        self.get_message(&message_id)
            .await?
            .ok_or_else(|| ChatbotError::Internal("message vanished after insert".to_string()))
    }

    /// Trailing window of at most `limit` messages, oldest first.
    pub async fn recent_history(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, ChatbotError> {
        let rows = sqlx::query(
            "SELECT * FROM (
                 SELECT * FROM messages WHERE session_id = ?1
                 ORDER BY message_index DESC LIMIT ?2
             ) ORDER BY message_index ASC",
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(ChatbotError::internal)?;

        Ok(rows.iter().map(row_to_message).collect())
    }

    /// Full transcript for a session token, oldest first.
    pub async fn chat_history(&self, token: &str) -> Result<Vec<Message>, ChatbotError> {
        let session = self
            .find_active(token)
            .await?
            .ok_or_else(|| ChatbotError::NotFound(format!("session token {}", token)))?;

        let rows = sqlx::query(
            "SELECT * FROM messages WHERE session_id = ?1 ORDER BY message_index ASC",
        )
        .bind(&session.session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ChatbotError::internal)?;

        Ok(rows.iter().map(row_to_message).collect())
    }

    pub async fn get_message(&self, message_id: &str) -> Result<Option<Message>, ChatbotError> {
        let row = sqlx::query("SELECT * FROM messages WHERE message_id = ?1")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ChatbotError::internal)?;

        Ok(row.as_ref().map(row_to_message))
    }

    /// Attach a helpfulness signal to a prior assistant reply.
    /// Last write wins; repeated identical calls are no-ops.
    pub async fn set_feedback(
        &self,
        message_id: &str,
        helpful: bool,
    ) -> Result<(), ChatbotError> {
        let message = self
            .get_message(message_id)
            .await?
            .ok_or_else(|| ChatbotError::InvalidFeedbackTarget(message_id.to_string()))?;

        if message.role != MessageRole::Assistant {
            return Err(ChatbotError::InvalidFeedbackTarget(message_id.to_string()));
        }

        sqlx::query("UPDATE messages SET is_helpful = ?2 WHERE message_id = ?1")
            .bind(message_id)
            .bind(helpful as i64)
            .execute(&self.pool)
            .await
            .map_err(ChatbotError::internal)?;

        tracing::info!("feedback recorded - message_id: {}, helpful: {}", message_id, helpful);
        Ok(())
    }

    pub async fn touch(&self, session_id: &str) -> Result<(), ChatbotError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE sessions SET last_activity_at = ?2 WHERE session_id = ?1")
            .bind(session_id)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(ChatbotError::internal)?;
        Ok(())
    }

    pub async fn end_session(&self, token: &str) -> Result<(), ChatbotError> {
        let result =
            sqlx::query("UPDATE sessions SET is_active = 0 WHERE session_token = ?1 AND is_active = 1")
                .bind(token)
                .execute(&self.pool)
                .await
                .map_err(ChatbotError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ChatbotError::NotFound(format!("session token {}", token)));
        }

        tracing::info!("session ended - token: {}", token);
        Ok(())
    }

    /// Deactivate sessions idle for longer than `idle`. Returns how
    /// many were swept.
    pub async fn sweep_inactive(&self, idle: Duration) -> Result<usize, ChatbotError> {
        let cutoff = (Utc::now() - idle).to_rfc3339();
        let result = sqlx::query(
            "UPDATE sessions SET is_active = 0 WHERE is_active = 1 AND last_activity_at < ?1",
        )
        .bind(&cutoff)
        .execute(&self.pool)
        .await
        .map_err(ChatbotError::internal)?;

        let swept = result.rows_affected() as usize;
        if swept > 0 {
            tracing::info!("inactive sessions swept - count: {}", swept);
        }
        Ok(swept)
    }

    // Read-only aggregates consumed by the external statistics collaborator.

    pub async fn total_sessions(&self) -> Result<i64, ChatbotError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await
            .map_err(ChatbotError::internal)
    }

    pub async fn sessions_since(&self, since: DateTime<Utc>) -> Result<i64, ChatbotError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE created_at >= ?1")
            .bind(since.to_rfc3339())
            .fetch_one(&self.pool)
            .await
            .map_err(ChatbotError::internal)
    }

    pub async fn total_token_usage(&self) -> Result<(i64, i64), ChatbotError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(input_tokens), 0) AS input,
                    COALESCE(SUM(output_tokens), 0) AS output
             FROM messages",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(ChatbotError::internal)?;

        Ok((row.get("input"), row.get("output")))
    }

    pub async fn token_usage_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<(i64, i64), ChatbotError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(input_tokens), 0) AS input,
                    COALESCE(SUM(output_tokens), 0) AS output
             FROM messages WHERE created_at >= ?1",
        )
        .bind(since.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(ChatbotError::internal)?;

        Ok((row.get("input"), row.get("output")))
    }
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Session {
    Session {
        session_id: row.get("session_id"),
        session_token: row.get("session_token"),
        user_ip: row.get("user_ip"),
        user_agent: row.get("user_agent"),
        is_active: row.get::<i64, _>("is_active") != 0,
        message_count: row.get("message_count"),
        last_activity_at: row.get("last_activity_at"),
        created_at: row.get("created_at"),
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Message {
    Message {
        message_id: row.get("message_id"),
        session_id: row.get("session_id"),
        message_index: row.get("message_index"),
        role: MessageRole::from_str(&row.get::<String, _>("role")),
        content: row.get("content"),
        input_tokens: row.get("input_tokens"),
        output_tokens: row.get("output_tokens"),
        referenced_document_ids: row.get("referenced_document_ids"),
        is_helpful: row.get::<Option<i64>, _>("is_helpful").map(|v| v != 0),
        created_at: row.get("created_at"),
    }
}
