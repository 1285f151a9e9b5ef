//! Runtime tunables backed by the `chatbot_config` table.
//!
//! Read-through cache: first read of a key hits sqlite and caches the
//! value; `set` writes through and invalidates so the next read sees
//! the new value. Components receive a `ConfigStore` at construction —
//! there is no ambient global configuration.

pub mod defaults;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sqlx::SqlitePool;

use crate::core::errors::ChatbotError;

#[derive(Default)]
struct CacheInner {
    /// Bumped by every invalidation. A read that started before a
    /// write may not repopulate the cache afterwards.
    generation: u64,
    values: HashMap<String, String>,
}

#[derive(Clone)]
pub struct ConfigStore {
    pool: SqlitePool,
    cache: Arc<RwLock<CacheInner>>,
}

impl ConfigStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, ChatbotError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chatbot_config (
                config_key TEXT PRIMARY KEY,
                config_value TEXT NOT NULL,
                description TEXT,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&pool)
        .await
        .map_err(ChatbotError::internal)?;

        Ok(Self {
            pool,
            cache: Arc::new(RwLock::new(CacheInner::default())),
        })
    }

    /// Raw value for `key`, or `None` when unset.
    pub async fn get(&self, key: &str) -> Result<Option<String>, ChatbotError> {
        let generation = {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(value) = cache.values.get(key) {
                return Ok(Some(value.clone()));
            }
            cache.generation
        };

        let value: Option<String> =
            sqlx::query_scalar("SELECT config_value FROM chatbot_config WHERE config_key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(ChatbotError::internal)?;

        if let Some(value) = &value {
            self.store_cached(key, value, generation);
        }

        Ok(value)
    }

    /// Cache a value fetched while the cache was at `generation`. The
    /// insert is dropped if any invalidation landed since the fetch
    /// started, so an in-flight read cannot resurrect a value a
    /// concurrent `set` just replaced.
    fn store_cached(&self, key: &str, value: &str, generation: u64) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        if cache.generation == generation {
            cache.values.insert(key.to_string(), value.to_string());
        }
    }

    /// Write `key` and invalidate any cached value.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), ChatbotError> {
        sqlx::query(
            "INSERT INTO chatbot_config (config_key, config_value, updated_at)
             VALUES (?1, ?2, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
             ON CONFLICT(config_key) DO UPDATE SET
                config_value = excluded.config_value,
                updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(ChatbotError::internal)?;

        self.invalidate(key);
        tracing::info!("config updated - key: {}", key);
        Ok(())
    }

    pub fn invalidate(&self, key: &str) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.generation += 1;
        cache.values.remove(key);
    }

    pub fn clear_cache(&self) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.generation += 1;
        cache.values.clear();
    }

    async fn parsed_or<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        match self.get(key).await {
            Ok(Some(raw)) => raw.parse().unwrap_or(default),
            _ => default,
        }
    }

    async fn string_or(&self, key: &str, default: &str) -> String {
        match self.get(key).await {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            _ => default.to_string(),
        }
    }

    pub async fn chunk_size(&self) -> usize {
        self.parsed_or("chunk_size", defaults::CHUNK_SIZE).await
    }

    pub async fn chunk_overlap(&self) -> usize {
        self.parsed_or("chunk_overlap", defaults::CHUNK_OVERLAP).await
    }

    pub async fn top_k(&self) -> usize {
        self.parsed_or("top_k", defaults::TOP_K).await
    }

    pub async fn min_score(&self) -> f32 {
        self.parsed_or("min_score", defaults::MIN_SCORE).await
    }

    pub async fn max_history_messages(&self) -> usize {
        self.parsed_or("max_history_messages", defaults::MAX_HISTORY_MESSAGES)
            .await
    }

    pub async fn generation_timeout_secs(&self) -> u64 {
        self.parsed_or("generation_timeout_secs", defaults::GENERATION_TIMEOUT_SECS)
            .await
    }

    pub async fn session_idle_hours(&self) -> i64 {
        self.parsed_or("session_idle_hours", defaults::SESSION_IDLE_HOURS)
            .await
    }

    pub async fn vector_dimension(&self) -> usize {
        self.parsed_or("vector_dimension", defaults::VECTOR_DIMENSION)
            .await
    }

    pub async fn collection_name(&self) -> String {
        self.string_or("collection_name", defaults::COLLECTION_NAME).await
    }

    pub async fn intent_model(&self) -> String {
        self.string_or("intent_model", defaults::INTENT_MODEL).await
    }

    pub async fn generation_model(&self) -> String {
        self.string_or("generation_model", defaults::GENERATION_MODEL).await
    }

    pub async fn embedding_model(&self) -> String {
        self.string_or("embedding_model", defaults::EMBEDDING_MODEL).await
    }

    pub async fn system_prompt(&self) -> String {
        self.string_or("system_prompt", defaults::SYSTEM_PROMPT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{test_pool, TestDb};

    async fn config() -> (ConfigStore, TestDb) {
        let db = test_pool().await;
        let config = ConfigStore::new(db.pool.clone()).await.unwrap();
        (config, db)
    }

    #[tokio::test]
    async fn missing_keys_fall_back_to_defaults() {
        let (config, _db) = config().await;

        assert_eq!(config.chunk_size().await, defaults::CHUNK_SIZE);
        assert_eq!(config.top_k().await, defaults::TOP_K);
        assert_eq!(config.generation_model().await, defaults::GENERATION_MODEL);
    }

    #[tokio::test]
    async fn set_invalidates_cached_value() {
        let (config, _db) = config().await;

        config.set("top_k", "5").await.unwrap();
        assert_eq!(config.top_k().await, 5);

        // Prime the cache, then overwrite and expect the new value.
        assert_eq!(config.get("top_k").await.unwrap().as_deref(), Some("5"));
        config.set("top_k", "7").await.unwrap();
        assert_eq!(config.top_k().await, 7);
    }

    #[tokio::test]
    async fn stale_read_cannot_repopulate_past_an_invalidation() {
        let (config, _db) = config().await;
        config.set("top_k", "5").await.unwrap();

        // A read that fetched "5" from sqlite, then lost the race to a
        // concurrent set: its late cache insert must be dropped.
        let generation = config.cache.read().unwrap().generation;
        config.set("top_k", "7").await.unwrap();
        config.store_cached("top_k", "5", generation);

        assert_eq!(config.top_k().await, 7);
        assert_eq!(config.get("top_k").await.unwrap().as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn unparseable_values_fall_back() {
        let (config, _db) = config().await;

        config.set("chunk_size", "not-a-number").await.unwrap();
        assert_eq!(config.chunk_size().await, defaults::CHUNK_SIZE);
    }
}
