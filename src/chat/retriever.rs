//! Semantic retrieval over the document index.
//!
//! Retrieval degrades rather than fails: if the embedder or the index
//! is unreachable, the turn proceeds with zero context and the model
//! answers from the system prompt alone.

use std::sync::Arc;

use crate::config::ConfigStore;
use crate::llm::ModelClient;
use crate::vector::VectorStore;

/// One context chunk scored against the query.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub document_id: String,
    pub title: String,
    pub category: String,
    pub chunk_index: i64,
    pub content: String,
    pub score: f32,
}

#[derive(Clone)]
pub struct ContextRetriever {
    vector: Arc<dyn VectorStore>,
    models: Arc<dyn ModelClient>,
    config: ConfigStore,
}

impl ContextRetriever {
    pub fn new(
        vector: Arc<dyn VectorStore>,
        models: Arc<dyn ModelClient>,
        config: ConfigStore,
    ) -> Self {
        Self { vector, models, config }
    }

    /// Top chunks for `query`: at most `top_k`, each scoring at least
    /// `min_score`, best first. Ties keep the index's ordering.
    pub async fn retrieve(&self, query: &str) -> Vec<RetrievedChunk> {
        let embedding_model = self.config.embedding_model().await;
        let top_k = self.config.top_k().await;
        let min_score = self.config.min_score().await;

        let query_vector = match self.models.embed(&embedding_model, query).await {
            Ok(vector) => vector,
            Err(err) => {
                tracing::warn!("query embedding failed, answering without context: {}", err);
                return Vec::new();
            }
        };

        let hits = match self.vector.search(&query_vector, top_k).await {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!("vector search failed, answering without context: {}", err);
                return Vec::new();
            }
        };

        let chunks: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter(|hit| hit.score >= min_score)
            .map(|hit| RetrievedChunk {
                document_id: hit.metadata_str("document_id").to_string(),
                title: hit.metadata_str("title").to_string(),
                category: hit.metadata_str("category").to_string(),
                chunk_index: hit
                    .metadata
                    .get("chunk_index")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0),
                content: hit.content,
                score: hit.score,
            })
            .collect();

        tracing::debug!("context retrieved - chunks: {}", chunks.len());
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Map, Value};

    use crate::core::errors::ChatbotError;
    use crate::llm::Generation;
    use crate::store::{test_pool, TestDb};
    use crate::vector::{InMemoryVectorStore, PointInsert, SearchHit};

    struct AxisEmbedder;

    #[async_trait]
    impl crate::llm::ModelClient for AxisEmbedder {
        async fn embed(&self, _model: &str, text: &str) -> Result<Vec<f32>, ChatbotError> {
            // "x" maps onto the first axis, anything else onto the second.
            if text.contains('x') {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }

        async fn generate(&self, _m: &str, _p: &str) -> Result<Generation, ChatbotError> {
            unreachable!("retrieval never generates");
        }
    }

    struct DownIndex;

    #[async_trait]
    impl VectorStore for DownIndex {
        async fn create_collection(&self, _d: usize) -> Result<(), ChatbotError> {
            Ok(())
        }
        async fn upsert_points(&self, _p: Vec<PointInsert>) -> Result<(), ChatbotError> {
            Ok(())
        }
        async fn search(&self, _v: &[f32], _k: usize) -> Result<Vec<SearchHit>, ChatbotError> {
            Err(ChatbotError::RetrievalUnavailable("down".to_string()))
        }
        async fn delete_points(&self, _i: &[String]) -> Result<(), ChatbotError> {
            Ok(())
        }
        async fn delete_by_document(&self, _i: &str) -> Result<(), ChatbotError> {
            Ok(())
        }
        async fn count(&self) -> Result<usize, ChatbotError> {
            Ok(0)
        }
    }

    fn point(id: &str, vector: Vec<f32>, doc: &str) -> PointInsert {
        let mut metadata = Map::new();
        metadata.insert("document_id".to_string(), Value::String(doc.to_string()));
        metadata.insert("title".to_string(), Value::String(format!("Title {}", doc)));
        metadata.insert("category".to_string(), Value::String("docs".to_string()));
        metadata.insert("chunk_index".to_string(), Value::from(0));
        PointInsert {
            point_id: id.to_string(),
            vector,
            content: format!("content {}", id),
            metadata,
        }
    }

    async fn config() -> (ConfigStore, TestDb) {
        let db = test_pool().await;
        let config = ConfigStore::new(db.pool.clone()).await.unwrap();
        config.set("top_k", "2").await.unwrap();
        config.set("min_score", "0.5").await.unwrap();
        (config, db)
    }

    #[tokio::test]
    async fn filters_by_score_and_caps_at_top_k() {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .upsert_points(vec![
                point("a", vec![1.0, 0.0], "d1"),  // score 1.0
                point("b", vec![0.9, 0.1], "d2"),  // high
                point("c", vec![0.8, 0.2], "d3"),  // high but beyond top_k
                point("d", vec![0.0, 1.0], "d4"),  // score 0.0, filtered
            ])
            .await
            .unwrap();

        let (config, _db) = config().await;
        let retriever = ContextRetriever::new(store, Arc::new(AxisEmbedder), config);
        let chunks = retriever.retrieve("x question").await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].document_id, "d1");
        assert!(chunks[0].score >= chunks[1].score);
        assert!(chunks.iter().all(|c| c.score >= 0.5));
    }

    #[tokio::test]
    async fn index_outage_degrades_to_empty() {
        let (config, _db) = config().await;
        let retriever =
            ContextRetriever::new(Arc::new(DownIndex), Arc::new(AxisEmbedder), config);
        assert!(retriever.retrieve("x question").await.is_empty());
    }

    #[tokio::test]
    async fn nothing_above_threshold_yields_empty() {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .upsert_points(vec![point("d", vec![0.0, 1.0], "d4")])
            .await
            .unwrap();

        let (config, _db) = config().await;
        let retriever = ContextRetriever::new(store, Arc::new(AxisEmbedder), config);
        assert!(retriever.retrieve("x question").await.is_empty());
    }
}
