//! Document ingestion: chunk, embed, index, commit.
//!
//! The write order is what keeps the two stores consistent without a
//! cross-store transaction: old vector entries go first, then the old
//! chunk rows; new vectors are upserted before any new chunk row is
//! committed. A failure while embedding or upserting leaves the
//! document unprocessed with zero chunk rows — never a partial set.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::chunker::{self, ChunkConfig};
use crate::config::ConfigStore;
use crate::core::errors::ChatbotError;
use crate::core::locks::KeyedLocks;
use crate::llm::ModelClient;
use crate::store::{Document, DocumentStore, NewChunk};
use crate::vector::{PointInsert, VectorStore};

#[derive(Clone)]
pub struct IngestService {
    documents: DocumentStore,
    vector: Arc<dyn VectorStore>,
    models: Arc<dyn ModelClient>,
    config: ConfigStore,
    doc_locks: Arc<KeyedLocks>,
}

impl IngestService {
    pub fn new(
        documents: DocumentStore,
        vector: Arc<dyn VectorStore>,
        models: Arc<dyn ModelClient>,
        config: ConfigStore,
    ) -> Self {
        Self {
            documents,
            vector,
            models,
            config,
            doc_locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Declare the collection at startup. Failure is logged, not
    /// fatal — ingestion and retrieval will fail until the index is
    /// reachable, but the rest of the engine keeps running.
    pub async fn init_collection(&self) {
        let dimension = self.config.vector_dimension().await;
        match self.vector.create_collection(dimension).await {
            Ok(()) => tracing::info!("vector collection ready - dimension: {}", dimension),
            Err(err) => tracing::warn!("vector collection init failed: {}", err),
        }
    }

    pub async fn create_document(
        &self,
        title: &str,
        category: &str,
        description: &str,
        content: &str,
    ) -> Result<Document, ChatbotError> {
        let document = self
            .documents
            .create(title, category, description, content)
            .await?;

        self.process_document(&document.document_id).await?;
        self.documents
            .get(&document.document_id)
            .await?
            .ok_or_else(|| ChatbotError::NotFound(format!("document {}", document.document_id)))
    }

    pub async fn update_document(
        &self,
        document_id: &str,
        title: &str,
        category: &str,
        description: &str,
        content: &str,
    ) -> Result<Document, ChatbotError> {
        self.documents
            .update(document_id, title, category, description, content)
            .await?;

        self.process_document(document_id).await?;
        self.documents
            .get(document_id)
            .await?
            .ok_or_else(|| ChatbotError::NotFound(format!("document {}", document_id)))
    }

    /// Chunk, embed and index one document, replacing any previous
    /// chunk set. Serialized per document id; distinct documents
    /// process independently.
    pub async fn process_document(&self, document_id: &str) -> Result<(), ChatbotError> {
        let _guard = self.doc_locks.acquire(document_id).await;

        let document = self
            .documents
            .get(document_id)
            .await?
            .ok_or_else(|| ChatbotError::NotFound(format!("document {}", document_id)))?;

        tracing::info!("document processing started - document_id: {}", document_id);

        // Chunking is pure; run it before touching any durable state so
        // a bad config rejects the job with everything intact.
        let chunk_config = ChunkConfig {
            chunk_size: self.config.chunk_size().await,
            chunk_overlap: self.config.chunk_overlap().await,
        };
        let texts = chunker::split_into_chunks(&document.content, &chunk_config)?;

        let expected_dim = self.config.vector_dimension().await;
        let embedding_model = self.config.embedding_model().await;

        let mut points = Vec::with_capacity(texts.len());
        let mut new_chunks = Vec::with_capacity(texts.len());

        for (i, text) in texts.iter().enumerate() {
            let vector = self
                .models
                .embed(&embedding_model, text)
                .await
                .map_err(|e| ingestion_failure(document_id, e))?;

            if vector.len() != expected_dim {
                return Err(ChatbotError::EmbeddingDimensionMismatch {
                    expected: expected_dim,
                    actual: vector.len(),
                });
            }

            let point_id = uuid::Uuid::new_v4().to_string();
            let mut metadata = Map::new();
            metadata.insert("document_id".to_string(), Value::String(document.document_id.clone()));
            metadata.insert("title".to_string(), Value::String(document.title.clone()));
            metadata.insert("category".to_string(), Value::String(document.category.clone()));
            metadata.insert("chunk_index".to_string(), Value::from(i as i64));

            points.push(PointInsert {
                point_id: point_id.clone(),
                vector,
                content: text.clone(),
                metadata,
            });
            new_chunks.push(NewChunk {
                chunk_index: i as i64,
                content: text.clone(),
                token_count: chunker::token_count(text) as i64,
                point_id,
            });
        }

        // Delete-before-insert: drop the previous chunk set from both
        // stores before the new vectors land. The document is flagged
        // unprocessed first, so an index failure mid-replacement can
        // never leave a processed document without its chunks.
        let old_chunks = self.documents.chunks_for(document_id).await?;
        if !old_chunks.is_empty() {
            self.documents.mark_unprocessed(document_id).await?;
            let point_ids: Vec<String> =
                old_chunks.iter().map(|c| c.point_id.clone()).collect();
            self.vector
                .delete_points(&point_ids)
                .await
                .map_err(|e| ingestion_failure(document_id, e))?;
            self.documents.clear_chunks(document_id).await?;
        }

        self.vector
            .upsert_points(points)
            .await
            .map_err(|e| ingestion_failure(document_id, e))?;

        self.documents.commit_chunks(document_id, new_chunks).await?;

        tracing::info!(
            "document processing complete - document_id: {}, chunks: {}",
            document_id,
            texts.len()
        );
        Ok(())
    }

    /// Remove a document and every trace of it from the index. The
    /// index side deletes by document filter, which also catches any
    /// stray point a past partial failure might have left behind.
    pub async fn delete_document(&self, document_id: &str) -> Result<(), ChatbotError> {
        let _guard = self.doc_locks.acquire(document_id).await;

        self.vector
            .delete_by_document(document_id)
            .await
            .map_err(|e| ingestion_failure(document_id, e))?;

        self.documents.delete(document_id).await?;
        tracing::info!("document deleted - document_id: {}", document_id);
        Ok(())
    }

    pub async fn set_document_active(
        &self,
        document_id: &str,
        active: bool,
    ) -> Result<(), ChatbotError> {
        self.documents.set_active(document_id, active).await
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }
}

fn ingestion_failure(document_id: &str, err: ChatbotError) -> ChatbotError {
    ChatbotError::IngestionFailure {
        document_id: document_id.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::llm::Generation;
    use crate::store::{test_pool, TestDb};
    use crate::vector::{InMemoryVectorStore, SearchHit};

    /// Deterministic fake: 4-dim embeddings, scripted failure switch.
    struct FakeModels {
        fail_embed: AtomicBool,
    }

    impl FakeModels {
        fn new() -> Self {
            Self { fail_embed: AtomicBool::new(false) }
        }
    }

    #[async_trait]
    impl ModelClient for FakeModels {
        async fn embed(&self, _model: &str, text: &str) -> Result<Vec<f32>, ChatbotError> {
            if self.fail_embed.load(Ordering::SeqCst) {
                return Err(ChatbotError::Internal("embed down".to_string()));
            }
            let seed = text.len() as f32;
            Ok(vec![seed, 1.0, 0.0, 0.0])
        }

        async fn generate(&self, _model: &str, _prompt: &str) -> Result<Generation, ChatbotError> {
            unreachable!("ingestion never generates");
        }
    }

    struct DownVectorStore;

    #[async_trait]
    impl VectorStore for DownVectorStore {
        async fn create_collection(&self, _dimension: usize) -> Result<(), ChatbotError> {
            Err(ChatbotError::RetrievalUnavailable("down".to_string()))
        }
        async fn upsert_points(&self, _points: Vec<PointInsert>) -> Result<(), ChatbotError> {
            Err(ChatbotError::RetrievalUnavailable("down".to_string()))
        }
        async fn search(&self, _v: &[f32], _k: usize) -> Result<Vec<SearchHit>, ChatbotError> {
            Err(ChatbotError::RetrievalUnavailable("down".to_string()))
        }
        async fn delete_points(&self, _ids: &[String]) -> Result<(), ChatbotError> {
            Err(ChatbotError::RetrievalUnavailable("down".to_string()))
        }
        async fn delete_by_document(&self, _id: &str) -> Result<(), ChatbotError> {
            Err(ChatbotError::RetrievalUnavailable("down".to_string()))
        }
        async fn count(&self) -> Result<usize, ChatbotError> {
            Ok(0)
        }
    }

    async fn service_with(
        vector: Arc<dyn VectorStore>,
        models: Arc<FakeModels>,
    ) -> (IngestService, TestDb) {
        let db = test_pool().await;
        let documents = DocumentStore::new(db.pool.clone()).await.unwrap();
        let config = ConfigStore::new(db.pool.clone()).await.unwrap();
        config.set("vector_dimension", "4").await.unwrap();
        config.set("chunk_size", "10").await.unwrap();
        config.set("chunk_overlap", "2").await.unwrap();
        (IngestService::new(documents, vector, models, config), db)
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[tokio::test]
    async fn ingestion_writes_chunks_and_vectors() {
        let vector = Arc::new(InMemoryVectorStore::new());
        let (service, _db) = service_with(vector.clone(), Arc::new(FakeModels::new())).await;

        let doc = service
            .create_document("Guide", "docs", "", &words(25))
            .await
            .unwrap();

        assert!(doc.is_processed);
        let chunks = service.documents().chunks_for(&doc.document_id).await.unwrap();
        assert_eq!(chunks.len() as i64, doc.chunk_count);
        assert_eq!(vector.count().await.unwrap(), chunks.len());

        let indices: Vec<i64> = chunks.iter().map(|c| c.chunk_index).collect();
        let expected: Vec<i64> = (0..chunks.len() as i64).collect();
        assert_eq!(indices, expected);
    }

    #[tokio::test]
    async fn reprocessing_replaces_the_chunk_set() {
        let vector = Arc::new(InMemoryVectorStore::new());
        let (service, _db) = service_with(vector.clone(), Arc::new(FakeModels::new())).await;

        let doc = service
            .create_document("Guide", "docs", "", &words(25))
            .await
            .unwrap();
        let before = service.documents().chunks_for(&doc.document_id).await.unwrap();

        let updated = service
            .update_document(&doc.document_id, "Guide", "docs", "", &words(8))
            .await
            .unwrap();
        assert!(updated.is_processed);

        let after = service.documents().chunks_for(&doc.document_id).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(vector.count().await.unwrap(), 1);
        assert!(before.iter().all(|old| after.iter().all(|new| new.point_id != old.point_id)));
    }

    #[tokio::test]
    async fn embed_failure_leaves_document_unprocessed() {
        let vector = Arc::new(InMemoryVectorStore::new());
        let models = Arc::new(FakeModels::new());
        let (service, _db) = service_with(vector.clone(), models.clone()).await;

        models.fail_embed.store(true, Ordering::SeqCst);
        let err = service.create_document("Guide", "docs", "", &words(25)).await;
        assert!(matches!(err, Err(ChatbotError::IngestionFailure { .. })));

        let docs = service.documents().list_active().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert!(!docs[0].is_processed);
        assert!(service.documents().chunks_for(&docs[0].document_id).await.unwrap().is_empty());
        assert_eq!(vector.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn index_outage_is_fail_clean() {
        let (service, _db) =
            service_with(Arc::new(DownVectorStore), Arc::new(FakeModels::new())).await;

        let err = service.create_document("Guide", "docs", "", &words(25)).await;
        assert!(matches!(err, Err(ChatbotError::IngestionFailure { .. })));

        let docs = service.documents().list_active().await.unwrap();
        assert!(!docs[0].is_processed);
        assert!(service.documents().chunks_for(&docs[0].document_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let vector = Arc::new(InMemoryVectorStore::new());
        let models = Arc::new(FakeModels::new());
        let (service, _db) = service_with(vector, models).await;
        service.config.set("vector_dimension", "8").await.unwrap();

        let err = service.create_document("Guide", "docs", "", &words(25)).await;
        assert!(matches!(
            err,
            Err(ChatbotError::EmbeddingDimensionMismatch { expected: 8, actual: 4 })
        ));
    }

    #[tokio::test]
    async fn bad_chunk_config_rejects_before_any_write() {
        let vector = Arc::new(InMemoryVectorStore::new());
        let (service, _db) = service_with(vector.clone(), Arc::new(FakeModels::new())).await;

        let doc = service
            .create_document("Guide", "docs", "", &words(25))
            .await
            .unwrap();
        let before = vector.count().await.unwrap();
        assert!(before > 0);

        service.config.set("chunk_overlap", "10").await.unwrap(); // == chunk_size
        let err = service.process_document(&doc.document_id).await;
        assert!(matches!(err, Err(ChatbotError::InvalidChunkConfig { .. })));

        // Previous chunk set untouched.
        assert_eq!(vector.count().await.unwrap(), before);
        assert!(!service
            .documents()
            .chunks_for(&doc.document_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn delete_document_clears_index_by_document_filter() {
        let vector = Arc::new(InMemoryVectorStore::new());
        let (service, _db) = service_with(vector.clone(), Arc::new(FakeModels::new())).await;

        let keep = service.create_document("Keep", "docs", "", &words(25)).await.unwrap();
        let doomed = service.create_document("Doomed", "docs", "", &words(25)).await.unwrap();
        let total = vector.count().await.unwrap();

        service.delete_document(&doomed.document_id).await.unwrap();

        assert!(service.documents().get(&doomed.document_id).await.unwrap().is_none());
        let keep_chunks = service.documents().chunks_for(&keep.document_id).await.unwrap();
        assert_eq!(vector.count().await.unwrap(), keep_chunks.len());
        assert!(vector.count().await.unwrap() < total);
    }

    #[tokio::test]
    async fn document_locks_do_not_accumulate() {
        let vector = Arc::new(InMemoryVectorStore::new());
        let (service, _db) = service_with(vector, Arc::new(FakeModels::new())).await;

        for _ in 0..3 {
            service.create_document("Guide", "docs", "", &words(25)).await.unwrap();
        }

        assert!(service.doc_locks.is_empty());
    }
}
