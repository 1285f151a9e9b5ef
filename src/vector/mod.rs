//! Vector index abstraction.
//!
//! The engine only needs five operations from the index; `QdrantStore`
//! talks to a real Qdrant server over HTTP and `InMemoryVectorStore`
//! keeps everything in process for tests and single-node setups.

pub mod memory;
pub mod qdrant;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::errors::ChatbotError;

pub use memory::InMemoryVectorStore;
pub use qdrant::QdrantStore;

/// One point to write into the index.
#[derive(Debug, Clone)]
pub struct PointInsert {
    pub point_id: String,
    pub vector: Vec<f32>,
    pub content: String,
    pub metadata: Map<String, Value>,
}

/// One similarity-search hit, best first.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub point_id: String,
    pub score: f32,
    pub content: String,
    pub metadata: Map<String, Value>,
}

impl SearchHit {
    pub fn metadata_str(&self, key: &str) -> &str {
        self.metadata.get(key).and_then(Value::as_str).unwrap_or("")
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Declare the collection (dimension, cosine distance) if absent.
    async fn create_collection(&self, dimension: usize) -> Result<(), ChatbotError>;

    async fn upsert_points(&self, points: Vec<PointInsert>) -> Result<(), ChatbotError>;

    /// Nearest neighbours of `vector`, at most `top_k`, descending score.
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>, ChatbotError>;

    async fn delete_points(&self, point_ids: &[String]) -> Result<(), ChatbotError>;

    /// Drop every point whose payload references `document_id`.
    async fn delete_by_document(&self, document_id: &str) -> Result<(), ChatbotError>;

    async fn count(&self) -> Result<usize, ChatbotError>;
}
