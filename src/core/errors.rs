use thiserror::Error;

/// Failure taxonomy for the chatbot engine.
///
/// Ingestion errors surface to the ingestion caller and leave durable
/// state unchanged. Retrieval errors are absorbed inside the runtime
/// pipeline (the turn degrades to context-free generation). Generation
/// errors never escape as errors at all — the generator turns them into
/// its fallback reply.
#[derive(Debug, Error)]
pub enum ChatbotError {
    #[error("invalid chunk config: overlap {overlap} must be smaller than size {size}")]
    InvalidChunkConfig { size: usize, overlap: usize },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    #[error("ingestion failed for document {document_id}: {reason}")]
    IngestionFailure { document_id: String, reason: String },

    #[error("vector index unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("generation timed out after {0}s")]
    GenerationTimeout(u64),

    #[error("generation failed: {0}")]
    GenerationFailure(String),

    #[error("invalid feedback target: {0}")]
    InvalidFeedbackTarget(String),

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatbotError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ChatbotError::Internal(err.to_string())
    }
}
