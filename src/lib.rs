//! Sunny — RAG chatbot engine.
//!
//! Ingests reference documents into a vector index and answers user
//! questions over them: intent classification, similarity retrieval,
//! bounded conversational context, and generation with graceful
//! degradation. Sessions, message history, token accounting and
//! feedback are persisted in sqlite; vectors live in Qdrant.
//!
//! The HTTP layer is not part of this crate — it wraps `ChatService`
//! and `IngestService` from the outside.

pub mod chat;
pub mod chunker;
pub mod config;
pub mod core;
pub mod ingest;
pub mod llm;
pub mod store;
pub mod vector;

pub use crate::chat::{ChatOutcome, ChatService};
pub use crate::core::errors::ChatbotError;
pub use crate::ingest::IngestService;
