//! Conversation runtime: intent routing, retrieval, generation and
//! turn persistence.

pub mod generator;
pub mod intent;
pub mod prompt;
pub mod retriever;
mod service;

pub use generator::{GenReply, ResponseGenerator};
pub use intent::{Classification, Intent, IntentClassifier};
pub use retriever::{ContextRetriever, RetrievedChunk};
pub use service::{ChatOutcome, ChatService, Reference};
