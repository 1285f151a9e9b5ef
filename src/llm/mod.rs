//! Model endpoints: embedding, intent and generation models all sit
//! behind one `ModelClient` trait so tests can swap in scripted fakes.

pub mod ollama;

use async_trait::async_trait;

use crate::core::errors::ChatbotError;

pub use ollama::OllamaClient;

/// One completed generation call, with the token counts the model reported.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Embed `text` with the named embedding model.
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ChatbotError>;

    /// Non-streaming completion with the named model.
    async fn generate(&self, model: &str, prompt: &str) -> Result<Generation, ChatbotError>;
}
