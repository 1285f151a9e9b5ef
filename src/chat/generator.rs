//! Answer generation with a hard deadline.
//!
//! A slow or broken model never fails the turn: past the configured
//! deadline (or on a model error) the reply becomes the fixed fallback
//! apology with zero token counts, and the turn persists normally.

use std::sync::Arc;
use std::time::Duration;

use crate::config::defaults;
use crate::config::ConfigStore;
use crate::core::errors::ChatbotError;
use crate::llm::{Generation, ModelClient};

/// What a turn persists for the assistant side.
#[derive(Debug, Clone)]
pub struct GenReply {
    pub text: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    /// False when the fallback apology replaced a real answer.
    pub generated: bool,
}

impl GenReply {
    fn fallback() -> Self {
        Self {
            text: defaults::FALLBACK_REPLY.to_string(),
            input_tokens: 0,
            output_tokens: 0,
            generated: false,
        }
    }
}

#[derive(Clone)]
pub struct ResponseGenerator {
    models: Arc<dyn ModelClient>,
    config: ConfigStore,
}

impl ResponseGenerator {
    pub fn new(models: Arc<dyn ModelClient>, config: ConfigStore) -> Self {
        Self { models, config }
    }

    /// Run the answer model against `prompt`. Infallible by design:
    /// the fallback reply is a valid outcome, not an error.
    pub async fn generate(&self, prompt: &str) -> GenReply {
        let model = self.config.generation_model().await;
        let timeout = Duration::from_secs(self.config.generation_timeout_secs().await);

        let result = tokio::time::timeout(timeout, self.models.generate(&model, prompt)).await;

        match result {
            Ok(Ok(Generation { text, input_tokens, output_tokens })) => GenReply {
                text,
                input_tokens,
                output_tokens,
                generated: true,
            },
            Ok(Err(err)) => {
                tracing::warn!("generation failed, serving fallback reply: {}", err);
                GenReply::fallback()
            }
            Err(_) => {
                let err = ChatbotError::GenerationTimeout(timeout.as_secs());
                tracing::warn!("{}, serving fallback reply", err);
                GenReply::fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::core::errors::ChatbotError;
    use crate::store::{test_pool, TestDb};

    struct SlowModel {
        delay: Duration,
    }

    #[async_trait]
    impl ModelClient for SlowModel {
        async fn embed(&self, _m: &str, _t: &str) -> Result<Vec<f32>, ChatbotError> {
            unreachable!("generation never embeds");
        }

        async fn generate(&self, _m: &str, _p: &str) -> Result<Generation, ChatbotError> {
            tokio::time::sleep(self.delay).await;
            Ok(Generation {
                text: "an answer".to_string(),
                input_tokens: 12,
                output_tokens: 34,
            })
        }
    }

    struct BrokenModel;

    #[async_trait]
    impl ModelClient for BrokenModel {
        async fn embed(&self, _m: &str, _t: &str) -> Result<Vec<f32>, ChatbotError> {
            unreachable!();
        }

        async fn generate(&self, _m: &str, _p: &str) -> Result<Generation, ChatbotError> {
            Err(ChatbotError::GenerationFailure("boom".to_string()))
        }
    }

    async fn config_with_timeout(secs: u64) -> (ConfigStore, TestDb) {
        let db = test_pool().await;
        let config = ConfigStore::new(db.pool.clone()).await.unwrap();
        config
            .set("generation_timeout_secs", &secs.to_string())
            .await
            .unwrap();
        (config, db)
    }

    #[tokio::test]
    async fn fast_model_answer_carries_token_counts() {
        let (config, _db) = config_with_timeout(5).await;
        let generator =
            ResponseGenerator::new(Arc::new(SlowModel { delay: Duration::from_millis(0) }), config);

        let reply = generator.generate("prompt").await;
        assert!(reply.generated);
        assert_eq!(reply.text, "an answer");
        assert_eq!((reply.input_tokens, reply.output_tokens), (12, 34));
    }

    #[tokio::test]
    async fn deadline_overrun_serves_exact_fallback() {
        let (config, _db) = config_with_timeout(1).await;
        // Pause only after setup: opening the db under a paused clock
        // trips the pool's acquire timeout via auto-advance.
        tokio::time::pause();
        let generator =
            ResponseGenerator::new(Arc::new(SlowModel { delay: Duration::from_secs(120) }), config);

        let reply = generator.generate("prompt").await;
        assert!(!reply.generated);
        assert_eq!(reply.text, defaults::FALLBACK_REPLY);
        assert_eq!((reply.input_tokens, reply.output_tokens), (0, 0));
    }

    #[tokio::test]
    async fn model_error_serves_fallback() {
        let (config, _db) = config_with_timeout(5).await;
        let generator = ResponseGenerator::new(Arc::new(BrokenModel), config);

        let reply = generator.generate("prompt").await;
        assert!(!reply.generated);
        assert_eq!(reply.text, defaults::FALLBACK_REPLY);
    }
}
