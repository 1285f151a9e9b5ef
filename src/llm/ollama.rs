use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{Generation, ModelClient};
use crate::core::errors::ChatbotError;

/// Ollama-compatible model server client.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: Client,
}

impl OllamaClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        matches!(self.client.get(&url).send().await, Ok(resp) if resp.status().is_success())
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ChatbotError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = json!({ "model": model, "input": text });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ChatbotError::internal)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ChatbotError::Internal(format!("embed error: {}", text)));
        }

        let payload: Value = res.json().await.map_err(ChatbotError::internal)?;
        let vector: Vec<f32> = payload["embeddings"][0]
            .as_array()
            .map(|vals| {
                vals.iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect()
            })
            .unwrap_or_default();

        if vector.is_empty() {
            return Err(ChatbotError::Internal(
                "embed response carried no vector".to_string(),
            ));
        }

        Ok(vector)
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<Generation, ChatbotError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({ "model": model, "prompt": prompt, "stream": false });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatbotError::GenerationFailure(e.to_string()))?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ChatbotError::GenerationFailure(format!(
                "model server returned error: {}",
                text
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| ChatbotError::GenerationFailure(e.to_string()))?;

        Ok(Generation {
            text: payload["response"].as_str().unwrap_or_default().to_string(),
            input_tokens: payload["prompt_eval_count"].as_i64().unwrap_or(0),
            output_tokens: payload["eval_count"].as_i64().unwrap_or(0),
        })
    }
}
