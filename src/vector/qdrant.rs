//! Qdrant vector store over the HTTP API.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};

use super::{PointInsert, SearchHit, VectorStore};
use crate::core::errors::ChatbotError;

#[derive(Clone)]
pub struct QdrantStore {
    base_url: String,
    collection: String,
    client: Client,
}

impl QdrantStore {
    pub fn new(base_url: String, collection: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            collection,
            client: Client::new(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    fn unavailable<E: std::fmt::Display>(err: E) -> ChatbotError {
        ChatbotError::RetrievalUnavailable(err.to_string())
    }

    async fn collection_exists(&self) -> Result<bool, ChatbotError> {
        let res = self
            .client
            .get(self.url(""))
            .send()
            .await
            .map_err(Self::unavailable)?;
        Ok(res.status().is_success())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn create_collection(&self, dimension: usize) -> Result<(), ChatbotError> {
        if self.collection_exists().await? {
            tracing::debug!("qdrant collection already exists - {}", self.collection);
            return Ok(());
        }

        let body = json!({
            "vectors": { "size": dimension, "distance": "Cosine" }
        });

        let res = self
            .client
            .put(self.url(""))
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(Self::unavailable(format!("create collection failed: {}", text)));
        }

        tracing::info!(
            "qdrant collection created - name: {}, dimension: {}",
            self.collection,
            dimension
        );
        Ok(())
    }

    async fn upsert_points(&self, points: Vec<PointInsert>) -> Result<(), ChatbotError> {
        if points.is_empty() {
            return Ok(());
        }

        let count = points.len();
        let body_points: Vec<Value> = points
            .into_iter()
            .map(|p| {
                let mut payload = p.metadata;
                payload.insert("content".to_string(), Value::String(p.content));
                json!({ "id": p.point_id, "vector": p.vector, "payload": payload })
            })
            .collect();

        let res = self
            .client
            .put(self.url("/points?wait=true"))
            .json(&json!({ "points": body_points }))
            .send()
            .await
            .map_err(Self::unavailable)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(Self::unavailable(format!("upsert failed: {}", text)));
        }

        tracing::debug!("qdrant upsert complete - points: {}", count);
        Ok(())
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>, ChatbotError> {
        let body = json!({
            "vector": vector,
            "limit": top_k,
            "with_payload": true
        });

        let res = self
            .client
            .post(self.url("/points/search"))
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(Self::unavailable(format!("search failed: {}", text)));
        }

        let payload: Value = res.json().await.map_err(Self::unavailable)?;
        let hits = payload["result"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .map(|r| {
                        let mut metadata = r["payload"]
                            .as_object()
                            .cloned()
                            .unwrap_or_else(Map::new);
                        let content = metadata
                            .remove("content")
                            .and_then(|v| v.as_str().map(str::to_string))
                            .unwrap_or_default();

                        SearchHit {
                            point_id: point_id_string(&r["id"]),
                            score: r["score"].as_f64().unwrap_or(0.0) as f32,
                            content,
                            metadata,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(hits)
    }

    async fn delete_points(&self, point_ids: &[String]) -> Result<(), ChatbotError> {
        if point_ids.is_empty() {
            return Ok(());
        }

        let res = self
            .client
            .post(self.url("/points/delete?wait=true"))
            .json(&json!({ "points": point_ids }))
            .send()
            .await
            .map_err(Self::unavailable)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(Self::unavailable(format!("delete failed: {}", text)));
        }

        tracing::debug!("qdrant delete complete - points: {}", point_ids.len());
        Ok(())
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<(), ChatbotError> {
        let body = json!({
            "filter": {
                "must": [{ "key": "document_id", "match": { "value": document_id } }]
            }
        });

        let res = self
            .client
            .post(self.url("/points/delete?wait=true"))
            .json(&body)
            .send()
            .await
            .map_err(Self::unavailable)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(Self::unavailable(format!("delete by document failed: {}", text)));
        }

        Ok(())
    }

    async fn count(&self) -> Result<usize, ChatbotError> {
        let res = self
            .client
            .post(self.url("/points/count"))
            .json(&json!({ "exact": true }))
            .send()
            .await
            .map_err(Self::unavailable)?;

        if !res.status().is_success() {
            return Ok(0);
        }

        let payload: Value = res.json().await.map_err(Self::unavailable)?;
        Ok(payload["result"]["count"].as_u64().unwrap_or(0) as usize)
    }
}

fn point_id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}
