//! In-process vector store: brute-force cosine over a Vec.
//!
//! Insertion order is preserved, which gives searches a stable
//! tie-break (earlier-inserted points rank first at equal score).

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{PointInsert, SearchHit, VectorStore};
use crate::core::errors::ChatbotError;

#[derive(Clone, Default)]
pub struct InMemoryVectorStore {
    points: Arc<RwLock<Vec<PointInsert>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, _dimension: usize) -> Result<(), ChatbotError> {
        Ok(())
    }

    async fn upsert_points(&self, points: Vec<PointInsert>) -> Result<(), ChatbotError> {
        let mut guard = self.points.write().unwrap_or_else(|e| e.into_inner());
        for point in points {
            if let Some(existing) = guard.iter_mut().find(|p| p.point_id == point.point_id) {
                *existing = point;
            } else {
                guard.push(point);
            }
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>, ChatbotError> {
        let guard = self.points.read().unwrap_or_else(|e| e.into_inner());

        let mut hits: Vec<SearchHit> = guard
            .iter()
            .map(|p| SearchHit {
                point_id: p.point_id.clone(),
                score: Self::cosine_similarity(vector, &p.vector),
                content: p.content.clone(),
                metadata: p.metadata.clone(),
            })
            .collect();

        // Stable sort keeps insertion order for equal scores.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);

        Ok(hits)
    }

    async fn delete_points(&self, point_ids: &[String]) -> Result<(), ChatbotError> {
        let mut guard = self.points.write().unwrap_or_else(|e| e.into_inner());
        guard.retain(|p| !point_ids.contains(&p.point_id));
        Ok(())
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<(), ChatbotError> {
        let mut guard = self.points.write().unwrap_or_else(|e| e.into_inner());
        guard.retain(|p| {
            p.metadata
                .get("document_id")
                .and_then(|v| v.as_str())
                .map(|id| id != document_id)
                .unwrap_or(true)
        });
        Ok(())
    }

    async fn count(&self) -> Result<usize, ChatbotError> {
        Ok(self.points.read().unwrap_or_else(|e| e.into_inner()).len())
    }
}
