//! Turn routing: a light model call decides how a message is handled.

use std::sync::Arc;

use serde::Deserialize;

use crate::config::ConfigStore;
use crate::llm::ModelClient;

/// Closed set of routes. Anything the classifier emits outside this
/// set is treated as a knowledge query — misrouting a greeting into
/// retrieval is cheap, silently dropping a real question is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    SmallTalk,
    KnowledgeQuery,
    OutOfScope,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::SmallTalk => "SMALL_TALK",
            Intent::KnowledgeQuery => "KNOWLEDGE_QUERY",
            Intent::OutOfScope => "OUT_OF_SCOPE",
        }
    }

    fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "SMALL_TALK" => Intent::SmallTalk,
            "OUT_OF_SCOPE" => Intent::OutOfScope,
            _ => Intent::KnowledgeQuery,
        }
    }
}

/// One routed turn: the intent plus an optional reformulated search
/// query the classifier considered a better retrieval key than the
/// user's literal phrasing.
#[derive(Debug, Clone)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f32,
    pub search_query: Option<String>,
}

impl Classification {
    fn knowledge_query() -> Self {
        Self {
            intent: Intent::KnowledgeQuery,
            confidence: 0.0,
            search_query: None,
        }
    }
}

#[derive(Deserialize)]
struct RawClassification {
    intent: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    search_query: Option<String>,
}

#[derive(Clone)]
pub struct IntentClassifier {
    models: Arc<dyn ModelClient>,
    config: ConfigStore,
}

impl IntentClassifier {
    pub fn new(models: Arc<dyn ModelClient>, config: ConfigStore) -> Self {
        Self { models, config }
    }

    /// Classify one user message. Never fails: any model or parse
    /// problem routes the turn as a knowledge query so the message
    /// still gets a grounded answer.
    pub async fn classify(&self, message: &str) -> Classification {
        let model = self.config.intent_model().await;
        let prompt = classification_prompt(message);

        let generation = match self.models.generate(&model, &prompt).await {
            Ok(generation) => generation,
            Err(err) => {
                tracing::warn!("intent classification failed, defaulting to knowledge query: {}", err);
                return Classification::knowledge_query();
            }
        };

        match parse_classification(&generation.text) {
            Some(classification) => {
                tracing::debug!(
                    "intent classified - intent: {}, confidence: {:.2}",
                    classification.intent.as_str(),
                    classification.confidence
                );
                classification
            }
            None => {
                tracing::warn!("unparseable classifier output, defaulting to knowledge query");
                Classification::knowledge_query()
            }
        }
    }
}

fn classification_prompt(message: &str) -> String {
    format!(
        "Classify the user message into exactly one intent.\n\
         Intents:\n\
         - SMALL_TALK: greetings, thanks, chit-chat with no information need\n\
         - KNOWLEDGE_QUERY: a question answerable from the site's documentation\n\
         - OUT_OF_SCOPE: requests unrelated to this site or its features\n\n\
         Respond with JSON only, no prose:\n\
         {{\"intent\": \"...\", \"confidence\": 0.0, \"search_query\": \"...\"}}\n\
         search_query is a short retrieval query for KNOWLEDGE_QUERY, else null.\n\n\
         User message: {}",
        message
    )
}

/// Pull the JSON object out of the model reply, tolerating code fences
/// or prose around it.
fn parse_classification(text: &str) -> Option<Classification> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }

    let raw: RawClassification = serde_json::from_str(&text[start..=end]).ok()?;
    let search_query = raw
        .search_query
        .filter(|q| !q.trim().is_empty())
        .map(|q| q.trim().to_string());

    Some(Classification {
        intent: Intent::from_label(&raw.intent),
        confidence: raw.confidence.clamp(0.0, 1.0),
        search_query,
    })
}
