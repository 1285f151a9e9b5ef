//! One chat turn, end to end.
//!
//! Turns against the same session token are serialized by an async
//! lock, which makes message-index allocation gapless and keeps two
//! concurrent requests from racing session creation. Turns on distinct
//! tokens run concurrently.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::config::{defaults, ConfigStore};
use crate::core::errors::ChatbotError;
use crate::core::locks::KeyedLocks;
use crate::store::{Message, MessageRole, SessionStore};

use super::generator::{GenReply, ResponseGenerator};
use super::intent::{Intent, IntentClassifier};
use super::prompt;
use super::retriever::{ContextRetriever, RetrievedChunk};

const SNIPPET_CHARS: usize = 200;

/// A document chunk cited by a reply.
#[derive(Debug, Clone, Serialize)]
pub struct Reference {
    pub document_id: String,
    pub title: String,
    pub category: String,
    pub snippet: String,
    pub score: f32,
}

/// Everything the caller gets back from a completed turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub session_token: String,
    pub session_id: String,
    pub message_id: String,
    pub reply: String,
    pub intent: String,
    pub references: Vec<Reference>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub elapsed_ms: u64,
}

#[derive(Clone)]
pub struct ChatService {
    sessions: SessionStore,
    classifier: IntentClassifier,
    retriever: ContextRetriever,
    generator: ResponseGenerator,
    config: ConfigStore,
    turn_locks: Arc<KeyedLocks>,
}

impl ChatService {
    pub fn new(
        sessions: SessionStore,
        classifier: IntentClassifier,
        retriever: ContextRetriever,
        generator: ResponseGenerator,
        config: ConfigStore,
    ) -> Self {
        Self {
            sessions,
            classifier,
            retriever,
            generator,
            config,
            turn_locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Handle one user message and return the assistant's reply.
    ///
    /// Both sides of the exchange are persisted before this returns:
    /// the user message as soon as the session is open, the assistant
    /// message once the route produced a reply. Retrieval and
    /// generation problems downgrade the reply, never the turn.
    pub async fn chat(
        &self,
        session_token: Option<&str>,
        message: &str,
        user_ip: &str,
        user_agent: &str,
    ) -> Result<ChatOutcome, ChatbotError> {
        let started = Instant::now();

        let token = session_token
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let _guard = self.turn_locks.acquire(&token).await;

        let session = self
            .sessions
            .open_session(Some(&token), user_ip, user_agent)
            .await?;

        let user_index = self.sessions.next_message_index(&session.session_id).await?;
        self.sessions
            .append_message(
                &session.session_id,
                user_index,
                MessageRole::User,
                message,
                0,
                0,
                "",
            )
            .await?;

        let classification = self.classifier.classify(message).await;
        let (reply, chunks) = match classification.intent {
            Intent::OutOfScope => (
                GenReply {
                    text: defaults::DECLINE_REPLY.to_string(),
                    input_tokens: 0,
                    output_tokens: 0,
                    generated: false,
                },
                Vec::new(),
            ),
            Intent::SmallTalk => {
                let history = self.history_window(&session.session_id, user_index).await?;
                let system_prompt = self.config.system_prompt().await;
                let prompt = prompt::build_small_talk_prompt(&system_prompt, &history, message);
                (self.generator.generate(&prompt).await, Vec::new())
            }
            Intent::KnowledgeQuery => {
                let query = classification.search_query.as_deref().unwrap_or(message);
                let chunks = self.retriever.retrieve(query).await;
                let history = self.history_window(&session.session_id, user_index).await?;
                let system_prompt = self.config.system_prompt().await;
                let prompt = prompt::build_prompt(&system_prompt, &chunks, &history, message);
                (self.generator.generate(&prompt).await, chunks)
            }
        };

        let referenced_ids = referenced_document_ids(&chunks);
        let assistant = self
            .sessions
            .append_message(
                &session.session_id,
                user_index + 1,
                MessageRole::Assistant,
                &reply.text,
                reply.input_tokens,
                reply.output_tokens,
                &referenced_ids,
            )
            .await?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "chat turn complete - session_id: {}, intent: {}, references: {}, elapsed_ms: {}",
            session.session_id,
            classification.intent.as_str(),
            chunks.len(),
            elapsed_ms
        );

        Ok(ChatOutcome {
            session_token: session.session_token,
            session_id: session.session_id,
            message_id: assistant.message_id,
            reply: reply.text,
            intent: classification.intent.as_str().to_string(),
            references: chunks.into_iter().map(to_reference).collect(),
            input_tokens: reply.input_tokens,
            output_tokens: reply.output_tokens,
            elapsed_ms,
        })
    }

    /// Attach a helpfulness signal to a prior assistant reply.
    pub async fn record_feedback(
        &self,
        message_id: &str,
        helpful: bool,
    ) -> Result<(), ChatbotError> {
        self.sessions.set_feedback(message_id, helpful).await
    }

    /// Full transcript for an active session token, oldest first.
    pub async fn chat_history(&self, session_token: &str) -> Result<Vec<Message>, ChatbotError> {
        self.sessions.chat_history(session_token).await
    }

    pub async fn end_session(&self, session_token: &str) -> Result<(), ChatbotError> {
        self.sessions.end_session(session_token).await
    }

    /// Deactivate sessions idle past the configured window. Meant to
    /// run from a periodic task.
    pub async fn sweep_inactive(&self) -> Result<usize, ChatbotError> {
        let idle = chrono::Duration::hours(self.config.session_idle_hours().await);
        self.sessions.sweep_inactive(idle).await
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// History window of messages strictly before `turn_index`, so the
    /// just-persisted user message is excluded by identity and the
    /// question is not in the prompt twice.
    async fn history_window(
        &self,
        session_id: &str,
        turn_index: i64,
    ) -> Result<Vec<Message>, ChatbotError> {
        let limit = self.config.max_history_messages().await;
        // The window fetched includes the current turn's user row; the
        // index filter removes it, leaving at most `limit` entries.
        let mut history = self.sessions.recent_history(session_id, limit + 1).await?;
        history.retain(|m| m.message_index < turn_index);
        Ok(history)
    }
}

fn referenced_document_ids(chunks: &[RetrievedChunk]) -> String {
    let mut seen = Vec::new();
    for chunk in chunks {
        if !seen.iter().any(|id| id == &chunk.document_id) {
            seen.push(chunk.document_id.clone());
        }
    }
    seen.join(",")
}

fn to_reference(chunk: RetrievedChunk) -> Reference {
    let snippet = if chunk.content.chars().count() > SNIPPET_CHARS {
        let cut: String = chunk.content.chars().take(SNIPPET_CHARS).collect();
        format!("{}…", cut.trim_end())
    } else {
        chunk.content
    };

    Reference {
        document_id: chunk.document_id,
        title: chunk.title,
        category: chunk.category,
        snippet,
        score: chunk.score,
    }
}
