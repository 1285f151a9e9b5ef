//! Compiled-in defaults used when a key is absent from `chatbot_config`.

pub const CHUNK_SIZE: usize = 500;
pub const CHUNK_OVERLAP: usize = 50;
pub const TOP_K: usize = 3;
pub const MIN_SCORE: f32 = 0.5;
pub const MAX_HISTORY_MESSAGES: usize = 30;
pub const GENERATION_TIMEOUT_SECS: u64 = 60;
pub const SESSION_IDLE_HOURS: i64 = 24;

pub const VECTOR_DIMENSION: usize = 768;
pub const COLLECTION_NAME: &str = "chatbot-docs";

pub const INTENT_MODEL: &str = "gemma3:1b";
pub const GENERATION_MODEL: &str = "rnj-1:8b";
pub const EMBEDDING_MODEL: &str = "embeddinggemma:latest";

pub const SYSTEM_PROMPT: &str = "\
## You are 'Sunny', the site assistant.

Sunny helps visitors find their way around the project utility site.

### Guidelines
- Answer directly and concisely.
- When asked who you are, introduce yourself as Sunny.
- If you do not know something, say so honestly instead of guessing.
- Politely steer the conversation away from abusive language.";

/// Returned verbatim when the generation model fails or times out.
pub const FALLBACK_REPLY: &str =
    "Sorry, the assistant is having temporary trouble. Please try again in a moment.";

/// Returned for OUT_OF_SCOPE questions without calling any model.
pub const DECLINE_REPLY: &str =
    "Sorry, that is outside what I can help with. I can answer questions about this site \
and its features.";
