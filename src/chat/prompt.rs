//! Prompt assembly for the answer model.

use crate::store::{Message, MessageRole};

use super::retriever::RetrievedChunk;

/// Full generation prompt: persona, numbered context chunks, the
/// recent transcript, then the live question. With no chunks the
/// context block is omitted and the model is told so.
pub fn build_prompt(
    system_prompt: &str,
    chunks: &[RetrievedChunk],
    history: &[Message],
    question: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(system_prompt);
    prompt.push_str("\n\n");

    if chunks.is_empty() {
        prompt.push_str(
            "No reference material matched this question. Answer from general \
             knowledge of the site, and say so when you are unsure.\n\n",
        );
    } else {
        prompt.push_str("Reference material:\n");
        for (i, chunk) in chunks.iter().enumerate() {
            prompt.push_str(&format!(
                "[{}] {} ({})\n{}\n\n",
                i + 1,
                chunk.title,
                chunk.category,
                chunk.content
            ));
        }
    }

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for message in history {
            let speaker = match message.role {
                MessageRole::User => "User",
                MessageRole::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{}: {}\n", speaker, message.content));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("User: {}\nAssistant:", question));
    prompt
}

/// Prompt for a turn that needs no retrieval.
pub fn build_small_talk_prompt(system_prompt: &str, history: &[Message], question: &str) -> String {
    build_prompt(system_prompt, &[], history, question)
}
