//! Overlapping-window document chunker.
//!
//! Pure function from (content, config) to chunk texts: no I/O, no
//! side effects, identical output for identical input. Tokens are
//! whitespace-separated words; chunk texts are rejoined with single
//! spaces, so consecutive chunks share exactly `chunk_overlap` tokens.

use serde::{Deserialize, Serialize};

use crate::core::errors::ChatbotError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Window size in tokens.
    pub chunk_size: usize,
    /// Tokens shared between consecutive chunks. Must be < chunk_size.
    pub chunk_overlap: usize,
}

/// Number of tokens the chunker would count for `text`.
///
/// Stored per chunk so the relational side can report sizes without
/// re-tokenizing.
pub fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split `content` into overlapping token windows.
///
/// Windows advance by `chunk_size - chunk_overlap`; the final chunk may
/// be shorter than `chunk_size`, and content that fits in one window
/// yields exactly one chunk. Empty content yields no chunks.
pub fn split_into_chunks(
    content: &str,
    config: &ChunkConfig,
) -> Result<Vec<String>, ChatbotError> {
    if config.chunk_size == 0 || config.chunk_overlap >= config.chunk_size {
        return Err(ChatbotError::InvalidChunkConfig {
            size: config.chunk_size,
            overlap: config.chunk_overlap,
        });
    }

    let tokens: Vec<&str> = content.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let step = config.chunk_size - config.chunk_overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + config.chunk_size).min(tokens.len());
        chunks.push(tokens[start..end].join(" "));
        if end == tokens.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let err = split_into_chunks("a b c", &ChunkConfig { chunk_size: 10, chunk_overlap: 10 });
        assert!(matches!(err, Err(ChatbotError::InvalidChunkConfig { .. })));

        let err = split_into_chunks("a b c", &ChunkConfig { chunk_size: 5, chunk_overlap: 9 });
        assert!(matches!(err, Err(ChatbotError::InvalidChunkConfig { .. })));
    }

    #[test]
    fn short_document_yields_one_chunk() {
        let content = words(42);
        let chunks =
            split_into_chunks(&content, &ChunkConfig { chunk_size: 500, chunk_overlap: 100 })
                .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], content);
    }

    #[test]
    fn empty_content_yields_no_chunks() {
        let chunks =
            split_into_chunks("   \n\t ", &ChunkConfig { chunk_size: 10, chunk_overlap: 2 })
                .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn twelve_hundred_tokens_make_three_chunks() {
        let content = words(1200);
        let config = ChunkConfig { chunk_size: 500, chunk_overlap: 100 };
        let chunks = split_into_chunks(&content, &config).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(token_count(&chunks[0]), 500); // 0..500
        assert_eq!(token_count(&chunks[1]), 500); // 400..900
        assert_eq!(token_count(&chunks[2]), 400); // 800..1200
        assert!(chunks[0].starts_with("w0 "));
        assert!(chunks[1].starts_with("w400 "));
        assert!(chunks[2].ends_with(" w1199"));
    }

    #[test]
    fn consecutive_chunks_overlap_exactly() {
        let content = words(1000);
        let config = ChunkConfig { chunk_size: 300, chunk_overlap: 60 };
        let chunks = split_into_chunks(&content, &config).unwrap();
        assert!(chunks.len() > 1);

        for pair in chunks.windows(2) {
            let left: Vec<&str> = pair[0].split_whitespace().collect();
            let right: Vec<&str> = pair[1].split_whitespace().collect();
            let tail = &left[left.len() - config.chunk_overlap..];
            let head = &right[..config.chunk_overlap];
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn rechunking_is_idempotent() {
        let content = words(777);
        let config = ChunkConfig { chunk_size: 128, chunk_overlap: 32 };
        let first = split_into_chunks(&content, &config).unwrap();
        let second = split_into_chunks(&content, &config).unwrap();
        assert_eq!(first, second);
    }
}
