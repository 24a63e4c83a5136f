//! Token counting and encoding for chunking and context management.
//!
//! Wraps the tiktoken library so token windows line up with the tokenizer of
//! the embedding/generation model family in use. Also provides a fast
//! estimation heuristic for cheap limit checks.
//!
//! Note that `decode(encode(x))` is not guaranteed to reproduce `x` exactly
//! (whitespace normalization is possible); the chunker tolerates this.

use crate::error::{Error, Result};

/// Trait for tokenization operations.
///
/// Implementations must be thread-safe. The chunker takes this as a trait
/// object so tests can substitute deterministic tokenizers.
pub trait Tokenizer: Send + Sync {
    /// Count the number of tokens in the given text.
    fn count_tokens(&self, text: &str) -> usize;

    /// Encode text into token IDs.
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decode token IDs back into text.
    fn decode(&self, tokens: &[u32]) -> String;

    /// Get the name/identifier of this tokenizer.
    fn name(&self) -> &str;
}

/// Tiktoken-based tokenizer implementation.
pub struct TiktokenTokenizer {
    bpe: tiktoken_rs::CoreBPE,
    name: String,
}

impl TiktokenTokenizer {
    /// Create a tokenizer for the specified model (e.g. "gpt-4o-mini").
    ///
    /// # Errors
    /// Returns an error if the model is not recognized or BPE initialization
    /// fails.
    pub fn new(model: &str) -> Result<Self> {
        let bpe = tiktoken_rs::get_bpe_from_model(model)
            .map_err(|e| Error::Internal(format!("Failed to initialize tokenizer: {}", e)))?;

        Ok(Self {
            bpe,
            name: model.to_string(),
        })
    }

    /// Create a tokenizer for embeddings (uses cl100k_base).
    ///
    /// This is the tokenizer used by text-embedding-3-small and its family.
    pub fn for_embeddings() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| Error::Internal(format!("Failed to initialize cl100k_base: {}", e)))?;

        Ok(Self {
            bpe,
            name: "cl100k_base".to_string(),
        })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|t| t as u32)
            .collect()
    }

    fn decode(&self, tokens: &[u32]) -> String {
        let token_vec: Vec<usize> = tokens.iter().map(|&t| t as usize).collect();
        self.bpe.decode(token_vec).unwrap_or_default()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Quickly estimate token count without full tokenization.
///
/// Uses a heuristic ratio of ~3.7 characters per token for English text.
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() as f32 / 3.7).ceil() as usize
}

/// Check if text likely exceeds a token limit using estimation.
///
/// Useful for quick filtering before expensive tokenization.
pub fn likely_exceeds_limit(text: &str, limit: usize) -> bool {
    estimate_tokens(text) > limit
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_ENGLISH: &str = "The quick brown fox jumps over the lazy dog.";

    #[test]
    fn test_tiktoken_for_embeddings_initialization() {
        let tokenizer = TiktokenTokenizer::for_embeddings().unwrap();
        assert_eq!(tokenizer.name(), "cl100k_base");
    }

    #[test]
    fn test_count_tokens_simple_english() {
        let tokenizer = TiktokenTokenizer::for_embeddings().unwrap();
        let count = tokenizer.count_tokens(SIMPLE_ENGLISH);

        // "The quick brown fox jumps over the lazy dog." is typically ~10 tokens
        assert!(
            (8..=12).contains(&count),
            "Expected ~10 tokens, got {}",
            count
        );
    }

    #[test]
    fn test_count_tokens_empty_string() {
        let tokenizer = TiktokenTokenizer::for_embeddings().unwrap();
        assert_eq!(tokenizer.count_tokens(""), 0);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let tokenizer = TiktokenTokenizer::for_embeddings().unwrap();

        let tokens = tokenizer.encode(SIMPLE_ENGLISH);
        assert!(!tokens.is_empty());

        let decoded = tokenizer.decode(&tokens);
        assert_eq!(decoded, SIMPLE_ENGLISH);
    }

    #[test]
    fn test_decode_partial_prefix_measures_chars() {
        // The chunker relies on decode(prefix).len() to locate window starts.
        let tokenizer = TiktokenTokenizer::for_embeddings().unwrap();
        let text = "First sentence here. Second sentence follows.";
        let tokens = tokenizer.encode(text);

        let prefix = tokenizer.decode(&tokens[..tokens.len() / 2]);
        assert!(text.starts_with(&prefix));
    }

    #[test]
    fn test_estimate_tokens() {
        // 44 chars / 3.7 = 11.89 -> ceil = 12
        assert_eq!(estimate_tokens(SIMPLE_ENGLISH), 12);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_likely_exceeds_limit() {
        assert!(!likely_exceeds_limit("Short text", 100));
        let long_text = "word ".repeat(1000);
        assert!(likely_exceeds_limit(&long_text, 100));
    }

    #[test]
    fn test_tokenizer_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let tokenizer = Arc::new(TiktokenTokenizer::for_embeddings().unwrap());
        let mut handles = vec![];

        for i in 0..4 {
            let tokenizer_clone = Arc::clone(&tokenizer);
            handles.push(thread::spawn(move || {
                let text = format!("Thread {} is tokenizing this text", i);
                tokenizer_clone.count_tokens(&text)
            }));
        }

        for handle in handles {
            assert!(handle.join().unwrap() > 0);
        }
    }
}
