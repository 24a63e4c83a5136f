//! Centralized default constants for the nexus system.
//!
//! **This module is the single source of truth** for all shared default
//! values. Other crates reference these constants instead of defining their
//! own magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// CHUNKING
// =============================================================================

/// Target token count per chunk. Chunks may run slightly shorter after the
/// boundary is snapped back to a sentence delimiter.
pub const CHUNK_TARGET_TOKENS: usize = 400;

/// Token overlap between successive chunks for context preservation.
pub const CHUNK_OVERLAP_TOKENS: usize = 60;

// =============================================================================
// SECTION PARSING
// =============================================================================

/// Characters of document prefix sampled for the section outline prompt.
/// Bounded so long papers stay within the generation model's context.
pub const SECTION_SAMPLE_CHARS: usize = 8000;

/// Maximum section title length persisted on a chunk.
pub const SECTION_TITLE_MAX_CHARS: usize = 200;

// =============================================================================
// RETRIEVAL
// =============================================================================

/// Candidate pool size for the vector recall stage when reranking is on.
pub const RETRIEVE_INITIAL_K: usize = 20;

/// Final result count returned to the caller.
pub const RETRIEVE_FINAL_K: usize = 5;

// =============================================================================
// ANSWERING
// =============================================================================

/// Maximum characters of chunk content used as a citation snippet when the
/// model did not return an exact quote for that citation number.
pub const SNIPPET_PREVIEW_CHARS: usize = 300;

/// Soft token budget for the assembled answer context. Exceeding it only
/// logs a warning; the generation service enforces its own hard limit.
pub const ANSWER_CONTEXT_TOKEN_BUDGET: usize = 6000;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name.
pub const EMBED_MODEL: &str = "text-embedding-3-small";

/// Default embedding vector dimension for text-embedding-3-small.
pub const EMBED_DIMENSION: usize = 1536;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default OpenAI-compatible base URL.
pub const OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default generation model name.
pub const GEN_MODEL: &str = "gpt-4o-mini";

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 60;

/// Timeout for generation requests in seconds.
pub const GEN_TIMEOUT_SECS: u64 = 120;
