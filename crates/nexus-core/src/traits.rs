//! Service boundary traits.
//!
//! The pipeline crate depends only on these traits, never on a concrete
//! backend or database: the embedding service, the generation service, and
//! chunk storage are all injected, so every stage can be unit-tested with
//! deterministic fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChunkFilter, ChunkRecord, NewChunk, ScoredChunk, SourceType};
use crate::Vector;

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns one vector per input text, order-preserving, all with
    /// [`dimension`](Self::dimension) components.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for text generation (LLM).
///
/// The output carries no structural guarantee beyond best-effort adherence
/// to the prompt; callers parse defensively.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Combined inference backend supporting both embedding and generation.
#[async_trait]
pub trait InferenceBackend: EmbeddingBackend + GenerationBackend {
    /// Check if the backend is available and responding.
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// STORAGE TRAITS
// =============================================================================

/// Persistent store for chunk records.
///
/// Chunk rows are owned by the indexer: they are only ever created through
/// [`replace_for_source`](Self::replace_for_source), which swaps a source's
/// entire chunk generation atomically. Readers must never observe a mix of
/// old and new chunks.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Atomically replace all chunks for one source entity.
    ///
    /// Deletes the previous generation and inserts `chunks` in a single
    /// transaction; either all new rows are committed or none are. Returns
    /// the number of chunks inserted.
    async fn replace_for_source(
        &self,
        source_type: SourceType,
        source_id: i64,
        user_id: i64,
        chunks: Vec<NewChunk>,
    ) -> Result<usize>;

    /// Fetch the `limit` chunks nearest to `embedding` by cosine distance,
    /// restricted to `filter`. Results are ordered by ascending distance
    /// with ties broken by ascending chunk id.
    async fn nearest(
        &self,
        embedding: &Vector,
        filter: &ChunkFilter,
        limit: i64,
    ) -> Result<Vec<ScoredChunk>>;

    /// Fetch all chunks for one source, ordered by chunk index.
    async fn get_for_source(
        &self,
        source_type: SourceType,
        source_id: i64,
        user_id: i64,
    ) -> Result<Vec<ChunkRecord>>;
}
