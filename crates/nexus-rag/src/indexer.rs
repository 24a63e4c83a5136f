//! The indexer: text → sections → chunks → embeddings → persisted records.
//!
//! Owns the chunk lifecycle. All external calls happen before any store
//! mutation, so a failed embedding batch (or a timeout in the calling
//! layer) aborts the operation with the previous chunk generation intact.
//! The store swap itself is the store's transactional responsibility.
//!
//! Two reindexes of the same source racing each other are not arbitrated:
//! last committed wins, but a mixed generation is never visible.

use std::sync::Arc;

use tracing::{debug, info};

use nexus_core::{
    ChunkStore, EmbeddingBackend, Error, GenerationBackend, IndexSource, NewChunk, Result,
    Tokenizer,
};

use crate::chunker::{chunk_text, ChunkerConfig};
use crate::metadata::extract_doc_metadata;
use crate::pages::page_range_for_span;
use crate::sections::parse_sections;

/// Orchestrates indexing of one source entity into chunk records.
pub struct Indexer {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingBackend>,
    generator: Arc<dyn GenerationBackend>,
    tokenizer: Arc<dyn Tokenizer>,
    config: ChunkerConfig,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn EmbeddingBackend>,
        generator: Arc<dyn GenerationBackend>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            tokenizer,
            config: ChunkerConfig::default(),
        }
    }

    /// Override the chunk window configuration.
    pub fn with_chunker_config(mut self, config: ChunkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Index one source: replaces its entire chunk generation and returns
    /// the new chunk count.
    ///
    /// Fails with `NoContent` before touching persisted state when the
    /// source has no text. Re-indexing unchanged content is idempotent in
    /// count: the old generation is fully superseded, never mixed.
    pub async fn index(&self, source: &IndexSource) -> Result<usize> {
        if source.text.trim().is_empty() {
            return Err(Error::NoContent(format!(
                "{} {} has no text to index",
                source.source_type, source.source_id
            )));
        }

        // Section parsing and metadata extraction are independent; issue
        // them concurrently. Metadata is only needed when the caller did
        // not already supply a document title.
        let (outline, extracted) = if source.doc_title.is_none() {
            tokio::try_join!(
                parse_sections(self.generator.as_ref(), &source.text),
                extract_doc_metadata(self.generator.as_ref(), &source.text)
            )?
        } else {
            (parse_sections(self.generator.as_ref(), &source.text).await?, None)
        };

        debug!(
            subsystem = "index",
            component = "indexer",
            op = "sections",
            section_count = outline.sections.len(),
            fallback = outline.fallback,
            "Section outline ready"
        );

        let candidates = chunk_text(
            &source.text,
            &outline.sections,
            self.tokenizer.as_ref(),
            &self.config,
        )?;

        if candidates.is_empty() {
            // Nothing chunkable: still commit the replace so stale chunks
            // from a previous generation don't linger.
            return self
                .store
                .replace_for_source(source.source_type, source.source_id, source.user_id, vec![])
                .await;
        }

        // One batched embedding call for all chunks.
        let texts: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_texts(&texts).await?;
        if embeddings.len() != candidates.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                candidates.len(),
                embeddings.len()
            )));
        }

        let doc_title = source
            .doc_title
            .clone()
            .or_else(|| extracted.map(|meta| meta.title));

        let pages = source.pages.as_deref().filter(|pages| !pages.is_empty());

        let rows: Vec<NewChunk> = candidates
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (candidate, embedding))| {
                let (page_start, page_end) = match pages {
                    Some(pages) => {
                        let (start, end) =
                            page_range_for_span(candidate.char_start, candidate.char_end, pages);
                        (Some(start), Some(end))
                    }
                    None => (None, None),
                };

                NewChunk {
                    user_id: source.user_id,
                    project_id: source.project_id,
                    source_type: source.source_type,
                    source_id: source.source_id,
                    content: candidate.content,
                    chunk_index: i as i32,
                    section_title: candidate.section_title,
                    char_start: candidate.char_start as i32,
                    char_end: candidate.char_end as i32,
                    page_start,
                    page_end,
                    doc_title: doc_title.clone(),
                    doc_authors: source.doc_authors.clone(),
                    doc_year: source.doc_year,
                    embedding,
                }
            })
            .collect();

        let count = self
            .store
            .replace_for_source(source.source_type, source.source_id, source.user_id, rows)
            .await?;

        info!(
            subsystem = "index",
            component = "indexer",
            op = "index",
            source_type = %source.source_type,
            source_id = source.source_id,
            chunk_count = count,
            "Indexed source"
        );

        Ok(count)
    }
}
