//! # nexus-rag
//!
//! Indexing and citation-grounded retrieval pipeline for the nexus research
//! assistant.
//!
//! This crate provides:
//! - Section-aware token chunking with sentence-boundary snapping
//! - Offset-to-page mapping for citation provenance
//! - LLM-assisted section outline and document metadata extraction
//! - The indexer (chunk → embed → atomically replace)
//! - Two-stage retrieval (vector recall + LLM reranking)
//! - The answer composer (grounded prompt + structured citation parsing)
//!
//! Everything here talks to the outside world through the `nexus-core`
//! traits (`EmbeddingBackend`, `GenerationBackend`, `ChunkStore`), so each
//! stage is unit-testable with injected fakes. `MemoryChunkStore` is a
//! reference in-memory store used by the test suites.

pub mod answer;
pub mod chunker;
pub mod indexer;
pub mod memory_store;
pub mod metadata;
pub mod pages;
pub mod retriever;
pub mod sections;

// Re-export core types
pub use nexus_core::*;

pub use answer::{AnswerComposer, NO_CONTEXT_ANSWER};
pub use chunker::{chunk_text, ChunkerConfig};
pub use indexer::Indexer;
pub use memory_store::MemoryChunkStore;
pub use metadata::extract_doc_metadata;
pub use pages::{map_offset_to_page, page_range_for_span};
pub use retriever::{RetrievalRequest, Retriever};
pub use sections::parse_sections;
