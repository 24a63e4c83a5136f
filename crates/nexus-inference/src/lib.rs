//! # nexus-inference
//!
//! Embedding and generation backends for the nexus research assistant.
//!
//! This crate provides:
//! - An OpenAI-compatible HTTP backend implementing the `EmbeddingBackend`
//!   and `GenerationBackend` traits from `nexus-core`
//! - A deterministic mock backend (feature `mock`) for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use nexus_inference::OpenAIBackend;
//! use nexus_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::from_env();
//!     let texts = vec!["Hello".to_string()];
//!     let embeddings = backend.embed_texts(&texts).await.unwrap();
//!     assert_eq!(embeddings.len(), 1);
//! }
//! ```

pub mod openai;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use nexus_core::*;

pub use openai::{OpenAIBackend, OpenAIConfig};

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockEmbeddingGenerator, MockInferenceBackend};
