//! Summarizer Client (C6) and Embedding Hook (C7), spec.md §4.6–§4.7.

pub mod embedder;
pub mod error;
pub mod summarizer;

pub use embedder::{EmbedObserver, Embedder, EmbeddingHook, EmbeddingMetrics};
pub use error::{SummarizeError, SummarizeResult};
pub use summarizer::{AiClientSummarizer, Summarizer};
