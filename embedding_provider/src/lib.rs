//! Embedding service contract and its implementations.

pub mod config;
pub mod embedder;

pub use embedder::{Embedder, EmbedderError, EmbedderInfo, ProviderKind};
