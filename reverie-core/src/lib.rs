//! # Reverie Core Library
//!
//! Semantic long-term memory for AI-driven narrative games.
//!
//! The store combines an embedding-backed similarity index with
//! structured-metadata filtering, plus the orchestration that turns
//! tagged narration into indexed, queryable entries:
//!
//! - [`index::VectorIndex`] — append-only, lazily-schematized collection
//!   of memory records with filtered nearest-neighbor search
//! - [`search::SemanticSearch`] — query text + domain filters in, ranked
//!   entries out (the read path)
//! - [`context::ContextManager`] — role/content/turn/tags in, persisted
//!   entry out (the write path)
//! - [`window::ConversationWindow`] — the bounded short-term transcript,
//!   kept separate from the unbounded long-term index
//!
//! Embeddings come from an [`embedding::EmbeddingProvider`]; the
//! production HTTP provider lives in `reverie-llm`.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod index;
pub mod search;
pub mod types;
pub mod window;

pub use config::ReverieConfig;
pub use context::{ContextManager, WritePolicy};
pub use embedding::{EmbedIntent, EmbeddingProvider};
pub use error::{MemoryError, Result};
pub use index::{AppendOutcome, DimensionPolicy, ScoredEntry, SearchFilters, VectorIndex};
pub use search::SemanticSearch;
pub use types::*;
pub use window::ConversationWindow;
