//! Generative-language API client for reverie.
//!
//! Wraps the `generateContent` and `embedContent` endpoints behind
//! small typed surfaces: [`GenAiClient`] for narration and tool
//! calling, [`RemoteEmbeddingProvider`] for vectorising text into
//! the memory index.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod embedding;
pub mod error;
pub mod types;

pub use client::GenAiClient;
pub use embedding::RemoteEmbeddingProvider;
pub use error::LlmError;
pub use types::{
    Content, FunctionCall, FunctionResponse, GenerateResponse, Part, ToolDeclaration,
};
