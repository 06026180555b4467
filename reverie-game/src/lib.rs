//! Narrative game loop wired to the reverie memory layer.
//!
//! Glue between `reverie-core` (memory) and `reverie-llm` (generation):
//! the callable-tool registry and the per-session turn pipeline.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod session;
pub mod tools;

pub use session::{GameSession, GameUpdate, SessionError};
pub use tools::GameTools;
