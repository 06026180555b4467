//! Core type definitions for the Reverie memory system.
//!
//! A [`MemoryEntry`] is the unit of long-term memory: narrative text plus
//! flattened structured tags and a fixed-length embedding vector.  A
//! [`ConversationTurn`] is the unit of the short-term transcript and is
//! never persisted to the vector index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{MemoryError, Result};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Unique identifier for a long-term memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Create a new random memory ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Roles & categories
// ---------------------------------------------------------------------------

/// Who authored a long-term memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryRole {
    /// The game master's narration.
    Narrator,
    /// System-authored entries (tool-initiated facts, lore).
    System,
}

impl MemoryRole {
    /// Stable string form used in the database column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Narrator => "narrator",
            Self::System => "system",
        }
    }

    /// Parse the database column form back into a role.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Serialization`] for an unknown role string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "narrator" => Ok(Self::Narrator),
            "system" => Ok(Self::System),
            other => Err(MemoryError::Serialization(format!(
                "unknown memory role '{other}'"
            ))),
        }
    }
}

impl fmt::Display for MemoryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The narrative category of a memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    /// Dialogue and played-out actions.
    Narration,
    /// A concrete fact that happened.
    Event,
    /// Details of a place, NPC, or object.
    Description,
    /// Lore, world rules, abstract relations.
    Concept,
}

impl MemoryCategory {
    /// Stable string form used in the database column and tool payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Narration => "narration",
            Self::Event => "event",
            Self::Description => "description",
            Self::Concept => "concept",
        }
    }

    /// Parse the string form back into a category.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Serialization`] for an unknown category.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "narration" => Ok(Self::Narration),
            "event" => Ok(Self::Event),
            "description" => Ok(Self::Description),
            "concept" => Ok(Self::Concept),
            other => Err(MemoryError::Serialization(format!(
                "unknown memory category '{other}'"
            ))),
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Embedding vector
// ---------------------------------------------------------------------------

/// A dense vector embedding for semantic similarity search.
///
/// Dimensionality is fixed per collection by the first entry ever stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Dimensionality of the embedding.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Cosine similarity to `other`, in \[-1.0, 1.0\].
    ///
    /// Returns `0.0` for mismatched dimensions or zero-magnitude vectors.
    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        if self.0.len() != other.0.len() || self.0.is_empty() {
            return 0.0;
        }
        let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom < f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    /// Cosine distance to `other` (`1.0 - cosine_similarity`), clamped to
    /// be non-negative.  `0.0` means identical direction.
    #[must_use]
    pub fn cosine_distance(&self, other: &Self) -> f32 {
        (1.0 - self.cosine_similarity(other)).max(0.0)
    }
}

// ---------------------------------------------------------------------------
// Memory metadata & entry
// ---------------------------------------------------------------------------

/// Structured tags attached to a memory entry.
///
/// Optional fields default to absent — never the empty string — so
/// exact-match filters can distinguish "unset" from "set to empty".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    /// Narrative category of the entry.
    pub category: MemoryCategory,
    /// Whether this entry records a fact crucial to the plot.
    #[serde(default)]
    pub important_fact: bool,
    /// Short summary of the fact; meaningful only when `important_fact`.
    #[serde(default)]
    pub fact_summary: Option<String>,
    /// Name of the principal NPC involved, if any.
    #[serde(default)]
    pub npc: Option<String>,
    /// Name of the location the memory occurred at, if any.
    #[serde(default)]
    pub location: Option<String>,
    /// Ordered names of the characters present in the scene.
    #[serde(default)]
    pub present_characters: Vec<String>,
}

impl MemoryMetadata {
    /// Minimal metadata for an automatic narration save.
    #[must_use]
    pub fn narration() -> Self {
        Self {
            category: MemoryCategory::Narration,
            important_fact: false,
            fact_summary: None,
            npc: None,
            location: None,
            present_characters: Vec::new(),
        }
    }

    /// Metadata with only a category set.
    #[must_use]
    pub fn with_category(category: MemoryCategory) -> Self {
        Self {
            category,
            ..Self::narration()
        }
    }
}

/// The unit of long-term memory.
///
/// Entries are immutable and append-only: the index has no update or
/// delete operation, so a stored entry is permanent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique entry identifier.
    pub id: MemoryId,
    /// Who authored the entry.
    pub role: MemoryRole,
    /// The full memory text.
    pub content: String,
    /// Wall-clock creation instant.
    pub timestamp: DateTime<Utc>,
    /// Game turn at which the memory was created.  Non-decreasing within
    /// a session, but not unique.
    pub turn: u64,
    /// Flattened structured tags.
    pub metadata: MemoryMetadata,
    /// Document embedding of `content`.
    pub embedding: Embedding,
}

impl MemoryEntry {
    /// Assemble a new entry stamped with the current wall-clock time.
    #[must_use]
    pub fn new(
        role: MemoryRole,
        content: impl Into<String>,
        turn: u64,
        metadata: MemoryMetadata,
        embedding: Embedding,
    ) -> Self {
        Self {
            id: MemoryId::new(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            turn,
            metadata,
            embedding,
        }
    }
}

// ---------------------------------------------------------------------------
// Short-term transcript
// ---------------------------------------------------------------------------

/// Who spoke a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The player's input.
    Player,
    /// The game master's reply.
    Narrator,
}

/// One turn of the short-term transcript.
///
/// Transient: lives only in a [`crate::window::ConversationWindow`] and is
/// evicted by its pruning policy.  Unrelated to [`MemoryEntry`] identity
/// even when the same narration text is also persisted long-term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who spoke.
    pub speaker: Speaker,
    /// What was said.
    pub text: String,
    /// Game turn of the exchange.
    pub turn: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
