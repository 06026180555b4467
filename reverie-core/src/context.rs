//! Context manager — the single entry point for creating long-term
//! memories.
//!
//! `add_entry` embeds the content with document intent, assembles the
//! full record, and delegates to the vector index.  Under the default
//! [`WritePolicy::BestEffort`] any failure along that path is logged and
//! swallowed: losing one memory write must never stall the story.  There
//! is no transactional link between embedding and persistence, and no
//! retry — a write that fails after a successful embed is simply lost
//! (with a logged error).

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::embedding::{EmbedIntent, EmbeddingProvider};
use crate::error::Result;
use crate::index::{AppendOutcome, VectorIndex};
use crate::types::{MemoryEntry, MemoryMetadata, MemoryRole};

/// How write-path failures are surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WritePolicy {
    /// Log the failure and continue; the caller sees `Ok(())`.
    #[default]
    BestEffort,
    /// Propagate embedding and persistence failures.
    Strict,
}

/// Write path of the memory layer.
pub struct ContextManager<P> {
    provider: Arc<P>,
    index: Arc<VectorIndex>,
    policy: WritePolicy,
}

impl<P> Clone for ContextManager<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            index: Arc::clone(&self.index),
            policy: self.policy,
        }
    }
}

impl<P: EmbeddingProvider> ContextManager<P> {
    /// Create a new write path over a shared index.
    #[must_use]
    pub fn new(provider: Arc<P>, index: Arc<VectorIndex>, policy: WritePolicy) -> Self {
        Self {
            provider,
            index,
            policy,
        }
    }

    /// The shared vector index.
    #[must_use]
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Create and persist one long-term memory entry.
    ///
    /// Generates the document embedding for `content`, assembles the
    /// full entry with a fresh ID and the current wall-clock timestamp,
    /// and appends it to the index.
    ///
    /// # Errors
    ///
    /// Under [`WritePolicy::BestEffort`] this only logs failures and
    /// returns `Ok(())`.  Under [`WritePolicy::Strict`] embedding and
    /// persistence errors propagate.
    pub async fn add_entry(
        &self,
        role: MemoryRole,
        content: &str,
        turn: u64,
        metadata: MemoryMetadata,
    ) -> Result<()> {
        match self.try_add(role, content, turn, metadata).await {
            Ok(AppendOutcome::Stored) => Ok(()),
            Ok(AppendOutcome::Discarded { expected, got }) => {
                // The index already warned; the discard is visible here
                // only so strict callers could act on it later.
                debug!(expected, got, "Memory entry discarded by the index");
                Ok(())
            }
            Err(e) => match self.policy {
                WritePolicy::BestEffort => {
                    error!(turn, error = %e, "Failed to store memory entry; continuing");
                    Ok(())
                }
                WritePolicy::Strict => Err(e),
            },
        }
    }

    async fn try_add(
        &self,
        role: MemoryRole,
        content: &str,
        turn: u64,
        metadata: MemoryMetadata,
    ) -> Result<AppendOutcome> {
        let embedding = self.provider.embed(content, EmbedIntent::Document).await?;
        let entry = MemoryEntry::new(role, content, turn, metadata, embedding);
        let outcome = self.index.append(&entry)?;
        if outcome.is_stored() {
            debug!(id = %entry.id, turn, "Stored memory entry");
        } else {
            warn!(turn, "Memory entry not persisted");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingProvider;
    use crate::error::MemoryError;
    use crate::index::{DimensionPolicy, SearchFilters};
    use crate::types::Embedding;

    struct FailingProvider;

    impl EmbeddingProvider for FailingProvider {
        async fn embed(&self, _text: &str, _intent: EmbedIntent) -> Result<Embedding> {
            Err(MemoryError::Embedding("provider down".into()))
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn fresh_index() -> Arc<VectorIndex> {
        Arc::new(VectorIndex::open_in_memory("session", DimensionPolicy::Discard).expect("open"))
    }

    #[tokio::test]
    async fn add_entry_persists_a_searchable_record() {
        let provider = Arc::new(HashEmbeddingProvider::new(32));
        let index = fresh_index();
        let manager =
            ContextManager::new(Arc::clone(&provider), Arc::clone(&index), WritePolicy::BestEffort);

        manager
            .add_entry(
                MemoryRole::Narrator,
                "the bridge collapsed at dusk",
                7,
                MemoryMetadata::narration(),
            )
            .await
            .expect("add");

        assert_eq!(index.len().expect("len"), 1);
        let vector = provider
            .embed("the bridge collapsed at dusk", EmbedIntent::Query)
            .await
            .expect("embed");
        let results = index.search(&vector, 5, &SearchFilters::none()).expect("search");
        assert_eq!(results[0].entry.turn, 7);
        assert_eq!(results[0].entry.role, MemoryRole::Narrator);
    }

    #[tokio::test]
    async fn best_effort_swallows_embedding_failure() {
        let index = fresh_index();
        let manager =
            ContextManager::new(Arc::new(FailingProvider), Arc::clone(&index), WritePolicy::BestEffort);

        manager
            .add_entry(MemoryRole::System, "lost to the void", 1, MemoryMetadata::narration())
            .await
            .expect("best-effort must not error");
        assert_eq!(index.len().expect("len"), 0, "nothing was persisted");
    }

    #[tokio::test]
    async fn strict_propagates_embedding_failure() {
        let manager =
            ContextManager::new(Arc::new(FailingProvider), fresh_index(), WritePolicy::Strict);

        let err = manager
            .add_entry(MemoryRole::System, "lost", 1, MemoryMetadata::narration())
            .await
            .expect_err("strict must propagate");
        assert!(matches!(err, MemoryError::Embedding(_)));
    }
}
