//! Semantic search — natural-language query plus domain filters in,
//! ranked memory entries out.
//!
//! Composes an [`EmbeddingProvider`] with a [`VectorIndex`]: the query is
//! embedded with [`EmbedIntent::Query`] (the index stores document-intent
//! vectors, and the asymmetry matters), then handed to the index's
//! filtered nearest-neighbor search.

use std::sync::Arc;

use tracing::{debug, info};

use crate::embedding::{EmbedIntent, EmbeddingProvider};
use crate::error::Result;
use crate::index::{ScoredEntry, SearchFilters, VectorIndex};

/// Read path of the memory layer.
pub struct SemanticSearch<P> {
    provider: Arc<P>,
    index: Arc<VectorIndex>,
}

impl<P> Clone for SemanticSearch<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            index: Arc::clone(&self.index),
        }
    }
}

impl<P: EmbeddingProvider> SemanticSearch<P> {
    /// Create a new search layer over a shared index.
    #[must_use]
    pub fn new(provider: Arc<P>, index: Arc<VectorIndex>) -> Self {
        Self { provider, index }
    }

    /// The shared vector index.
    #[must_use]
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// The embedding provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Search long-term memory for entries relevant to `query`.
    ///
    /// An empty query short-circuits to an empty result without invoking
    /// the embedding provider — that is an explicit fast path, not an
    /// error.  Embedding failure aborts the whole search; there are no
    /// partial results.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Embedding`] if the query cannot be
    /// embedded, or [`MemoryError::Search`] on backing-store failure.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredEntry>> {
        if query.is_empty() {
            debug!("Empty query; skipping embedding and index lookup");
            return Ok(Vec::new());
        }

        let query_embedding = self.provider.embed(query, EmbedIntent::Query).await?;

        let results = self.index.search(&query_embedding, limit, filters)?;
        info!(
            query,
            limit,
            found = results.len(),
            "Semantic search completed"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingProvider;
    use crate::error::MemoryError;
    use crate::index::DimensionPolicy;
    use crate::types::{Embedding, MemoryEntry, MemoryMetadata, MemoryRole};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls; used to prove the empty-query short-circuit.
    struct CountingProvider {
        calls: AtomicUsize,
    }

    impl EmbeddingProvider for CountingProvider {
        async fn embed(&self, _text: &str, _intent: EmbedIntent) -> Result<Embedding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Embedding(vec![1.0, 0.0]))
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    /// Always fails; used to prove embedding failure aborts the search.
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
    async fn empty_query_short_circuits_without_embedding() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let search = SemanticSearch::new(Arc::clone(&provider), fresh_index());

        let results = search.search("", 5, &SearchFilters::none()).await.expect("search");
        assert!(results.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0, "provider must not be invoked");
    }

    #[tokio::test]
    async fn embedding_failure_aborts_search() {
        let search = SemanticSearch::new(Arc::new(FailingProvider), fresh_index());
        let err = search
            .search("what happened at the mill", 5, &SearchFilters::none())
            .await
            .expect_err("should fail");
        assert!(matches!(err, MemoryError::Embedding(_)));
    }

    #[tokio::test]
    async fn query_finds_stored_content() {
        let provider = Arc::new(HashEmbeddingProvider::new(32));
        let index = fresh_index();

        let embedding = provider
            .embed("the blacksmith hid a key", EmbedIntent::Document)
            .await
            .expect("embed");
        index
            .append(&MemoryEntry::new(
                MemoryRole::System,
                "the blacksmith hid a key",
                1,
                MemoryMetadata::narration(),
                embedding,
            ))
            .expect("append");

        let search = SemanticSearch::new(provider, index);
        let results = search
            .search("the blacksmith hid a key", 3, &SearchFilters::none())
            .await
            .expect("search");
        assert_eq!(results.len(), 1);
        assert!(results[0].distance < 1e-5, "identical text should be distance ~0");
    }
}
