//! Embedding provider abstraction.
//!
//! The embedding space is asymmetric: a short question and a long
//! narrative passage are encoded to be comparable under a declared
//! [`EmbedIntent`], not under plain text similarity.  Implementations
//! must therefore preserve the distinction between query text and stored
//! content.
//!
//! The production implementation lives in `reverie-llm` (remote HTTP
//! provider); the providers here are deterministic test doubles.

use crate::error::Result;
use crate::types::Embedding;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Declared purpose of an embedding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedIntent {
    /// Encoding a search query.
    Query,
    /// Encoding stored content.
    Document,
}

/// Generate vector embeddings from text.
///
/// The embed future is `Send` so callers can run providers from spawned
/// tasks; implementations write a plain `async fn` and the bound is
/// checked at the impl.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string with the given intent.
    ///
    /// Returns a vector of `dimensions()` floats.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::MemoryError::Embedding`] if the provider
    /// is unreachable or returns a malformed response.
    fn embed(
        &self,
        text: &str,
        intent: EmbedIntent,
    ) -> impl Future<Output = Result<Embedding>> + Send;

    /// The dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A human-readable name for the model.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Hash provider (deterministic, for tests)
// ---------------------------------------------------------------------------

/// A deterministic provider that hashes whitespace tokens into a unit
/// vector.  Identical texts map to identical vectors regardless of
/// intent, so index round-trips are exact; different texts scatter.
pub struct HashEmbeddingProvider {
    dims: usize,
}

impl HashEmbeddingProvider {
    /// Create a new hash provider with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str, _intent: EmbedIntent) -> Result<Embedding> {
        let mut raw = vec![0.0_f32; self.dims];
        for token in text.split_whitespace() {
            // FNV-1a over the token bytes.
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in token.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
            }
            let bucket = (hash as usize) % self.dims;
            let sign = if hash & 1 == 0 { 1.0 } else { -1.0 };
            raw[bucket] += sign;
        }

        let mag: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag >= f32::EPSILON {
            for value in &mut raw {
                *value /= mag;
            }
        }
        Ok(Embedding(raw))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "hash-token-bucket"
    }
}

// ---------------------------------------------------------------------------
// Random provider (diverse vectors, for integration tests)
// ---------------------------------------------------------------------------

/// A provider that returns random unit-length vectors — non-zero and
/// diverse without a real model behind them.
pub struct RandomEmbeddingProvider {
    dims: usize,
}

impl RandomEmbeddingProvider {
    /// Create a new random provider.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

impl EmbeddingProvider for RandomEmbeddingProvider {
    async fn embed(&self, _text: &str, _intent: EmbedIntent) -> Result<Embedding> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let raw: Vec<f32> = (0..self.dims).map(|_| rng.gen_range(-1.0..1.0)).collect();

        let mag: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag < f32::EPSILON {
            return Ok(Embedding(vec![0.0; self.dims]));
        }
        Ok(Embedding(raw.iter().map(|x| x / mag).collect()))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "random-unit-vector"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
