//! Configuration for the Reverie memory system.
//!
//! Maps directly to `reverie.toml`.  Every field has a serde default so a
//! partial (or missing) file still yields a working configuration.

use serde::{Deserialize, Serialize};

use crate::context::WritePolicy;
use crate::index::DimensionPolicy;

/// Top-level Reverie configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReverieConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Long-term memory store settings.
    #[serde(default)]
    pub memory: MemoryStoreConfig,
    /// Semantic retrieval settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Short-term transcript window settings.
    #[serde(default)]
    pub window: WindowConfig,
    /// Generation / embedding service settings.
    #[serde(default)]
    pub llm: LlmConfig,
}

impl ReverieConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`crate::MemoryError::Config`] if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::MemoryError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log filter directive (e.g. "info", "reverie_core=debug").
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Long-term memory store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStoreConfig {
    /// Collection (campaign) name; one SQLite table per collection.
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// What to do on an embedding dimension mismatch.
    #[serde(default)]
    pub dimension_policy: DimensionPolicy,
    /// How write-path failures are surfaced.
    #[serde(default)]
    pub write_policy: WritePolicy,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            db_path: default_db_path(),
            dimension_policy: DimensionPolicy::default(),
            write_policy: WritePolicy::default(),
        }
    }
}

/// Semantic retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default number of entries returned per search.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
        }
    }
}

/// Short-term transcript window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Exchanges retained in the transcript (1 = most recent round-trip).
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

/// Generation / embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the generative-language API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Generation model name.
    #[serde(default = "default_generation_model")]
    pub generation_model: String,
    /// Embedding model name.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Expected embedding dimensionality.
    #[serde(default = "default_dimensions")]
    pub embedding_dimensions: usize,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries per HTTP call before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            generation_model: default_generation_model(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_dimensions(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_log_level() -> String {
    "info".to_string()
}

fn default_collection() -> String {
    "campaign".to_string()
}

fn default_db_path() -> String {
    "reverie.db".to_string()
}

fn default_max_results() -> usize {
    5
}

fn default_max_rounds() -> usize {
    1
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_generation_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_embedding_model() -> String {
    "gemini-embedding-001".to_string()
}

fn default_dimensions() -> usize {
    3072
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    2
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
