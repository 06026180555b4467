//! Callable tools the generation model can invoke mid-turn.
//!
//! Two tools are advertised: `save_memory` writes a structured entry
//! through the context manager, `recall_memory` runs a filtered
//! semantic search.  Dispatch never fails: every outcome, including an
//! unknown tool name or malformed arguments, comes back as a
//! `{success, ...}` JSON payload so the model can react to it in-story.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use reverie_core::context::ContextManager;
use reverie_core::embedding::EmbeddingProvider;
use reverie_core::index::{ScoredEntry, SearchFilters};
use reverie_core::search::SemanticSearch;
use reverie_core::types::{MemoryCategory, MemoryMetadata, MemoryRole};
use reverie_llm::types::{FunctionCall, ToolDeclaration};

/// Tool name for the explicit memory write.
pub const SAVE_MEMORY: &str = "save_memory";
/// Tool name for the filtered memory search.
pub const RECALL_MEMORY: &str = "recall_memory";

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// The tool declarations advertised on every generation call.
#[must_use]
pub fn declarations() -> Vec<ToolDeclaration> {
    vec![
        ToolDeclaration {
            name: SAVE_MEMORY.to_string(),
            description: "Save an important fact, event, description or concept to \
                          long-term memory so it can be recalled in later scenes."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "content": {
                        "type": "string",
                        "description": "The full text of the memory to store."
                    },
                    "category": {
                        "type": "string",
                        "enum": ["narration", "event", "description", "concept"],
                        "description": "What kind of memory this is."
                    },
                    "important_fact": {
                        "type": "boolean",
                        "description": "True if this fact is crucial to the plot."
                    },
                    "fact_summary": {
                        "type": "string",
                        "description": "One-line summary of the crucial fact."
                    },
                    "npc": {
                        "type": "string",
                        "description": "Name of the principal NPC involved."
                    },
                    "location": {
                        "type": "string",
                        "description": "Where the memory takes place."
                    },
                    "present_characters": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Names of the characters present in the scene."
                    }
                },
                "required": ["content", "category"]
            }),
        },
        ToolDeclaration {
            name: RECALL_MEMORY.to_string(),
            description: "Search long-term memory for entries relevant to a natural \
                          language query, optionally narrowed by structured filters."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to search for."
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of entries to return."
                    },
                    "category": {
                        "type": "string",
                        "enum": ["narration", "event", "description", "concept"]
                    },
                    "npc": { "type": "string" },
                    "location": { "type": "string" },
                    "important_fact": { "type": "boolean" },
                    "turn_min": {
                        "type": "integer",
                        "description": "Earliest game turn to include (inclusive)."
                    },
                    "turn_max": {
                        "type": "integer",
                        "description": "Latest game turn to include (inclusive)."
                    }
                },
                "required": ["query"]
            }),
        },
    ]
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SaveMemoryArgs {
    content: String,
    category: String,
    #[serde(default)]
    important_fact: bool,
    #[serde(default)]
    fact_summary: Option<String>,
    #[serde(default)]
    npc: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    present_characters: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RecallMemoryArgs {
    query: String,
    #[serde(default)]
    max_results: Option<usize>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    npc: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    important_fact: Option<bool>,
    #[serde(default)]
    turn_min: Option<u64>,
    #[serde(default)]
    turn_max: Option<u64>,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Executes tool calls against the shared memory layer.
pub struct GameTools<P> {
    context: ContextManager<P>,
    search: SemanticSearch<P>,
    default_max_results: usize,
}

impl<P> Clone for GameTools<P> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            search: self.search.clone(),
            default_max_results: self.default_max_results,
        }
    }
}

impl<P: EmbeddingProvider> GameTools<P> {
    /// Create a new tool executor over shared read and write paths.
    #[must_use]
    pub fn new(
        context: ContextManager<P>,
        search: SemanticSearch<P>,
        default_max_results: usize,
    ) -> Self {
        Self {
            context,
            search,
            default_max_results,
        }
    }

    /// The write path, for narration saves outside of tool dispatch.
    #[must_use]
    pub fn context(&self) -> &ContextManager<P> {
        &self.context
    }

    /// The read path, for pre-turn retrieval outside of tool dispatch.
    #[must_use]
    pub fn search(&self) -> &SemanticSearch<P> {
        &self.search
    }

    /// Execute one tool call at the given game turn.
    ///
    /// Infallible by contract: errors, unknown tool names, and bad
    /// arguments all come back as `{"success": false, ...}` payloads.
    pub async fn dispatch(&self, call: &FunctionCall, turn: u64) -> Value {
        match call.name.as_str() {
            SAVE_MEMORY => self.save_memory(call.args.clone(), turn).await,
            RECALL_MEMORY => self.recall_memory(call.args.clone()).await,
            other => {
                warn!(tool = other, "Model requested an unknown tool");
                json!({
                    "success": false,
                    "message": format!("unknown tool '{other}'"),
                })
            }
        }
    }

    async fn save_memory(&self, args: Value, turn: u64) -> Value {
        let args: SaveMemoryArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return bad_args(SAVE_MEMORY, &e),
        };
        let category = match MemoryCategory::parse(&args.category) {
            Ok(category) => category,
            Err(e) => return bad_args(SAVE_MEMORY, &e),
        };

        let metadata = MemoryMetadata {
            category,
            important_fact: args.important_fact,
            fact_summary: args.fact_summary,
            npc: args.npc,
            location: args.location,
            present_characters: args.present_characters,
        };

        match self
            .context
            .add_entry(MemoryRole::System, &args.content, turn, metadata)
            .await
        {
            Ok(()) => {
                info!(turn, category = %category, "Tool saved a memory entry");
                json!({ "success": true, "message": "memory saved" })
            }
            Err(e) => {
                warn!(turn, error = %e, "Tool memory save failed");
                json!({ "success": false, "message": e.to_string() })
            }
        }
    }

    async fn recall_memory(&self, args: Value) -> Value {
        let args: RecallMemoryArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return bad_args(RECALL_MEMORY, &e),
        };

        let mut filters = SearchFilters::none();
        if let Some(raw) = &args.category {
            match MemoryCategory::parse(raw) {
                Ok(category) => filters = filters.with_category(category),
                Err(e) => return bad_args(RECALL_MEMORY, &e),
            }
        }
        if let Some(npc) = args.npc {
            filters = filters.with_npc(npc);
        }
        if let Some(location) = args.location {
            filters = filters.with_location(location);
        }
        if let Some(important) = args.important_fact {
            filters = filters.with_important_fact(important);
        }
        if args.turn_min.is_some() || args.turn_max.is_some() {
            filters = filters.with_turn_range(args.turn_min, args.turn_max);
        }

        let limit = args.max_results.unwrap_or(self.default_max_results);
        match self.search.search(&args.query, limit, &filters).await {
            Ok(results) => json!({
                "success": true,
                "entries": results.iter().map(entry_payload).collect::<Vec<_>>(),
            }),
            Err(e) => {
                warn!(error = %e, "Tool memory recall failed");
                json!({ "success": false, "message": e.to_string() })
            }
        }
    }
}

fn bad_args(tool: &str, error: &dyn std::fmt::Display) -> Value {
    warn!(tool, %error, "Rejected malformed tool arguments");
    json!({
        "success": false,
        "message": format!("invalid arguments for '{tool}': {error}"),
    })
}

/// Flatten one scored entry into the payload shape fed back to the model.
fn entry_payload(scored: &ScoredEntry) -> Value {
    let entry = &scored.entry;
    json!({
        "content": entry.content,
        "category": entry.metadata.category.as_str(),
        "turn": entry.turn,
        "important_fact": entry.metadata.important_fact,
        "fact_summary": entry.metadata.fact_summary,
        "npc": entry.metadata.npc,
        "location": entry.metadata.location,
        "present_characters": entry.metadata.present_characters,
        "distance": scored.distance,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use reverie_core::context::WritePolicy;
    use reverie_core::embedding::HashEmbeddingProvider;
    use reverie_core::index::{DimensionPolicy, VectorIndex};

    fn tools() -> Arc<GameTools<HashEmbeddingProvider>> {
        let provider = Arc::new(HashEmbeddingProvider::new(32));
        let index = Arc::new(
            VectorIndex::open_in_memory("session", DimensionPolicy::Discard).expect("open"),
        );
        let context = ContextManager::new(
            Arc::clone(&provider),
            Arc::clone(&index),
            WritePolicy::BestEffort,
        );
        let search = SemanticSearch::new(provider, index);
        Arc::new(GameTools::new(context, search, 5))
    }

    fn call(name: &str, args: Value) -> FunctionCall {
        FunctionCall {
            name: name.to_string(),
            args,
        }
    }

    #[tokio::test]
    async fn save_then_recall_round_trips() {
        let tools = tools();

        let saved = tools
            .dispatch(
                &call(
                    SAVE_MEMORY,
                    json!({
                        "content": "Mara buried the signet ring under the old oak",
                        "category": "event",
                        "important_fact": true,
                        "fact_summary": "ring buried under oak",
                        "npc": "Mara",
                        "location": "old oak",
                    }),
                ),
                3,
            )
            .await;
        assert_eq!(saved["success"], json!(true));

        let recalled = tools
            .dispatch(
                &call(
                    RECALL_MEMORY,
                    json!({
                        "query": "Mara buried the signet ring under the old oak",
                        "npc": "Mara",
                    }),
                ),
                4,
            )
            .await;
        assert_eq!(recalled["success"], json!(true));
        let entries = recalled["entries"].as_array().expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["npc"], json!("Mara"));
        assert_eq!(entries[0]["turn"], json!(3));
        assert_eq!(entries[0]["important_fact"], json!(true));
    }

    #[tokio::test]
    async fn recall_filters_exclude_other_categories() {
        let tools = tools();
        tools
            .dispatch(
                &call(
                    SAVE_MEMORY,
                    json!({ "content": "the mill burned down", "category": "event" }),
                ),
                1,
            )
            .await;
        tools
            .dispatch(
                &call(
                    SAVE_MEMORY,
                    json!({ "content": "the mill is made of red brick", "category": "description" }),
                ),
                1,
            )
            .await;

        let recalled = tools
            .dispatch(
                &call(
                    RECALL_MEMORY,
                    json!({ "query": "the mill", "category": "event" }),
                ),
                2,
            )
            .await;
        let entries = recalled["entries"].as_array().expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["category"], json!("event"));
    }

    #[tokio::test]
    async fn unknown_tool_degrades_to_a_payload() {
        let tools = tools();
        let payload = tools.dispatch(&call("roll_dice", json!({})), 1).await;
        assert_eq!(payload["success"], json!(false));
        assert!(
            payload["message"]
                .as_str()
                .expect("message")
                .contains("roll_dice")
        );
    }

    #[tokio::test]
    async fn malformed_arguments_degrade_to_a_payload() {
        let tools = tools();

        // Missing required "content".
        let payload = tools
            .dispatch(&call(SAVE_MEMORY, json!({ "category": "event" })), 1)
            .await;
        assert_eq!(payload["success"], json!(false));

        // Unknown category string.
        let payload = tools
            .dispatch(
                &call(SAVE_MEMORY, json!({ "content": "x", "category": "ballad" })),
                1,
            )
            .await;
        assert_eq!(payload["success"], json!(false));
    }

    #[test]
    fn declarations_cover_both_tools() {
        let decls = declarations();
        let names: Vec<&str> = decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec![SAVE_MEMORY, RECALL_MEMORY]);
        for decl in &decls {
            assert_eq!(decl.parameters["type"], json!("object"));
        }
    }
}
