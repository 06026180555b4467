//! Per-session turn pipeline.
//!
//! Each player input runs one pass through the pipeline: retrieve
//! related long-term memories, build the prompt from the short-term
//! window plus a memory preamble, call the generation service, execute
//! any requested tools concurrently (results are fanned back in request
//! order), obtain the final narration, persist it as a long-term memory,
//! and advance the window.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use reverie_core::context::ContextManager;
use reverie_core::embedding::EmbeddingProvider;
use reverie_core::error::MemoryError;
use reverie_core::index::{ScoredEntry, SearchFilters};
use reverie_core::types::{ConversationTurn, MemoryMetadata, MemoryRole, Speaker};
use reverie_core::window::ConversationWindow;
use reverie_llm::client::GenAiClient;
use reverie_llm::error::LlmError;
use reverie_llm::types::{Content, FunctionCall, GenerateResponse, ToolDeclaration};

use crate::tools::{self, GameTools};

/// Spoken when the model returns neither text nor tool calls.
const SILENT_NARRATOR_FALLBACK: &str =
    "The narrator pauses, gathering the threads of the story.";

const NARRATOR_INSTRUCTION: &str = "You are the narrator of an ongoing interactive story. \
    Continue the scene from the player's input. Use the provided memory context for \
    continuity, call save_memory when something worth remembering happens, and call \
    recall_memory when you need details from earlier in the story.";

/// Errors the turn pipeline can surface.
///
/// Narration writes never appear here regardless of write policy; only
/// retrieval and generation failures stop a turn.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Pre-turn memory retrieval failed.
    #[error("memory retrieval failed: {0}")]
    Memory(#[from] MemoryError),
    /// The generation service failed.
    #[error("generation failed: {0}")]
    Generation(#[from] LlmError),
}

/// What one completed turn produced, for rendering by the caller.
#[derive(Debug)]
pub struct GameUpdate {
    /// The player's input verbatim.
    pub player_input: String,
    /// The final narration for this turn.
    pub narrator_response: String,
    /// Long-term memories retrieved for the player input.
    pub memory_results: Vec<ScoredEntry>,
    /// The retained short-term transcript after this turn.
    pub transcript: Vec<ConversationTurn>,
    /// The turn number just played.
    pub turn: u64,
}

/// One player's running game, sharing the memory layer with its tools.
pub struct GameSession<P> {
    client: Arc<GenAiClient>,
    tools: Arc<GameTools<P>>,
    declarations: Vec<ToolDeclaration>,
    window: ConversationWindow,
    max_results: usize,
    turn: u64,
}

impl<P: EmbeddingProvider + 'static> GameSession<P> {
    /// Create a session starting at turn zero with an empty window.
    #[must_use]
    pub fn new(
        client: Arc<GenAiClient>,
        tools: Arc<GameTools<P>>,
        max_rounds: usize,
        max_results: usize,
    ) -> Self {
        Self {
            client,
            tools,
            declarations: tools::declarations(),
            window: ConversationWindow::new(max_rounds),
            max_results,
            turn: 0,
        }
    }

    /// The turn counter; the number of exchanges played so far.
    #[must_use]
    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// Play one full turn from the player's input.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Memory`] if pre-turn retrieval fails and
    /// [`SessionError::Generation`] if the generation service fails.
    /// The turn counter only advances on success.
    pub async fn play_turn(&mut self, player_input: &str) -> Result<GameUpdate, SessionError> {
        let turn = self.turn + 1;

        let memory_results = self
            .tools
            .search()
            .search(player_input, self.max_results, &SearchFilters::none())
            .await?;
        debug!(turn, recalled = memory_results.len(), "Pre-turn retrieval done");

        let mut transcript = self.base_transcript();
        transcript.push(Content::user(player_message(player_input, &memory_results)));

        let mut response = self
            .client
            .generate(&transcript, &self.declarations, Some(NARRATOR_INSTRUCTION))
            .await?;

        if response.wants_tools() {
            response = self
                .run_tool_round(&mut transcript, response, turn)
                .await?;
        }

        let narration = response
            .text
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| {
                warn!(turn, "Model produced no narration text; using fallback");
                SILENT_NARRATOR_FALLBACK.to_string()
            });

        self.save_narration(&narration, turn).await;

        self.window.record_exchange(player_input, &narration, turn);
        self.turn = turn;
        info!(turn, "Turn complete");

        Ok(GameUpdate {
            player_input: player_input.to_string(),
            narrator_response: narration,
            memory_results,
            transcript: self.window.transcript().cloned().collect(),
            turn,
        })
    }

    /// Persist the turn's narration as a long-term memory.
    ///
    /// The narration was already generated and is about to reach the
    /// player; a rejected save must not eat it, so even a strict write
    /// policy only gets logged here. Tool-initiated saves still honor
    /// the policy through `save_memory`.
    async fn save_narration(&self, narration: &str, turn: u64) {
        if let Err(e) = self
            .tools
            .context()
            .add_entry(
                MemoryRole::Narrator,
                narration,
                turn,
                MemoryMetadata::narration(),
            )
            .await
        {
            error!(turn, error = %e, "Narration save failed; continuing the turn");
        }
    }

    /// Execute the requested tools concurrently, splice their results
    /// into the transcript in request order, and ask for the final
    /// narration.
    async fn run_tool_round(
        &self,
        transcript: &mut Vec<Content>,
        response: GenerateResponse,
        turn: u64,
    ) -> Result<GenerateResponse, SessionError> {
        info!(turn, requested = response.tool_calls.len(), "Running tool round");

        if let Some(model_turn) = response.content {
            transcript.push(model_turn);
        }

        let tools = Arc::clone(&self.tools);
        let responses = run_tools_ordered(&response.tool_calls, move |call| {
            let tools = Arc::clone(&tools);
            async move { tools.dispatch(&call, turn).await }
        })
        .await;
        transcript.extend(responses);

        let final_response = self
            .client
            .generate(transcript, &self.declarations, Some(NARRATOR_INSTRUCTION))
            .await?;
        Ok(final_response)
    }

    /// The retained window rendered as transcript messages.
    fn base_transcript(&self) -> Vec<Content> {
        self.window
            .transcript()
            .map(|t| match t.speaker {
                Speaker::Player => Content::user(t.text.clone()),
                Speaker::Narrator => Content::model(t.text.clone()),
            })
            .collect()
    }
}

/// Spawn one task per tool call, then await the handles in request
/// order, so the returned `functionResponse` messages always line up
/// with the requested calls no matter which task finishes first.
///
/// A panicked task degrades to a `{"success": false}` payload for its
/// slot; the other results are unaffected.
async fn run_tools_ordered<F, Fut>(calls: &[FunctionCall], dispatch: F) -> Vec<Content>
where
    F: Fn(FunctionCall) -> Fut,
    Fut: Future<Output = serde_json::Value> + Send + 'static,
{
    let handles: Vec<_> = calls
        .iter()
        .map(|call| tokio::spawn(dispatch(call.clone())))
        .collect();

    let mut responses = Vec::with_capacity(calls.len());
    for (call, handle) in calls.iter().zip(handles) {
        let payload = match handle.await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool task panicked");
                serde_json::json!({
                    "success": false,
                    "message": "tool execution failed",
                })
            }
        };
        responses.push(Content::function_response(call.name.clone(), payload));
    }
    responses
}

/// Render the player input with its memory preamble, if any memories
/// were retrieved.
fn player_message(player_input: &str, memories: &[ScoredEntry]) -> String {
    if memories.is_empty() {
        return format!("[PLAYER]: {player_input}");
    }
    let mut message = String::from(
        "[MEMORY CONTEXT] Relevant events from earlier in the story, most relevant first:\n",
    );
    for scored in memories {
        message.push_str("- (turn ");
        message.push_str(&scored.entry.turn.to_string());
        message.push_str(") ");
        message.push_str(&scored.entry.content);
        message.push('\n');
    }
    message.push_str("\n[PLAYER]: ");
    message.push_str(player_input);
    message
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use reverie_core::context::WritePolicy;
    use reverie_core::embedding::{EmbedIntent, EmbeddingProvider};
    use reverie_core::error::Result as MemoryResult;
    use reverie_core::index::{DimensionPolicy, VectorIndex};
    use reverie_core::search::SemanticSearch;
    use reverie_core::types::{Embedding, MemoryEntry};

    fn scored(content: &str, turn: u64, distance: f32) -> ScoredEntry {
        ScoredEntry {
            entry: MemoryEntry::new(
                MemoryRole::Narrator,
                content,
                turn,
                MemoryMetadata::narration(),
                Embedding(vec![1.0, 0.0]),
            ),
            distance,
        }
    }

    fn response_name(content: &Content) -> &str {
        content.parts[0]
            .function_response
            .as_ref()
            .expect("function response")
            .name
            .as_str()
    }

    #[tokio::test(start_paused = true)]
    async fn tool_results_fan_in_by_request_order_not_completion_order() {
        let completion_order = Arc::new(Mutex::new(Vec::new()));
        let calls = vec![
            FunctionCall {
                name: "slow_lookup".into(),
                args: serde_json::json!({}),
            },
            FunctionCall {
                name: "fast_lookup".into(),
                args: serde_json::json!({}),
            },
        ];

        let order = Arc::clone(&completion_order);
        let responses = run_tools_ordered(&calls, move |call| {
            let order = Arc::clone(&order);
            async move {
                let delay = if call.name == "slow_lookup" { 50 } else { 1 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                order.lock().expect("lock").push(call.name.clone());
                serde_json::json!({ "success": true, "tool": call.name })
            }
        })
        .await;

        // The fast tool genuinely finished first...
        assert_eq!(
            completion_order.lock().expect("lock").as_slice(),
            ["fast_lookup", "slow_lookup"]
        );
        // ...but the spliced responses follow the request order.
        let names: Vec<&str> = responses.iter().map(response_name).collect();
        assert_eq!(names, vec!["slow_lookup", "fast_lookup"]);
        let first_payload = &responses[0].parts[0]
            .function_response
            .as_ref()
            .expect("function response")
            .response;
        assert_eq!(first_payload["tool"], serde_json::json!("slow_lookup"));
    }

    #[tokio::test]
    async fn panicking_tool_task_degrades_to_a_failure_payload() {
        let calls = vec![
            FunctionCall {
                name: "explode".into(),
                args: serde_json::json!({}),
            },
            FunctionCall {
                name: "survive".into(),
                args: serde_json::json!({}),
            },
        ];

        let responses = run_tools_ordered(&calls, |call| async move {
            assert!(call.name != "explode", "this tool always fails");
            serde_json::json!({ "success": true })
        })
        .await;

        assert_eq!(responses.len(), 2);
        let exploded = &responses[0].parts[0]
            .function_response
            .as_ref()
            .expect("function response")
            .response;
        assert_eq!(exploded["success"], serde_json::json!(false));
        let survived = &responses[1].parts[0]
            .function_response
            .as_ref()
            .expect("function response")
            .response;
        assert_eq!(survived["success"], serde_json::json!(true));
    }

    struct FailingProvider;

    impl EmbeddingProvider for FailingProvider {
        async fn embed(&self, _text: &str, _intent: EmbedIntent) -> MemoryResult<Embedding> {
            Err(reverie_core::error::MemoryError::Embedding(
                "provider down".into(),
            ))
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn strict_write_failure_does_not_lose_the_narration_step() {
        let provider = Arc::new(FailingProvider);
        let index = Arc::new(
            VectorIndex::open_in_memory("session", DimensionPolicy::Discard).expect("open"),
        );
        let context = ContextManager::new(
            Arc::clone(&provider),
            Arc::clone(&index),
            WritePolicy::Strict,
        );
        let search = SemanticSearch::new(provider, Arc::clone(&index));
        let tools = Arc::new(GameTools::new(context, search, 5));
        let client = Arc::new(
            GenAiClient::new("https://example.test", "model", "key", 1000, 0).expect("client"),
        );
        let session = GameSession::new(client, tools, 1, 5);

        // Even the strict write policy must not turn the save into an
        // abort at this point in the turn.
        session.save_narration("the bridge held after all", 1).await;
        assert_eq!(index.len().expect("len"), 0, "nothing was persisted");
    }

    #[test]
    fn player_message_without_memories_is_bare() {
        let message = player_message("open the door", &[]);
        assert_eq!(message, "[PLAYER]: open the door");
    }

    #[test]
    fn player_message_lists_memories_before_the_input() {
        let memories = vec![
            scored("the door was locked from inside", 2, 0.1),
            scored("a key glinted in the well", 5, 0.3),
        ];
        let message = player_message("open the door", &memories);

        let context_pos = message.find("[MEMORY CONTEXT]").expect("preamble");
        let first = message.find("the door was locked").expect("first memory");
        let second = message.find("a key glinted").expect("second memory");
        let player = message.find("[PLAYER]: open the door").expect("input");
        assert!(context_pos < first && first < second && second < player);
        assert!(message.contains("(turn 2)"));
        assert!(message.contains("(turn 5)"));
    }
}
