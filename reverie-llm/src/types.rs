//! Wire types for the generative-language API.
//!
//! The generation contract is: given a conversation transcript and a set
//! of callable-tool declarations, the service returns either natural
//! language text or a list of tool invocations; a second call with the
//! tool results appended yields the final narration.

use serde::{Deserialize, Serialize};

/// One message of the conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    /// Message author: "user", "model", or "function".
    pub role: String,
    /// Message payload parts.
    pub parts: Vec<Part>,
}

impl Content {
    /// A user-authored text message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::text(text)],
        }
    }

    /// A model-authored text message.
    #[must_use]
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part::text(text)],
        }
    }

    /// A function-result message carrying one tool outcome.
    #[must_use]
    pub fn function_response(name: impl Into<String>, response: serde_json::Value) -> Self {
        Self {
            role: "function".to_string(),
            parts: vec![Part {
                text: None,
                function_call: None,
                function_response: Some(FunctionResponse {
                    name: name.into(),
                    response,
                }),
            }],
        }
    }

    /// Concatenated text of all text parts.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// One part of a message: text, a tool invocation, or a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Natural-language text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// A tool invocation requested by the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    /// A tool result supplied back to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    /// A plain text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            function_call: None,
            function_response: None,
        }
    }
}

/// A tool invocation requested by the generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Declared tool name.
    pub name: String,
    /// Tool arguments as free-form JSON.
    #[serde(default)]
    pub args: serde_json::Value,
}

/// A tool result fed back to the generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResponse {
    /// Tool name the result belongs to.
    pub name: String,
    /// Structured result payload.
    pub response: serde_json::Value,
}

/// A callable-tool declaration advertised to the generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Tool name.
    pub name: String,
    /// What the tool does, for the model.
    pub description: String,
    /// JSON-schema description of the parameters object.
    pub parameters: serde_json::Value,
}

/// Decoded outcome of one `generateContent` call.
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// Natural-language text, if the model produced any.
    pub text: Option<String>,
    /// Tool invocations, in the order the model requested them.
    pub tool_calls: Vec<FunctionCall>,
    /// The raw model message, for appending to the transcript.
    pub content: Option<Content>,
}

impl GenerateResponse {
    /// Whether the model asked for tools instead of (or before) text.
    #[must_use]
    pub fn wants_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_serialization_omits_absent_fields() {
        let json = serde_json::to_value(Part::text("hello")).expect("serialize");
        assert_eq!(json, serde_json::json!({ "text": "hello" }));
    }

    #[test]
    fn function_call_deserializes_from_wire_shape() {
        let json = serde_json::json!({
            "functionCall": { "name": "recall_memory", "args": { "query": "the mill" } }
        });
        let part: Part = serde_json::from_value(json).expect("deserialize");
        let call = part.function_call.expect("call");
        assert_eq!(call.name, "recall_memory");
        assert_eq!(call.args["query"], "the mill");
    }

    #[test]
    fn content_text_concatenates_parts() {
        let content = Content {
            role: "model".into(),
            parts: vec![Part::text("The door "), Part::text("creaks open.")],
        };
        assert_eq!(content.text(), "The door creaks open.");
    }
}
