//! Generation-service client.
//!
//! Speaks the `generateContent` protocol: transcript plus tool
//! declarations in, text and/or tool invocations out.  The caller runs
//! the tool round-trip and calls again for the final narration.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{Content, FunctionCall, GenerateResponse, ToolDeclaration};

/// HTTP client for the generative-language API.
#[derive(Debug)]
pub struct GenAiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout_ms: u64,
    max_retries: u32,
}

impl GenAiClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] if the API key is empty — missing
    /// credentials are fatal at startup, not at first use.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout_ms: u64,
        max_retries: u32,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(LlmError::Config(
                "no API key configured for the generation service".into(),
            ));
        }
        Ok(Self {
            http: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            timeout_ms,
            max_retries,
        })
    }

    /// The configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one `generateContent` call over the given transcript.
    ///
    /// Tool invocations are returned in the order the service requested
    /// them; callers must preserve that order when fanning results back
    /// in, whatever order execution completes in.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::RetriesExhausted`] once every attempt has
    /// failed, or [`LlmError::ParseError`] for a malformed body.
    pub async fn generate(
        &self,
        transcript: &[Content],
        tools: &[ToolDeclaration],
        system_instruction: Option<&str>,
    ) -> Result<GenerateResponse, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.model
        );

        let mut body = json!({ "contents": transcript });
        if !tools.is_empty() {
            body["tools"] = json!([{ "functionDeclarations": tools }]);
            body["toolConfig"] = json!({ "functionCallingConfig": { "mode": "AUTO" } });
        }
        if let Some(instruction) = system_instruction {
            body["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
        }

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(
                    attempt = attempt + 1,
                    total = self.max_retries + 1,
                    "Retrying generation call"
                );
            }

            let start = Instant::now();
            let result = self
                .http
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .timeout(Duration::from_millis(self.timeout_ms))
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let raw: RawGenerateResponse = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()))?;
                    let response = decode_response(raw);
                    debug!(
                        latency_ms = start.elapsed().as_millis() as u64,
                        tool_calls = response.tool_calls.len(),
                        has_text = response.text.is_some(),
                        "Generation call completed"
                    );
                    return Ok(response);
                }
                Ok(resp) => {
                    last_error = format!(
                        "HTTP {}: {}",
                        resp.status(),
                        resp.text().await.unwrap_or_default()
                    );
                    warn!(error = %last_error, "Generation service returned an error");
                }
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() {
                        warn!(timeout_ms = self.timeout_ms, "Generation request timed out");
                    } else {
                        warn!(error = %last_error, "Generation request failed");
                    }
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawGenerateResponse {
    #[serde(default)]
    candidates: Vec<RawCandidate>,
}

#[derive(Debug, Deserialize)]
struct RawCandidate {
    #[serde(default)]
    content: Option<Content>,
}

fn decode_response(raw: RawGenerateResponse) -> GenerateResponse {
    let content = raw.candidates.into_iter().next().and_then(|c| c.content);

    let (text, tool_calls) = match &content {
        Some(content) => {
            let text = content.text();
            let calls: Vec<FunctionCall> = content
                .parts
                .iter()
                .filter_map(|p| p.function_call.clone())
                .collect();
            (if text.is_empty() { None } else { Some(text) }, calls)
        }
        None => (None, Vec::new()),
    };

    GenerateResponse {
        text,
        tool_calls,
        content,
    }
}
