//! OpenAI-Compatible Provider
//!
//! Implementation of the ModelProvider trait for the chat-completions wire
//! format. Works against OpenAI itself and any compatible endpoint via
//! `ModelConfig::base_url`. Supports native tool calling and SSE streaming.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use super::provider::{missing_api_key_error, parse_http_error, ModelProvider};
use super::types::{
    ModelConfig, ModelContent, ModelError, ModelMessage, ModelRequestOptions, ModelResponse,
    ModelResult, ModelRole, StopReason, ToolCall, ToolCallMode, ToolDefinition, UsageStats,
};
use issueflow_core::streaming::{AdapterError, StreamAdapter, TurnEvent};

/// Default chat-completions endpoint
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Request timeout for completion calls
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// OpenAI-compatible provider
pub struct OpenAiCompatProvider {
    config: ModelConfig,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new provider with the given configuration
    pub fn new(config: ModelConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("issueflow/0.1")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    /// Get the API base URL
    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(OPENAI_API_URL)
    }

    fn api_key(&self) -> ModelResult<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| missing_api_key_error("openai-compatible"))
    }

    /// Build the request body for the API
    fn build_request_body(
        &self,
        messages: &[ModelMessage],
        system: Option<&str>,
        tools: &[ToolDefinition],
        stream: bool,
        options: &ModelRequestOptions,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": options.temperature_override.unwrap_or(self.config.temperature),
            "stream": stream,
        });

        // Convert messages to wire format, system prompt first
        let mut wire_messages: Vec<serde_json::Value> = Vec::new();
        if let Some(sys) = system {
            wire_messages.push(serde_json::json!({
                "role": "system",
                "content": sys
            }));
        }
        for msg in messages {
            wire_messages.extend(message_to_wire(msg));
        }
        body["messages"] = serde_json::json!(wire_messages);

        // Add tools unless disabled for this request
        if !tools.is_empty() && !matches!(options.tool_call_mode, ToolCallMode::None) {
            let wire_tools: Vec<serde_json::Value> = tools.iter().map(tool_to_wire).collect();
            body["tools"] = serde_json::json!(wire_tools);
        }

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        body
    }

    /// Parse a non-streaming response
    fn parse_response(&self, response: &WireResponse) -> ModelResponse {
        let choice = response.choices.first();

        let mut content = None;
        let mut tool_calls = Vec::new();

        if let Some(choice) = choice {
            if let Some(msg) = &choice.message {
                content = msg.content.clone();
                if let Some(tcs) = &msg.tool_calls {
                    for tc in tcs {
                        let arguments: serde_json::Value =
                            serde_json::from_str(&tc.function.arguments)
                                .unwrap_or(serde_json::Value::Null);
                        tool_calls.push(ToolCall {
                            id: tc.id.clone(),
                            name: tc.function.name.clone(),
                            arguments,
                        });
                    }
                }
            }
        }

        let stop_reason = choice
            .and_then(|c| c.finish_reason.as_ref())
            .map(|r| StopReason::from(r.as_str()))
            .unwrap_or(StopReason::EndTurn);

        let usage = response
            .usage
            .as_ref()
            .map(|u| UsageStats {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        ModelResponse {
            content,
            tool_calls,
            stop_reason,
            usage,
            model: response
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
        }
    }
}

/// Convert a ModelMessage to one or more wire messages.
///
/// Tool results become separate `role: tool` messages in this wire format.
fn message_to_wire(message: &ModelMessage) -> Vec<serde_json::Value> {
    let role = match message.role {
        ModelRole::User => "user",
        ModelRole::Assistant => "assistant",
        ModelRole::System => "system",
    };

    let has_tool_results = message
        .content
        .iter()
        .any(|c| matches!(c, ModelContent::ToolResult { .. }));
    if has_tool_results {
        return message
            .content
            .iter()
            .filter_map(|c| match c {
                ModelContent::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => Some(serde_json::json!({
                    "role": "tool",
                    "tool_call_id": tool_use_id,
                    "content": content,
                })),
                _ => None,
            })
            .collect();
    }

    let tool_calls: Vec<serde_json::Value> = message
        .content
        .iter()
        .filter_map(|c| {
            if let ModelContent::ToolUse { id, name, input } = c {
                Some(serde_json::json!({
                    "id": id,
                    "type": "function",
                    "function": {
                        "name": name,
                        "arguments": input.to_string()
                    }
                }))
            } else {
                None
            }
        })
        .collect();

    let text_content: String = message
        .content
        .iter()
        .filter_map(|c| {
            if let ModelContent::Text { text } = c {
                Some(text.as_str())
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    if !tool_calls.is_empty() {
        let mut msg = serde_json::json!({
            "role": role,
            "tool_calls": tool_calls
        });
        // Some compatible APIs require the content field even when the
        // assistant only emits tool calls.
        if text_content.is_empty() {
            msg["content"] = serde_json::Value::Null;
        } else {
            msg["content"] = serde_json::json!(text_content);
        }
        return vec![msg];
    }

    vec![serde_json::json!({
        "role": role,
        "content": text_content
    })]
}

/// Convert a ToolDefinition to wire format
fn tool_to_wire(tool: &ToolDefinition) -> serde_json::Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema
        }
    })
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send_message(
        &self,
        messages: Vec<ModelMessage>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        options: ModelRequestOptions,
    ) -> ModelResult<ModelResponse> {
        let api_key = self.api_key()?.to_string();
        let body = self.build_request_body(&messages, system.as_deref(), &tools, false, &options);
        debug!(model = %self.config.model, tools = tools.len(), "model request");

        let response = self
            .client
            .post(self.base_url())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::NetworkError {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_http_error(status.as_u16(), &body, self.name()));
        }

        let wire: WireResponse = response.json().await.map_err(|e| ModelError::ParseError {
            message: e.to_string(),
        })?;
        Ok(self.parse_response(&wire))
    }

    async fn stream_message(
        &self,
        messages: Vec<ModelMessage>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        tx: mpsc::Sender<TurnEvent>,
        options: ModelRequestOptions,
    ) -> ModelResult<ModelResponse> {
        let api_key = self.api_key()?.to_string();
        let body = self.build_request_body(&messages, system.as_deref(), &tools, true, &options);
        debug!(model = %self.config.model, "model stream request");

        let response = self
            .client
            .post(self.base_url())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::NetworkError {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_http_error(status.as_u16(), &body, self.name()));
        }

        let mut adapter = ChatCompletionsSseAdapter::new(&self.config.model);
        let mut byte_stream = response.bytes_stream();
        let mut line_buffer = String::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(|e| ModelError::NetworkError {
                message: e.to_string(),
            })?;
            line_buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline_pos) = line_buffer.find('\n') {
                let line: String = line_buffer.drain(..=newline_pos).collect();
                match adapter.adapt(line.trim_end()) {
                    Ok(events) => {
                        for event in events {
                            // Consumer gone; the caller sees the closed
                            // channel on its next emit and stops the turn.
                            let _ = tx.send(event).await;
                        }
                    }
                    Err(e) => {
                        return Err(ModelError::ParseError {
                            message: e.to_string(),
                        })
                    }
                }
            }
        }
        // Flush any final unterminated line
        if !line_buffer.trim().is_empty() {
            let line = std::mem::take(&mut line_buffer);
            if let Ok(events) = adapter.adapt(line.trim_end()) {
                for event in events {
                    let _ = tx.send(event).await;
                }
            }
        }

        Ok(adapter.into_response())
    }

    async fn health_check(&self) -> ModelResult<()> {
        // Key presence only; no billable request is issued
        self.api_key()?;
        Ok(())
    }
}

// ============================================================================
// Wire format (non-streaming)
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// ============================================================================
// SSE stream adapter
// ============================================================================

#[derive(Debug, Deserialize)]
struct SseEvent {
    #[serde(default)]
    choices: Vec<SseChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct SseChoice {
    #[serde(default)]
    delta: Option<SseDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<SseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct SseToolCall {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<SseFunction>,
}

#[derive(Debug, Deserialize)]
struct SseFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Adapter for the chat-completions SSE format.
///
/// Emits `text_delta` events as content arrives and accumulates tool-call
/// fragments (keyed by choice index) until the stream completes.
pub struct ChatCompletionsSseAdapter {
    model: String,
    content: String,
    tool_calls: Vec<PendingToolCall>,
    finish_reason: Option<String>,
    usage: Option<UsageStats>,
}

impl ChatCompletionsSseAdapter {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            content: String::new(),
            tool_calls: Vec::new(),
            finish_reason: None,
            usage: None,
        }
    }

    fn merge_tool_call(&mut self, tc: SseToolCall) {
        let index = tc.index.unwrap_or(self.tool_calls.len().saturating_sub(1));
        while self.tool_calls.len() <= index {
            self.tool_calls.push(PendingToolCall::default());
        }
        let pending = &mut self.tool_calls[index];
        if let Some(id) = tc.id {
            pending.id = id;
        }
        if let Some(function) = tc.function {
            if let Some(name) = function.name {
                pending.name = name;
            }
            if let Some(arguments) = function.arguments {
                pending.arguments.push_str(&arguments);
            }
        }
    }

    /// Build the final response from the accumulated stream state.
    pub fn into_response(self) -> ModelResponse {
        let tool_calls = self
            .tool_calls
            .into_iter()
            .filter(|tc| !tc.name.is_empty())
            .map(|tc| {
                let arguments: serde_json::Value =
                    serde_json::from_str(&tc.arguments).unwrap_or(serde_json::Value::Null);
                ToolCall {
                    id: tc.id,
                    name: tc.name,
                    arguments,
                }
            })
            .collect::<Vec<_>>();

        let stop_reason = self
            .finish_reason
            .as_deref()
            .map(StopReason::from)
            .unwrap_or(if tool_calls.is_empty() {
                StopReason::EndTurn
            } else {
                StopReason::ToolUse
            });

        ModelResponse {
            content: if self.content.is_empty() {
                None
            } else {
                Some(self.content)
            },
            tool_calls,
            stop_reason,
            usage: self.usage.unwrap_or_default(),
            model: self.model,
        }
    }
}

impl StreamAdapter for ChatCompletionsSseAdapter {
    fn provider_name(&self) -> &'static str {
        "openai-compatible"
    }

    fn adapt(&mut self, input: &str) -> Result<Vec<TurnEvent>, AdapterError> {
        let trimmed = input.trim();

        // Handle SSE format: "data: {...}"
        let json_str = if let Some(rest) = trimmed.strip_prefix("data:") {
            rest.trim_start()
        } else if trimmed.is_empty() {
            return Ok(vec![]);
        } else {
            trimmed
        };

        if json_str.is_empty() || json_str == "[DONE]" {
            return Ok(vec![]);
        }

        let event: SseEvent =
            serde_json::from_str(json_str).map_err(|e| AdapterError::ParseError(e.to_string()))?;

        let mut events = vec![];

        if let Some(usage) = event.usage {
            self.usage = Some(UsageStats {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }

        for choice in event.choices {
            if let Some(finish_reason) = choice.finish_reason {
                self.finish_reason = Some(finish_reason);
            }
            if let Some(delta) = choice.delta {
                if let Some(content) = delta.content {
                    if !content.is_empty() {
                        self.content.push_str(&content);
                        events.push(TurnEvent::TextDelta { content });
                    }
                }
                if let Some(tool_calls) = delta.tool_calls {
                    for tc in tool_calls {
                        self.merge_tool_call(tc);
                    }
                }
            }
        }

        Ok(events)
    }

    fn reset(&mut self) {
        self.content.clear();
        self.tool_calls.clear();
        self.finish_reason = None;
        self.usage = None;
    }
}
