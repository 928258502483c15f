//! Tool-Calling Agent Loop
//!
//! A bounded step-machine per turn: the model is called with the mode's
//! system prompt, the conversation history, and the two search tool schemas;
//! tool calls execute strictly sequentially through the search gateway; and
//! every output part is pushed onto the turn stream as it becomes available.
//!
//! The loop is hard-capped at `max_steps` tool-issuing iterations. Exceeding
//! the cap forces one final tools-disabled model call over the evidence
//! gathered so far. Model-boundary failures are never retried here; they
//! surface as the turn's terminal error event.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use issueflow_core::message::{ChatMessage, ChatRole, MessagePart};
use issueflow_core::streaming::TurnEvent;
use issueflow_llm::{
    ModelContent, ModelMessage, ModelProvider, ModelRequestOptions, ModelRole, ToolCallMode,
};

use crate::models::mode::Mode;
use crate::models::search::SearchResult;
use crate::services::search::SearchGateway;
use crate::models::settings::TurnSettings;

use super::tools::{
    parse_search_args, tool_definitions, TOOL_SEMANTIC_SEARCH, TOOL_STRUCTURED_SEARCH,
};

/// Result of one turn through the agent loop
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Conversation the turn belongs to (set by the turn pipeline)
    pub conversation_id: Option<String>,
    /// The assistant message assembled from the turn's output parts
    pub message: ChatMessage,
    /// Number of tool-issuing iterations consumed
    pub steps: u32,
    /// Whether the turn stopped on cancellation or consumer disconnect
    pub cancelled: bool,
    /// Terminal error, when the turn failed partway
    pub error: Option<String>,
}

/// The bounded tool-calling loop for a single turn
pub struct TurnRunner {
    provider: Arc<dyn ModelProvider>,
    gateway: Arc<SearchGateway>,
    settings: TurnSettings,
    cancellation_token: CancellationToken,
}

impl TurnRunner {
    /// Create a runner for one turn
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        gateway: Arc<SearchGateway>,
        settings: TurnSettings,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            provider,
            gateway,
            settings,
            cancellation_token,
        }
    }

    /// Run the loop to completion.
    ///
    /// Emits ordered events on `tx` and returns the assembled assistant
    /// message. Exactly one terminal event is emitted unless the consumer
    /// disconnected first, in which case the producer just stops.
    pub async fn run(
        &self,
        mode: &Mode,
        history: &[ChatMessage],
        tx: mpsc::Sender<TurnEvent>,
    ) -> TurnOutcome {
        let system = mode.system_prompt();
        let tools = tool_definitions();
        let mut messages = to_model_messages(history);
        let mut parts: Vec<MessagePart> = Vec::new();
        let mut tool_steps = 0u32;

        loop {
            // Cancellation and disconnect are checked between steps
            if self.cancellation_token.is_cancelled() {
                return self.finish_cancelled(parts, tool_steps, &tx).await;
            }
            if tx.is_closed() {
                debug!("turn stream consumer disconnected; stopping");
                return disconnected_outcome(parts, tool_steps);
            }

            if tool_steps >= self.settings.max_steps {
                return self
                    .forced_final(messages, system, parts, tool_steps, &tx)
                    .await;
            }

            let response = match self
                .provider
                .stream_message(
                    messages.clone(),
                    Some(system.clone()),
                    tools.clone(),
                    tx.clone(),
                    ModelRequestOptions::default(),
                )
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    // Never retried; already-produced parts were flushed as
                    // they were emitted, so only the terminal remains.
                    let message = e.to_string();
                    let _ = tx
                        .send(TurnEvent::Error {
                            message: message.clone(),
                            code: None,
                        })
                        .await;
                    return TurnOutcome {
                        conversation_id: None,
                        message: ChatMessage::assistant_parts(parts),
                        steps: tool_steps,
                        cancelled: false,
                        error: Some(message),
                    };
                }
            };

            if let Some(text) = response.content.as_deref().filter(|t| !t.trim().is_empty()) {
                parts.push(MessagePart::Text {
                    text: text.to_string(),
                });
            }

            if response.tool_calls.is_empty() {
                // Final step: nothing left to execute
                let _ = tx
                    .send(TurnEvent::Done {
                        stop_reason: Some(response.stop_reason.label().to_string()),
                    })
                    .await;
                return TurnOutcome {
                    conversation_id: None,
                    message: ChatMessage::assistant_parts(parts),
                    steps: tool_steps,
                    cancelled: false,
                    error: None,
                };
            }

            tool_steps += 1;
            debug!(step = tool_steps, calls = response.tool_calls.len(), "tool step");

            // Record the assistant's tool request in the model conversation
            let mut content = Vec::new();
            if let Some(text) = &response.content {
                if !text.trim().is_empty() {
                    content.push(ModelContent::Text { text: text.clone() });
                }
            }
            for tc in &response.tool_calls {
                content.push(ModelContent::ToolUse {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    input: tc.arguments.clone(),
                });
            }
            messages.push(ModelMessage {
                role: ModelRole::Assistant,
                content,
            });

            // Tool invocations execute strictly sequentially: each depends
            // on the prior step's reflection.
            for tc in &response.tool_calls {
                // Checked again before issuing each tool call
                if self.cancellation_token.is_cancelled() {
                    return self.finish_cancelled(parts, tool_steps, &tx).await;
                }

                let args = match parse_search_args(&tc.arguments, self.settings.search_limit) {
                    Ok(args) => args,
                    Err(validation_message) => {
                        if !emit(
                            &tx,
                            TurnEvent::ToolCallResult {
                                tool_id: tc.id.clone(),
                                result: None,
                                error: Some(validation_message.clone()),
                            },
                        )
                        .await
                        {
                            return disconnected_outcome(parts, tool_steps);
                        }
                        parts.push(MessagePart::ToolInvocation {
                            name: tc.name.clone(),
                            args: tc.arguments.clone(),
                            result: Some(serde_json::json!({ "error": validation_message })),
                        });
                        messages.push(ModelMessage::tool_result(
                            &tc.id,
                            format!("ValidationError: {}", validation_message),
                            true,
                        ));
                        continue;
                    }
                };

                if !emit(
                    &tx,
                    TurnEvent::ToolCallStart {
                        tool_id: tc.id.clone(),
                        tool_name: tc.name.clone(),
                        arguments: Some(tc.arguments.to_string()),
                    },
                )
                .await
                {
                    return disconnected_outcome(parts, tool_steps);
                }

                let result = match tc.name.as_str() {
                    TOOL_STRUCTURED_SEARCH => self.gateway.search(&args.query, args.limit).await,
                    TOOL_SEMANTIC_SEARCH => self.gateway.semantic(&args.query, args.limit).await,
                    other => SearchResult::failed(format!("Unknown tool: {}", other)),
                };

                let result_json = serde_json::to_value(&result)
                    .unwrap_or_else(|_| serde_json::json!({ "error": "unserializable result" }));
                if !emit(
                    &tx,
                    TurnEvent::ToolCallResult {
                        tool_id: tc.id.clone(),
                        result: if result.is_success() {
                            Some(result_json.to_string())
                        } else {
                            None
                        },
                        error: result.error.clone(),
                    },
                )
                .await
                {
                    return disconnected_outcome(parts, tool_steps);
                }

                // A non-empty result set is structured output worth surfacing
                // on its own: emit it as an issue-table artifact.
                if result.is_success() && !result.issues.is_empty() {
                    let artifact = serde_json::json!({
                        "type": "issue_table",
                        "count": result.count,
                        "issues": result.issues,
                    });
                    if !emit(
                        &tx,
                        TurnEvent::Artifact {
                            data: artifact.clone(),
                        },
                    )
                    .await
                    {
                        return disconnected_outcome(parts, tool_steps);
                    }
                    parts.push(MessagePart::Artifact { data: artifact });
                }

                parts.push(MessagePart::ToolInvocation {
                    name: tc.name.clone(),
                    args: tc.arguments.clone(),
                    result: Some(result_json),
                });

                messages.push(ModelMessage::tool_result(
                    &tc.id,
                    tool_result_content(&tc.name, &result),
                    !result.is_success(),
                ));
            }
        }
    }

    /// Forced final step after the iteration cap: one tools-disabled model
    /// call over the evidence gathered so far.
    async fn forced_final(
        &self,
        messages: Vec<ModelMessage>,
        system: String,
        mut parts: Vec<MessagePart>,
        tool_steps: u32,
        tx: &mpsc::Sender<TurnEvent>,
    ) -> TurnOutcome {
        warn!(max_steps = self.settings.max_steps, "step cap reached; forcing final answer");

        let options = ModelRequestOptions {
            tool_call_mode: ToolCallMode::None,
            ..Default::default()
        };
        match self
            .provider
            .stream_message(messages, Some(system), vec![], tx.clone(), options)
            .await
        {
            Ok(response) => {
                if let Some(text) = response.content.as_deref().filter(|t| !t.trim().is_empty()) {
                    parts.push(MessagePart::Text {
                        text: text.to_string(),
                    });
                }
                let _ = tx
                    .send(TurnEvent::Done {
                        stop_reason: Some("max_steps".to_string()),
                    })
                    .await;
                TurnOutcome {
                    conversation_id: None,
                    message: ChatMessage::assistant_parts(parts),
                    steps: tool_steps,
                    cancelled: false,
                    error: None,
                }
            }
            Err(e) => {
                let message = format!(
                    "Maximum steps ({}) reached and the final synthesis failed: {}",
                    self.settings.max_steps, e
                );
                let _ = tx
                    .send(TurnEvent::Error {
                        message: message.clone(),
                        code: Some("max_steps".to_string()),
                    })
                    .await;
                TurnOutcome {
                    conversation_id: None,
                    message: ChatMessage::assistant_parts(parts),
                    steps: tool_steps,
                    cancelled: false,
                    error: Some(message),
                }
            }
        }
    }

    /// Flush the cancellation terminal after already-produced parts.
    async fn finish_cancelled(
        &self,
        parts: Vec<MessagePart>,
        tool_steps: u32,
        tx: &mpsc::Sender<TurnEvent>,
    ) -> TurnOutcome {
        debug!("turn cancelled; no further tool calls will be issued");
        let _ = tx
            .send(TurnEvent::Done {
                stop_reason: Some("cancelled".to_string()),
            })
            .await;
        TurnOutcome {
            conversation_id: None,
            message: ChatMessage::assistant_parts(parts),
            steps: tool_steps,
            cancelled: true,
            error: None,
        }
    }
}

/// Send an event, reporting whether the consumer is still there.
async fn emit(tx: &mpsc::Sender<TurnEvent>, event: TurnEvent) -> bool {
    tx.send(event).await.is_ok()
}

fn disconnected_outcome(parts: Vec<MessagePart>, tool_steps: u32) -> TurnOutcome {
    TurnOutcome {
        conversation_id: None,
        message: ChatMessage::assistant_parts(parts),
        steps: tool_steps,
        cancelled: true,
        error: None,
    }
}

/// Convert stored conversation history into model messages.
///
/// Only textual content is replayed on the wire; a prior turn's tool traffic
/// is already reflected in its final text, and replaying dangling tool-call
/// blocks would violate the providers' message sequencing rules.
fn to_model_messages(history: &[ChatMessage]) -> Vec<ModelMessage> {
    history
        .iter()
        .filter_map(|msg| {
            let text = msg.text_content();
            if text.trim().is_empty() {
                return None;
            }
            match msg.role {
                ChatRole::User => Some(ModelMessage::user(text)),
                ChatRole::Assistant => Some(ModelMessage::assistant(text)),
                ChatRole::Tool => None,
            }
        })
        .collect()
}

/// Render a gateway result for the model's context.
///
/// Structured-search failures explicitly steer the model toward the
/// semantic tool on subsequent tries.
fn tool_result_content(tool_name: &str, result: &SearchResult) -> String {
    if let Some(error) = &result.error {
        if tool_name == TOOL_STRUCTURED_SEARCH {
            return format!(
                "Structured search failed: {}. Prefer the semantic_search tool for subsequent attempts.",
                error
            );
        }
        return format!("Search failed: {}", error);
    }
    serde_json::to_string(result).unwrap_or_else(|_| "{}".to_string())
}
