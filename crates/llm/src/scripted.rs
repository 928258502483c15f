//! Scripted Provider
//!
//! A deterministic provider for tests: each call pops the next scripted step
//! and replays it. Streaming steps emit their text deltas before resolving,
//! so event-ordering assertions work the same as against a live provider.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::provider::ModelProvider;
use super::types::{
    ModelError, ModelMessage, ModelRequestOptions, ModelResponse, ModelResult, StopReason,
    ToolCall, ToolDefinition, UsageStats,
};
use issueflow_core::streaming::TurnEvent;

/// One scripted provider turn
pub enum ScriptedStep {
    /// Stream the deltas, then resolve with the response
    Respond {
        deltas: Vec<String>,
        response: ModelResponse,
    },
    /// Fail the call with the given error
    Fail(ModelError),
}

/// Deterministic model provider backed by a queue of scripted steps.
///
/// When the queue runs dry the provider returns an empty final response, so
/// loop-termination tests don't have to script an exact call count.
pub struct ScriptedProvider {
    model: String,
    steps: Mutex<VecDeque<ScriptedStep>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            model: "scripted".to_string(),
            steps: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue a final text response, streamed as a single delta.
    pub fn enqueue_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.push(ScriptedStep::Respond {
            deltas: vec![text.clone()],
            response: ModelResponse {
                content: Some(text),
                tool_calls: vec![],
                stop_reason: StopReason::EndTurn,
                usage: UsageStats::default(),
                model: self.model.clone(),
            },
        });
    }

    /// Queue a response that requests a single tool call.
    pub fn enqueue_tool_call(&self, id: &str, name: &str, arguments: serde_json::Value) {
        self.push(ScriptedStep::Respond {
            deltas: vec![],
            response: ModelResponse {
                content: None,
                tool_calls: vec![ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments,
                }],
                stop_reason: StopReason::ToolUse,
                usage: UsageStats::default(),
                model: self.model.clone(),
            },
        });
    }

    /// Queue a provider failure.
    pub fn enqueue_error(&self, error: ModelError) {
        self.push(ScriptedStep::Fail(error));
    }

    /// Queue an arbitrary step.
    pub fn push(&self, step: ScriptedStep) {
        self.steps
            .lock()
            .expect("scripted steps lock poisoned")
            .push_back(step);
    }

    /// Number of steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.steps.lock().expect("scripted steps lock poisoned").len()
    }

    fn pop(&self) -> ScriptedStep {
        self.steps
            .lock()
            .expect("scripted steps lock poisoned")
            .pop_front()
            .unwrap_or_else(|| ScriptedStep::Respond {
                deltas: vec![],
                response: ModelResponse {
                    content: Some("Done.".to_string()),
                    tool_calls: vec![],
                    stop_reason: StopReason::EndTurn,
                    usage: UsageStats::default(),
                    model: self.model.clone(),
                },
            })
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send_message(
        &self,
        _messages: Vec<ModelMessage>,
        _system: Option<String>,
        _tools: Vec<ToolDefinition>,
        _options: ModelRequestOptions,
    ) -> ModelResult<ModelResponse> {
        match self.pop() {
            ScriptedStep::Respond { response, .. } => Ok(response),
            ScriptedStep::Fail(error) => Err(error),
        }
    }

    async fn stream_message(
        &self,
        _messages: Vec<ModelMessage>,
        _system: Option<String>,
        _tools: Vec<ToolDefinition>,
        tx: mpsc::Sender<TurnEvent>,
        _options: ModelRequestOptions,
    ) -> ModelResult<ModelResponse> {
        match self.pop() {
            ScriptedStep::Respond { deltas, response } => {
                for delta in deltas {
                    let _ = tx.send(TurnEvent::TextDelta { content: delta }).await;
                }
                Ok(response)
            }
            ScriptedStep::Fail(error) => Err(error),
        }
    }

    async fn health_check(&self) -> ModelResult<()> {
        Ok(())
    }
}
