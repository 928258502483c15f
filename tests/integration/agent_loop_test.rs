//! Agent Loop Integration Tests
//!
//! Verifies the bounded tool-calling loop end to end with a scripted model
//! provider and mock search backends:
//! - ordered event emission with exactly one terminal event
//! - the hard step cap and the forced final step
//! - cooperative cancellation between tool calls
//! - model failures surfacing without retries

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use issueflow::models::mode::{Mode, PromptSections, QueryPatterns};
use issueflow::models::search::{IssueSummary, SearchResult};
use issueflow::models::settings::TurnSettings;
use issueflow::services::search::{IssueSearchBackend, SearchGateway};
use issueflow::services::turn::{TurnRequest, TurnRunner, TurnService};
use issueflow::storage::Database;
use issueflow::utils::error::AppError;
use issueflow_core::message::{ChatMessage, MessagePart};
use issueflow_core::streaming::TurnEvent;
use issueflow_llm::{ModelError, ScriptedProvider};

fn test_mode() -> Mode {
    Mode {
        id: "m1".to_string(),
        name: "default".to_string(),
        display_name: "Default".to_string(),
        description: None,
        query_patterns: QueryPatterns::default(),
        prompt_sections: PromptSections::formatting_only("Answer concisely."),
        is_default: true,
        owner_id: None,
        created_at: None,
        updated_at: None,
    }
}

fn issue(key: &str) -> IssueSummary {
    IssueSummary {
        key: key.to_string(),
        summary: format!("Issue {}", key),
        status: Some("Open".to_string()),
        assignee: None,
        issue_type: Some("Bug".to_string()),
        url: None,
    }
}

/// Backend that always succeeds and counts calls
struct CountingBackend {
    calls: AtomicUsize,
    issues: Vec<IssueSummary>,
}

impl CountingBackend {
    fn new(issues: Vec<IssueSummary>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            issues,
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IssueSearchBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    async fn structured_search(&self, _query: &str, _limit: u32) -> Result<SearchResult, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SearchResult::ok(self.issues.clone()))
    }

    async fn semantic_search(&self, _text: &str, _limit: u32) -> Result<SearchResult, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SearchResult::ok(self.issues.clone()))
    }
}

/// Backend that always fails both operations
struct FailingBackend;

#[async_trait]
impl IssueSearchBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    async fn structured_search(&self, _query: &str, _limit: u32) -> Result<SearchResult, String> {
        Err("structured backend down".to_string())
    }

    async fn semantic_search(&self, _text: &str, _limit: u32) -> Result<SearchResult, String> {
        Err("semantic backend down".to_string())
    }
}

/// Backend that cancels the turn during its first call
struct CancellingBackend {
    token: CancellationToken,
    calls: AtomicUsize,
}

#[async_trait]
impl IssueSearchBackend for CancellingBackend {
    fn name(&self) -> &str {
        "cancelling"
    }

    async fn structured_search(&self, _query: &str, _limit: u32) -> Result<SearchResult, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.token.cancel();
        Ok(SearchResult::ok(vec![issue("DS-1")]))
    }

    async fn semantic_search(&self, _text: &str, _limit: u32) -> Result<SearchResult, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.token.cancel();
        Ok(SearchResult::ok(vec![issue("DS-1")]))
    }
}

fn runner(
    provider: Arc<ScriptedProvider>,
    backend: Arc<dyn IssueSearchBackend>,
    token: CancellationToken,
) -> TurnRunner {
    TurnRunner::new(
        provider,
        Arc::new(SearchGateway::new(backend)),
        TurnSettings::default(),
        token,
    )
}

async fn run_and_collect(
    runner: &TurnRunner,
    history: &[ChatMessage],
) -> (issueflow::services::turn::TurnOutcome, Vec<TurnEvent>) {
    let (tx, mut rx) = mpsc::channel(256);
    let outcome = runner.run(&test_mode(), history, tx).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (outcome, events)
}

fn terminal_count(events: &[TurnEvent]) -> usize {
    events.iter().filter(|e| e.is_terminal()).count()
}

// ============================================================================
// Happy path: one tool call, then final text
// ============================================================================

#[tokio::test]
async fn test_single_tool_call_event_order() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.enqueue_tool_call(
        "tc-1",
        "semantic_search",
        serde_json::json!({"query": "open bugs", "limit": 3}),
    );
    provider.enqueue_text("Found one open bug: DS-1.");

    let backend = CountingBackend::new(vec![issue("DS-1")]);
    let runner = runner(provider, backend.clone(), CancellationToken::new());
    let (outcome, events) = run_and_collect(&runner, &[ChatMessage::user("any open bugs?")]).await;

    assert!(outcome.error.is_none());
    assert!(!outcome.cancelled);
    assert_eq!(outcome.steps, 1);
    assert_eq!(backend.call_count(), 1);

    // Ordering: start before result, artifact after result, terminal last
    let start_pos = events
        .iter()
        .position(|e| matches!(e, TurnEvent::ToolCallStart { .. }))
        .unwrap();
    let result_pos = events
        .iter()
        .position(|e| matches!(e, TurnEvent::ToolCallResult { .. }))
        .unwrap();
    let artifact_pos = events
        .iter()
        .position(|e| matches!(e, TurnEvent::Artifact { .. }))
        .unwrap();
    assert!(start_pos < result_pos);
    assert!(result_pos < artifact_pos);

    assert_eq!(terminal_count(&events), 1);
    assert!(events.last().unwrap().is_terminal());
    assert!(matches!(events.last().unwrap(), TurnEvent::Done { .. }));

    // The assembled assistant message carries the parts in order
    let has_tool_part = outcome.message.parts.iter().any(|p| {
        matches!(p, MessagePart::ToolInvocation { name, result: Some(_), .. } if name == "semantic_search")
    });
    assert!(has_tool_part);
    assert!(outcome
        .message
        .parts
        .iter()
        .any(|p| matches!(p, MessagePart::Artifact { .. })));
    assert_eq!(
        outcome.message.text_content(),
        "Found one open bug: DS-1."
    );
}

// ============================================================================
// Step cap
// ============================================================================

#[tokio::test]
async fn test_loop_is_capped_at_max_steps() {
    let provider = Arc::new(ScriptedProvider::new());
    // The model keeps asking for tools far past the cap
    for i in 0..10 {
        provider.enqueue_tool_call(
            &format!("tc-{}", i),
            "structured_search",
            serde_json::json!({"query": format!("project = DS AND step = {}", i)}),
        );
    }

    let backend = CountingBackend::new(vec![issue("DS-1")]);
    let runner = runner(provider.clone(), backend.clone(), CancellationToken::new());
    let (outcome, events) = run_and_collect(&runner, &[ChatMessage::user("dig deep")]).await;

    // Exactly max_steps tool-issuing iterations ran
    assert_eq!(outcome.steps, TurnSettings::default().max_steps);
    assert_eq!(backend.call_count(), 5);
    let starts = events
        .iter()
        .filter(|e| matches!(e, TurnEvent::ToolCallStart { .. }))
        .count();
    assert_eq!(starts, 5);

    // The forced final consumed one more scripted step (tools disabled) and
    // terminated the turn
    assert_eq!(terminal_count(&events), 1);
    match events.last().unwrap() {
        TurnEvent::Done { stop_reason } => {
            assert_eq!(stop_reason.as_deref(), Some("max_steps"));
        }
        other => panic!("expected Done terminal, got {:?}", other),
    }
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn test_terminates_with_final_even_when_every_tool_call_fails() {
    let provider = Arc::new(ScriptedProvider::new());
    for i in 0..5 {
        provider.enqueue_tool_call(
            &format!("tc-{}", i),
            "semantic_search",
            serde_json::json!({"query": "anything"}),
        );
    }
    provider.enqueue_text("I could not reach the search backends.");

    let runner = runner(provider, Arc::new(FailingBackend), CancellationToken::new());
    let (outcome, events) = run_and_collect(&runner, &[ChatMessage::user("find bugs")]).await;

    // Every tool call produced an error result, yet the turn still ended
    // with a final answer
    let error_results = events
        .iter()
        .filter(|e| matches!(e, TurnEvent::ToolCallResult { error: Some(_), .. }))
        .count();
    assert_eq!(error_results, 5);
    assert_eq!(terminal_count(&events), 1);
    assert!(matches!(events.last().unwrap(), TurnEvent::Done { .. }));
    assert_eq!(
        outcome.message.text_content(),
        "I could not reach the search backends."
    );
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancellation_between_tool_calls() {
    let provider = Arc::new(ScriptedProvider::new());
    // One response carrying two tool calls: the first completes (and cancels
    // the turn), the second must never be issued
    provider.push(issueflow_llm::ScriptedStep::Respond {
        deltas: vec![],
        response: issueflow_llm::ModelResponse {
            content: None,
            tool_calls: vec![
                issueflow_llm::ToolCall {
                    id: "tc-1".to_string(),
                    name: "structured_search".to_string(),
                    arguments: serde_json::json!({"query": "project = DS"}),
                },
                issueflow_llm::ToolCall {
                    id: "tc-2".to_string(),
                    name: "structured_search".to_string(),
                    arguments: serde_json::json!({"query": "project = DS"}),
                },
            ],
            stop_reason: issueflow_llm::StopReason::ToolUse,
            usage: issueflow_llm::UsageStats::default(),
            model: "scripted".to_string(),
        },
    });

    let token = CancellationToken::new();
    let backend = Arc::new(CancellingBackend {
        token: token.clone(),
        calls: AtomicUsize::new(0),
    });
    let runner = runner(provider, backend.clone(), token);
    let (outcome, events) = run_and_collect(&runner, &[ChatMessage::user("go")]).await;

    // Only the first tool call ran
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    let starts = events
        .iter()
        .filter(|e| matches!(e, TurnEvent::ToolCallStart { .. }))
        .count();
    assert_eq!(starts, 1);

    // Already-produced parts were flushed, then the cancellation terminal
    assert!(events
        .iter()
        .any(|e| matches!(e, TurnEvent::ToolCallResult { .. })));
    assert_eq!(terminal_count(&events), 1);
    match events.last().unwrap() {
        TurnEvent::Done { stop_reason } => {
            assert_eq!(stop_reason.as_deref(), Some("cancelled"));
        }
        other => panic!("expected cancellation terminal, got {:?}", other),
    }

    assert!(outcome.cancelled);
    assert!(outcome.error.is_none());
    // The completed tool call's part survives in the assistant message
    assert!(outcome
        .message
        .parts
        .iter()
        .any(|p| matches!(p, MessagePart::ToolInvocation { .. })));
}

#[tokio::test]
async fn test_pre_cancelled_turn_issues_no_tool_calls() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.enqueue_tool_call("tc-1", "semantic_search", serde_json::json!({"query": "x"}));

    let token = CancellationToken::new();
    token.cancel();
    let backend = CountingBackend::new(vec![]);
    let runner = runner(provider, backend.clone(), token);
    let (outcome, events) = run_and_collect(&runner, &[ChatMessage::user("go")]).await;

    assert!(outcome.cancelled);
    assert_eq!(backend.call_count(), 0);
    assert_eq!(events.len(), 1);
    assert!(events[0].is_terminal());
}

// ============================================================================
// Model failures
// ============================================================================

#[tokio::test]
async fn test_model_failure_surfaces_without_retry() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.enqueue_tool_call("tc-1", "semantic_search", serde_json::json!({"query": "bugs"}));
    provider.enqueue_error(ModelError::ServerError {
        message: "upstream exploded".to_string(),
        status: Some(500),
    });
    // A retry would consume this step; it must stay queued
    provider.enqueue_text("never reached");

    let backend = CountingBackend::new(vec![issue("DS-1")]);
    let runner = runner(provider.clone(), backend, CancellationToken::new());
    let (outcome, events) = run_and_collect(&runner, &[ChatMessage::user("go")]).await;

    // The first step's parts were flushed before the terminal error
    assert!(events
        .iter()
        .any(|e| matches!(e, TurnEvent::ToolCallResult { .. })));
    assert_eq!(terminal_count(&events), 1);
    assert!(matches!(events.last().unwrap(), TurnEvent::Error { .. }));

    assert!(outcome.error.is_some());
    assert!(outcome.error.unwrap().contains("upstream exploded"));
    assert_eq!(provider.remaining(), 1, "model call must not be retried");
}

// ============================================================================
// Argument validation
// ============================================================================

#[tokio::test]
async fn test_invalid_tool_arguments_are_validation_errors_not_crashes() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.enqueue_tool_call("tc-1", "semantic_search", serde_json::json!({"limit": 5}));
    provider.enqueue_text("Recovered after the bad call.");

    let backend = CountingBackend::new(vec![issue("DS-1")]);
    let runner = runner(provider, backend.clone(), CancellationToken::new());
    let (outcome, events) = run_and_collect(&runner, &[ChatMessage::user("go")]).await;

    // The invalid call never reached a backend
    assert_eq!(backend.call_count(), 0);
    let validation_errors = events
        .iter()
        .filter(|e| {
            matches!(e, TurnEvent::ToolCallResult { error: Some(msg), .. } if msg.contains("query"))
        })
        .count();
    assert_eq!(validation_errors, 1);

    // The loop continued to a successful final
    assert!(matches!(events.last().unwrap(), TurnEvent::Done { .. }));
    assert!(outcome.error.is_none());
}

// ============================================================================
// Consumer disconnect
// ============================================================================

#[tokio::test]
async fn test_disconnected_consumer_stops_the_producer() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.enqueue_tool_call("tc-1", "semantic_search", serde_json::json!({"query": "x"}));

    let backend = CountingBackend::new(vec![]);
    let runner = runner(provider, backend.clone(), CancellationToken::new());

    let (tx, rx) = mpsc::channel(8);
    drop(rx);
    let outcome = runner.run(&test_mode(), &[ChatMessage::user("go")], tx).await;

    assert!(outcome.cancelled);
    assert_eq!(outcome.steps, 0);
    assert_eq!(backend.call_count(), 0, "no work after the consumer is gone");
}

// ============================================================================
// Full pipeline
// ============================================================================

#[tokio::test]
async fn test_turn_service_persists_the_turn() {
    let db = Database::new_in_memory().unwrap();
    issueflow::services::modes::ModeService::from_database(&db)
        .seed_builtins()
        .unwrap();

    let provider = Arc::new(ScriptedProvider::new());
    provider.enqueue_text("DS-1 is the only open bug.");

    let service = TurnService::new(
        db.clone(),
        Arc::new(SearchGateway::new(CountingBackend::new(vec![]))),
        provider,
        TurnSettings::default(),
    );

    let (tx, mut rx) = mpsc::channel(64);
    let outcome = service
        .run_turn(
            TurnRequest {
                user_id: "user-1".to_string(),
                conversation_id: None,
                query: "list all bugs in DS".to_string(),
            },
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let conversation_id = outcome.conversation_id.clone().unwrap();
    let stored = issueflow::services::conversation::ConversationService::from_database(&db)
        .get(&conversation_id)
        .unwrap()
        .unwrap();

    // User message plus assistant message, in order
    assert_eq!(stored.messages.len(), 2);
    assert_eq!(stored.messages[0].text_content(), "list all bugs in DS");
    assert_eq!(stored.messages[1].text_content(), "DS-1 is the only open bug.");
    assert_eq!(stored.title, "list all bugs in DS");

    // The stream saw the text and exactly one terminal
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(
        events.iter().filter(|e| e.is_terminal()).count(),
        1
    );
}

#[tokio::test]
async fn test_turn_service_rejects_empty_query() {
    let db = Database::new_in_memory().unwrap();
    issueflow::services::modes::ModeService::from_database(&db)
        .seed_builtins()
        .unwrap();

    let provider = Arc::new(ScriptedProvider::new());
    let service = TurnService::new(
        db,
        Arc::new(SearchGateway::new(CountingBackend::new(vec![]))),
        provider,
        TurnSettings::default(),
    );

    let (tx, _rx) = mpsc::channel(8);
    let err = service
        .run_turn(
            TurnRequest {
                user_id: "user-1".to_string(),
                conversation_id: None,
                query: "   ".to_string(),
            },
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_turn_service_unknown_conversation_is_not_found() {
    let db = Database::new_in_memory().unwrap();
    issueflow::services::modes::ModeService::from_database(&db)
        .seed_builtins()
        .unwrap();

    let provider = Arc::new(ScriptedProvider::new());
    let service = TurnService::new(
        db,
        Arc::new(SearchGateway::new(CountingBackend::new(vec![]))),
        provider,
        TurnSettings::default(),
    );

    let (tx, _rx) = mpsc::channel(8);
    let err = service
        .run_turn(
            TurnRequest {
                user_id: "user-1".to_string(),
                conversation_id: Some("ghost".to_string()),
                query: "hello".to_string(),
            },
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_failed_turn_still_persists_partial_output() {
    let db = Database::new_in_memory().unwrap();
    issueflow::services::modes::ModeService::from_database(&db)
        .seed_builtins()
        .unwrap();

    let provider = Arc::new(ScriptedProvider::new());
    provider.enqueue_tool_call("tc-1", "semantic_search", serde_json::json!({"query": "bugs"}));
    provider.enqueue_error(ModelError::NetworkError {
        message: "connection reset".to_string(),
    });

    let service = TurnService::new(
        db.clone(),
        Arc::new(SearchGateway::new(CountingBackend::new(vec![issue("DS-1")]))),
        provider,
        TurnSettings::default(),
    );

    let (tx, _rx) = mpsc::channel(64);
    let outcome = service
        .run_turn(
            TurnRequest {
                user_id: "user-1".to_string(),
                conversation_id: None,
                query: "find bugs".to_string(),
            },
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(outcome.error.is_some());

    // The partial assistant message (tool invocation + artifact) was saved
    let stored = issueflow::services::conversation::ConversationService::from_database(&db)
        .get(&outcome.conversation_id.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(stored.messages.len(), 2);
    assert!(stored.messages[1]
        .parts
        .iter()
        .any(|p| matches!(p, MessagePart::ToolInvocation { .. })));
}
