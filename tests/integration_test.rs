//! End-to-end integration tests for `AgentRuntime`
//!
//! Unlike the per-module unit tests inside `src/`, these exercise the public
//! API surface a deployment actually calls: `post_client_event`,
//! `wait_for_update`, `update_consumption_offset`, wired up through the real
//! `SessionDispatcher` + `Pipeline` + `ServiceRegistry` stack rather than
//! calling any single stage directly.

use async_trait::async_trait;
use conversant::generation::{GenerationHints, SchematicGenerator};
use conversant::services::local::LocalToolService;
use conversant::services::registry::ServiceKind;
use conversant::storage::memory::InMemoryDocumentDatabase;
use conversant::tool::{ToolParameter, ToolParameterType};
use conversant::*;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// A scripted generator standing in for a real LLM backend: it answers
/// differently depending on which stage of the pipeline is asking, the way
/// the module-level tests do, so the whole pipeline runs without a network
/// call.
struct ScriptedGenerator;

#[async_trait]
impl SchematicGenerator for ScriptedGenerator {
    async fn generate_value(&self, prompt: &str, _hints: &GenerationHints) -> Result<Value, GenerationError> {
        if prompt.contains("inferring which tools") {
            Ok(serde_json::json!({
                "calls": [{"tool_name": "get_balance", "arguments": {"account_id": "acc-1"}}]
            }))
        } else if prompt.contains("evaluating which") {
            Ok(serde_json::json!({
                "checks": [{"predicate_number": 0, "rationale": "matches", "applies_score": 9}]
            }))
        } else {
            Ok(serde_json::json!({
                "revisions": [
                    {"content": "Your balance is $42.", "rules_followed": ["be concise"], "rules_broken": [], "followed_all_rules": true}
                ]
            }))
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn billing_tool_service() -> Arc<LocalToolService> {
    let local = Arc::new(LocalToolService::new());
    local.register(
        ToolDescriptor::new("get_balance", "reads an account's balance")
            .with_parameter("account_id", ToolParameter::new(ToolParameterType::String))
            .require("account_id"),
        |_ctx, args| async move {
            Ok(ToolResult::new(
                serde_json::json!({"balance": 42, "account": args["account_id"]}),
            ))
        },
    );
    local
}

fn test_runtime(associations: AssociationStore) -> AgentRuntime {
    let generator: Arc<dyn SchematicGenerator> = Arc::new(ScriptedGenerator);
    let database: Arc<dyn DocumentDatabase> = Arc::new(InMemoryDocumentDatabase::new());
    let registry = Arc::new(ServiceRegistry::new(database, billing_tool_service()));
    AgentRuntime::new(generator, registry, Arc::new(associations), RuntimeConfig::default())
}

#[tokio::test]
async fn test_post_client_event_produces_agent_reply() {
    let runtime = test_runtime(AssociationStore::new());
    let session_id = SessionId::new();

    let client_event = runtime
        .post_client_event(
            session_id,
            Agent::new("billing-bot"),
            vec![],
            vec![],
            vec![],
            serde_json::json!({"message": "what's my balance?"}),
        )
        .await;
    assert_eq!(client_event.offset, 0);
    assert_eq!(client_event.source, EventSource::Customer);

    let found = runtime
        .wait_for_update(session_id, 1, &[EventKind::Message], Duration::from_secs(2))
        .await;
    assert!(found, "expected a reply to be persisted before the wait timed out");

    let history = runtime.session_history(session_id).await;
    assert_eq!(history.len(), 2, "client event plus the agent reply");

    let reply = &history[1];
    assert_eq!(reply.source, EventSource::AiAgent);
    assert_eq!(reply.kind, EventKind::Message);
    assert_eq!(reply.data["message"], "Your balance is $42.");
    assert_eq!(reply.correlation_id, client_event.correlation_id);
}

#[tokio::test]
async fn test_tool_enabled_guideline_records_a_tool_event_before_the_reply() {
    let guideline = Guideline::new(
        AgentId::new(),
        GuidelineContent::new("user asks balance", "look up and report it"),
    );

    let associations = AssociationStore::new();
    associations.associate(guideline.id, ToolId::local("get_balance"));

    let runtime = test_runtime(associations);
    let session_id = SessionId::new();

    let client_event = runtime
        .post_client_event(
            session_id,
            Agent::new("billing-bot"),
            vec![guideline],
            vec![],
            vec![],
            serde_json::json!({"message": "what's my balance?"}),
        )
        .await;

    runtime
        .wait_for_update(session_id, 1, &[EventKind::Message], Duration::from_secs(2))
        .await;

    let history = runtime.session_history(session_id).await;
    assert_eq!(history.len(), 3, "client event, tool event, then the reply");
    assert_eq!(history[1].kind, EventKind::Tool);
    assert_eq!(history[1].correlation_id, client_event.correlation_id);
    assert_eq!(history[2].kind, EventKind::Message);
}

#[tokio::test]
async fn test_rapid_successive_posts_cancel_predecessors() {
    let runtime = test_runtime(AssociationStore::new());
    let session_id = SessionId::new();

    for i in 0..3 {
        runtime
            .post_client_event(
                session_id,
                Agent::new("billing-bot"),
                vec![],
                vec![],
                vec![],
                serde_json::json!({"message": format!("msg {i}")}),
            )
            .await;
    }

    runtime
        .wait_for_update(session_id, 1, &[EventKind::Message], Duration::from_secs(2))
        .await;

    let history = runtime.session_history(session_id).await;
    let agent_replies: Vec<_> = history.iter().filter(|e| e.source == EventSource::AiAgent).collect();
    assert_eq!(
        agent_replies.len(),
        1,
        "only the last post's processing task should survive cancellation of its predecessors"
    );
}

#[tokio::test]
async fn test_wait_for_update_ignores_already_consumed_offsets() {
    let runtime = test_runtime(AssociationStore::new());
    let session_id = SessionId::new();

    runtime
        .post_client_event(
            session_id,
            Agent::new("billing-bot"),
            vec![],
            vec![],
            vec![],
            serde_json::json!({"message": "hi"}),
        )
        .await;
    runtime
        .wait_for_update(session_id, 1, &[EventKind::Message], Duration::from_secs(2))
        .await;

    runtime.update_consumption_offset(session_id, "web-ui", 2).await;

    let stale = runtime
        .wait_for_update(session_id, 2, &[EventKind::Message], Duration::from_millis(100))
        .await;
    assert!(!stale, "no event at offset 2 exists yet");
}

#[tokio::test]
async fn test_shutdown_drains_dispatcher_without_panicking() {
    let runtime = test_runtime(AssociationStore::new());
    let session_id = SessionId::new();

    runtime
        .post_client_event(
            session_id,
            Agent::new("billing-bot"),
            vec![],
            vec![],
            vec![],
            serde_json::json!({"message": "hi"}),
        )
        .await;

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_registry_create_list_delete_round_trip() {
    let database: Arc<dyn DocumentDatabase> = Arc::new(InMemoryDocumentDatabase::new());
    let registry = ServiceRegistry::new(database, Arc::new(LocalToolService::new()));

    registry
        .update_service("weather_plugin", ServiceKind::Sdk { url: "http://localhost:9999".to_string() })
        .await
        .unwrap();

    let names = registry.list_tool_services().await.unwrap();
    assert!(names.contains(&"local".to_string()));
    assert!(names.contains(&"weather_plugin".to_string()));

    registry.delete_service("weather_plugin").await.unwrap();
    assert!(registry.read_tool_service("weather_plugin").await.is_err());
}
