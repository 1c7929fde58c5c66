//! The tool caller: infers arguments for every tool-enabled guideline
//! proposition and executes the calls concurrently.
//!
//! Grounded in `core/engines/alpha/tool_event_producer.py`: if no
//! proposition is tool-enabled the stage is a no-op; otherwise every
//! inferred call in the batch runs concurrently via `asyncio.gather`
//! (mirrored here with [`futures::future::join_all`]) and the whole batch is
//! recorded as a single `tool` event carrying `tool_calls: [...]`. Per spec
//! §9 Open Question (ii), calls within one iteration never see each other's
//! results — arguments are inferred from a frozen snapshot of the
//! conversation before any call in the batch runs.
//!
//! Spec §4.4 names "terms" (and, alongside the proposer, context values) as
//! part of the tool caller's input; both are rendered into the inference
//! prompt alongside the conversation and activated guidelines.

use crate::context::{ContextVariable, ContextVariableValue, Message};
use crate::error::{Result, ToolError};
use crate::generation::{GenerationHints, SchematicGenerator, SchematicGeneratorExt};
use crate::glossary::Term;
use crate::guideline::{AssociationStore, Guideline};
use crate::tool::{ToolContext, ToolResult, ToolService};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// One inferred call: which tool, with what arguments.
#[derive(Debug, Clone, Deserialize)]
struct InferredCall {
    tool_name: String,
    arguments: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct InferredCallBatch {
    calls: Vec<InferredCall>,
}

/// A single executed call, successful or not — recorded verbatim in the
/// batch's `tool` event.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedToolCall {
    pub tool_name: String,
    pub arguments: HashMap<String, Value>,
    pub result: Option<ToolResult>,
    pub error: Option<String>,
}

/// Infers and executes every tool call warranted by `tool_enabled` guideline
/// propositions. Returns an empty vec (no event should be emitted) if none
/// of the propositions are tool-enabled, matching the original's early exit.
pub async fn call_tools(
    generator: &dyn SchematicGenerator,
    service: &Arc<dyn ToolService>,
    associations: &AssociationStore,
    tool_enabled_propositions: &[Guideline],
    history: &[Message],
    context_values: &[(ContextVariable, ContextVariableValue)],
    terms: &[Term],
    context: &ToolContext,
) -> Result<Vec<ExecutedToolCall>> {
    let tool_enabled: Vec<&Guideline> = tool_enabled_propositions
        .iter()
        .filter(|g| associations.is_tool_enabled(g.id))
        .collect();

    if tool_enabled.is_empty() {
        return Ok(Vec::new());
    }

    let prompt = build_prompt(&tool_enabled, associations, history, context_values, terms);
    let hints = GenerationHints::default().with_temperature(0.0);
    let inferred = generator
        .generate::<InferredCallBatch>(&prompt, &hints)
        .await?
        .content
        .calls;

    let executions = join_all(inferred.into_iter().map(|call| async move {
        let outcome = service
            .call_tool(&call.tool_name, context, call.arguments.clone())
            .await;

        match outcome {
            Ok(result) => ExecutedToolCall {
                tool_name: call.tool_name,
                arguments: call.arguments,
                result: Some(result),
                error: None,
            },
            Err(err) => {
                warn!(tool = %call.tool_name, error = %err, "tool call failed");
                ExecutedToolCall {
                    tool_name: call.tool_name,
                    arguments: call.arguments,
                    result: None,
                    error: Some(tool_error_message(err)),
                }
            }
        }
    }))
    .await;

    Ok(executions)
}

fn tool_error_message(error: crate::error::AgentError) -> String {
    match error {
        crate::error::AgentError::ToolExecution(ToolError::ExecutionFailed { message, .. }) => message,
        other => other.to_string(),
    }
}

fn build_prompt(
    tool_enabled: &[&Guideline],
    associations: &AssociationStore,
    history: &[Message],
    context_values: &[(ContextVariable, ContextVariableValue)],
    terms: &[Term],
) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are inferring which tools to call and with what arguments, given the conversation and the following activated guidelines.\n\n");

    prompt.push_str("Conversation:\n");
    for message in history {
        prompt.push_str(&format!("{:?}: {}\n", message.role, message.content));
    }

    if !context_values.is_empty() {
        prompt.push_str("\nContext variables:\n");
        for (variable, value) in context_values {
            prompt.push_str(&format!("- {}: {} ({})\n", variable.name, value.data, variable.description));
        }
    }

    if !terms.is_empty() {
        prompt.push_str("\nRelevant terminology:\n");
        for term in terms {
            prompt.push_str(&format!("- {}\n", term.indexed_text()));
        }
    }

    prompt.push_str("\nActivated tool-enabled guidelines:\n");
    for guideline in tool_enabled {
        let tools = associations.tools_for(guideline.id);
        prompt.push_str(&format!(
            "- {} => {} (tools: {})\n",
            guideline.content.condition,
            guideline.content.action,
            tools.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
        ));
    }

    prompt.push_str(
        "\nRespond with JSON: {\"calls\": [{\"tool_name\": <string>, \"arguments\": {...}}]}. Omit calls that aren't warranted.",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::local::LocalToolService;
    use crate::tool::{Tool, ToolParameter, ToolParameterType};
    use crate::types::{AgentId, SessionId};
    use async_trait::async_trait;

    struct StubGenerator;

    #[async_trait]
    impl SchematicGenerator for StubGenerator {
        async fn generate_value(
            &self,
            _prompt: &str,
            _hints: &GenerationHints,
        ) -> Result<Value, crate::error::GenerationError> {
            Ok(serde_json::json!({
                "calls": [
                    {"tool_name": "get_balance", "arguments": {"account_id": "acc-1"}}
                ]
            }))
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn test_context() -> ToolContext {
        ToolContext::new(AgentId::new(), SessionId::new(), |_| {}, |_, _| {})
    }

    #[tokio::test]
    async fn test_no_tool_enabled_guidelines_short_circuits() {
        let generator = StubGenerator;
        let local = Arc::new(LocalToolService::new());
        let service: Arc<dyn ToolService> = local;
        let associations = AssociationStore::new();

        let agent_id = AgentId::new();
        let guideline = Guideline::new(agent_id, crate::guideline::GuidelineContent::new("x", "y"));

        let calls = call_tools(
            &generator,
            &service,
            &associations,
            &[guideline],
            &[],
            &[],
            &[],
            &test_context(),
        )
        .await
        .unwrap();

        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn test_executes_inferred_call_against_local_service() {
        let generator = StubGenerator;
        let local = Arc::new(LocalToolService::new());
        local.register(
            Tool::new("get_balance", "reads account balance")
                .with_parameter("account_id", ToolParameter::new(ToolParameterType::String))
                .require("account_id"),
            |_ctx, args| async move { Ok(ToolResult::new(serde_json::json!({"balance": 42, "account": args["account_id"]}))) },
        );
        let service: Arc<dyn ToolService> = local;

        let associations = AssociationStore::new();
        let agent_id = AgentId::new();
        let guideline = Guideline::new(
            agent_id,
            crate::guideline::GuidelineContent::new("user asks balance", "look it up"),
        );
        associations.associate(guideline.id, crate::tool::ToolId::local("get_balance"));

        let calls = call_tools(
            &generator,
            &service,
            &associations,
            &[guideline],
            &[Message::user("what's my balance?")],
            &[],
            &[],
            &test_context(),
        )
        .await
        .unwrap();

        assert_eq!(calls.len(), 1);
        assert!(calls[0].error.is_none());
        assert_eq!(calls[0].result.as_ref().unwrap().data["balance"], 42);
    }

    #[tokio::test]
    async fn test_tool_error_is_recorded_not_propagated() {
        let generator = StubGenerator;
        let local = Arc::new(LocalToolService::new());
        // "get_balance" deliberately not registered: the call should fail and be recorded.
        let service: Arc<dyn ToolService> = local;

        let associations = AssociationStore::new();
        let agent_id = AgentId::new();
        let guideline = Guideline::new(agent_id, crate::guideline::GuidelineContent::new("x", "y"));
        associations.associate(guideline.id, crate::tool::ToolId::local("get_balance"));

        let calls = call_tools(
            &generator,
            &service,
            &associations,
            &[guideline],
            &[],
            &[],
            &[],
            &test_context(),
        )
        .await
        .unwrap();

        assert_eq!(calls.len(), 1);
        assert!(calls[0].error.is_some());
    }
}
