//! The bounded iterative processing pipeline (spec §4.2): propose
//! guidelines, call whatever tools they warrant, and repeat until no
//! proposition is tool-enabled or `agent.max_engine_iterations` is reached,
//! then produce the final reply.
//!
//! Grounded in `core/mc.py`'s `_process_session`, which interleaves
//! guideline matching and tool calling across a bounded number of rounds
//! before handing off to the message producer; the per-round tool-call
//! batching is [`tool_caller::call_tools`], grounded separately in
//! `tool_event_producer.py`.

pub mod message_producer;
pub mod proposer;
pub mod tool_caller;

use crate::config::RuntimeConfig;
use crate::context::{ContextVariable, ContextVariableValue, Message};
use crate::agent::Agent;
use crate::error::Result;
use crate::event::{EmittedEvent, EventBuffer};
use crate::generation::SchematicGenerator;
use crate::glossary::Term;
use crate::guideline::{AssociationStore, Guideline};
use crate::services::registry::ServiceRegistry;
use crate::tool::ToolContext;
use message_producer::{produce_message, ProducedMessage};
use proposer::{propose_guidelines, GuidelineProposition};
use std::collections::HashMap;
use tool_caller::{call_tools, ExecutedToolCall};
use tracing::debug;

/// Ties the proposer, tool caller, and message producer into one bounded
/// loop for a single customer turn.
pub struct Pipeline<'a> {
    pub generator: &'a dyn SchematicGenerator,
    pub registry: &'a ServiceRegistry,
    pub associations: &'a AssociationStore,
    pub config: &'a RuntimeConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        generator: &'a dyn SchematicGenerator,
        registry: &'a ServiceRegistry,
        associations: &'a AssociationStore,
        config: &'a RuntimeConfig,
    ) -> Self {
        Self {
            generator,
            registry,
            associations,
            config,
        }
    }

    /// Runs the bounded propose/call-tools loop, then produces the final
    /// reply. Tool and message side effects are staged into `buffer` under
    /// `correlation_id`, matching the single-event-per-batch contract the
    /// original tool/message producers follow.
    pub async fn process_turn(
        &self,
        agent: &Agent,
        candidates: &[Guideline],
        history: &mut Vec<Message>,
        context_values: &[(ContextVariable, ContextVariableValue)],
        terms: &[Term],
        tool_context: &ToolContext,
        correlation_id: &str,
        buffer: &EventBuffer,
    ) -> Result<ProducedMessage> {
        let mut propositions: Vec<GuidelineProposition> = Vec::new();
        let mut all_tool_calls: Vec<ExecutedToolCall> = Vec::new();

        for iteration in 0..agent.max_engine_iterations {
            propositions =
                propose_guidelines(self.generator, candidates, history, context_values, terms, self.config).await?;

            let tool_enabled: Vec<Guideline> = propositions
                .iter()
                .filter(|p| self.associations.is_tool_enabled(p.guideline.id))
                .map(|p| p.guideline.clone())
                .collect();

            if tool_enabled.is_empty() {
                debug!(iteration, "no tool-enabled propositions, ending tool-call loop");
                break;
            }

            let by_service = group_by_service(&tool_enabled, self.associations);
            let mut any_calls_this_iteration = false;

            for (service_name, guidelines) in by_service {
                let service = self.registry.read_tool_service(&service_name).await?;
                let calls = call_tools(
                    self.generator,
                    &service,
                    self.associations,
                    &guidelines,
                    history,
                    context_values,
                    terms,
                    tool_context,
                )
                .await?;

                if !calls.is_empty() {
                    any_calls_this_iteration = true;
                    buffer.push(EmittedEvent::tool(
                        correlation_id,
                        serde_json::json!({ "tool_calls": calls }),
                    ));

                    for call in &calls {
                        if let Some(result) = &call.result {
                            history.push(Message::tool(format!("{}: {}", call.tool_name, result.data)));
                        }
                    }

                    all_tool_calls.extend(calls);
                }
            }

            if !any_calls_this_iteration {
                debug!(iteration, "no tool calls produced this iteration, ending tool-call loop");
                break;
            }
        }

        let produced =
            produce_message(self.generator, &propositions, &all_tool_calls, history, context_values, self.config)
                .await?;

        // Spec §4.5: an empty-content revision emits no message event.
        if !produced.content.is_empty() {
            buffer.push(EmittedEvent::message(
                correlation_id,
                serde_json::json!({ "message": produced.content }),
            ));
        } else {
            debug!("message producer yielded empty content, emitting no message event");
        }

        Ok(produced)
    }
}

fn group_by_service(
    tool_enabled: &[Guideline],
    associations: &AssociationStore,
) -> HashMap<String, Vec<Guideline>> {
    let mut by_service: HashMap<String, Vec<Guideline>> = HashMap::new();
    for guideline in tool_enabled {
        for tool_id in associations.tools_for(guideline.id) {
            by_service
                .entry(tool_id.service_name)
                .or_default()
                .push(guideline.clone());
        }
    }
    by_service
}
