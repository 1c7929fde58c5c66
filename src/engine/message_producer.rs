//! The message producer: drafts a reply, then revises it until it follows
//! every activated guideline or the revision budget is exhausted.
//!
//! Grounded in `engines/alpha/event_producer.py`: the generator is asked for
//! a sequence of revisions in one call (`{"revisions": [...]}`), each
//! carrying `rules_followed`/`rules_broken`/`followed_all_rules`; the last
//! revision in the sequence is used regardless of whether it fully complied,
//! and a warning is logged if it didn't (the original never retries beyond
//! that single call — [`RuntimeConfig::message_revision_budget`] here
//! instead bounds a loop of such calls, each one seeded with the previous
//! round's unmet guidelines, since a single generator call cannot be
//! guaranteed to converge).
//!
//! Spec §4.5 orders the prompt as interaction history, then context
//! variables, then guideline propositions, then staged tool events; the
//! "context variables" section is emitted only when non-empty.

use crate::config::RuntimeConfig;
use crate::context::{ContextVariable, ContextVariableValue, Message};
use crate::engine::proposer::GuidelineProposition;
use crate::engine::tool_caller::ExecutedToolCall;
use crate::error::Result;
use crate::generation::{GenerationHints, SchematicGenerator, SchematicGeneratorExt};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
struct Revision {
    content: String,
    #[serde(default)]
    #[allow(dead_code)]
    rules_followed: Vec<String>,
    rules_broken: Vec<String>,
    followed_all_rules: bool,
}

#[derive(Debug, Deserialize)]
struct RevisionSequence {
    revisions: Vec<Revision>,
}

/// The final drafted reply plus whether it fully complied with the
/// guidelines it was revised against.
#[derive(Debug, Clone)]
pub struct ProducedMessage {
    pub content: String,
    pub followed_all_rules: bool,
}

/// Drafts and iteratively revises a reply against `propositions`, bounded by
/// `config.message_revision_budget` rounds.
pub async fn produce_message(
    generator: &dyn SchematicGenerator,
    propositions: &[GuidelineProposition],
    tool_calls: &[ExecutedToolCall],
    history: &[Message],
    context_values: &[(ContextVariable, ContextVariableValue)],
    config: &RuntimeConfig,
) -> Result<ProducedMessage> {
    let mut unmet: Vec<String> = propositions
        .iter()
        .map(|p| p.guideline.content.action.clone())
        .collect();

    let mut last = ProducedMessage {
        content: String::new(),
        followed_all_rules: unmet.is_empty(),
    };

    for round_number in 0..config.message_revision_budget.max(1) {
        let prompt = build_prompt(propositions, tool_calls, history, context_values, &unmet, round_number);
        let sequence = generator
            .generate::<RevisionSequence>(&prompt, &GenerationHints::default().with_temperature(0.5))
            .await?
            .content;

        let final_revision = sequence
            .revisions
            .last()
            .cloned()
            .unwrap_or(Revision {
                content: String::new(),
                rules_followed: Vec::new(),
                rules_broken: Vec::new(),
                followed_all_rules: true,
            });

        last = ProducedMessage {
            content: final_revision.content,
            followed_all_rules: final_revision.followed_all_rules,
        };

        if last.followed_all_rules {
            return Ok(last);
        }

        unmet = final_revision.rules_broken;
    }

    warn!(
        unmet_count = unmet.len(),
        "message producer exhausted its revision budget without following every guideline"
    );
    Ok(last)
}

fn build_prompt(
    propositions: &[GuidelineProposition],
    tool_calls: &[ExecutedToolCall],
    history: &[Message],
    context_values: &[(ContextVariable, ContextVariableValue)],
    unmet: &[String],
    round_number: usize,
) -> String {
    let mut prompt = String::new();
    prompt.push_str("Draft a reply to the customer, then produce a sequence of revisions that progressively better follow the guidelines below.\n\n");

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

    prompt.push_str("\nGuidelines to follow:\n");
    for proposition in propositions {
        prompt.push_str(&format!("- {}\n", proposition.guideline.content.action));
    }

    if !tool_calls.is_empty() {
        prompt.push_str("\nTool results:\n");
        for call in tool_calls {
            match &call.result {
                Some(result) => prompt.push_str(&format!("- {}: {}\n", call.tool_name, result.data)),
                None => prompt.push_str(&format!("- {} failed: {}\n", call.tool_name, call.error.as_deref().unwrap_or("unknown error"))),
            }
        }
    }

    if round_number > 0 {
        prompt.push_str("\nThe previous revision still broke these guidelines; address them:\n");
        for rule in unmet {
            prompt.push_str(&format!("- {rule}\n"));
        }
    }

    prompt.push_str(
        "\nRespond with JSON: {\"revisions\": [{\"content\": <string>, \"rules_followed\": [<string>], \"rules_broken\": [<string>], \"followed_all_rules\": <bool>}]}",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guideline::{Guideline, GuidelineContent};
    use crate::types::AgentId;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ConvergesImmediately;

    #[async_trait]
    impl SchematicGenerator for ConvergesImmediately {
        async fn generate_value(
            &self,
            _prompt: &str,
            _hints: &GenerationHints,
        ) -> Result<Value, crate::error::GenerationError> {
            Ok(serde_json::json!({
                "revisions": [
                    {"content": "draft", "rules_followed": [], "rules_broken": ["be concise"], "followed_all_rules": false},
                    {"content": "Sure, here's your balance.", "rules_followed": ["be concise"], "rules_broken": [], "followed_all_rules": true}
                ]
            }))
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    struct NeverConverges {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SchematicGenerator for NeverConverges {
        async fn generate_value(
            &self,
            _prompt: &str,
            _hints: &GenerationHints,
        ) -> Result<Value, crate::error::GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({
                "revisions": [
                    {"content": "still not quite right", "rules_followed": [], "rules_broken": ["be concise"], "followed_all_rules": false}
                ]
            }))
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn sample_proposition() -> GuidelineProposition {
        let agent_id = AgentId::new();
        GuidelineProposition {
            guideline: Guideline::new(agent_id, GuidelineContent::new("user asks balance", "be concise")),
            score: 9,
        }
    }

    #[tokio::test]
    async fn test_takes_last_revision_in_sequence() {
        let generator = ConvergesImmediately;
        let config = RuntimeConfig::default();
        let propositions = vec![sample_proposition()];

        let produced = produce_message(&generator, &propositions, &[], &[], &[], &config).await.unwrap();

        assert_eq!(produced.content, "Sure, here's your balance.");
        assert!(produced.followed_all_rules);
    }

    #[tokio::test]
    async fn test_stops_retrying_after_revision_budget_exhausted() {
        let generator = NeverConverges { calls: AtomicUsize::new(0) };
        let mut config = RuntimeConfig::default();
        config.message_revision_budget = 2;
        let propositions = vec![sample_proposition()];

        let produced = produce_message(&generator, &propositions, &[], &[], &[], &config).await.unwrap();

        assert!(!produced.followed_all_rules);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_propositions_is_trivially_compliant_before_first_round() {
        let generator = ConvergesImmediately;
        let config = RuntimeConfig::default();

        let produced = produce_message(&generator, &[], &[], &[], &[], &config).await.unwrap();
        assert_eq!(produced.content, "Sure, here's your balance.");
    }
}
