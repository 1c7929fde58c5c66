//! The guideline proposer: scores every candidate guideline's condition
//! against the current interaction and keeps the ones that apply.
//!
//! Grounded in the original `engines/alpha/guideline_filter.py`: candidates
//! are split into fixed-size batches (spec default 5, [`GUIDELINE_BATCH_SIZE`]),
//! every batch is scored concurrently by one generator call, and a
//! guideline is "proposed" once its score clears
//! [`RuntimeConfig::guideline_applicability_threshold`] (spec §4.3, default
//! 7 — the original hardcodes 8, see `DESIGN.md` Open Question (iii) for why
//! this crate keeps the two thresholds distinct and configurable).
//!
//! Spec §4.3 names the proposer's input as "history, context values, terms,
//! candidate guidelines" — `context_values` and `terms` are rendered into
//! every batch's prompt alongside the conversation so far.

use crate::config::RuntimeConfig;
use crate::context::{ContextVariable, ContextVariableValue, Message, MessageRole};
use crate::error::Result;
use crate::generation::{GenerationHints, SchematicGenerator, SchematicGeneratorExt};
use crate::glossary::Term;
use crate::guideline::{Guideline, PreviouslyApplied};
use futures::future::join_all;
use serde::Deserialize;
use tracing::debug;

/// Fraction of a guideline action's significant words that must already
/// appear in an assistant reply for the action to count as having fired.
const FULLY_APPLIED_WORD_OVERLAP: f64 = 0.6;

/// Derives whether `guideline`'s action already played out earlier in
/// `history`, so the prompt can tell the generator not to re-fire a
/// once-satisfied guideline on every subsequent turn (spec §4.3 "Guideline
/// previously applied"). This is a coarse word-overlap heuristic, not a
/// ground-truth record of which guidelines actually fired each turn — the
/// source tracks that via structured `GuidelineMatch` history, which this
/// crate's plain `Message` history does not carry.
fn classify_previously_applied(guideline: &Guideline, history: &[Message]) -> PreviouslyApplied {
    let action_words: Vec<String> = significant_words(&guideline.content.action);
    if action_words.is_empty() {
        return PreviouslyApplied::No;
    }

    let mut best_overlap = 0.0f64;
    for message in history {
        if message.role != MessageRole::Assistant {
            continue;
        }
        let reply = message.content.to_lowercase();
        let matched = action_words.iter().filter(|w| reply.contains(w.as_str())).count();
        let overlap = matched as f64 / action_words.len() as f64;
        if overlap > best_overlap {
            best_overlap = overlap;
        }
    }

    if best_overlap >= FULLY_APPLIED_WORD_OVERLAP {
        PreviouslyApplied::Fully
    } else if best_overlap > 0.0 {
        PreviouslyApplied::Partially
    } else {
        PreviouslyApplied::No
    }
}

fn significant_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| w.len() > 3)
        .collect()
}


/// One guideline's applicability check, scored 1-10 by the generator.
#[derive(Debug, Clone, Deserialize)]
struct PredicateCheck {
    predicate_number: usize,
    #[allow(dead_code)]
    rationale: String,
    applies_score: u8,
}

#[derive(Debug, Deserialize)]
struct PredicateCheckBatch {
    checks: Vec<PredicateCheck>,
}

/// A guideline judged applicable to the current interaction, carrying the
/// score that cleared the threshold.
#[derive(Debug, Clone)]
pub struct GuidelineProposition {
    pub guideline: Guideline,
    pub score: u8,
}

/// Scores `candidates` against `history`, `context_values`, and `terms`, and
/// returns the ones whose score clears `config.guideline_applicability_threshold`.
pub async fn propose_guidelines(
    generator: &dyn SchematicGenerator,
    candidates: &[Guideline],
    history: &[Message],
    context_values: &[(ContextVariable, ContextVariableValue)],
    terms: &[Term],
    config: &RuntimeConfig,
) -> Result<Vec<GuidelineProposition>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let batches: Vec<&[Guideline]> = candidates.chunks(config.guideline_batch_size).collect();

    let batch_results = join_all(
        batches
            .iter()
            .map(|batch| score_batch(generator, batch, history, context_values, terms)),
    )
    .await;

    let mut propositions = Vec::new();
    for (batch, checks) in batches.iter().zip(batch_results) {
        let checks = checks?;
        for check in checks {
            if check.applies_score >= config.guideline_applicability_threshold {
                if let Some(guideline) = batch.get(check.predicate_number) {
                    propositions.push(GuidelineProposition {
                        guideline: guideline.clone(),
                        score: check.applies_score,
                    });
                }
            }
        }
    }

    // Descending by score; `sort_by` is stable, so equal scores keep the
    // input order they were pushed in (spec §4.3 Tie-breaks).
    propositions.sort_by(|a, b| b.score.cmp(&a.score));

    debug!(
        candidates = candidates.len(),
        proposed = propositions.len(),
        "guideline proposer finished"
    );

    Ok(propositions)
}

async fn score_batch(
    generator: &dyn SchematicGenerator,
    batch: &[Guideline],
    history: &[Message],
    context_values: &[(ContextVariable, ContextVariableValue)],
    terms: &[Term],
) -> Result<Vec<PredicateCheck>> {
    let prompt = build_prompt(batch, history, context_values, terms);
    let hints = GenerationHints::default().with_temperature(0.0);
    let result = generator
        .generate::<PredicateCheckBatch>(&prompt, &hints)
        .await?;
    Ok(result.content.checks)
}

fn build_prompt(
    batch: &[Guideline],
    history: &[Message],
    context_values: &[(ContextVariable, ContextVariableValue)],
    terms: &[Term],
) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are evaluating which of the following predicates (guideline conditions) apply to the conversation so far.\n\n");

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

    prompt.push_str("\nPredicates:\n");
    for (index, guideline) in batch.iter().enumerate() {
        let applied = classify_previously_applied(guideline, history);
        prompt.push_str(&format!(
            "{index}. {} (previously applied this session: {})\n",
            guideline.content.condition,
            applied.as_prompt_str()
        ));
    }

    prompt.push_str(
        "\nRespond with JSON: {\"checks\": [{\"predicate_number\": <int>, \"rationale\": <string>, \"applies_score\": <1-10>}]}",
    );

    prompt
}
