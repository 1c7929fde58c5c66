//! The guideline indexer: classifies which guidelines changed since the
//! last indexing pass and (re)proposes connections between them.
//!
//! Grounded in `indexing/indexer.py`: each guideline's checksum (spec §3,
//! [`crate::guideline::GuidelineContent::checksum`]) is compared against a
//! previously persisted index to classify it as introduced, existing
//! (unchanged), or deleted; introduced and existing guidelines are then
//! checked pairwise for connections, and any edge scoring at least
//! [`RuntimeConfig::connection_persist_threshold`] (the original's
//! `applies_score >= 6`) is persisted via [`ConnectionGraph::update_connection`].
//! Guidelines classified as deleted have their connections purged via
//! [`ConnectionGraph::remove_guideline`].

use crate::config::RuntimeConfig;
use crate::connection::{ConnectionGraph, ConnectionKind};
use crate::error::Result;
use crate::generation::{GenerationHints, SchematicGenerator, SchematicGeneratorExt};
use crate::guideline::Guideline;
use crate::types::GuidelineId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// One entry in a persisted guideline index: the checksum recorded the last
/// time this guideline was indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidelineIndexEntry {
    pub guideline_id: GuidelineId,
    pub checksum: String,
}

/// The classification of a guideline set against its previous index.
#[derive(Debug, Clone, Default)]
pub struct IndexDiff {
    pub introduced: Vec<Guideline>,
    pub existing: Vec<Guideline>,
    pub deleted: Vec<GuidelineId>,
}

/// Compares `current` against `previous_index` by checksum, classifying
/// each guideline as introduced (new id), existing (same id, same
/// checksum), or — implicitly — modified (same id, different checksum,
/// treated as introduced since its content now needs re-indexing).
/// Guideline ids present in `previous_index` but absent from `current` are
/// deleted.
pub fn assess_modifications(previous_index: &[GuidelineIndexEntry], current: &[Guideline]) -> IndexDiff {
    let mut previous_checksums = std::collections::HashMap::new();
    for entry in previous_index {
        previous_checksums.insert(entry.guideline_id, entry.checksum.clone());
    }

    let mut diff = IndexDiff::default();
    let mut seen_ids = HashSet::new();

    for guideline in current {
        seen_ids.insert(guideline.id);
        match previous_checksums.get(&guideline.id) {
            Some(checksum) if *checksum == guideline.checksum() => diff.existing.push(guideline.clone()),
            _ => diff.introduced.push(guideline.clone()),
        }
    }

    for entry in previous_index {
        if !seen_ids.contains(&entry.guideline_id) {
            diff.deleted.push(entry.guideline_id);
        }
    }

    diff
}

#[derive(Debug, Deserialize)]
struct ConnectionCheck {
    target_number: usize,
    applies_score: u8,
    #[serde(default = "default_connection_kind")]
    kind: ConnectionKindWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ConnectionKindWire {
    Entails,
    Suggests,
}

fn default_connection_kind() -> ConnectionKindWire {
    ConnectionKindWire::Suggests
}

impl From<ConnectionKindWire> for ConnectionKind {
    fn from(wire: ConnectionKindWire) -> Self {
        match wire {
            ConnectionKindWire::Entails => ConnectionKind::Entails,
            ConnectionKindWire::Suggests => ConnectionKind::Suggests,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectionCheckBatch {
    connections: Vec<ConnectionCheck>,
}

/// Re-indexes one agent's guideline set: purges connections for deleted
/// guidelines, proposes and persists connections from every
/// introduced-or-existing guideline to every other current guideline, and
/// returns the new index to persist for next time.
pub struct GuidelineIndexer<'a> {
    pub generator: &'a dyn SchematicGenerator,
    pub connections: &'a ConnectionGraph,
    pub config: &'a RuntimeConfig,
}

impl<'a> GuidelineIndexer<'a> {
    pub fn new(
        generator: &'a dyn SchematicGenerator,
        connections: &'a ConnectionGraph,
        config: &'a RuntimeConfig,
    ) -> Self {
        Self {
            generator,
            connections,
            config,
        }
    }

    /// Whether a reindex is warranted at all: skipped entirely when the
    /// current guideline set is checksum-identical to the previous index
    /// (spec §4.7's `should_index`).
    pub fn should_index(&self, previous_index: &[GuidelineIndexEntry], current: &[Guideline]) -> bool {
        let diff = assess_modifications(previous_index, current);
        !diff.introduced.is_empty() || !diff.deleted.is_empty()
    }

    pub async fn index(
        &self,
        previous_index: &[GuidelineIndexEntry],
        current: &[Guideline],
    ) -> Result<Vec<GuidelineIndexEntry>> {
        let diff = assess_modifications(previous_index, current);

        for deleted_id in &diff.deleted {
            self.connections.remove_guideline(*deleted_id).await;
        }

        let candidates: Vec<&Guideline> = diff.introduced.iter().chain(diff.existing.iter()).collect();

        for source in &candidates {
            let others: Vec<&Guideline> = current.iter().filter(|g| g.id != source.id).collect();
            if others.is_empty() {
                continue;
            }

            let checks = self.propose_connections(source, &others).await?;
            for check in checks {
                if check.applies_score >= self.config.connection_persist_threshold {
                    if let Some(target) = others.get(check.target_number) {
                        self.connections
                            .update_connection(source.id, target.id, check.kind.into())
                            .await;
                    }
                }
            }
        }

        debug!(
            introduced = diff.introduced.len(),
            existing = diff.existing.len(),
            deleted = diff.deleted.len(),
            "guideline indexing pass complete"
        );

        Ok(current
            .iter()
            .map(|g| GuidelineIndexEntry {
                guideline_id: g.id,
                checksum: g.checksum(),
            })
            .collect())
    }

    async fn propose_connections(
        &self,
        source: &Guideline,
        others: &[&Guideline],
    ) -> Result<Vec<ConnectionCheck>> {
        let prompt = build_connection_prompt(source, others);
        let hints = GenerationHints::default().with_temperature(0.0);
        let result = self
            .generator
            .generate::<ConnectionCheckBatch>(&prompt, &hints)
            .await?;
        Ok(result.content.connections)
    }
}

fn build_connection_prompt(source: &Guideline, others: &[&Guideline]) -> String {
    let mut prompt = String::new();
    prompt.push_str("Decide whether the following source guideline connects to (entails or suggests) any of the target guidelines.\n\n");
    prompt.push_str(&format!(
        "Source: condition=\"{}\" action=\"{}\"\n\n",
        source.content.condition, source.content.action
    ));

    prompt.push_str("Targets:\n");
    for (index, target) in others.iter().enumerate() {
        prompt.push_str(&format!(
            "{index}. condition=\"{}\" action=\"{}\"\n",
            target.content.condition, target.content.action
        ));
    }

    prompt.push_str(
        "\nRespond with JSON: {\"connections\": [{\"target_number\": <int>, \"applies_score\": <1-10>, \"kind\": \"entails\"|\"suggests\"}]}",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guideline::GuidelineContent;
    use crate::types::AgentId;
    use async_trait::async_trait;
    use serde_json::Value;

    fn guideline(agent_id: AgentId, condition: &str, action: &str) -> Guideline {
        Guideline::new(agent_id, GuidelineContent::new(condition, action))
    }

    #[test]
    fn test_assess_modifications_classifies_introduced_existing_deleted() {
        let agent_id = AgentId::new();
        let kept = guideline(agent_id, "a", "b");
        let deleted = guideline(agent_id, "c", "d");
        let introduced = guideline(agent_id, "e", "f");

        let previous_index = vec![
            GuidelineIndexEntry { guideline_id: kept.id, checksum: kept.checksum() },
            GuidelineIndexEntry { guideline_id: deleted.id, checksum: deleted.checksum() },
        ];

        let current = vec![kept.clone(), introduced.clone()];
        let diff = assess_modifications(&previous_index, &current);

        assert_eq!(diff.existing.len(), 1);
        assert_eq!(diff.existing[0].id, kept.id);
        assert_eq!(diff.introduced.len(), 1);
        assert_eq!(diff.introduced[0].id, introduced.id);
        assert_eq!(diff.deleted, vec![deleted.id]);
    }

    #[test]
    fn test_modified_content_reclassified_as_introduced() {
        let agent_id = AgentId::new();
        let guideline = guideline(agent_id, "a", "b");
        let previous_index = vec![GuidelineIndexEntry {
            guideline_id: guideline.id,
            checksum: "stale-checksum".to_string(),
        }];

        let diff = assess_modifications(&previous_index, &[guideline.clone()]);
        assert_eq!(diff.introduced.len(), 1);
        assert!(diff.existing.is_empty());
    }

    struct StubGenerator;

    #[async_trait]
    impl SchematicGenerator for StubGenerator {
        async fn generate_value(
            &self,
            _prompt: &str,
            _hints: &GenerationHints,
        ) -> Result<Value, crate::error::GenerationError> {
            Ok(serde_json::json!({
                "connections": [{"target_number": 0, "applies_score": 8, "kind": "entails"}]
            }))
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn test_index_persists_connection_above_threshold() {
        let agent_id = AgentId::new();
        let source = guideline(agent_id, "user greets", "greet back");
        let target = guideline(agent_id, "greeted", "ask how to help");

        let generator = StubGenerator;
        let connections = ConnectionGraph::new();
        let config = RuntimeConfig::default();
        let indexer = GuidelineIndexer::new(&generator, &connections, &config);

        let new_index = indexer.index(&[], &[source.clone(), target.clone()]).await.unwrap();

        assert_eq!(new_index.len(), 2);
        assert!(connections.contains_edge(source.id, target.id).await);
    }

    #[tokio::test]
    async fn test_deleted_guideline_connections_purged() {
        let agent_id = AgentId::new();
        let source = guideline(agent_id, "a", "b");
        let deleted = guideline(agent_id, "c", "d");

        let connections = ConnectionGraph::new();
        connections.update_connection(source.id, deleted.id, ConnectionKind::Suggests).await;

        let generator = StubGenerator;
        let config = RuntimeConfig::default();
        let indexer = GuidelineIndexer::new(&generator, &connections, &config);

        let previous_index = vec![
            GuidelineIndexEntry { guideline_id: source.id, checksum: source.checksum() },
            GuidelineIndexEntry { guideline_id: deleted.id, checksum: deleted.checksum() },
        ];

        indexer.index(&previous_index, &[source.clone()]).await.unwrap();

        assert!(!connections.contains_edge(source.id, deleted.id).await);
    }

    #[tokio::test]
    async fn test_should_index_false_when_nothing_changed() {
        let agent_id = AgentId::new();
        let guideline = guideline(agent_id, "a", "b");
        let previous_index = vec![GuidelineIndexEntry {
            guideline_id: guideline.id,
            checksum: guideline.checksum(),
        }];

        let generator = StubGenerator;
        let connections = ConnectionGraph::new();
        let config = RuntimeConfig::default();
        let indexer = GuidelineIndexer::new(&generator, &connections, &config);

        assert!(!indexer.should_index(&previous_index, &[guideline]));
    }
}
