//! Guidelines: declarative condition/action rules shaping agent behavior
//!
//! A guideline's content is identified for caching/indexing purposes by the
//! MD5 of `condition || "_" || action` (spec §3, grounded in the original
//! `indexing/indexer.py`, which hashes `f"{predicate}_{action}"`).

use crate::types::{AgentId, GuidelineId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The condition/action pair a guideline expresses, both free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidelineContent {
    pub condition: String,
    pub action: String,
}

impl GuidelineContent {
    pub fn new(condition: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            action: action.into(),
        }
    }

    /// MD5 checksum of `condition || "_" || action`, used by the indexer to
    /// detect introduced/existing/deleted guidelines without a full diff.
    pub fn checksum(&self) -> String {
        let digest = md5::compute(format!("{}_{}", self.condition, self.action));
        format!("{:x}", digest)
    }
}

/// A behavioral rule belonging to one agent's guideline set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guideline {
    pub id: GuidelineId,
    pub guideline_set: AgentId,
    pub content: GuidelineContent,
    pub created_at: DateTime<Utc>,
}

impl Guideline {
    pub fn new(guideline_set: AgentId, content: GuidelineContent) -> Self {
        Self {
            id: GuidelineId::new(),
            guideline_set,
            content,
            created_at: Utc::now(),
        }
    }

    pub fn checksum(&self) -> String {
        self.content.checksum()
    }
}

/// Whether a guideline's action has already been carried out earlier in the
/// session, derived from the history of agent events (spec §4.3). Guidelines
/// marked `Fully` do not re-fire on every turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviouslyApplied {
    Fully,
    Partially,
    No,
}

impl PreviouslyApplied {
    pub fn as_prompt_str(self) -> &'static str {
        match self {
            PreviouslyApplied::Fully => "fully",
            PreviouslyApplied::Partially => "partially",
            PreviouslyApplied::No => "no",
        }
    }
}

/// A (guideline, tool) pairing: marks a guideline as tool-enabled (spec §3,
/// §4.6 `guideline_tool_associations`). A guideline with at least one
/// association is placed in the proposer's `tool_enabled` set rather than
/// `ordinary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidelineToolAssociation {
    pub guideline_id: GuidelineId,
    pub tool_id: crate::tool::ToolId,
    pub created_at: DateTime<Utc>,
}

impl GuidelineToolAssociation {
    pub fn new(guideline_id: GuidelineId, tool_id: crate::tool::ToolId) -> Self {
        Self {
            guideline_id,
            tool_id,
            created_at: Utc::now(),
        }
    }
}

/// An in-memory index of guideline→tool associations, scoped across all
/// agents (associations are looked up by guideline id, which already scopes
/// to one agent's guideline set).
#[derive(Default)]
pub struct AssociationStore {
    by_guideline: std::sync::RwLock<std::collections::HashMap<GuidelineId, Vec<crate::tool::ToolId>>>,
}

impl AssociationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn associate(&self, guideline_id: GuidelineId, tool_id: crate::tool::ToolId) {
        self.by_guideline
            .write()
            .expect("association store lock poisoned")
            .entry(guideline_id)
            .or_default()
            .push(tool_id);
    }

    /// Tools associated with a guideline, empty if the guideline is purely
    /// ordinary (no tools).
    pub fn tools_for(&self, guideline_id: GuidelineId) -> Vec<crate::tool::ToolId> {
        self.by_guideline
            .read()
            .expect("association store lock poisoned")
            .get(&guideline_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_tool_enabled(&self, guideline_id: GuidelineId) -> bool {
        !self.tools_for(guideline_id).is_empty()
    }
}

#[cfg(test)]
mod association_tests {
    use super::*;
    use crate::tool::ToolId;

    #[test]
    fn test_guideline_without_association_is_ordinary() {
        let store = AssociationStore::new();
        let guideline_id = GuidelineId::new();
        assert!(!store.is_tool_enabled(guideline_id));
    }

    #[test]
    fn test_guideline_with_association_is_tool_enabled() {
        let store = AssociationStore::new();
        let guideline_id = GuidelineId::new();
        store.associate(guideline_id, ToolId::local("read_balance"));
        assert!(store.is_tool_enabled(guideline_id));
        assert_eq!(store.tools_for(guideline_id).len(), 1);
    }

    #[test]
    fn test_guideline_can_have_multiple_tools() {
        let store = AssociationStore::new();
        let guideline_id = GuidelineId::new();
        store.associate(guideline_id, ToolId::local("a"));
        store.associate(guideline_id, ToolId::local("b"));
        assert_eq!(store.tools_for(guideline_id).len(), 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_deterministic() {
        let content = GuidelineContent::new("user greets", "greet back");
        assert_eq!(content.checksum(), content.checksum());
    }

    #[test]
    fn test_checksum_changes_with_content() {
        let a = GuidelineContent::new("user greets", "greet back");
        let b = GuidelineContent::new("user greets", "greet back in French");
        assert_ne!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_checksum_is_hex_md5_length() {
        let content = GuidelineContent::new("a", "b");
        assert_eq!(content.checksum().len(), 32);
    }

    #[test]
    fn test_guideline_belongs_to_agent_set() {
        let agent_id = AgentId::new();
        let guideline = Guideline::new(agent_id, GuidelineContent::new("x", "y"));
        assert_eq!(guideline.guideline_set, agent_id);
    }
}
