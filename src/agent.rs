//! Agent definition
//!
//! An `Agent` is immutable configuration data (spec §3): a name, an optional
//! description, and `max_engine_iterations` bounding the processing
//! pipeline's proposer/tool-caller loop. It owns its guidelines, terms,
//! context variables, and guideline-tool associations via the
//! `guideline_set = agent_id` convention, but does not itself run the
//! pipeline — that is the [`crate::dispatcher::SessionDispatcher`]'s job.

use crate::types::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_max_engine_iterations() -> u32 {
    3
}

/// An agent: a named, versioned bundle of behavior-shaping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_max_engine_iterations")]
    pub max_engine_iterations: u32,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Create a new agent with the default iteration bound (3).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: AgentId::new(),
            name: name.into(),
            description: None,
            max_engine_iterations: default_max_engine_iterations(),
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the bound on proposer/tool-caller iterations per turn.
    ///
    /// # Panics
    /// Panics if `iterations` is zero; the spec requires `max_engine_iterations ≥ 1`.
    pub fn with_max_engine_iterations(mut self, iterations: u32) -> Self {
        assert!(
            iterations >= 1,
            "max_engine_iterations must be at least 1"
        );
        self.max_engine_iterations = iterations;
        self
    }
}
