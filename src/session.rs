//! Session lifecycle
//!
//! A session is created on first contact between an end user and an agent,
//! deleted only explicitly, and otherwise permanent (spec §3) — there is no
//! completed/terminated lifecycle state the way the teacher's original
//! `Session` modeled one. `mode` is a separate axis from lifecycle: `auto`
//! (the agent replies automatically) vs `manual` (a human has taken over),
//! switchable at tool-result persistence time via `ToolResult.control.mode`.

use crate::tool::SessionMode;
use crate::types::{AgentId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A conversation between one end user and one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub agent_id: AgentId,
    pub end_user_id: String,
    pub title: Option<String>,
    pub mode: SessionMode,
    /// Per-consumer (e.g. a UI client, a webhook subscriber) last-seen offset.
    #[serde(default)]
    pub consumption_offsets: HashMap<String, u64>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(agent_id: AgentId, end_user_id: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            agent_id,
            end_user_id: end_user_id.into(),
            title: None,
            mode: SessionMode::Auto,
            consumption_offsets: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Idempotent setter: repeated calls with the same offset are no-ops.
    pub fn update_consumption_offset(&mut self, consumer_id: impl Into<String>, offset: u64) {
        self.consumption_offsets.insert(consumer_id.into(), offset);
    }

    pub fn consumption_offset(&self, consumer_id: &str) -> Option<u64> {
        self.consumption_offsets.get(consumer_id).copied()
    }

    /// Applied at tool-result persistence time when a `ToolResult` carries a
    /// `control.mode`.
    pub fn set_mode(&mut self, mode: SessionMode) {
        self.mode = mode;
    }
}
