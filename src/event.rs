//! The session event log and the in-memory staging buffer
//!
//! An [`Event`] is the unit of the durable per-session log: append-only,
//! offsets assigned server-side, strictly increasing and dense. An
//! [`EmittedEvent`] is the in-flight counterpart a processing task builds up
//! in its [`EventBuffer`] before the pipeline decides whether to persist or
//! discard it (grounded in `core/mc.py`'s `EventBuffer`).

use crate::types::{EventId, SessionId};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Who produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Customer,
    AiAgent,
    System,
}

/// What an event represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    Tool,
    Status,
    Custom,
}

/// A durable, persisted event in a session's log.
///
/// **Invariants** (spec §3, §8 property 1): `offset` is assigned server-side,
/// strictly increasing and dense (0-based) within a session; events are
/// never physically removed, only logically `deleted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub session_id: SessionId,
    pub source: EventSource,
    pub kind: EventKind,
    pub offset: u64,
    pub correlation_id: String,
    pub creation_utc: chrono::DateTime<chrono::Utc>,
    pub data: serde_json::Value,
    #[serde(default)]
    pub deleted: bool,
}

impl Event {
    pub fn new(
        session_id: SessionId,
        source: EventSource,
        kind: EventKind,
        offset: u64,
        correlation_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: EventId::new(),
            session_id,
            source,
            kind,
            offset,
            correlation_id: correlation_id.into(),
            creation_utc: chrono::Utc::now(),
            data,
            deleted: false,
        }
    }
}

/// An in-flight event produced by a processing task, not yet assigned an
/// offset or persisted. Held in the [`EventBuffer`] until the pipeline
/// either flushes it to the store (on normal completion) or discards it (on
/// cancellation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmittedEvent {
    pub source: EventSource,
    pub kind: EventKind,
    pub correlation_id: String,
    pub data: serde_json::Value,
}

impl EmittedEvent {
    pub fn new(
        source: EventSource,
        kind: EventKind,
        correlation_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            source,
            kind,
            correlation_id: correlation_id.into(),
            data,
        }
    }

    pub fn message(correlation_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(
            EventSource::AiAgent,
            EventKind::Message,
            correlation_id,
            data,
        )
    }

    pub fn tool(correlation_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(EventSource::AiAgent, EventKind::Tool, correlation_id, data)
    }

    pub fn status(correlation_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(
            EventSource::System,
            EventKind::Status,
            correlation_id,
            data,
        )
    }
}

/// The staging emitter: a plain in-memory, order-preserving list of emitted
/// events for one processing task. Not a set — relative emission order must
/// survive to persistence (spec §4.2, §5).
///
/// A `Mutex` rather than a `tokio::sync::RwLock` is correct here: the buffer
/// is only ever touched from within the single task that owns it (including
/// via tool-callback closures which may run on the same task), never shared
/// across tasks, so there is no need for an async-aware lock.
#[derive(Debug, Default)]
pub struct EventBuffer {
    events: Mutex<Vec<EmittedEvent>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: EmittedEvent) {
        self.events.lock().expect("event buffer lock poisoned").push(event);
    }

    /// Drains the buffer in arrival order, leaving it empty.
    pub fn drain(&self) -> Vec<EmittedEvent> {
        std::mem::take(&mut *self.events.lock().expect("event buffer lock poisoned"))
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("event buffer lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
