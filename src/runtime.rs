//! The agent runtime: wires the session dispatcher, the processing
//! pipeline, and a durable per-session event log into the three public
//! operations spec §4.1 names on the Session Dispatcher —
//! `PostClientEvent`, `WaitForUpdate`, `UpdateConsumptionOffset`.
//!
//! Grounded in `core/mc.py`'s `MC` class: `post_client_event` appends the
//! triggering event at the next offset under a freshly minted correlation
//! id and dispatches a processing task; on normal completion the task's
//! staged events are persisted under that same correlation id, each
//! assigned the next free offset in arrival order (§4.2 step 5); on
//! cancellation nothing is persisted (§8 property 3); `wait_for_update`
//! polls the log against a `tokio::sync::Notify` woken on every append.

use crate::agent::Agent;
use crate::config::RuntimeConfig;
use crate::context::{ContextVariable, ContextVariableValue, Message};
use crate::dispatcher::SessionDispatcher;
use crate::engine::Pipeline;
use crate::event::{EmittedEvent, Event, EventBuffer, EventKind, EventSource};
use crate::generation::SchematicGenerator;
use crate::glossary::Term;
use crate::guideline::{AssociationStore, Guideline};
use crate::services::registry::ServiceRegistry;
use crate::tool::{SessionMode, ToolContext};
use crate::types::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tracing::{error, warn};
use uuid::Uuid;

/// The durable, append-only per-session event log. Offsets are assigned
/// here, under the same lock that appends, so they stay dense and strictly
/// increasing (spec §3, §8 property 1).
#[derive(Default)]
struct EventLog {
    events: RwLock<HashMap<SessionId, Vec<Event>>>,
    consumption_offsets: RwLock<HashMap<SessionId, HashMap<String, u64>>>,
    notify: RwLock<HashMap<SessionId, Arc<Notify>>>,
    /// Session mode, switched at persistence time by a tool result's
    /// `control.mode` (spec §4.4, §4.2 step 5). Absent means `Auto`, a
    /// session's initial mode (spec §3).
    modes: RwLock<HashMap<SessionId, SessionMode>>,
}

impl EventLog {
    fn new() -> Self {
        Self::default()
    }

    async fn notifier(&self, session_id: SessionId) -> Arc<Notify> {
        if let Some(existing) = self.notify.read().await.get(&session_id) {
            return existing.clone();
        }
        self.notify
            .write()
            .await
            .entry(session_id)
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Appends a single event at the next free offset for its session.
    async fn append(
        &self,
        session_id: SessionId,
        source: EventSource,
        kind: EventKind,
        correlation_id: &str,
        data: serde_json::Value,
    ) -> Event {
        let mut events = self.events.write().await;
        let log = events.entry(session_id).or_default();
        let offset = log.len() as u64;
        let event = Event::new(session_id, source, kind, offset, correlation_id, data);
        log.push(event.clone());
        drop(events);

        self.notifier(session_id).await.notify_waiters();
        event
    }

    /// Persists a batch of staged events under one correlation id, in
    /// arrival order, each claiming the next free offset in turn. Applies
    /// whatever session mode switch the batch's tool results carry, last one
    /// wins (spec §4.4, §4.2 step 5).
    async fn persist_batch(&self, session_id: SessionId, staged: Vec<crate::event::EmittedEvent>) {
        if staged.is_empty() {
            return;
        }
        let mode_switch = staged.iter().filter_map(|e| tool_event_mode_switch(e)).last();

        let mut events = self.events.write().await;
        let log = events.entry(session_id).or_default();
        for emitted in staged {
            let offset = log.len() as u64;
            log.push(Event::new(
                session_id,
                emitted.source,
                emitted.kind,
                offset,
                emitted.correlation_id,
                emitted.data,
            ));
        }
        drop(events);

        if let Some(mode) = mode_switch {
            self.modes.write().await.insert(session_id, mode);
        }

        self.notifier(session_id).await.notify_waiters();
    }

    async fn session_mode(&self, session_id: SessionId) -> SessionMode {
        self.modes
            .read()
            .await
            .get(&session_id)
            .copied()
            .unwrap_or(SessionMode::Auto)
    }

    async fn history(&self, session_id: SessionId) -> Vec<Event> {
        self.events
            .read()
            .await
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn set_consumption_offset(&self, session_id: SessionId, consumer_id: &str, offset: u64) {
        self.consumption_offsets
            .write()
            .await
            .entry(session_id)
            .or_default()
            .insert(consumer_id.to_string(), offset);
    }
}

/// Ties the [`SessionDispatcher`], the [`Pipeline`], and the durable event
/// log together behind the three operations spec §4.1 names on the
/// dispatcher. `generator`, `registry`, and `associations` are held as
/// `Arc`s because each dispatched processing task runs as an independent
/// `'static` tokio task.
pub struct AgentRuntime {
    dispatcher: SessionDispatcher,
    log: Arc<EventLog>,
    generator: Arc<dyn SchematicGenerator>,
    registry: Arc<ServiceRegistry>,
    associations: Arc<AssociationStore>,
    config: RuntimeConfig,
}

impl AgentRuntime {
    pub fn new(
        generator: Arc<dyn SchematicGenerator>,
        registry: Arc<ServiceRegistry>,
        associations: Arc<AssociationStore>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            dispatcher: SessionDispatcher::new(&config),
            log: Arc::new(EventLog::new()),
            generator,
            registry,
            associations,
            config,
        }
    }

    /// Appends a `source=customer` event at the next offset under a newly
    /// minted correlation id, then schedules a processing task for the
    /// session. Returns the persisted client event immediately; the agent's
    /// reply is appended asynchronously once the pipeline completes.
    ///
    /// `agent`, `candidates`, `context_values`, and `terms` stand in for this
    /// crate's agent/guideline/context/glossary stores (out of scope per
    /// spec §1); callers load them from whatever store backs their
    /// deployment and pass the current snapshot in.
    pub async fn post_client_event(
        &self,
        session_id: SessionId,
        agent: Agent,
        candidates: Vec<Guideline>,
        context_values: Vec<(ContextVariable, ContextVariableValue)>,
        terms: Vec<Term>,
        data: serde_json::Value,
    ) -> Event {
        let correlation_id = Uuid::new_v4().to_string();
        let client_event = self
            .log
            .append(
                session_id,
                EventSource::Customer,
                EventKind::Message,
                &correlation_id,
                data,
            )
            .await;

        let log = self.log.clone();
        let generator = self.generator.clone();
        let registry = self.registry.clone();
        let associations = self.associations.clone();
        let config = self.config.clone();
        let agent_id = agent.id;
        let corr = correlation_id.clone();

        self.dispatcher
            .dispatch(session_id, move |token| async move {
                let prior = log.history(session_id).await;
                let mut history: Vec<Message> = prior
                    .iter()
                    .filter(|e| !e.deleted && e.kind == EventKind::Message)
                    .map(|e| match e.source {
                        EventSource::Customer => Message::user(event_text(e)),
                        EventSource::AiAgent => Message::assistant(event_text(e)),
                        EventSource::System => Message::system(event_text(e)),
                    })
                    .collect();

                let buffer = Arc::new(EventBuffer::new());
                let buffer_for_message = buffer.clone();
                let corr_for_message = corr.clone();
                let buffer_for_status = buffer.clone();
                let corr_for_status = corr.clone();
                let context = ToolContext::new(
                    agent_id,
                    session_id,
                    move |text| {
                        buffer_for_message.push(EmittedEvent::message(
                            corr_for_message.clone(),
                            serde_json::json!({ "message": text }),
                        ));
                    },
                    move |status, data| {
                        buffer_for_status.push(EmittedEvent::status(
                            corr_for_status.clone(),
                            serde_json::json!({ "status": status, "data": data }),
                        ));
                    },
                );
                let pipeline = Pipeline::new(&*generator, &*registry, &*associations, &config);

                let run = pipeline.process_turn(
                    &agent,
                    &candidates,
                    &mut history,
                    &context_values,
                    &terms,
                    &context,
                    &corr,
                    &buffer,
                );

                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        warn!(%session_id, correlation_id = %corr, "processing task cancelled, discarding staged events");
                    }
                    result = run => {
                        match result {
                            Ok(_) if token.is_cancelled() => {
                                warn!(%session_id, correlation_id = %corr, "processing task cancelled after completion, discarding staged events");
                            }
                            Ok(_) => {
                                log.persist_batch(session_id, buffer.drain()).await;
                            }
                            Err(err) => {
                                error!(%session_id, correlation_id = %corr, error = %err, "processing task failed, persisting no events");
                            }
                        }
                    }
                }
            })
            .await;

        client_event
    }

    /// Blocks until an event with `offset >= min_offset` of one of `kinds`
    /// exists for `session_id`, or `timeout` elapses. Returns whether such
    /// an event was found.
    pub async fn wait_for_update(
        &self,
        session_id: SessionId,
        min_offset: u64,
        kinds: &[EventKind],
        timeout: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.has_matching_event(session_id, min_offset, kinds).await {
                return true;
            }

            let notify = self.log.notifier(session_id).await;
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return self.has_matching_event(session_id, min_offset, kinds).await;
            }

            let _ = tokio::time::timeout(remaining, notify.notified()).await;
            if tokio::time::Instant::now() >= deadline {
                return self.has_matching_event(session_id, min_offset, kinds).await;
            }
        }
    }

    async fn has_matching_event(&self, session_id: SessionId, min_offset: u64, kinds: &[EventKind]) -> bool {
        self.log
            .history(session_id)
            .await
            .iter()
            .any(|e| !e.deleted && e.offset >= min_offset && kinds.contains(&e.kind))
    }

    /// Idempotent setter for a consumer's last-seen offset in a session.
    pub async fn update_consumption_offset(&self, session_id: SessionId, consumer_id: &str, offset: u64) {
        self.log.set_consumption_offset(session_id, consumer_id, offset).await;
    }

    /// All non-deleted events persisted for a session, in offset order.
    pub async fn session_history(&self, session_id: SessionId) -> Vec<Event> {
        self.log.history(session_id).await
    }

    /// The session's current mode: `auto` unless a tool result has switched
    /// it to `manual` (or back) at persistence time.
    pub async fn session_mode(&self, session_id: SessionId) -> SessionMode {
        self.log.session_mode(session_id).await
    }

    /// Forces a full GC drain of the dispatcher, cancelling and awaiting
    /// every still-running task. Intended for orderly shutdown.
    pub async fn shutdown(&self) {
        self.dispatcher.collect_garbage(true).await;
    }
}

/// Extracts the last `control.mode` found among a staged `tool` event's
/// `tool_calls`, if any. Mirrors the `{"tool_calls": [ExecutedToolCall, ...]}`
/// shape [`crate::engine::Pipeline::process_turn`] stages each tool round
/// under.
fn tool_event_mode_switch(event: &EmittedEvent) -> Option<SessionMode> {
    if event.kind != EventKind::Tool {
        return None;
    }
    event
        .data
        .get("tool_calls")?
        .as_array()?
        .iter()
        .filter_map(|call| {
            let mode = call.pointer("/result/control/mode")?.as_str()?;
            serde_json::from_value(serde_json::Value::String(mode.to_string())).ok()
        })
        .last()
}

fn event_text(event: &Event) -> String {
    event
        .data
        .get("message")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| event.data.to_string())
}
