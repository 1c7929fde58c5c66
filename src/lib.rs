//! # conversant
//!
//! A Rust runtime for guideline-driven conversational agents: behavior is
//! expressed as condition/action guidelines rather than hand-written
//! dialogue trees, a per-session dispatcher ensures a session has at most
//! one actively-running processing task at a time, and a bounded iterative
//! pipeline interleaves guideline matching, tool calls, and message
//! production for each customer turn.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      SessionDispatcher                       │
//! │   per-session FIFO; dispatching cancels queued predecessors  │
//! └───────────────────────────┬────────────────────────────────-─┘
//!                             │
//! ┌───────────────────────────▼────────────────────────────────-─┐
//! │                      engine::Pipeline                        │
//! │  ┌──────────────┐   ┌──────────────┐   ┌───────────────────┐ │
//! │  │   proposer   │──▶│ tool_caller  │──▶│  message_producer │ │
//! │  └──────────────┘   └──────────────┘   └───────────────────┘ │
//! └───────────────────────────┬────────────────────────────────-─┘
//!                             │
//! ┌───────────────────────────▼────────────────────────────────-─┐
//! │   generation::SchematicGenerator (OpenAI / Anthropic / ...)   │
//! │   services::{local, plugin, openapi}::ToolService             │
//! │   storage::DocumentDatabase                                   │
//! └────────────────────────────────────────────────────────────-─┘
//! ```
//!
//! ## Module overview
//!
//! - [`types`]: Newtype identifiers shared across the crate
//! - [`error`]: `thiserror`-based error types and result aliases
//! - [`config`]: Runtime-wide thresholds and intervals
//! - [`agent`]: Agent configuration
//! - [`session`]: Session lifecycle
//! - [`event`]: The durable event log and in-flight staging buffer
//! - [`guideline`]: Condition/action rules and guideline-tool associations
//! - [`connection`]: The guideline connection graph
//! - [`context`]: Context variables and prompt-assembly messages
//! - [`glossary`]: Domain terminology
//! - [`tool`]: Tool descriptors and the `ToolService` contract
//! - [`services`]: Local, SDK-plugin, and OpenAPI tool service implementations
//! - [`storage`]: The document database contract and an in-memory backend
//! - [`generation`]: The schematic generator contract and backends
//! - [`engine`]: The bounded iterative processing pipeline
//! - [`indexer`]: Guideline indexing and connection proposal
//! - [`dispatcher`]: Per-session task dispatch and cancellation
//! - [`runtime`]: Wires the dispatcher, pipeline, and durable event log into
//!   `PostClientEvent`/`WaitForUpdate`/`UpdateConsumptionOffset`

pub mod agent;
pub mod config;
pub mod connection;
pub mod context;
pub mod dispatcher;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod event;
pub mod generation;
pub mod glossary;
pub mod guideline;
pub mod indexer;
pub mod runtime;
pub mod services;
pub mod session;
pub mod storage;
pub mod tool;
pub mod types;

pub use agent::Agent;
pub use config::RuntimeConfig;
pub use connection::{ConnectionGraph, ConnectionKind, GuidelineConnection};
pub use context::{ContextVariable, ContextVariableValue, FreshnessRules, Message, MessageRole};
pub use dispatcher::SessionDispatcher;
pub use engine::Pipeline;
pub use error::{AgentError, GenerationError, GuidelineError, Result, StorageError, ToolError};
pub use event::{EmittedEvent, Event, EventBuffer, EventKind, EventSource};
pub use generation::{GenerationHints, SchematicGenerationResult, SchematicGenerator, SchematicGeneratorExt};
pub use glossary::{Term, TermStore};
pub use guideline::{AssociationStore, Guideline, GuidelineContent, GuidelineToolAssociation, PreviouslyApplied};
pub use indexer::{GuidelineIndexEntry, GuidelineIndexer};
pub use runtime::AgentRuntime;
pub use services::registry::ServiceRegistry;
pub use session::Session;
pub use storage::{DocumentCollection, DocumentDatabase, Filter};
pub use tool::{Tool as ToolDescriptor, ToolContext, ToolId, ToolResult, ToolService};
pub use types::*;

pub use embedding::cosine_similarity;
#[cfg(feature = "semantic-matching")]
pub use embedding::SentenceEmbedder;
