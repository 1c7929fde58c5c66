//! Guideline connections: a derived directed graph over guidelines
//!
//! The original (`core/guideline_connections.py`) backs this with a
//! `networkx.DiGraph`; the pack carries no graph crate, so the DAG here is a
//! small adjacency-list index the indexer keeps in lock-step with the edge
//! set (spec §5: "a single lock protecting both the edge set and the
//! adjacency index; they must be updated atomically").

use crate::types::{GuidelineConnectionId, GuidelineId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;

/// The kind of relationship a connection expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Entails,
    Suggests,
}

/// A directed edge between two guidelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidelineConnection {
    pub id: GuidelineConnectionId,
    pub source: GuidelineId,
    pub target: GuidelineId,
    pub kind: ConnectionKind,
    pub created_at: DateTime<Utc>,
}

impl GuidelineConnection {
    pub fn new(source: GuidelineId, target: GuidelineId, kind: ConnectionKind) -> Self {
        Self {
            id: GuidelineConnectionId::new(),
            source,
            target,
            kind,
            created_at: Utc::now(),
        }
    }
}

/// The in-memory connection graph: an edge set plus an adjacency index of
/// outgoing successors, updated atomically under one lock.
#[derive(Default)]
pub struct ConnectionGraph {
    inner: RwLock<GraphInner>,
}

#[derive(Default)]
struct GraphInner {
    edges: HashMap<(GuidelineId, GuidelineId), GuidelineConnection>,
    outgoing: HashMap<GuidelineId, HashSet<GuidelineId>>,
    incoming: HashMap<GuidelineId, HashSet<GuidelineId>>,
}

impl ConnectionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert: calling this twice with the same `(source, target)` produces
    /// one edge, with the later kind winning (spec §8 property 5).
    pub async fn update_connection(
        &self,
        source: GuidelineId,
        target: GuidelineId,
        kind: ConnectionKind,
    ) -> GuidelineConnection {
        let mut inner = self.inner.write().await;
        let key = (source, target);

        let connection = if let Some(existing) = inner.edges.get(&key) {
            GuidelineConnection {
                id: existing.id,
                source,
                target,
                kind,
                created_at: existing.created_at,
            }
        } else {
            GuidelineConnection::new(source, target, kind)
        };

        inner.edges.insert(key, connection.clone());
        inner.outgoing.entry(source).or_default().insert(target);
        inner.incoming.entry(target).or_default().insert(source);

        debug!(%source, %target, ?kind, "guideline connection upserted");
        connection
    }

    /// Removes every outgoing and incoming edge touching `guideline_id`.
    /// Used by the indexer when a guideline is deleted (spec §4.7).
    pub async fn remove_guideline(&self, guideline_id: GuidelineId) {
        let mut inner = self.inner.write().await;

        let successors = inner.outgoing.remove(&guideline_id).unwrap_or_default();
        for target in &successors {
            inner.edges.remove(&(guideline_id, *target));
            if let Some(preds) = inner.incoming.get_mut(target) {
                preds.remove(&guideline_id);
            }
        }

        let predecessors = inner.incoming.remove(&guideline_id).unwrap_or_default();
        for source in &predecessors {
            inner.edges.remove(&(*source, guideline_id));
            if let Some(succs) = inner.outgoing.get_mut(source) {
                succs.remove(&guideline_id);
            }
        }
    }

    /// Direct successors, or the full BFS-reachable set when `indirect`.
    pub async fn list_connections_from(
        &self,
        source: GuidelineId,
        indirect: bool,
    ) -> Vec<GuidelineId> {
        let inner = self.inner.read().await;
        if !indirect {
            return inner
                .outgoing
                .get(&source)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default();
        }
        bfs_reachable(&inner.outgoing, source)
    }

    /// Direct predecessors, or the full BFS-reachable set (against the
    /// reversed graph) when `indirect`.
    pub async fn list_connections_to(
        &self,
        target: GuidelineId,
        indirect: bool,
    ) -> Vec<GuidelineId> {
        let inner = self.inner.read().await;
        if !indirect {
            return inner
                .incoming
                .get(&target)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default();
        }
        bfs_reachable(&inner.incoming, target)
    }

    pub async fn edge_count(&self) -> usize {
        self.inner.read().await.edges.len()
    }

    pub async fn contains_edge(&self, source: GuidelineId, target: GuidelineId) -> bool {
        self.inner.read().await.edges.contains_key(&(source, target))
    }
}

fn bfs_reachable(
    adjacency: &HashMap<GuidelineId, HashSet<GuidelineId>>,
    start: GuidelineId,
) -> Vec<GuidelineId> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(start);
    visited.insert(start);

    let mut result = Vec::new();
    while let Some(node) = queue.pop_front() {
        if let Some(neighbors) = adjacency.get(&node) {
            for &neighbor in neighbors {
                if visited.insert(neighbor) {
                    result.push(neighbor);
                    queue.push_back(neighbor);
                }
            }
        }
    }
    result
}
