//! Glossary terms and similarity search
//!
//! A term is indexed by an assembled `"name[, synonyms]: description"`
//! string (spec §3). Similarity search reuses the teacher's
//! [`crate::embedding::cosine_similarity`] machinery: when the
//! `semantic-matching` feature is enabled, terms are embedded with
//! [`crate::embedding::SentenceEmbedder`]; otherwise lookup falls back to a
//! substring match, which keeps the contract usable without the optional
//! model dependency.

use crate::types::{AgentId, TermId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// A glossary entry belonging to one agent's term set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Term {
    pub id: TermId,
    pub term_set: AgentId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl Term {
    pub fn new(term_set: AgentId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: TermId::new(),
            term_set,
            name: name.into(),
            description: description.into(),
            synonyms: Vec::new(),
        }
    }

    pub fn with_synonyms(mut self, synonyms: Vec<String>) -> Self {
        self.synonyms = synonyms;
        self
    }

    /// The assembled string a term is indexed by: `"name[, synonyms]: description"`.
    pub fn indexed_text(&self) -> String {
        if self.synonyms.is_empty() {
            format!("{}: {}", self.name, self.description)
        } else {
            format!("{}, {}: {}", self.name, self.synonyms.join(", "), self.description)
        }
    }
}

/// An in-memory term index for one agent, supporting similarity search over
/// the assembled indexed text.
pub struct TermStore {
    terms: RwLock<HashMap<TermId, Term>>,
    #[cfg(feature = "semantic-matching")]
    embedder: crate::embedding::SentenceEmbedder,
}

impl TermStore {
    pub fn new() -> Self {
        Self {
            terms: RwLock::new(HashMap::new()),
            #[cfg(feature = "semantic-matching")]
            embedder: crate::embedding::SentenceEmbedder::new()
                .expect("semantic-matching embedder must initialize"),
        }
    }

    pub fn insert(&self, term: Term) -> TermId {
        let id = term.id;
        self.terms.write().expect("term store lock poisoned").insert(id, term);
        id
    }

    pub fn get(&self, id: &TermId) -> Option<Term> {
        self.terms.read().expect("term store lock poisoned").get(id).cloned()
    }

    pub fn for_agent(&self, agent_id: AgentId) -> Vec<Term> {
        self.terms
            .read()
            .expect("term store lock poisoned")
            .values()
            .filter(|t| t.term_set == agent_id)
            .cloned()
            .collect()
    }

    /// Returns the `limit` most relevant terms for `agent_id` given `query`.
    #[cfg(feature = "semantic-matching")]
    pub fn search(&self, agent_id: AgentId, query: &str, limit: usize) -> Vec<Term> {
        let mut scored: Vec<(f32, Term)> = self
            .for_agent(agent_id)
            .into_iter()
            .filter_map(|term| {
                let score = self.embedder.similarity(query, &term.indexed_text()).ok()?;
                Some((score, term))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(limit).map(|(_, term)| term).collect()
    }

    /// Substring-match fallback used when the optional embedding model isn't
    /// compiled in.
    #[cfg(not(feature = "semantic-matching"))]
    pub fn search(&self, agent_id: AgentId, query: &str, limit: usize) -> Vec<Term> {
        let query = query.to_lowercase();
        self.for_agent(agent_id)
            .into_iter()
            .filter(|term| term.indexed_text().to_lowercase().contains(&query))
            .take(limit)
            .collect()
    }
}

impl Default for TermStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexed_text_without_synonyms() {
        let term = Term::new(AgentId::new(), "APR", "annual percentage rate");
        assert_eq!(term.indexed_text(), "APR: annual percentage rate");
    }

    #[test]
    fn test_indexed_text_with_synonyms() {
        let term = Term::new(AgentId::new(), "APR", "annual percentage rate")
            .with_synonyms(vec!["interest rate".into()]);
        assert_eq!(
            term.indexed_text(),
            "APR, interest rate: annual percentage rate"
        );
    }

    #[test]
    fn test_term_store_scoped_by_agent() {
        let store = TermStore::new();
        let agent_a = AgentId::new();
        let agent_b = AgentId::new();

        store.insert(Term::new(agent_a, "APR", "annual percentage rate"));
        store.insert(Term::new(agent_b, "SLA", "service level agreement"));

        assert_eq!(store.for_agent(agent_a).len(), 1);
        assert_eq!(store.for_agent(agent_b).len(), 1);
    }

    #[cfg(not(feature = "semantic-matching"))]
    #[test]
    fn test_substring_search_fallback() {
        let store = TermStore::new();
        let agent_id = AgentId::new();
        store.insert(Term::new(agent_id, "APR", "annual percentage rate"));
        store.insert(Term::new(agent_id, "SLA", "service level agreement"));

        let results = store.search(agent_id, "percentage", 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "APR");
    }
}
