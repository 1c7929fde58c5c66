//! The document database contract
//!
//! Grounded in the original `core/persistence/document_database.py` and
//! `json_file_database.py`: collections hold JSON documents keyed by `id`,
//! CRUD goes through an async trait, and filtered lookups use a small
//! Mongo-like grammar (`common.py`'s per-field operators, extended here with
//! `$and`/`$or` combinators per spec §6/§8 property 7 — the older reference
//! file only shows the per-field grammar, not the combinators, so those are
//! this crate's own addition on top of it).
//!
//! This module fixes the contract only; persistence adapters beyond an
//! in-memory implementation (JSON file, vector store) are out of scope
//! (spec §1).

pub mod memory;

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;

/// A single-field comparison operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// The filter grammar: field comparisons combined under `$and`/`$or`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Field { field: String, op: Op, value: Value },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::Field {
            field: field.into(),
            op: Op::Eq,
            value,
        }
    }

    pub fn ne(field: impl Into<String>, value: Value) -> Self {
        Self::Field {
            field: field.into(),
            op: Op::Ne,
            value,
        }
    }

    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        Self::Field {
            field: field.into(),
            op: Op::Gt,
            value,
        }
    }

    pub fn gte(field: impl Into<String>, value: Value) -> Self {
        Self::Field {
            field: field.into(),
            op: Op::Gte,
            value,
        }
    }

    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self::Field {
            field: field.into(),
            op: Op::Lt,
            value,
        }
    }

    pub fn lte(field: impl Into<String>, value: Value) -> Self {
        Self::Field {
            field: field.into(),
            op: Op::Lte,
            value,
        }
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Self::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Self::Or(filters)
    }
}

/// Matches a single scalar comparison. Numbers compare numerically;
/// everything else compares by JSON-value equality/ordering of its string
/// form, which is sufficient for the string/bool/number documents this
/// runtime stores.
fn compare(op: &Op, actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return matches!(op, Op::Ne);
    };

    match op {
        Op::Eq => actual == expected,
        Op::Ne => actual != expected,
        Op::Gt | Op::Gte | Op::Lt | Op::Lte => {
            let ordering = match (actual.as_f64(), expected.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => actual.as_str().zip(expected.as_str()).map(|(a, b)| a.cmp(b)),
            };

            match (op, ordering) {
                (Op::Gt, Some(Ordering::Greater)) => true,
                (Op::Gte, Some(Ordering::Greater | Ordering::Equal)) => true,
                (Op::Lt, Some(Ordering::Less)) => true,
                (Op::Lte, Some(Ordering::Less | Ordering::Equal)) => true,
                _ => false,
            }
        }
    }
}

/// The recursive filter evaluator the spec requires be reimplemented rather
/// than inherited from a particular database (spec §9).
pub fn matches_filters(filter: &Filter, document: &Value) -> bool {
    match filter {
        Filter::Field { field, op, value } => compare(op, document.get(field), value),
        Filter::And(filters) => filters.iter().all(|f| matches_filters(f, document)),
        Filter::Or(filters) => filters.iter().any(|f| matches_filters(f, document)),
    }
}

/// A single collection of JSON documents, each required to carry an `id`
/// field used as its primary key.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    async fn insert_one(&self, document: Value) -> StorageResult<()>;
    async fn find(&self, filter: &Filter) -> StorageResult<Vec<Value>>;
    async fn find_one(&self, filter: &Filter) -> StorageResult<Option<Value>> {
        Ok(self.find(filter).await?.into_iter().next())
    }
    async fn update_one(&self, filter: &Filter, document: Value) -> StorageResult<()>;
    async fn delete_one(&self, filter: &Filter) -> StorageResult<()>;
}

/// A document database: a namespace of named collections.
#[async_trait]
pub trait DocumentDatabase: Send + Sync {
    async fn create_collection(&self, name: &str) -> StorageResult<()>;
    async fn get_collection(
        &self,
        name: &str,
    ) -> StorageResult<std::sync::Arc<dyn DocumentCollection>>;
    async fn get_or_create_collection(
        &self,
        name: &str,
    ) -> std::sync::Arc<dyn DocumentCollection>;
    async fn delete_collection(&self, name: &str) -> StorageResult<()>;
}

pub(crate) fn document_id(document: &Value) -> StorageResult<String> {
    document
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StorageError::Serialization("document is missing an 'id' field".into()))
}
