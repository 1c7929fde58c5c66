//! In-memory document database
//!
//! Grounded in the teacher's old `InMemorySessionStore` (`Arc<RwLock<HashMap<...>>>`),
//! generalized from a single session-shaped store into a collection-per-name
//! document store covering every record type the runtime persists (agents,
//! sessions, events, guidelines, connections, context variables, terms, tool
//! service registrations).

use super::{document_id, matches_filters, DocumentCollection, DocumentDatabase, Filter};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct InMemoryDocumentCollection {
    documents: RwLock<HashMap<String, Value>>,
}

#[async_trait]
impl DocumentCollection for InMemoryDocumentCollection {
    async fn insert_one(&self, document: Value) -> StorageResult<()> {
        let id = document_id(&document)?;
        let mut documents = self.documents.write().await;
        if documents.contains_key(&id) {
            return Err(StorageError::AlreadyExists(id));
        }
        documents.insert(id, document);
        Ok(())
    }

    async fn find(&self, filter: &Filter) -> StorageResult<Vec<Value>> {
        let documents = self.documents.read().await;
        Ok(documents
            .values()
            .filter(|doc| matches_filters(filter, doc))
            .cloned()
            .collect())
    }

    async fn update_one(&self, filter: &Filter, document: Value) -> StorageResult<()> {
        let mut documents = self.documents.write().await;
        let matched_id = documents
            .iter()
            .find(|(_, doc)| matches_filters(filter, doc))
            .map(|(id, _)| id.clone());

        match matched_id {
            Some(id) => {
                documents.insert(id, document);
                Ok(())
            }
            None => Err(StorageError::NotFound(
                "no document matched the update filter".into(),
            )),
        }
    }

    async fn delete_one(&self, filter: &Filter) -> StorageResult<()> {
        let mut documents = self.documents.write().await;
        let matched_id = documents
            .iter()
            .find(|(_, doc)| matches_filters(filter, doc))
            .map(|(id, _)| id.clone());

        match matched_id {
            Some(id) => {
                documents.remove(&id);
                Ok(())
            }
            None => Err(StorageError::NotFound(
                "no document matched the delete filter".into(),
            )),
        }
    }
}

/// An in-process document database: collections are created on demand and
/// held for the lifetime of the process. Suitable for tests and for running
/// the runtime without a persistence backend configured.
#[derive(Default)]
pub struct InMemoryDocumentDatabase {
    collections: RwLock<HashMap<String, Arc<InMemoryDocumentCollection>>>,
}

impl InMemoryDocumentDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentDatabase for InMemoryDocumentDatabase {
    async fn create_collection(&self, name: &str) -> StorageResult<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(StorageError::AlreadyExists(format!(
                "collection '{name}' already exists"
            )));
        }
        collections.insert(name.to_string(), Arc::new(InMemoryDocumentCollection::default()));
        Ok(())
    }

    async fn get_collection(&self, name: &str) -> StorageResult<Arc<dyn DocumentCollection>> {
        let collections = self.collections.read().await;
        collections
            .get(name)
            .cloned()
            .map(|c| c as Arc<dyn DocumentCollection>)
            .ok_or_else(|| StorageError::NotFound(format!("collection '{name}' not found")))
    }

    async fn get_or_create_collection(&self, name: &str) -> Arc<dyn DocumentCollection> {
        if let Some(existing) = self.collections.read().await.get(name) {
            return existing.clone() as Arc<dyn DocumentCollection>;
        }

        let mut collections = self.collections.write().await;
        collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InMemoryDocumentCollection::default()))
            .clone() as Arc<dyn DocumentCollection>
    }

    async fn delete_collection(&self, name: &str) -> StorageResult<()> {
        let mut collections = self.collections.write().await;
        collections
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("collection '{name}' not found")))
    }
}
