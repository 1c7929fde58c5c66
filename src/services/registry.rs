//! The tool service registry: durable records of which tool services an
//! agent can reach, plus live instances to dispatch calls against (spec
//! §4.6, grounded in `core/services/tools/service_registry.py`).
//!
//! The original persists each registration as a `{service_type, ...}`
//! document (`openapi` → `server_url`/`openapi_json`, `sdk` → `url`) and
//! reconstructs the matching client on read. This keeps the same persisted
//! shape via [`ServiceKind`] but also caches the instantiated
//! [`crate::tool::ToolService`] behind an `Arc` so repeated calls don't
//! re-parse an OpenAPI document on every tool invocation.

use crate::error::{Result, StorageError};
use crate::services::{local::LocalToolService, openapi::OpenApiToolService, plugin::PluginToolService};
use crate::storage::{DocumentDatabase, Filter};
use crate::tool::{ToolService, LOCAL_SERVICE_NAME};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const COLLECTION_NAME: &str = "tool_services";

/// The persisted shape of a service registration, serialized to/from a
/// document's `kind`-tagged fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "service_type", rename_all = "snake_case")]
pub enum ServiceKind {
    Sdk { url: String },
    Openapi { server_url: String, openapi_json: serde_json::Value },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServiceRegistrationDocument {
    id: String,
    #[serde(flatten)]
    kind: ServiceKind,
}

/// A registry of tool services: the built-in `local` service plus any
/// number of named `sdk`/`openapi` services, durably recorded via a
/// [`DocumentDatabase`].
pub struct ServiceRegistry {
    database: Arc<dyn DocumentDatabase>,
    local: Arc<LocalToolService>,
    live: RwLock<HashMap<String, Arc<dyn ToolService>>>,
}

impl ServiceRegistry {
    pub fn new(database: Arc<dyn DocumentDatabase>, local: Arc<LocalToolService>) -> Self {
        Self {
            database,
            local,
            live: RwLock::new(HashMap::new()),
        }
    }

    /// Registers or updates a named service (spec §4.6 `UpdateService`):
    /// persists `kind` under `name`, inserting it if unregistered and
    /// overwriting it in place otherwise, then re-instantiates the live
    /// client so a changed url/kind takes effect on the next call. Fails only
    /// for the reserved `local` name.
    pub async fn update_service(&self, name: &str, kind: ServiceKind) -> Result<()> {
        if name == LOCAL_SERVICE_NAME {
            return Err(StorageError::AlreadyExists(format!(
                "'{LOCAL_SERVICE_NAME}' is a reserved service name"
            ))
            .into());
        }

        let collection = self.database.get_or_create_collection(COLLECTION_NAME).await;
        let document = ServiceRegistrationDocument {
            id: name.to_string(),
            kind: kind.clone(),
        };

        let serialized = serde_json::to_value(&document)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        match collection.insert_one(serialized.clone()).await {
            Ok(()) => {}
            Err(StorageError::AlreadyExists(_)) => {
                collection
                    .update_one(&Filter::eq("id", serde_json::json!(name)), serialized)
                    .await?;
            }
            Err(other) => return Err(other.into()),
        }

        let instance = instantiate(name, &kind)?;
        self.live.write().await.insert(name.to_string(), instance);

        Ok(())
    }

    /// Returns the live service instance for `name`, special-casing the
    /// built-in `local` service and lazily instantiating a persisted
    /// registration on first use.
    pub async fn read_tool_service(&self, name: &str) -> Result<Arc<dyn ToolService>> {
        if name == LOCAL_SERVICE_NAME {
            return Ok(self.local.clone() as Arc<dyn ToolService>);
        }

        if let Some(existing) = self.live.read().await.get(name) {
            return Ok(existing.clone());
        }

        let collection = self.database.get_or_create_collection(COLLECTION_NAME).await;
        let document = collection
            .find_one(&Filter::eq("id", serde_json::json!(name)))
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("tool service '{name}' not found")))?;

        let registration: ServiceRegistrationDocument = serde_json::from_value(document)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let instance = instantiate(name, &registration.kind)?;
        self.live.write().await.insert(name.to_string(), instance.clone());
        Ok(instance)
    }

    /// Lists every registered service name, including the built-in `local`
    /// service first.
    pub async fn list_tool_services(&self) -> Result<Vec<String>> {
        let collection = self.database.get_or_create_collection(COLLECTION_NAME).await;
        let documents = collection.find(&Filter::and(vec![])).await?;

        let mut names = vec![LOCAL_SERVICE_NAME.to_string()];
        for document in documents {
            if let Some(id) = document.get("id").and_then(|v| v.as_str()) {
                names.push(id.to_string());
            }
        }
        Ok(names)
    }

    pub async fn delete_service(&self, name: &str) -> Result<()> {
        if name == LOCAL_SERVICE_NAME {
            return Err(StorageError::NotFound(format!(
                "'{LOCAL_SERVICE_NAME}' cannot be deleted"
            ))
            .into());
        }

        let collection = self.database.get_or_create_collection(COLLECTION_NAME).await;
        collection.delete_one(&Filter::eq("id", serde_json::json!(name))).await?;
        self.live.write().await.remove(name);
        Ok(())
    }
}

fn instantiate(name: &str, kind: &ServiceKind) -> Result<Arc<dyn ToolService>> {
    match kind {
        ServiceKind::Sdk { url } => Ok(Arc::new(PluginToolService::new(name, url.clone()))),
        ServiceKind::Openapi { server_url, openapi_json } => Ok(Arc::new(OpenApiToolService::new(
            name,
            server_url.clone(),
            openapi_json,
        )?)),
    }
}
