//! Common type definitions used throughout the conversant runtime
//!
//! This module provides newtype wrappers around UUID for type-safe identifiers.
//! `ToolId` is deliberately not defined here: per the tool service contract it
//! is a `(service_name, tool_name)` pair, not a UUID, and lives in [`crate::tool`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Get the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(AgentId, "Unique identifier for an Agent");
uuid_id!(SessionId, "Unique identifier for a Session");
uuid_id!(EventId, "Unique identifier for an Event");
uuid_id!(GuidelineId, "Unique identifier for a Guideline");
uuid_id!(
    GuidelineConnectionId,
    "Unique identifier for a GuidelineConnection edge"
);
uuid_id!(ContextVariableId, "Unique identifier for a ContextVariable");
uuid_id!(TermId, "Unique identifier for a glossary Term");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_creation() {
        let id1 = AgentId::new();
        let id2 = AgentId::new();
        assert_ne!(id1, id2, "AgentIds should be unique");
    }

    #[test]
    fn test_agent_id_display() {
        let id = AgentId::new();
        let display_str = format!("{}", id);
        assert!(
            !display_str.is_empty(),
            "Display string should not be empty"
        );
    }

    #[test]
    fn test_agent_id_serialization() {
        let id = AgentId::new();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: AgentId = serde_json::from_str(&json).unwrap();
        assert_eq!(
            id, deserialized,
            "AgentId should serialize and deserialize correctly"
        );
    }

    #[test]
    fn test_guideline_id_creation() {
        let id1 = GuidelineId::new();
        let id2 = GuidelineId::new();
        assert_ne!(id1, id2, "GuidelineIds should be unique");
    }

    #[test]
    fn test_event_id_creation() {
        let id1 = EventId::new();
        let id2 = EventId::new();
        assert_ne!(id1, id2, "EventIds should be unique");
    }

    #[test]
    fn test_session_id_creation() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2, "SessionIds should be unique");
    }

    #[test]
    fn test_guideline_connection_id_creation() {
        let id1 = GuidelineConnectionId::new();
        let id2 = GuidelineConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_all_ids_from_uuid() {
        let uuid = Uuid::new_v4();

        assert_eq!(AgentId::from(uuid).as_uuid(), &uuid);
        assert_eq!(SessionId::from(uuid).as_uuid(), &uuid);
        assert_eq!(EventId::from(uuid).as_uuid(), &uuid);
        assert_eq!(GuidelineId::from(uuid).as_uuid(), &uuid);
        assert_eq!(GuidelineConnectionId::from(uuid).as_uuid(), &uuid);
        assert_eq!(ContextVariableId::from(uuid).as_uuid(), &uuid);
        assert_eq!(TermId::from(uuid).as_uuid(), &uuid);
    }
}
