//! Runtime-wide configuration
//!
//! Thresholds and intervals the spec leaves configurable rather than
//! hardcoded (§4.3, §4.7, §5): the guideline-applicability score threshold,
//! the guideline-connection persistence threshold, proposer batch size, the
//! dispatcher's GC interval, and the default outbound HTTP timeout.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default minimum score (1..10) at which a guideline proposition is
/// considered activated (spec §4.3 "default 7").
pub const GUIDELINE_APPLICABILITY_THRESHOLD: u8 = 7;

/// Minimum proposed connection score at which the indexer persists an edge
/// (spec §4.7, grounded in the original's `indexer.py` `applies_score >= 6`).
/// Deliberately a distinct constant from the applicability threshold above —
/// see DESIGN.md Open Question (iii).
pub const CONNECTION_PERSIST_THRESHOLD: u8 = 6;

/// Fixed batch size the guideline proposer splits candidates into.
pub const GUIDELINE_BATCH_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_applicability_threshold")]
    pub guideline_applicability_threshold: u8,

    #[serde(default = "default_connection_threshold")]
    pub connection_persist_threshold: u8,

    #[serde(default = "default_batch_size")]
    pub guideline_batch_size: usize,

    #[serde(
        default = "default_gc_interval",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub gc_interval: Duration,

    #[serde(
        default = "default_http_timeout",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub http_timeout: Duration,

    /// Revision budget for the message producer's revise-until-compliant loop.
    #[serde(default = "default_revision_budget")]
    pub message_revision_budget: usize,
}

fn default_applicability_threshold() -> u8 {
    GUIDELINE_APPLICABILITY_THRESHOLD
}

fn default_connection_threshold() -> u8 {
    CONNECTION_PERSIST_THRESHOLD
}

fn default_batch_size() -> usize {
    GUIDELINE_BATCH_SIZE
}

fn default_gc_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_revision_budget() -> usize {
    3
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_secs())
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            guideline_applicability_threshold: default_applicability_threshold(),
            connection_persist_threshold: default_connection_threshold(),
            guideline_batch_size: default_batch_size(),
            gc_interval: default_gc_interval(),
            http_timeout: default_http_timeout(),
            message_revision_budget: default_revision_budget(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds_are_distinct() {
        let config = RuntimeConfig::default();
        assert_eq!(config.guideline_applicability_threshold, 7);
        assert_eq!(config.connection_persist_threshold, 6);
        assert_ne!(
            config.guideline_applicability_threshold,
            config.connection_persist_threshold
        );
    }

    #[test]
    fn test_config_round_trip() {
        let config = RuntimeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }
}
