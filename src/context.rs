//! Context variables and prompt-assembly messages
//!
//! `ContextVariable` here is the spec's agent-scoped definition (§3), not
//! the teacher's original per-message extracted/validated value — the
//! proposer/tool-caller/message-producer prompts need a piece of live state
//! ("the customer's account tier", "today's date") that's refreshed on a
//! schedule, not parsed out of a single message. The value/definition split
//! is supplemented from the older `emcie` tree, which keeps
//! `ContextVariableValue` separate so the same definition can hold a
//! different last-evaluated value per end user.
//!
//! `Message`/`MessageRole` survive from the teacher largely unchanged: they
//! are the shape the generation layer uses to assemble an LLM prompt from
//! interaction history, independent of how that history is persisted
//! (as [`crate::event::Event`]s).

use crate::types::ContextVariableId;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message in an assembled LLM prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single turn in a prompt's interaction-history section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
        }
    }
}

/// A calendar-subset predicate determining when a context variable's value
/// must be re-evaluated. Every populated field must match the current UTC
/// time for the rule to be considered satisfied (i.e. fresh); an empty field
/// means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessRules {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub months: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_of_month: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_of_week: Vec<chrono::Weekday>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hours: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub minutes: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seconds: Vec<u32>,
}

impl FreshnessRules {
    /// Whether `at` satisfies every populated calendar field.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        field_matches(&self.months, at.month())
            && field_matches(&self.days_of_month, at.day())
            && day_of_week_matches(&self.days_of_week, at.weekday())
            && field_matches(&self.hours, at.hour())
            && field_matches(&self.minutes, at.minute())
            && field_matches(&self.seconds, at.second())
    }
}

fn field_matches(rule: &[u32], actual: u32) -> bool {
    rule.is_empty() || rule.contains(&actual)
}

fn day_of_week_matches(rule: &[chrono::Weekday], actual: chrono::Weekday) -> bool {
    rule.is_empty() || rule.contains(&actual)
}

/// An agent-scoped context variable definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextVariable {
    pub id: ContextVariableId,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<crate::tool::ToolId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness_rules: Option<FreshnessRules>,
}

impl ContextVariable {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: ContextVariableId::new(),
            name: name.into(),
            description: description.into(),
            tool_id: None,
            freshness_rules: None,
        }
    }

    pub fn with_tool(mut self, tool_id: crate::tool::ToolId) -> Self {
        self.tool_id = Some(tool_id);
        self
    }

    pub fn with_freshness_rules(mut self, rules: FreshnessRules) -> Self {
        self.freshness_rules = Some(rules);
        self
    }

    /// If `freshness_rules` is absent, the variable is refreshed only on
    /// session creation — i.e. a value that already exists is never stale.
    pub fn is_stale(&self, value: &ContextVariableValue, now: DateTime<Utc>) -> bool {
        match &self.freshness_rules {
            None => false,
            Some(rules) => rules.matches(now) && value.last_modified < now,
        }
    }
}

/// A context variable's current value for one end user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextVariableValue {
    pub variable_id: ContextVariableId,
    pub end_user_id: String,
    pub data: serde_json::Value,
    pub last_modified: DateTime<Utc>,
}

impl ContextVariableValue {
    pub fn new(
        variable_id: ContextVariableId,
        end_user_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            variable_id,
            end_user_id: end_user_id.into(),
            data,
            last_modified: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_freshness_rules_empty_matches_anything() {
        let rules = FreshnessRules::default();
        assert!(rules.matches(Utc::now()));
    }

    #[test]
    fn test_freshness_rules_hour_filter() {
        let rules = FreshnessRules {
            hours: vec![9],
            ..Default::default()
        };

        let at_nine = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let at_ten = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();

        assert!(rules.matches(at_nine));
        assert!(!rules.matches(at_ten));
    }

    #[test]
    fn test_variable_without_freshness_rules_never_stale() {
        let variable = ContextVariable::new("account_tier", "the customer's plan tier");
        let value = ContextVariableValue::new(variable.id, "user-1", serde_json::json!("gold"));
        assert!(!variable.is_stale(&value, Utc::now()));
    }

    #[test]
    fn test_variable_with_freshness_rules_stale_when_matched_and_older() {
        let rules = FreshnessRules {
            hours: vec![9],
            ..Default::default()
        };
        let variable =
            ContextVariable::new("daily_rate", "today's exchange rate").with_freshness_rules(rules);

        let evaluated_at = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
        let value = ContextVariableValue {
            variable_id: variable.id,
            end_user_id: "user-1".into(),
            data: serde_json::json!(1.08),
            last_modified: evaluated_at,
        };

        let checked_at = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        assert!(variable.is_stale(&value, checked_at));
    }

    #[test]
    fn test_message_constructors() {
        let m = Message::user("hello");
        assert_eq!(m.role, MessageRole::User);
        assert_eq!(m.content, "hello");
    }
}
