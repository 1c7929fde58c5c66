//! Tool descriptors and the `ToolService` contract
//!
//! Grounded in the original `core/tools.py`: a tool is described by a name,
//! description, and parameter schema; `ToolId` is a `(service_name,
//! tool_name)` pair rather than a UUID, because tools are addressed by the
//! service that hosts them, not by a database row.

use crate::error::{Result, ToolError};
use crate::types::{AgentId, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The reserved service name for the built-in in-process tool service.
pub const LOCAL_SERVICE_NAME: &str = "local";

/// `"service_name:tool_name"` — the wire format for addressing a tool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToolId {
    pub service_name: String,
    pub tool_name: String,
}

impl ToolId {
    pub fn new(service_name: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            tool_name: tool_name.into(),
        }
    }

    pub fn local(tool_name: impl Into<String>) -> Self {
        Self::new(LOCAL_SERVICE_NAME, tool_name)
    }

    pub fn to_string_id(&self) -> String {
        format!("{}:{}", self.service_name, self.tool_name)
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_id())
    }
}

impl std::str::FromStr for ToolId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((service_name, tool_name)) => Ok(Self::new(service_name, tool_name)),
            None => Err(format!(
                "Invalid ToolId string format: '{}'. Expected 'service_name:tool_name'.",
                s
            )),
        }
    }
}

impl TryFrom<String> for ToolId {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ToolId> for String {
    fn from(id: ToolId) -> Self {
        id.to_string_id()
    }
}

/// The declared type of a single tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Enum,
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl ToolParameter {
    pub fn new(param_type: ToolParameterType) -> Self {
        Self {
            param_type,
            description: None,
            enum_values: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_enum(mut self, values: Vec<String>) -> Self {
        self.enum_values = Some(values);
        self
    }

    /// Checks a JSON value against this parameter's declared type.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match self.param_type {
            ToolParameterType::String => matches!(value, Value::String(_)),
            ToolParameterType::Number => matches!(value, Value::Number(_)),
            ToolParameterType::Integer => {
                matches!(value, Value::Number(n) if n.is_i64() || n.is_u64())
            }
            ToolParameterType::Boolean => matches!(value, Value::Bool(_)),
            ToolParameterType::Enum => match (value, &self.enum_values) {
                (Value::String(s), Some(values)) => values.contains(s),
                _ => false,
            },
        }
    }
}

/// A tool descriptor, as returned by `ToolService::list_tools`/`read_tool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub creation_utc: chrono::DateTime<chrono::Utc>,
    pub description: String,
    pub parameters: HashMap<String, ToolParameter>,
    pub required: Vec<String>,
    pub consequential: bool,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            creation_utc: chrono::Utc::now(),
            description: description.into(),
            parameters: HashMap::new(),
            required: Vec::new(),
            consequential: false,
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, parameter: ToolParameter) -> Self {
        self.parameters.insert(name.into(), parameter);
        self
    }

    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    pub fn consequential(mut self, consequential: bool) -> Self {
        self.consequential = consequential;
        self
    }

    /// Validates a call's arguments against required params and declared types.
    pub fn validate_arguments(
        &self,
        tool_id: &ToolId,
        arguments: &HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        for required in &self.required {
            if !arguments.contains_key(required) {
                return Err(ToolError::InvalidParameters {
                    tool_id: tool_id.clone(),
                    message: format!("missing required parameter: {}", required),
                }
                .into());
            }
        }

        for (name, value) in arguments {
            if let Some(param) = self.parameters.get(name) {
                if !param.accepts(value) {
                    return Err(ToolError::InvalidParameters {
                        tool_id: tool_id.clone(),
                        message: format!("parameter '{}' has wrong type", name),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }
}

/// The session mode a tool call may switch the session into at persistence
/// time: `auto` (agent replies automatically) or `manual` (a human takes
/// over).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Auto,
    Manual,
}

/// Optional control signal a tool may return alongside its result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SessionMode>,
}

/// The outcome of a single tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub data: serde_json::Value,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub control: ControlOptions,
}

impl ToolResult {
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            data,
            metadata: HashMap::new(),
            control: ControlOptions::default(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.control.mode = Some(mode);
        self
    }
}

/// A status reported by a tool while it runs, forwarded as a `status` side
/// event through the staging emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Typing,
    Processing,
    Ready,
}

/// Callbacks a running tool uses to stream side events. Both callbacks route
/// through the enclosing task's staging emitter and inherit the enclosing
/// task's correlation id (spec §9 Open Question (i)).
pub struct ToolContext {
    pub agent_id: AgentId,
    pub session_id: SessionId,
    emit_message: Box<dyn Fn(String) + Send + Sync>,
    emit_status: Box<dyn Fn(ToolStatus, serde_json::Value) + Send + Sync>,
}

impl ToolContext {
    pub fn new(
        agent_id: AgentId,
        session_id: SessionId,
        emit_message: impl Fn(String) + Send + Sync + 'static,
        emit_status: impl Fn(ToolStatus, serde_json::Value) + Send + Sync + 'static,
    ) -> Self {
        Self {
            agent_id,
            session_id,
            emit_message: Box::new(emit_message),
            emit_status: Box::new(emit_status),
        }
    }

    pub fn emit_message(&self, text: impl Into<String>) {
        (self.emit_message)(text.into());
    }

    pub fn emit_status(&self, status: ToolStatus, data: serde_json::Value) {
        (self.emit_status)(status, data);
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("agent_id", &self.agent_id)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// A source of callable tools: local (in-process), SDK-plugin (HTTP
/// chunked), or OpenAPI. Implemented by [`crate::services::local::LocalToolService`],
/// [`crate::services::plugin::PluginToolService`], and
/// [`crate::services::openapi::OpenApiToolService`].
#[async_trait::async_trait]
pub trait ToolService: Send + Sync {
    /// List every tool this service exposes.
    async fn list_tools(&self) -> Result<Vec<Tool>>;

    /// Read a single tool's descriptor by name.
    async fn read_tool(&self, tool_name: &str) -> Result<Tool>;

    /// Invoke a tool by name with the given arguments.
    async fn call_tool(
        &self,
        tool_name: &str,
        context: &ToolContext,
        arguments: HashMap<String, serde_json::Value>,
    ) -> Result<ToolResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_id_to_string() {
        let id = ToolId::new("local", "read_balance");
        assert_eq!(id.to_string_id(), "local:read_balance");
        assert_eq!(format!("{}", id), "local:read_balance");
    }

    #[test]
    fn test_tool_id_from_str() {
        let id: ToolId = "weather_plugin:get_forecast".parse().unwrap();
        assert_eq!(id.service_name, "weather_plugin");
        assert_eq!(id.tool_name, "get_forecast");
    }

    #[test]
    fn test_tool_id_from_str_missing_colon() {
        let result: std::result::Result<ToolId, String> = "no_colon_here".parse();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .contains("Invalid ToolId string format"));
    }

    #[test]
    fn test_tool_id_local_reserved_name() {
        let id = ToolId::local("read_balance");
        assert_eq!(id.service_name, LOCAL_SERVICE_NAME);
    }

    #[test]
    fn test_parameter_type_checks() {
        let string_param = ToolParameter::new(ToolParameterType::String);
        assert!(string_param.accepts(&serde_json::json!("hello")));
        assert!(!string_param.accepts(&serde_json::json!(42)));

        let enum_param =
            ToolParameter::new(ToolParameterType::Enum).with_enum(vec!["a".into(), "b".into()]);
        assert!(enum_param.accepts(&serde_json::json!("a")));
        assert!(!enum_param.accepts(&serde_json::json!("c")));
    }

    #[test]
    fn test_validate_arguments_missing_required() {
        let tool = Tool::new("test", "a test tool")
            .with_parameter("amount", ToolParameter::new(ToolParameterType::Number))
            .require("amount");

        let id = ToolId::local("test");
        let result = tool.validate_arguments(&id, &HashMap::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_arguments_success() {
        let tool = Tool::new("test", "a test tool")
            .with_parameter("amount", ToolParameter::new(ToolParameterType::Number))
            .require("amount");

        let id = ToolId::local("test");
        let mut args = HashMap::new();
        args.insert("amount".to_string(), serde_json::json!(10));
        assert!(tool.validate_arguments(&id, &args).is_ok());
    }

    #[test]
    fn test_tool_result_builder() {
        let result = ToolResult::new(serde_json::json!(999))
            .with_metadata("source", serde_json::json!("ledger"))
            .with_mode(SessionMode::Manual);

        assert_eq!(result.data, serde_json::json!(999));
        assert_eq!(result.control.mode, Some(SessionMode::Manual));
    }

    #[test]
    fn test_tool_context_emit_callbacks() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let message_emitted = Arc::new(AtomicBool::new(false));
        let message_emitted_clone = message_emitted.clone();

        let context = ToolContext::new(
            AgentId::new(),
            SessionId::new(),
            move |_text| message_emitted_clone.store(true, Ordering::SeqCst),
            |_status, _data| {},
        );

        context.emit_message("hello");
        assert!(message_emitted.load(Ordering::SeqCst));
    }
}
