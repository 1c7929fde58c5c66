//! The OpenAPI tool service: exposes the operations of a third-party
//! OpenAPI document as tools, dispatching each call as the matching HTTP
//! request (spec §4.6/§6, grounded in `core/services/openapi.py`).
//!
//! The original's `openapi.py` stubs out the actual request dispatch
//! (`tool_func` returns `""`); the pack carries no OpenAPI-parsing crate, so
//! this walks the parsed `serde_json::Value` document directly rather than
//! going through a schema-object layer. Per operation: path/query parameters
//! become individual tool parameters, and the request body's top-level
//! `properties` (if any) are flattened into the same flat parameter map —
//! `required` is the union of the path/query `required` flags and the body
//! schema's `required` array, mirroring `parse_parameters`'s approach of
//! presenting one flat argument list regardless of where a value ultimately
//! goes on the wire.

use crate::error::{Result, ToolError};
use crate::tool::{Tool, ToolContext, ToolParameter, ToolParameterType, ToolResult, ToolService};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use tracing::trace;

/// One operation parsed out of an OpenAPI document: enough to both describe
/// the tool and dispatch its call.
#[derive(Debug, Clone)]
struct Operation {
    tool: Tool,
    method: Method,
    /// The path template, e.g. `/accounts/{account_id}/balance`.
    path_template: String,
    path_param_names: Vec<String>,
    query_param_names: Vec<String>,
    body_param_names: Vec<String>,
}

/// A tool service backed by a parsed OpenAPI document, dispatching calls to
/// `server_url` over HTTP.
pub struct OpenApiToolService {
    service_name: String,
    server_url: String,
    client: reqwest::Client,
    operations: HashMap<String, Operation>,
}

impl OpenApiToolService {
    /// Parses `openapi_json` (a full OpenAPI 3.x document) into one
    /// operation per (path, method), each exposed as a tool named after its
    /// `operationId`.
    pub fn new(
        service_name: impl Into<String>,
        server_url: impl Into<String>,
        openapi_json: &Value,
    ) -> Result<Self> {
        let service_name = service_name.into();
        let mut operations = HashMap::new();

        let paths = openapi_json
            .get("paths")
            .and_then(Value::as_object)
            .ok_or_else(|| ToolError::ImportFailed {
                tool_id: crate::tool::ToolId::new(service_name.clone(), "*"),
                message: "OpenAPI document has no 'paths' object".into(),
            })?;

        for (path_template, methods) in paths {
            let Some(methods) = methods.as_object() else { continue };

            for (method_str, operation_json) in methods {
                let Some(method) = parse_http_method(method_str) else { continue };

                let Some(operation_id) = operation_json.get("operationId").and_then(Value::as_str)
                else {
                    continue;
                };

                let description = operation_json
                    .get("description")
                    .or_else(|| operation_json.get("summary"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();

                let mut tool = Tool::new(operation_id, description);
                let mut path_param_names = Vec::new();
                let mut query_param_names = Vec::new();
                let mut body_param_names = Vec::new();

                if let Some(params) = operation_json.get("parameters").and_then(Value::as_array) {
                    for param in params {
                        let Some(name) = param.get("name").and_then(Value::as_str) else { continue };
                        let location = param.get("in").and_then(Value::as_str).unwrap_or("query");
                        let required = param.get("required").and_then(Value::as_bool).unwrap_or(false);
                        let param_type = parse_schema_type(param.get("schema"));

                        tool = tool.with_parameter(name, ToolParameter::new(param_type));
                        if required {
                            tool = tool.require(name);
                        }

                        match location {
                            "path" => path_param_names.push(name.to_string()),
                            _ => query_param_names.push(name.to_string()),
                        }
                    }
                }

                if let Some(body_schema) = operation_json
                    .pointer("/requestBody/content/application~1json/schema")
                {
                    let required_body_fields: Vec<String> = body_schema
                        .get("required")
                        .and_then(Value::as_array)
                        .map(|values| {
                            values
                                .iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default();

                    if let Some(properties) = body_schema.get("properties").and_then(Value::as_object)
                    {
                        for (name, schema) in properties {
                            let param_type = parse_schema_type(Some(schema));
                            tool = tool.with_parameter(name, ToolParameter::new(param_type));
                            if required_body_fields.contains(name) {
                                tool = tool.require(name);
                            }
                            body_param_names.push(name.clone());
                        }
                    }
                }

                operations.insert(
                    operation_id.to_string(),
                    Operation {
                        tool,
                        method,
                        path_template: path_template.clone(),
                        path_param_names,
                        query_param_names,
                        body_param_names,
                    },
                );
            }
        }

        Ok(Self {
            service_name,
            server_url: server_url.into(),
            client: reqwest::Client::new(),
            operations,
        })
    }

    fn tool_id(&self, tool_name: &str) -> crate::tool::ToolId {
        crate::tool::ToolId::new(self.service_name.clone(), tool_name)
    }

    fn resolve_path(&self, operation: &Operation, arguments: &HashMap<String, Value>) -> String {
        let mut resolved = operation.path_template.clone();
        for name in &operation.path_param_names {
            if let Some(value) = arguments.get(name) {
                let placeholder = format!("{{{name}}}");
                resolved = resolved.replace(&placeholder, &value_to_path_segment(value));
            }
        }
        resolved
    }
}

#[async_trait]
impl ToolService for OpenApiToolService {
    async fn list_tools(&self) -> Result<Vec<Tool>> {
        Ok(self.operations.values().map(|op| op.tool.clone()).collect())
    }

    async fn read_tool(&self, tool_name: &str) -> Result<Tool> {
        self.operations
            .get(tool_name)
            .map(|op| op.tool.clone())
            .ok_or_else(|| ToolError::NotFound(self.tool_id(tool_name)).into())
    }

    async fn call_tool(
        &self,
        tool_name: &str,
        _context: &ToolContext,
        arguments: HashMap<String, serde_json::Value>,
    ) -> Result<ToolResult> {
        let tool_id = self.tool_id(tool_name);

        let operation = self
            .operations
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_id.clone()))?;

        operation.tool.validate_arguments(&tool_id, &arguments)?;

        let path = self.resolve_path(operation, &arguments);
        let url = format!("{}{}", self.server_url, path);

        let mut request = self.client.request(operation.method.clone(), &url);

        let query_pairs: Vec<(String, String)> = operation
            .query_param_names
            .iter()
            .filter_map(|name| arguments.get(name).map(|v| (name.clone(), value_to_path_segment(v))))
            .collect();
        if !query_pairs.is_empty() {
            request = request.query(&query_pairs);
        }

        if !operation.body_param_names.is_empty() {
            let mut body = serde_json::Map::new();
            for name in &operation.body_param_names {
                if let Some(value) = arguments.get(name) {
                    body.insert(name.clone(), value.clone());
                }
            }
            request = request.json(&Value::Object(body));
        }

        trace!(tool = %tool_id, %url, "dispatching OpenAPI tool call");
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(ToolError::ExecutionFailed {
                tool_id,
                message: format!("HTTP {}", response.status()),
            }
            .into());
        }

        let data: Value = response.json().await.unwrap_or(Value::Null);
        Ok(ToolResult::new(data))
    }
}

fn parse_http_method(method_str: &str) -> Option<Method> {
    match method_str.to_ascii_uppercase().as_str() {
        "GET" => Some(Method::GET),
        "POST" => Some(Method::POST),
        "PUT" => Some(Method::PUT),
        "PATCH" => Some(Method::PATCH),
        "DELETE" => Some(Method::DELETE),
        _ => None,
    }
}

fn parse_schema_type(schema: Option<&Value>) -> ToolParameterType {
    let Some(type_str) = schema.and_then(|s| s.get("type")).and_then(Value::as_str) else {
        return ToolParameterType::String;
    };

    match type_str {
        "integer" => ToolParameterType::Integer,
        "number" => ToolParameterType::Number,
        "boolean" => ToolParameterType::Boolean,
        "string" if schema.and_then(|s| s.get("enum")).is_some() => ToolParameterType::Enum,
        _ => ToolParameterType::String,
    }
}

fn value_to_path_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
