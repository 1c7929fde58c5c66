//! The SDK-plugin tool service: an HTTP client for externally hosted tools
//! that speak the chunked-JSON call contract (spec §6, grounded in the
//! original `core/services/tools/plugins.py`).
//!
//! `call_tool` streams a POST response body as newline-delimited JSON
//! chunks (spec §6). Each chunk is a bare JSON object, discriminated by
//! which fields it carries rather than by any tag:
//! - `{"status": ..., "data": {...}}` — forwarded as a status side event via
//!   [`ToolContext::emit_status`]
//! - `{"message": "<text>"}` — forwarded as a message side event via
//!   [`ToolContext::emit_message`]
//! - `{"error": "<text>"}` — raises [`ToolError::ExecutionFailed`]
//! - `{"data": <json>, "metadata": {...}, "control"?: {...}}` — the
//!   terminal chunk; ends the stream and becomes the [`ToolResult`]
//!
//! A chunk can carry a `"status"` key and a `"data"` key at once (the status
//! payload), so `"status"` is checked before `"data"` to tell a status update
//! apart from the terminal result. A stream that ends without a terminal
//! chunk is [`ToolError::NoResultChunk`], matching the original's
//! "Unexpected response (no result chunk)".

use crate::error::{Result, ToolError};
use crate::tool::{ControlOptions, Tool, ToolContext, ToolResult, ToolService, ToolStatus};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{trace, warn};

enum PluginChunk {
    Status { status: ToolStatus, data: serde_json::Value },
    Message { text: String },
    Data { data: serde_json::Value, metadata: HashMap<String, serde_json::Value>, control: ControlOptions },
    Error { message: String },
}

/// Parses one streamed chunk by field presence, per the wire contract in
/// spec §6 (no discriminant tag is sent over the wire).
fn parse_plugin_chunk(raw: &serde_json::Value) -> std::result::Result<PluginChunk, String> {
    if let Some(message) = raw.get("error").and_then(serde_json::Value::as_str) {
        return Ok(PluginChunk::Error { message: message.to_string() });
    }

    if let Some(text) = raw.get("message").and_then(serde_json::Value::as_str) {
        return Ok(PluginChunk::Message { text: text.to_string() });
    }

    if let Some(status_value) = raw.get("status") {
        let status: ToolStatus = serde_json::from_value(status_value.clone())
            .map_err(|e| format!("invalid status value: {e}"))?;
        let data = raw.get("data").cloned().unwrap_or(serde_json::Value::Null);
        return Ok(PluginChunk::Status { status, data });
    }

    if let Some(data) = raw.get("data") {
        let metadata = raw
            .get("metadata")
            .cloned()
            .map(|v| serde_json::from_value(v).map_err(|e| format!("invalid metadata: {e}")))
            .transpose()?
            .unwrap_or_default();
        let control = raw
            .get("control")
            .cloned()
            .map(|v| serde_json::from_value(v).map_err(|e| format!("invalid control: {e}")))
            .transpose()?
            .unwrap_or_default();
        return Ok(PluginChunk::Data { data: data.clone(), metadata, control });
    }

    Err(format!("unrecognized chunk shape: {raw}"))
}

/// A tool service proxying calls to an externally hosted plugin process over
/// HTTP (spec §6's "Plugin RPC" surface).
pub struct PluginToolService {
    service_name: String,
    base_url: String,
    client: reqwest::Client,
}

impl PluginToolService {
    pub fn new(service_name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::with_timeout(service_name, base_url, Duration::from_secs(120))
    }

    pub fn with_timeout(
        service_name: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build plugin HTTP client"),
        }
    }

    fn tool_id(&self, tool_name: &str) -> crate::tool::ToolId {
        crate::tool::ToolId::new(self.service_name.clone(), tool_name)
    }
}

#[async_trait]
impl ToolService for PluginToolService {
    async fn list_tools(&self) -> Result<Vec<Tool>> {
        let url = format!("{}/tools", self.base_url);
        let tools: Vec<Tool> = self.client.get(&url).send().await?.json().await?;
        Ok(tools)
    }

    async fn read_tool(&self, tool_name: &str) -> Result<Tool> {
        let url = format!("{}/tools/{}", self.base_url, tool_name);
        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ToolError::NotFound(self.tool_id(tool_name)).into());
        }

        Ok(response.json().await?)
    }

    async fn call_tool(
        &self,
        tool_name: &str,
        context: &ToolContext,
        arguments: HashMap<String, serde_json::Value>,
    ) -> Result<ToolResult> {
        let tool_id = self.tool_id(tool_name);
        let url = format!("{}/tools/{}/calls", self.base_url, tool_name);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "session_id": context.session_id,
                "arguments": arguments,
            }))
            .send()
            .await?;

        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline_pos) = buffer.find('\n') {
                let line = buffer[..newline_pos].trim().to_string();
                buffer.drain(..=newline_pos);

                if line.is_empty() {
                    continue;
                }

                let raw_value: serde_json::Value = serde_json::from_str(&line).map_err(|e| {
                    ToolError::ExecutionFailed {
                        tool_id: tool_id.clone(),
                        message: format!("malformed chunk from plugin: {e}"),
                    }
                })?;

                let parsed = parse_plugin_chunk(&raw_value).map_err(|message| ToolError::ExecutionFailed {
                    tool_id: tool_id.clone(),
                    message,
                })?;

                match parsed {
                    PluginChunk::Status { status, data } => {
                        trace!(tool = %tool_id, ?status, "plugin status chunk");
                        context.emit_status(status, data);
                    }
                    PluginChunk::Message { text } => {
                        context.emit_message(text);
                    }
                    PluginChunk::Data { data, metadata, control } => {
                        return Ok(ToolResult {
                            data,
                            metadata,
                            control,
                        });
                    }
                    PluginChunk::Error { message } => {
                        warn!(tool = %tool_id, %message, "plugin reported a tool error");
                        return Err(ToolError::ExecutionFailed {
                            tool_id,
                            message,
                        }
                        .into());
                    }
                }
            }
        }

        Err(ToolError::NoResultChunk(tool_id).into())
    }
}
