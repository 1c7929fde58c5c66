//! The in-process tool service
//!
//! The original dispatches a local tool call via `importlib` against a
//! module path stored on the tool's registration (`core/tools.py`). Rust has
//! no equivalent dynamic import, so a local tool is instead a closure
//! registered under its name ahead of time (spec §9, "Supplemented from
//! original_source" note on `LocalToolService`); lookup failure maps to the
//! same [`ToolError::ImportFailed`] the original raises for an unresolvable
//! module path.

use crate::error::{Result, ToolError};
use crate::tool::{Tool, ToolContext, ToolResult, ToolService};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

type ToolFn = Box<
    dyn Fn(
            &ToolContext,
            HashMap<String, serde_json::Value>,
        ) -> Pin<Box<dyn Future<Output = Result<ToolResult>> + Send>>
        + Send
        + Sync,
>;

struct LocalTool {
    descriptor: Tool,
    handler: ToolFn,
}

/// A tool service backed entirely by in-process closures, keyed by tool name.
#[derive(Default)]
pub struct LocalToolService {
    tools: RwLock<HashMap<String, LocalTool>>,
}

impl LocalToolService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under `descriptor.name`, overwriting any previous
    /// registration of the same name.
    pub fn register<F, Fut>(&self, descriptor: Tool, handler: F)
    where
        F: Fn(&ToolContext, HashMap<String, serde_json::Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult>> + Send + 'static,
    {
        let name = descriptor.name.clone();
        let boxed_handler: ToolFn = Box::new(move |ctx, args| Box::pin(handler(ctx, args)));
        self.tools.write().expect("local tool service lock poisoned").insert(
            name,
            LocalTool {
                descriptor,
                handler: boxed_handler,
            },
        );
    }
}

#[async_trait]
impl ToolService for LocalToolService {
    async fn list_tools(&self) -> Result<Vec<Tool>> {
        Ok(self
            .tools
            .read()
            .expect("local tool service lock poisoned")
            .values()
            .map(|t| t.descriptor.clone())
            .collect())
    }

    async fn read_tool(&self, tool_name: &str) -> Result<Tool> {
        self.tools
            .read()
            .expect("local tool service lock poisoned")
            .get(tool_name)
            .map(|t| t.descriptor.clone())
            .ok_or_else(|| {
                ToolError::ImportFailed {
                    tool_id: crate::tool::ToolId::local(tool_name),
                    message: format!("no local tool registered under name '{tool_name}'"),
                }
                .into()
            })
    }

    async fn call_tool(
        &self,
        tool_name: &str,
        context: &ToolContext,
        arguments: HashMap<String, serde_json::Value>,
    ) -> Result<ToolResult> {
        let tool_id = crate::tool::ToolId::local(tool_name);

        let descriptor = self.read_tool(tool_name).await?;
        descriptor.validate_arguments(&tool_id, &arguments)?;

        let future = {
            let tools = self.tools.read().expect("local tool service lock poisoned");
            let tool = tools.get(tool_name).ok_or_else(|| ToolError::ImportFailed {
                tool_id: tool_id.clone(),
                message: format!("no local tool registered under name '{tool_name}'"),
            })?;
            (tool.handler)(context, arguments)
        };

        future.await
    }
}
