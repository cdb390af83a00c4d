//! Tool hosts: the registration primitive the interceptor wraps
//!
//! A host maps tool names to handlers. [`InMemoryToolHost`] is a complete
//! host without any transport, used for embedding and tests.

use crate::context::{ToolArgs, ToolHandler, ToolResult};
use crate::error::{InterceptorError, RegistrationError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Host registration entry point
pub trait ToolHost: Send + Sync {
    /// Register `handler` under `name`; names are unique per host
    fn register_tool(&self, name: &str, schema: Value, handler: ToolHandler) -> Result<()>;

    /// Names of all tools registered so far
    fn tool_names(&self) -> Vec<String>;
}

/// Listing entry for a registered tool
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    pub input_schema: Value,
}

struct RegisteredTool {
    schema: Value,
    handler: ToolHandler,
}

/// Tool host backed by a concurrent map
#[derive(Default)]
pub struct InMemoryToolHost {
    tools: DashMap<String, RegisteredTool>,
}

impl InMemoryToolHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke a tool. Unknown tools and handler errors become error results.
    pub async fn call_tool(&self, name: &str, args: ToolArgs) -> ToolResult {
        // Clone the handler so the map guard is released before awaiting
        let handler = match self.tools.get(name) {
            Some(tool) => tool.handler.clone(),
            None => {
                debug!(tool = %name, "Call to unknown tool");
                return ToolResult::error(InterceptorError::ToolNotFound(name.to_string()).to_string());
            }
        };

        match handler(args).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool handler returned an error");
                ToolResult::error(e.to_string())
            }
        }
    }

    /// Registered tools sorted by name
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        let mut tools: Vec<ToolInfo> = self
            .tools
            .iter()
            .map(|entry| ToolInfo {
                name: entry.key().clone(),
                input_schema: entry.value().schema.clone(),
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

impl ToolHost for InMemoryToolHost {
    fn register_tool(&self, name: &str, schema: Value, handler: ToolHandler) -> Result<()> {
        match self.tools.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RegistrationError::DuplicateTool(name.to_string()).into()),
            Entry::Vacant(slot) => {
                slot.insert(RegisteredTool { schema, handler });
                debug!(tool = %name, "Registered tool");
                Ok(())
            }
        }
    }

    fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
