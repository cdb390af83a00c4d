//! Tool call payload types shared by hooks, handlers and hosts

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Arguments of a single tool call
pub type ToolArgs = serde_json::Map<String, serde_json::Value>;

/// Future returned by a tool handler
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<ToolResult>>;

/// A registered tool handler: maps call arguments to a result
pub type ToolHandler = Arc<dyn Fn(ToolArgs) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`ToolHandler`]
pub fn handler_fn<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ToolResult>> + Send + 'static,
{
    Arc::new(move |args: ToolArgs| -> HandlerFuture { Box::pin(f(args)) })
}

/// Content item of a tool result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

/// Result of a tool call as seen by the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,

    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<serde_json::Value>,

    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            structured_content: None,
            is_error: false,
        }
    }

    pub fn structured(value: serde_json::Value) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: value.to_string(),
            }],
            structured_content: Some(value),
            is_error: false,
        }
    }

    /// Error result carrying a message; never a raw error
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            structured_content: None,
            is_error: true,
        }
    }

    /// Text of the first text content item
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|c| match c {
            ToolContent::Text { text } => Some(text.as_str()),
        })
    }
}
