//! Per-call execution context
//!
//! An [`ExecutionContext`] is created for exactly one tool call, right before
//! the before-hook phase, and dropped once the after-hook phase completes. It
//! is never persisted or shared across calls.
//!
//! Hooks may run concurrently (parallel and hybrid modes), so the mutable
//! parts of the context are guarded:
//!
//! - `args` sits behind a `tokio::sync::RwLock`; hooks rewrite it before the
//!   original handler runs, which receives a snapshot
//! - `plugin_data` and the extension keys of `metadata` are `DashMap`s so
//!   plugins can hand values to later plugins without a global lock

pub mod types;

pub use types::{handler_fn, HandlerFuture, ToolArgs, ToolContent, ToolHandler, ToolResult};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::RwLock;

/// Call metadata: request id, start time and extension-defined keys
#[derive(Debug)]
pub struct CallMetadata {
    request_id: String,
    timestamp: DateTime<Utc>,
    extra: DashMap<String, Value>,
}

impl CallMetadata {
    fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            extra: DashMap::new(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.extra.get(key).map(|v| v.value().clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.extra.insert(key.into(), value)
    }

    /// Serializable view including request id and timestamp
    pub fn to_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for entry in self.extra.iter() {
            map.insert(entry.key().clone(), entry.value().clone());
        }
        map.insert("requestId".into(), Value::String(self.request_id.clone()));
        map.insert("timestamp".into(), Value::String(self.timestamp.to_rfc3339()));
        Value::Object(map)
    }
}

/// Data carried through one in-flight tool call
#[derive(Debug)]
pub struct ExecutionContext {
    tool_name: String,
    args: RwLock<ToolArgs>,
    metadata: CallMetadata,
    plugin_data: DashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new(tool_name: impl Into<String>, args: ToolArgs) -> Self {
        Self {
            tool_name: tool_name.into(),
            args: RwLock::new(args),
            metadata: CallMetadata::new(),
            plugin_data: DashMap::new(),
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn request_id(&self) -> &str {
        self.metadata.request_id()
    }

    pub fn metadata(&self) -> &CallMetadata {
        &self.metadata
    }

    /// Copy of the current arguments
    pub async fn args(&self) -> ToolArgs {
        self.args.read().await.clone()
    }

    pub async fn arg(&self, key: &str) -> Option<Value> {
        self.args.read().await.get(key).cloned()
    }

    pub async fn set_arg(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.args.write().await.insert(key.into(), value)
    }

    pub async fn remove_arg(&self, key: &str) -> Option<Value> {
        self.args.write().await.remove(key)
    }

    /// Rewrite the arguments in place under a single write lock
    pub async fn update_args<R>(&self, f: impl FnOnce(&mut ToolArgs) -> R) -> R {
        let mut args = self.args.write().await;
        f(&mut args)
    }

    pub fn plugin_data(&self, plugin: &str) -> Option<Value> {
        self.plugin_data.get(plugin).map(|v| v.value().clone())
    }

    pub fn set_plugin_data(&self, plugin: impl Into<String>, value: Value) -> Option<Value> {
        self.plugin_data.insert(plugin.into(), value)
    }

    pub fn plugin_data_keys(&self) -> Vec<String> {
        self.plugin_data.iter().map(|e| e.key().clone()).collect()
    }
}
