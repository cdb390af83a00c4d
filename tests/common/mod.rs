//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use mcp_tool_interceptor::context::{handler_fn, ExecutionContext, ToolArgs, ToolHandler, ToolResult};
use mcp_tool_interceptor::host::{InMemoryToolHost, ToolHost};
use mcp_tool_interceptor::interceptor::ToolInterceptor;
use mcp_tool_interceptor::plugin::{
    ExecutionMode, HookChain, HookOutcome, PluginDescriptor, PluginManager, PluginSettings,
    ToolPlugin,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// Plugin that journals every hook it runs
pub struct Recorder {
    pub name: String,
    pub journal: Journal,
    pub short_circuit: Option<String>,
    pub fail_before: bool,
    pub before_delay: Option<Duration>,
    pub after_suffix: Option<String>,
}

impl Recorder {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            short_circuit: None,
            fail_before: false,
            before_delay: None,
            after_suffix: None,
        }
    }

    pub fn short_circuit(mut self, text: &str) -> Self {
        self.short_circuit = Some(text.to_string());
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_before = true;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.before_delay = Some(delay);
        self
    }

    pub fn appending(mut self, suffix: &str) -> Self {
        self.after_suffix = Some(suffix.to_string());
        self
    }
}

#[async_trait]
impl ToolPlugin for Recorder {
    async fn before_tool_call(&self, _ctx: &ExecutionContext) -> anyhow::Result<HookOutcome> {
        if let Some(delay) = self.before_delay {
            tokio::time::sleep(delay).await;
        }
        self.journal
            .lock()
            .unwrap()
            .push(format!("before:{}", self.name));

        if self.fail_before {
            anyhow::bail!("{} exploded", self.name);
        }
        match &self.short_circuit {
            Some(text) => Ok(HookOutcome::ShortCircuit(ToolResult::text(text.clone()))),
            None => Ok(HookOutcome::Continue),
        }
    }

    async fn after_tool_call(
        &self,
        _ctx: &ExecutionContext,
        result: ToolResult,
    ) -> anyhow::Result<ToolResult> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("after:{}", self.name));

        match (&self.after_suffix, result.first_text()) {
            (Some(suffix), Some(text)) if !result.is_error => {
                Ok(ToolResult::text(format!("{text}{suffix}")))
            }
            _ => Ok(result),
        }
    }
}

/// Handler echoing `args.message`, journaling and counting its calls
pub fn echo_handler(journal: &Journal, calls: &Arc<AtomicUsize>) -> ToolHandler {
    let journal = journal.clone();
    let calls = calls.clone();
    handler_fn(move |args: ToolArgs| {
        let journal = journal.clone();
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            journal.lock().unwrap().push("handler".to_string());
            let message = args
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("echo")
                .to_string();
            Ok(ToolResult::text(message))
        }
    })
}

pub struct Harness {
    pub host: Arc<InMemoryToolHost>,
    pub manager: Arc<PluginManager>,
    pub interceptor: ToolInterceptor<InMemoryToolHost>,
    pub journal: Journal,
    pub calls: Arc<AtomicUsize>,
}

/// Register plugins, initialize them, intercept a fresh host and register `echo`
pub async fn harness(
    mode: ExecutionMode,
    plugins: Vec<(PluginDescriptor, Arc<dyn ToolPlugin>)>,
    journal: Journal,
) -> Harness {
    let manager = Arc::new(PluginManager::new(1_000));
    for (descriptor, plugin) in plugins {
        manager.register(descriptor, plugin).unwrap();
    }
    let report = manager.initialize_all().await;
    assert!(report.failed.is_empty(), "unexpected init failures: {:?}", report.failed);

    let host = Arc::new(InMemoryToolHost::new());
    let chain = Arc::new(HookChain::new(manager.clone(), mode));
    let interceptor = ToolInterceptor::install(host.clone(), chain).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    interceptor
        .register_tool("echo", Value::Null, echo_handler(&journal, &calls))
        .unwrap();

    Harness {
        host,
        manager,
        interceptor,
        journal,
        calls,
    }
}

pub fn descriptor(name: &str, priority: i32) -> PluginDescriptor {
    PluginDescriptor::new(name, "1.0.0", priority, PluginSettings::fail_open())
}

pub fn descriptor_with(name: &str, priority: i32, settings: PluginSettings) -> PluginDescriptor {
    PluginDescriptor::new(name, "1.0.0", priority, settings)
}
