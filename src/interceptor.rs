//! Registration interception
//!
//! [`ToolInterceptor`] wraps a [`ToolHost`] and exposes the same
//! registration entry point. Every handler registered through it is replaced
//! by an enhanced handler that runs the hook chain around the original.
//!
//! Interception is not retroactive: tools registered on the host before the
//! interceptor was installed would bypass every plugin, so `install` refuses
//! a host that already has tools.

use crate::context::{ExecutionContext, HandlerFuture, ToolArgs, ToolHandler, ToolResult};
use crate::error::{RegistrationError, Result};
use crate::host::ToolHost;
use crate::plugin::chain::{BeforeOutcome, HookChain};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// Metadata key holding the handler's error message when it failed
pub const HANDLER_ERROR_METADATA: &str = "handlerError";

/// What happened during one intercepted call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    pub tool_name: String,
    pub request_id: String,
    /// Plugins whose before hooks ran, in order
    pub before_plugins: Vec<String>,
    pub short_circuited_by: Option<String>,
    /// Fail-closed plugin whose failure aborted the call
    pub failed_plugin: Option<String>,
    pub handler_invoked: bool,
    pub duration_ms: u64,
    pub is_error: bool,
}

/// Host wrapper that inserts the hook chain around every registered handler
pub struct ToolInterceptor<H> {
    host: Arc<H>,
    chain: Arc<HookChain>,
}

impl<H: ToolHost + 'static> ToolInterceptor<H> {
    /// Install interception on `host`.
    ///
    /// Fails with [`RegistrationError::PreexistingTools`] when the host
    /// already has registrations.
    ///
    /// Only tools registered through the returned interceptor are wrapped.
    /// Callers keeping their own `Arc<H>` must use it for invoking tools,
    /// not for registering them: a direct registration runs no hooks.
    pub fn install(host: Arc<H>, chain: Arc<HookChain>) -> Result<Self> {
        let existing = host.tool_names();
        if !existing.is_empty() {
            error!(
                tools = ?existing,
                "Refusing to intercept a host with existing registrations"
            );
            return Err(RegistrationError::PreexistingTools(existing).into());
        }

        info!(
            mode = ?chain.mode(),
            plugins = chain.manager().plugin_count(),
            "Tool interceptor installed"
        );
        Ok(Self { host, chain })
    }

    /// The wrapped host, for invoking tools. Registrations made on it
    /// directly bypass the hook chain.
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn chain(&self) -> &Arc<HookChain> {
        &self.chain
    }

    fn enhance(&self, name: &str, handler: ToolHandler) -> ToolHandler {
        let chain = self.chain.clone();
        let tool: Arc<str> = Arc::from(name);

        Arc::new(move |args: ToolArgs| -> HandlerFuture {
            let chain = chain.clone();
            let handler = handler.clone();
            let tool = tool.clone();
            Box::pin(async move {
                let (result, _summary) = intercept(&chain, &tool, &handler, args).await;
                Ok(result)
            })
        })
    }
}

impl<H: ToolHost + 'static> ToolHost for ToolInterceptor<H> {
    fn register_tool(&self, name: &str, schema: Value, handler: ToolHandler) -> Result<()> {
        let enhanced = self.enhance(name, handler);
        self.host.register_tool(name, schema, enhanced)?;
        debug!(tool = %name, "Registered intercepted tool");
        Ok(())
    }

    fn tool_names(&self) -> Vec<String> {
        self.host.tool_names()
    }
}

/// Run one call through the hook chain.
///
/// Never fails: hook failures, short-circuits and handler errors all end up
/// as a [`ToolResult`].
pub async fn intercept(
    chain: &HookChain,
    tool_name: &str,
    handler: &ToolHandler,
    args: ToolArgs,
) -> (ToolResult, CallSummary) {
    let ctx = Arc::new(ExecutionContext::new(tool_name, args));
    let span = info_span!(
        "tool_call",
        tool = %tool_name,
        request_id = %ctx.request_id()
    );

    run_call(chain, &ctx, handler).instrument(span).await
}

async fn run_call(
    chain: &HookChain,
    ctx: &Arc<ExecutionContext>,
    handler: &ToolHandler,
) -> (ToolResult, CallSummary) {
    let started = Instant::now();
    let before = chain.run_before(ctx).await;

    let mut summary = CallSummary {
        tool_name: ctx.tool_name().to_string(),
        request_id: ctx.request_id().to_string(),
        before_plugins: before.invoked_names(),
        short_circuited_by: None,
        failed_plugin: None,
        handler_invoked: false,
        duration_ms: 0,
        is_error: false,
    };

    let result = match before.outcome {
        BeforeOutcome::Proceed => {
            summary.handler_invoked = true;
            call_handler(ctx, handler).await
        }
        BeforeOutcome::ShortCircuit { plugin, result } => {
            summary.short_circuited_by = Some(plugin);
            result
        }
        BeforeOutcome::Failed { plugin, error } => {
            summary.failed_plugin = Some(plugin);
            ToolResult::error(error.to_string())
        }
    };

    let result = chain.run_after(ctx, &before.invoked, result).await;

    summary.duration_ms = started.elapsed().as_millis() as u64;
    summary.is_error = result.is_error;

    if let Some(metrics) = chain.metrics() {
        metrics.record_tool_call(summary.short_circuited_by.is_some(), result.is_error);
    }

    debug!(
        tool = %summary.tool_name,
        request_id = %summary.request_id,
        short_circuited_by = ?summary.short_circuited_by,
        failed_plugin = ?summary.failed_plugin,
        handler_invoked = summary.handler_invoked,
        duration_ms = summary.duration_ms,
        is_error = summary.is_error,
        "Tool call completed"
    );

    (result, summary)
}

/// Invoke the original handler with the current arguments.
///
/// The handler runs in its own task so a panic is reported as an error
/// result instead of unwinding through the host.
async fn call_handler(ctx: &ExecutionContext, handler: &ToolHandler) -> ToolResult {
    let args = ctx.args().await;
    let task = tokio::spawn(handler(args).instrument(Span::current()));

    let failure = match task.await {
        Ok(Ok(result)) => return result,
        Ok(Err(e)) => e.to_string(),
        Err(join_error) => format!("tool handler panicked: {join_error}"),
    };

    warn!(
        tool = %ctx.tool_name(),
        request_id = %ctx.request_id(),
        error = %failure,
        "Tool handler failed"
    );
    ctx.metadata().insert(HANDLER_ERROR_METADATA, json!(failure));
    ToolResult::error(failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::handler_fn;
    use crate::host::InMemoryToolHost;
    use crate::plugin::config::{ExecutionMode, PluginSettings};
    use crate::plugin::hook::ToolPlugin;
    use crate::plugin::manager::PluginManager;
    use crate::plugin::schema::{HookOutcome, PluginDescriptor};
    use crate::error::InterceptorError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Rewrite;

    #[async_trait]
    impl ToolPlugin for Rewrite {
        async fn before_tool_call(&self, ctx: &ExecutionContext) -> anyhow::Result<HookOutcome> {
            ctx.set_arg("message", json!("rewritten")).await;
            Ok(HookOutcome::Continue)
        }
    }

    struct Observer;

    #[async_trait]
    impl ToolPlugin for Observer {
        async fn after_tool_call(
            &self,
            ctx: &ExecutionContext,
            result: ToolResult,
        ) -> anyhow::Result<ToolResult> {
            ctx.set_plugin_data("observer", json!({"sawError": result.is_error}));
            Ok(result)
        }
    }

    async fn chain_with(plugins: Vec<(&str, i32, Arc<dyn ToolPlugin>)>) -> Arc<HookChain> {
        let manager = Arc::new(PluginManager::new(1_000));
        for (name, priority, plugin) in plugins {
            manager
                .register(
                    PluginDescriptor::new(name, "1.0.0", priority, PluginSettings::fail_open()),
                    plugin,
                )
                .unwrap();
        }
        manager.initialize_all().await;
        Arc::new(HookChain::new(manager, ExecutionMode::Serial))
    }

    fn echo() -> ToolHandler {
        handler_fn(|args: ToolArgs| async move {
            Ok(ToolResult::text(
                args.get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            ))
        })
    }

    #[tokio::test]
    async fn test_install_refuses_preexisting_tools() {
        let host = Arc::new(InMemoryToolHost::new());
        host.register_tool("early", Value::Null, echo()).unwrap();

        let chain = chain_with(vec![]).await;
        let err = ToolInterceptor::install(host, chain).err().unwrap();
        assert!(matches!(
            err,
            InterceptorError::Registration(RegistrationError::PreexistingTools(ref tools))
                if tools == &vec!["early".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_handler_sees_mutated_args() {
        let host = Arc::new(InMemoryToolHost::new());
        let chain = chain_with(vec![("rewrite", 10, Arc::new(Rewrite))]).await;
        let interceptor = ToolInterceptor::install(host.clone(), chain).unwrap();
        interceptor
            .register_tool("echo", Value::Null, echo())
            .unwrap();

        let mut args = ToolArgs::new();
        args.insert("message".into(), json!("original"));
        let result = host.call_tool("echo", args).await;
        assert_eq!(result.first_text(), Some("rewritten"));
    }

    #[tokio::test]
    async fn test_only_interceptor_registrations_run_hooks() {
        let host = Arc::new(InMemoryToolHost::new());
        let chain = chain_with(vec![("rewrite", 10, Arc::new(Rewrite))]).await;
        let interceptor = ToolInterceptor::install(host.clone(), chain).unwrap();
        interceptor
            .register_tool("wrapped", Value::Null, echo())
            .unwrap();
        interceptor
            .host()
            .register_tool("direct", Value::Null, echo())
            .unwrap();

        let mut args = ToolArgs::new();
        args.insert("message".into(), json!("original"));
        let wrapped = host.call_tool("wrapped", args.clone()).await;
        let direct = host.call_tool("direct", args).await;

        assert_eq!(wrapped.first_text(), Some("rewritten"));
        assert_eq!(direct.first_text(), Some("original"));
        assert_eq!(interceptor.tool_names(), vec!["direct", "wrapped"]);
    }

    #[tokio::test]
    async fn test_duplicate_registration_through_interceptor() {
        let host = Arc::new(InMemoryToolHost::new());
        let interceptor = ToolInterceptor::install(host, chain_with(vec![]).await).unwrap();
        interceptor.register_tool("echo", Value::Null, echo()).unwrap();

        let err = interceptor
            .register_tool("echo", Value::Null, echo())
            .unwrap_err();
        assert!(matches!(
            err,
            InterceptorError::Registration(RegistrationError::DuplicateTool(_))
        ));
    }

    #[tokio::test]
    async fn test_handler_error_reaches_after_hooks() {
        let chain = chain_with(vec![("observer", 5, Arc::new(Observer))]).await;
        let failing = handler_fn(|_args| async {
            Err::<ToolResult, _>(anyhow::anyhow!("upstream unavailable"))
        });

        let ctx = Arc::new(ExecutionContext::new("fetch", ToolArgs::new()));
        let (result, summary) = run_call(&chain, &ctx, &failing).await;

        assert!(result.is_error);
        assert_eq!(result.first_text(), Some("upstream unavailable"));
        assert!(summary.handler_invoked);
        assert!(summary.is_error);
        assert_eq!(ctx.plugin_data("observer"), Some(json!({"sawError": true})));
        assert_eq!(
            ctx.metadata().get(HANDLER_ERROR_METADATA),
            Some(json!("upstream unavailable"))
        );
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_error_result() {
        let chain = chain_with(vec![]).await;
        let panicking = handler_fn(|args: ToolArgs| async move {
            if args.is_empty() {
                panic!("handler bug");
            }
            Ok(ToolResult::text("unreachable"))
        });

        let (result, summary) = intercept(&chain, "boom", &panicking, ToolArgs::new()).await;
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("panicked"));
        assert!(summary.handler_invoked);
    }

    #[tokio::test]
    async fn test_handler_runs_once_per_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler = handler_fn(move |_args| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ToolResult::text("ok"))
            }
        });

        let chain = chain_with(vec![
            ("rewrite", 10, Arc::new(Rewrite)),
            ("observer", 5, Arc::new(Observer)),
        ])
        .await;
        let (_, summary) = intercept(&chain, "count", &handler, ToolArgs::new()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.before_plugins, vec!["rewrite", "observer"]);
    }
}
