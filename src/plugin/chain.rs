//! Hook chain execution logic
//!
//! This module runs the before and after hooks of every eligible plugin for
//! one tool call. Before hooks run serially, in parallel, or in dependency
//! stages (hybrid); after hooks always run serially in the exact reverse of
//! the plugins whose before hooks ran.
//!
//! Every hook invocation is spawned as its own task and bounded by the
//! plugin's timeout. A timeout only discards the hook's result: the task is
//! detached, not aborted, so a slow hook can finish its work without leaving
//! partial state behind.

use crate::context::{ExecutionContext, ToolResult};
use crate::error::HookError;
use crate::metrics::HookMetrics;
use crate::plugin::config::{ExecutionMode, FailurePolicy};
use crate::plugin::manager::{PluginManager, RegisteredPlugin};
use crate::plugin::schema::HookOutcome;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn, Instrument};

/// Hook phase, used in logs and metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Before,
    After,
}

impl HookPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            HookPhase::Before => "before",
            HookPhase::After => "after",
        }
    }
}

/// Decision reached by the before phase
#[derive(Debug)]
pub enum BeforeOutcome {
    /// Call the original handler
    Proceed,
    /// A plugin supplied the result; the handler is skipped
    ShortCircuit { plugin: String, result: ToolResult },
    /// A fail-closed plugin failed; the handler is skipped
    Failed { plugin: String, error: HookError },
}

/// Result of the before phase for one call
#[derive(Debug)]
pub struct BeforePhase {
    pub outcome: BeforeOutcome,
    /// Plugins whose before hooks ran, in invocation order
    pub invoked: Vec<Arc<RegisteredPlugin>>,
}

impl BeforePhase {
    pub fn invoked_names(&self) -> Vec<String> {
        self.invoked.iter().map(|p| p.name().to_string()).collect()
    }
}

/// Runs plugin hooks around tool calls
pub struct HookChain {
    manager: Arc<PluginManager>,
    mode: ExecutionMode,
    metrics: Option<Arc<HookMetrics>>,
}

impl HookChain {
    pub fn new(manager: Arc<PluginManager>, mode: ExecutionMode) -> Self {
        Self {
            manager,
            mode,
            metrics: None,
        }
    }

    /// Record hook executions, failures and timeouts
    pub fn with_metrics(mut self, metrics: Arc<HookMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub(crate) fn metrics(&self) -> Option<&Arc<HookMetrics>> {
        self.metrics.as_ref()
    }

    /// Run the before hooks of all eligible plugins for this call
    pub async fn run_before(&self, ctx: &Arc<ExecutionContext>) -> BeforePhase {
        match self.mode {
            ExecutionMode::Serial => {
                let order = self.manager.execution_order(ctx.tool_name());
                self.run_serial(ctx, order).await
            }
            ExecutionMode::Parallel => {
                let order = self.manager.execution_order(ctx.tool_name());
                let outcome = self.run_stage(ctx, &order).await;
                BeforePhase {
                    outcome,
                    invoked: order,
                }
            }
            ExecutionMode::Hybrid => {
                let stages = self.manager.execution_stages(ctx.tool_name());
                let mut invoked = Vec::new();
                for (index, stage) in stages.into_iter().enumerate() {
                    debug!(
                        tool = %ctx.tool_name(),
                        stage = index,
                        plugins = stage.len(),
                        "Running hybrid stage"
                    );
                    let outcome = self.run_stage(ctx, &stage).await;
                    invoked.extend(stage);
                    if !matches!(outcome, BeforeOutcome::Proceed) {
                        return BeforePhase { outcome, invoked };
                    }
                }
                BeforePhase {
                    outcome: BeforeOutcome::Proceed,
                    invoked,
                }
            }
        }
    }

    async fn run_serial(
        &self,
        ctx: &Arc<ExecutionContext>,
        order: Vec<Arc<RegisteredPlugin>>,
    ) -> BeforePhase {
        let mut invoked = Vec::with_capacity(order.len());

        for plugin in order {
            invoked.push(plugin.clone());
            match self.invoke_before(&plugin, ctx).await {
                Ok(HookOutcome::Continue) => {}
                Ok(HookOutcome::ShortCircuit(result)) => {
                    info!(
                        plugin = %plugin.name(),
                        tool = %ctx.tool_name(),
                        request_id = %ctx.request_id(),
                        "Before hook short-circuited the call"
                    );
                    return BeforePhase {
                        outcome: BeforeOutcome::ShortCircuit {
                            plugin: plugin.name().to_string(),
                            result,
                        },
                        invoked,
                    };
                }
                Err(error) => {
                    if self.report_failure(&plugin, ctx, HookPhase::Before, &error) {
                        return BeforePhase {
                            outcome: BeforeOutcome::Failed {
                                plugin: plugin.name().to_string(),
                                error,
                            },
                            invoked,
                        };
                    }
                }
            }
        }

        BeforePhase {
            outcome: BeforeOutcome::Proceed,
            invoked,
        }
    }

    /// Run one group of before hooks concurrently, then pick the decision.
    ///
    /// All hooks are awaited before deciding so the winner does not depend
    /// on timing: the first short-circuit or fail-closed failure in
    /// priority order wins, the rest are discarded.
    async fn run_stage(
        &self,
        ctx: &Arc<ExecutionContext>,
        stage: &[Arc<RegisteredPlugin>],
    ) -> BeforeOutcome {
        let results = join_all(stage.iter().map(|p| self.invoke_before(p, ctx))).await;

        let mut decision = BeforeOutcome::Proceed;
        for (plugin, result) in stage.iter().zip(results) {
            let undecided = matches!(decision, BeforeOutcome::Proceed);
            match result {
                Ok(HookOutcome::Continue) => {}
                Ok(HookOutcome::ShortCircuit(result)) => {
                    if undecided {
                        info!(
                            plugin = %plugin.name(),
                            tool = %ctx.tool_name(),
                            request_id = %ctx.request_id(),
                            "Before hook short-circuited the call"
                        );
                        decision = BeforeOutcome::ShortCircuit {
                            plugin: plugin.name().to_string(),
                            result,
                        };
                    } else {
                        debug!(
                            plugin = %plugin.name(),
                            "Discarding short-circuit from lower-priority plugin"
                        );
                    }
                }
                Err(error) => {
                    let closed = self.report_failure(plugin, ctx, HookPhase::Before, &error);
                    if closed && undecided {
                        decision = BeforeOutcome::Failed {
                            plugin: plugin.name().to_string(),
                            error,
                        };
                    }
                }
            }
        }

        decision
    }

    /// Run after hooks in reverse of `invoked`, threading the result through.
    ///
    /// A fail-open failure keeps the last good result; a fail-closed failure
    /// replaces it with an error result that later hooks still see.
    pub async fn run_after(
        &self,
        ctx: &Arc<ExecutionContext>,
        invoked: &[Arc<RegisteredPlugin>],
        result: ToolResult,
    ) -> ToolResult {
        let mut current = result;

        for plugin in invoked.iter().rev() {
            let hook = plugin.plugin();
            let task_ctx = ctx.clone();
            let input = current.clone();
            let outcome = self
                .guarded(plugin, ctx, HookPhase::After, async move {
                    hook.after_tool_call(&task_ctx, input).await
                })
                .await;

            match outcome {
                Ok(next) => current = next,
                Err(error) => {
                    if self.report_failure(plugin, ctx, HookPhase::After, &error) {
                        current = ToolResult::error(error.to_string());
                    }
                }
            }
        }

        current
    }

    async fn invoke_before(
        &self,
        plugin: &Arc<RegisteredPlugin>,
        ctx: &Arc<ExecutionContext>,
    ) -> Result<HookOutcome, HookError> {
        let hook = plugin.plugin();
        let task_ctx = ctx.clone();
        self.guarded(plugin, ctx, HookPhase::Before, async move {
            hook.before_tool_call(&task_ctx).await
        })
        .await
    }

    /// Spawn a hook body and bound it by the plugin's timeout
    async fn guarded<T, F>(
        &self,
        plugin: &RegisteredPlugin,
        ctx: &ExecutionContext,
        phase: HookPhase,
        hook: F,
    ) -> Result<T, HookError>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let timeout_ms = self.manager.timeout_ms_for(plugin);
        let start = Instant::now();

        debug!(
            plugin = %plugin.name(),
            tool = %ctx.tool_name(),
            phase = phase.as_str(),
            timeout_ms,
            "Invoking hook"
        );

        let handle = tokio::spawn(hook.instrument(tracing::Span::current()));
        let result = match timeout(Duration::from_millis(timeout_ms), handle).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(source))) => Err(HookError::Execution {
                plugin: plugin.name().to_string(),
                source,
            }),
            Ok(Err(join_error)) => Err(HookError::Execution {
                plugin: plugin.name().to_string(),
                source: anyhow::anyhow!("hook panicked: {join_error}"),
            }),
            Err(_) => Err(HookError::Timeout {
                plugin: plugin.name().to_string(),
                timeout_ms,
            }),
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_hook(plugin.name(), phase.as_str(), start.elapsed(), result.is_ok());
            if matches!(result, Err(HookError::Timeout { .. })) {
                metrics.record_hook_timeout(plugin.name(), phase.as_str());
            }
        }

        result
    }

    /// Log a hook failure; returns true when the plugin fails closed
    fn report_failure(
        &self,
        plugin: &RegisteredPlugin,
        ctx: &ExecutionContext,
        phase: HookPhase,
        error: &HookError,
    ) -> bool {
        match plugin.settings().failure_policy {
            FailurePolicy::Open => {
                warn!(
                    plugin = %plugin.name(),
                    tool = %ctx.tool_name(),
                    request_id = %ctx.request_id(),
                    phase = phase.as_str(),
                    timed_out = error.is_timeout(),
                    error = %error,
                    "Hook failed, continuing (fail-open)"
                );
                false
            }
            FailurePolicy::Closed => {
                error!(
                    plugin = %plugin.name(),
                    tool = %ctx.tool_name(),
                    request_id = %ctx.request_id(),
                    phase = phase.as_str(),
                    timed_out = error.is_timeout(),
                    error = %error,
                    "Hook failed, failing the call (fail-closed)"
                );
                true
            }
        }
    }
}
