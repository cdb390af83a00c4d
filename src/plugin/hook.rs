//! The plugin trait implemented by extensions
//!
//! Every method has a no-op default, so a plugin only overrides the hooks it
//! cares about. A plugin without `health_check` is always reported healthy.

use crate::context::{ExecutionContext, ToolResult};
use crate::plugin::schema::{HookOutcome, PluginInitContext};
use async_trait::async_trait;

#[async_trait]
pub trait ToolPlugin: Send + Sync + 'static {
    /// One-time setup; an error disposes the plugin
    async fn initialize(&self, _ctx: &PluginInitContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs before the tool handler; may rewrite args or short-circuit
    async fn before_tool_call(&self, _ctx: &ExecutionContext) -> anyhow::Result<HookOutcome> {
        Ok(HookOutcome::Continue)
    }

    /// Runs after the tool handler (or short-circuit) and returns the result to pass on
    async fn after_tool_call(
        &self,
        _ctx: &ExecutionContext,
        result: ToolResult,
    ) -> anyhow::Result<ToolResult> {
        Ok(result)
    }

    async fn health_check(&self) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Teardown on shutdown; errors are logged, never propagated
    async fn destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
