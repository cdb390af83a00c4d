use super::customer_key;
use crate::config::RateLimitConfig;
use crate::context::{ExecutionContext, ToolResult};
use crate::error::InterceptorError;
use crate::metrics::HookMetrics;
use crate::plugin::config::PluginSettings;
use crate::plugin::hook::ToolPlugin;
use crate::plugin::schema::{HookOutcome, PluginDescriptor};
use crate::ratelimit::SlidingWindowRateLimiter;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Short-circuits calls from customers over their rate limit
pub struct RateLimitPlugin {
    limiter: Arc<SlidingWindowRateLimiter>,
    key_field: String,
    metrics: Option<Arc<HookMetrics>>,
}

impl RateLimitPlugin {
    pub const NAME: &'static str = "rate-limit";
    pub const DEFAULT_PRIORITY: i32 = 1000;

    pub fn new(limiter: Arc<SlidingWindowRateLimiter>, key_field: impl Into<String>) -> Self {
        Self {
            limiter,
            key_field: key_field.into(),
            metrics: None,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            Arc::new(SlidingWindowRateLimiter::new(config)),
            config.key_field.clone(),
        )
    }

    pub fn with_metrics(mut self, metrics: Arc<HookMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn limiter(&self) -> &Arc<SlidingWindowRateLimiter> {
        &self.limiter
    }

    /// Default registration: runs first and fails closed
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new(
            Self::NAME,
            env!("CARGO_PKG_VERSION"),
            Self::DEFAULT_PRIORITY,
            PluginSettings::fail_closed(),
        )
    }
}

#[async_trait]
impl ToolPlugin for RateLimitPlugin {
    async fn before_tool_call(&self, ctx: &ExecutionContext) -> anyhow::Result<HookOutcome> {
        let key = customer_key(ctx, &self.key_field).await;
        let decision = self.limiter.is_allowed(&key);

        ctx.set_plugin_data(
            Self::NAME,
            json!({
                "key": key,
                "allowed": decision.allowed,
                "remaining": decision.remaining,
                "resetTime": decision.reset_time.to_rfc3339(),
            }),
        );

        if decision.allowed {
            return Ok(HookOutcome::Continue);
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_rate_limited();
        }

        let err = InterceptorError::RateLimitExceeded {
            key: key.clone(),
            reset_time: decision.reset_time,
        };
        info!(
            key = %key,
            tool = %ctx.tool_name(),
            request_id = %ctx.request_id(),
            "Rate limit exceeded"
        );

        Ok(HookOutcome::ShortCircuit(ToolResult::error(err.to_string())))
    }
}
