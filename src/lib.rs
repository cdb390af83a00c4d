pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod interceptor;
pub mod metrics;
pub mod plugin;
pub mod ratelimit;
pub mod telemetry;

pub use config::InterceptorConfig;
pub use context::{handler_fn, ExecutionContext, ToolArgs, ToolHandler, ToolResult};
pub use error::{InterceptorError, Result};
pub use host::{InMemoryToolHost, ToolHost};
pub use interceptor::{CallSummary, ToolInterceptor};
pub use metrics::HookMetrics;
pub use plugin::{
    ExecutionMode, FailurePolicy, HookChain, HookOutcome, PluginDescriptor, PluginManager,
    PluginSettings, PluginState, ToolPlugin,
};
pub use ratelimit::{RateLimitDecision, SlidingWindowRateLimiter};
