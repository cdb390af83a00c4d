use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Prometheus metrics for hook chains and intercepted tool calls
pub struct HookMetrics {
    registry: Registry,

    // Tool call metrics
    pub tool_calls_total: IntCounter,
    pub tool_failures_total: IntCounter,
    pub short_circuits_total: IntCounter,

    // Hook metrics
    pub hook_executions_total: IntCounterVec,
    pub hook_errors_total: IntCounterVec,
    pub hook_timeouts_total: IntCounterVec,
    pub hook_duration: Histogram,

    // Rate limiter metrics
    pub rate_limited_total: IntCounter,
}

impl Default for HookMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HookMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let tool_calls_total = IntCounter::new(
            "mcp_interceptor_tool_calls_total",
            "Total number of intercepted tool calls",
        )
        .expect("metric creation failed");
        let tool_failures_total = IntCounter::new(
            "mcp_interceptor_tool_failures_total",
            "Total number of intercepted tool calls returning an error result",
        )
        .expect("metric creation failed");
        let short_circuits_total = IntCounter::new(
            "mcp_interceptor_short_circuits_total",
            "Total number of calls short-circuited by a before hook",
        )
        .expect("metric creation failed");

        let hook_executions_total = IntCounterVec::new(
            Opts::new(
                "mcp_interceptor_hook_executions_total",
                "Total number of hook invocations",
            ),
            &["plugin", "phase"],
        )
        .expect("metric creation failed");
        let hook_errors_total = IntCounterVec::new(
            Opts::new(
                "mcp_interceptor_hook_errors_total",
                "Total number of failed hook invocations",
            ),
            &["plugin", "phase"],
        )
        .expect("metric creation failed");
        let hook_timeouts_total = IntCounterVec::new(
            Opts::new(
                "mcp_interceptor_hook_timeouts_total",
                "Total number of timed out hook invocations",
            ),
            &["plugin", "phase"],
        )
        .expect("metric creation failed");
        let hook_duration = Histogram::with_opts(HistogramOpts::new(
            "mcp_interceptor_hook_duration_seconds",
            "Hook execution duration in seconds",
        ))
        .expect("metric creation failed");

        let rate_limited_total = IntCounter::new(
            "mcp_interceptor_rate_limited_total",
            "Total number of calls rejected by the rate limiter",
        )
        .expect("metric creation failed");

        registry
            .register(Box::new(tool_calls_total.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(tool_failures_total.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(short_circuits_total.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(hook_executions_total.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(hook_errors_total.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(hook_timeouts_total.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(hook_duration.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(rate_limited_total.clone()))
            .expect("metric registration failed");

        Self {
            registry,
            tool_calls_total,
            tool_failures_total,
            short_circuits_total,
            hook_executions_total,
            hook_errors_total,
            hook_timeouts_total,
            hook_duration,
            rate_limited_total,
        }
    }

    pub fn record_hook(&self, plugin: &str, phase: &str, duration: Duration, success: bool) {
        self.hook_executions_total
            .with_label_values(&[plugin, phase])
            .inc();
        self.hook_duration.observe(duration.as_secs_f64());
        if !success {
            self.hook_errors_total
                .with_label_values(&[plugin, phase])
                .inc();
        }
    }

    pub fn record_hook_timeout(&self, plugin: &str, phase: &str) {
        self.hook_timeouts_total
            .with_label_values(&[plugin, phase])
            .inc();
    }

    pub fn record_tool_call(&self, short_circuited: bool, is_error: bool) {
        self.tool_calls_total.inc();
        if short_circuited {
            self.short_circuits_total.inc();
        }
        if is_error {
            self.tool_failures_total.inc();
        }
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_total.inc();
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
