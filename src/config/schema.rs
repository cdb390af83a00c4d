use crate::plugin::config::{ExecutionMode, PluginSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Top-level interceptor configuration
///
/// Snake-case aliases let the same keys come from `MCP_INTERCEPTOR_*`
/// environment variables, which figment lowercases.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptorConfig {
    #[serde(default, alias = "execution_mode")]
    pub execution_mode: ExecutionMode,

    /// Hook timeout for plugins without their own `timeoutMs`
    #[serde(default = "default_timeout_ms", alias = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Per-plugin settings, replacing the settings a plugin registers with
    #[serde(default)]
    pub plugins: HashMap<String, PluginSettings>,

    #[serde(default, alias = "rate_limit", skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,

    #[serde(default)]
    pub usage: UsageConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    #[serde(alias = "window_ms")]
    pub window_ms: u64,

    #[serde(alias = "max_requests")]
    pub max_requests: u32,

    /// Shorter, stricter window checked alongside the main one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<BurstConfig>,

    /// How often idle keys are swept from memory
    #[serde(default = "default_sweep_interval_ms", alias = "sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Tool argument holding the customer key
    #[serde(default = "default_key_field", alias = "key_field")]
    pub key_field: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BurstConfig {
    #[serde(alias = "window_ms")]
    pub window_ms: u64,

    #[serde(alias = "max_requests")]
    pub max_requests: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageConfig {
    /// Cost charged for tools without an entry in `toolCosts`
    #[serde(default = "default_cost", alias = "default_cost")]
    pub default_cost: f64,

    #[serde(default, alias = "tool_costs")]
    pub tool_costs: HashMap<String, f64>,

    /// Capacity of the usage event channel
    #[serde(default = "default_channel_capacity", alias = "channel_capacity")]
    pub channel_capacity: usize,
}

// Default value functions
fn default_timeout_ms() -> u64 {
    5000
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

fn default_key_field() -> String {
    "customerKey".to_string()
}

fn default_cost() -> f64 {
    1.0
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::default(),
            default_timeout_ms: default_timeout_ms(),
            plugins: HashMap::new(),
            rate_limit: None,
            usage: UsageConfig::default(),
        }
    }
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            default_cost: default_cost(),
            tool_costs: HashMap::new(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl RateLimitConfig {
    pub fn new(window_ms: u64, max_requests: u32) -> Self {
        Self {
            window_ms,
            max_requests,
            burst: None,
            sweep_interval_ms: default_sweep_interval_ms(),
            key_field: default_key_field(),
        }
    }

    pub fn with_burst(mut self, window_ms: u64, max_requests: u32) -> Self {
        self.burst = Some(BurstConfig {
            window_ms,
            max_requests,
        });
        self
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl UsageConfig {
    pub fn cost_for(&self, tool_name: &str) -> f64 {
        self.tool_costs
            .get(tool_name)
            .copied()
            .unwrap_or(self.default_cost)
    }
}
