//! Plugin configuration types and validation
//!
//! This module defines per-plugin settings and the hook execution strategy.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How before-hooks of one call are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One hook at a time, in priority order
    #[default]
    Serial,
    /// All eligible hooks at once; highest-priority short-circuit wins
    Parallel,
    /// Dependency stages run serially, hooks within a stage in parallel
    Hybrid,
}

/// What a hook failure (error, panic or timeout) does to the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and continue the chain as if the hook returned `Continue`
    Open,
    /// Surface the failure as the call's error result
    Closed,
}

/// Settings for one registered plugin
///
/// `failure_policy` has no default: every plugin must state whether its
/// failures are swallowed or surfaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSettings {
    /// Whether this plugin participates in hook chains
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Only run for these tools (all tools when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_tools: Option<HashSet<String>>,

    /// Never run for these tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_tools: Option<HashSet<String>>,

    /// Per-hook timeout override (milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    pub failure_policy: FailurePolicy,

    /// Keep running hooks while the plugin reports unhealthy
    #[serde(default)]
    pub run_when_unhealthy: bool,

    /// Plugins that must run in an earlier hybrid stage
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

pub(crate) fn default_enabled() -> bool {
    true
}

impl PluginSettings {
    pub fn new(failure_policy: FailurePolicy) -> Self {
        Self {
            enabled: default_enabled(),
            include_tools: None,
            exclude_tools: None,
            timeout_ms: None,
            failure_policy,
            run_when_unhealthy: false,
            depends_on: Vec::new(),
        }
    }

    pub fn fail_open() -> Self {
        Self::new(FailurePolicy::Open)
    }

    pub fn fail_closed() -> Self {
        Self::new(FailurePolicy::Closed)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_include_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_exclude_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_depends_on<I, S>(mut self, plugins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = plugins.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_run_when_unhealthy(mut self, run: bool) -> Self {
        self.run_when_unhealthy = run;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether the include/exclude filters admit `tool_name`
    pub fn admits(&self, tool_name: &str) -> bool {
        if let Some(exclude) = &self.exclude_tools {
            if exclude.contains(tool_name) {
                return false;
            }
        }

        match &self.include_tools {
            Some(include) => include.contains(tool_name),
            None => true,
        }
    }

    /// Validate settings for the plugin named `name`
    pub fn validate(&self, name: &str) -> Result<(), String> {
        if let Some(timeout_ms) = self.timeout_ms {
            validate_timeout(&format!("Plugin '{name}' timeoutMs"), timeout_ms)?;
        }

        if let (Some(include), Some(exclude)) = (&self.include_tools, &self.exclude_tools) {
            if let Some(tool) = include.intersection(exclude).next() {
                return Err(format!(
                    "Plugin '{name}' both includes and excludes tool '{tool}'"
                ));
            }
        }

        if self.depends_on.iter().any(|dep| dep == name) {
            return Err(format!("Plugin '{name}' cannot depend on itself"));
        }

        Ok(())
    }
}

pub(crate) fn validate_timeout(label: &str, timeout_ms: u64) -> Result<(), String> {
    if timeout_ms == 0 {
        return Err(format!("{label} must be greater than 0"));
    }

    if timeout_ms > 600_000 {
        return Err(format!("{label} cannot exceed 600000ms (10 minutes)"));
    }

    Ok(())
}
