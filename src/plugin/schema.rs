//! Plugin descriptor, lifecycle state and hook outcome definitions

use crate::context::ToolResult;
use crate::plugin::config::PluginSettings;
use serde::{Deserialize, Serialize};

/// Result of a single before-hook invocation
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    /// No opinion; the chain proceeds
    Continue,
    /// Stop the before phase and use this result instead of calling the tool
    ShortCircuit(ToolResult),
}

impl HookOutcome {
    pub fn is_short_circuit(&self) -> bool {
        matches!(self, HookOutcome::ShortCircuit(_))
    }
}

/// Lifecycle state of a registered plugin
///
/// ```text
/// Registered --initialize ok--> Initializing --> Active
/// Registered --initialize err-> Initializing --> Disposed
/// Active <--health check--> Unhealthy
/// {Registered, Active, Unhealthy} --shutdown--> Disposed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PluginState {
    Registered = 0,
    Initializing = 1,
    Active = 2,
    Unhealthy = 3,
    Disposed = 4,
}

impl PluginState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => PluginState::Registered,
            1 => PluginState::Initializing,
            2 => PluginState::Active,
            3 => PluginState::Unhealthy,
            _ => PluginState::Disposed,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == PluginState::Disposed
    }
}

/// Registration data for one plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    /// Unique plugin name
    pub name: String,
    pub version: String,
    /// Higher runs earlier in the before phase and later in the after phase
    pub priority: i32,
    pub settings: PluginSettings,
}

impl PluginDescriptor {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        priority: i32,
        settings: PluginSettings,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            priority,
            settings,
        }
    }
}

/// Context passed to a plugin's `initialize`
#[derive(Debug, Clone)]
pub struct PluginInitContext {
    pub plugin_name: String,
    pub plugin_version: String,
    pub priority: i32,
    pub settings: PluginSettings,
}

/// Diagnostic snapshot of one plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginStatus {
    pub name: String,
    pub version: String,
    pub priority: i32,
    pub state: PluginState,
    pub enabled: bool,
}
