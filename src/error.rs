use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InterceptorError {
    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    #[error("Plugin '{plugin}' failed to initialize: {reason}")]
    PluginInitialization { plugin: String, reason: String },

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error("Rate limit exceeded for '{key}', window resets at {reset_time}")]
    RateLimitExceeded {
        key: String,
        reset_time: DateTime<Utc>,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Plugin '{0}' is already registered")]
    DuplicatePlugin(String),

    /// Handlers registered before interception was installed would bypass
    /// the hook chain, so installation is refused instead.
    #[error("Cannot install interceptor: host already has {} registered tool(s): {}", .0.len(), .0.join(", "))]
    PreexistingTools(Vec<String>),
}

#[derive(Error, Debug)]
pub enum HookError {
    #[error("Plugin '{plugin}' hook timed out after {timeout_ms}ms")]
    Timeout { plugin: String, timeout_ms: u64 },

    #[error("Plugin '{plugin}' hook failed: {source}")]
    Execution {
        plugin: String,
        #[source]
        source: anyhow::Error,
    },
}

impl HookError {
    pub fn plugin(&self) -> &str {
        match self {
            HookError::Timeout { plugin, .. } | HookError::Execution { plugin, .. } => plugin,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, HookError::Timeout { .. })
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Environment variable error: {0}")]
    EnvVar(String),
}

pub type Result<T> = std::result::Result<T, InterceptorError>;
