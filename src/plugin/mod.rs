//! Plugin system for intercepted tool calls
//!
//! Plugins implement [`ToolPlugin`] and are registered with a
//! [`PluginManager`], which owns their lifecycle. A [`HookChain`] runs the
//! hooks of the eligible plugins around each tool call.
//!
//! # Architecture
//!
//! - **Optional hooks**: every trait method has a no-op default
//! - **Priority ordering**: higher priority runs earlier before the handler
//!   and later after it
//! - **Isolation**: each hook runs in its own task under a timeout; a failure
//!   is contained according to the plugin's failure policy
//! - **Execution modes**: serial, parallel, or dependency-staged (hybrid)
//!
//! # Modules
//!
//! - `manager`: registration, lifecycle state machine, ordering
//! - `chain`: before/after hook execution
//! - `hook`: the plugin trait
//! - `schema`: descriptors, outcomes and lifecycle states
//! - `config`: per-plugin settings and execution modes
//! - `builtin`: rate limiting and usage tracking plugins

pub mod builtin;
pub mod chain;
pub mod config;
pub mod hook;
pub mod manager;
pub mod schema;

pub use chain::{BeforeOutcome, BeforePhase, HookChain, HookPhase};
pub use config::{ExecutionMode, FailurePolicy, PluginSettings};
pub use hook::ToolPlugin;
pub use manager::{
    InitializationReport, PluginInitFailure, PluginManager, RegisteredPlugin, ShutdownReport,
};
pub use schema::{HookOutcome, PluginDescriptor, PluginInitContext, PluginState, PluginStatus};
