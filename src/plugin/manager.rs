//! Plugin lifecycle management
//!
//! This module tracks registered plugins, drives their state machine
//! (initialize, health check, shutdown) and answers which plugins run for a
//! given tool. Lifecycle state is the only data mutated outside a single
//! call; it lives in an atomic per plugin and is re-read on every call.

use crate::config::InterceptorConfig;
use crate::error::{ConfigError, InterceptorError, RegistrationError, Result};
use crate::plugin::config::PluginSettings;
use crate::plugin::hook::ToolPlugin;
use crate::plugin::schema::{PluginDescriptor, PluginInitContext, PluginState, PluginStatus};
use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

/// A plugin together with its descriptor data and live state
pub struct RegisteredPlugin {
    name: String,
    version: String,
    priority: i32,
    /// Registration order, used to break priority ties
    sequence: u64,
    plugin: Arc<dyn ToolPlugin>,
    settings: ArcSwap<PluginSettings>,
    state: AtomicU8,
}

impl std::fmt::Debug for RegisteredPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredPlugin")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .field("state", &self.state())
            .finish()
    }
}

impl RegisteredPlugin {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn settings(&self) -> Arc<PluginSettings> {
        self.settings.load_full()
    }

    pub fn state(&self) -> PluginState {
        PluginState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn plugin(&self) -> Arc<dyn ToolPlugin> {
        self.plugin.clone()
    }

    fn set_state(&self, state: PluginState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Compare-and-swap transition; false if the plugin was not in `from`
    fn transition(&self, from: PluginState, to: PluginState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether this plugin's hooks run for `tool_name` right now
    fn is_eligible(&self, tool_name: &str) -> bool {
        let settings = self.settings.load();
        let state_ok = match self.state() {
            PluginState::Active => true,
            PluginState::Unhealthy => settings.run_when_unhealthy,
            _ => false,
        };
        state_ok && settings.enabled && settings.admits(tool_name)
    }

    fn status(&self) -> PluginStatus {
        PluginStatus {
            name: self.name.clone(),
            version: self.version.clone(),
            priority: self.priority,
            state: self.state(),
            enabled: self.settings.load().enabled,
        }
    }
}

/// Plugin that failed to initialize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInitFailure {
    pub plugin: String,
    pub reason: String,
}

/// Outcome of [`PluginManager::initialize_all`]
#[derive(Debug, Default, Clone)]
pub struct InitializationReport {
    /// Plugins that became active, in initialization order
    pub initialized: Vec<String>,
    pub failed: Vec<PluginInitFailure>,
}

/// Outcome of [`PluginManager::shutdown_all`]
#[derive(Debug, Default, Clone)]
pub struct ShutdownReport {
    /// Plugins disposed by this call, in disposal order
    pub disposed: Vec<String>,
    /// Plugins whose `destroy` failed (they are disposed regardless)
    pub teardown_errors: Vec<(String, String)>,
}

/// Manages plugin registration and lifecycle
pub struct PluginManager {
    plugins: DashMap<String, Arc<RegisteredPlugin>>,
    next_sequence: AtomicU64,
    /// Default hook timeout for plugins without an override (milliseconds)
    default_timeout_ms: u64,
    /// Settings from configuration, replacing descriptor settings by name
    overrides: HashMap<String, PluginSettings>,
    /// Serializes runtime settings replacement so dependency checks see a
    /// stable graph
    settings_update: Mutex<()>,
}

impl PluginManager {
    pub fn new(default_timeout_ms: u64) -> Self {
        Self {
            plugins: DashMap::new(),
            next_sequence: AtomicU64::new(0),
            default_timeout_ms,
            overrides: HashMap::new(),
            settings_update: Mutex::new(()),
        }
    }

    /// Create a manager whose plugin settings can be overridden by configuration
    pub fn from_config(config: &InterceptorConfig) -> Self {
        let mut manager = Self::new(config.default_timeout_ms);
        manager.overrides = config.plugins.clone();
        manager
    }

    /// Register a plugin in the `Registered` state
    pub fn register(
        &self,
        descriptor: PluginDescriptor,
        plugin: Arc<dyn ToolPlugin>,
    ) -> Result<()> {
        let PluginDescriptor {
            name,
            version,
            priority,
            settings,
        } = descriptor;

        let settings = match self.overrides.get(&name) {
            Some(overridden) => {
                debug!(plugin = %name, "Applying configured plugin settings");
                overridden.clone()
            }
            None => settings,
        };
        settings
            .validate(&name)
            .map_err(|reason| InterceptorError::Config(ConfigError::Validation(reason)))?;

        match self.plugins.entry(name.clone()) {
            Entry::Occupied(_) => Err(RegistrationError::DuplicatePlugin(name).into()),
            Entry::Vacant(slot) => {
                let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
                slot.insert(Arc::new(RegisteredPlugin {
                    name: name.clone(),
                    version,
                    priority,
                    sequence,
                    plugin,
                    settings: ArcSwap::from_pointee(settings),
                    state: AtomicU8::new(PluginState::Registered as u8),
                }));
                info!(plugin = %name, priority, "Plugin registered");
                Ok(())
            }
        }
    }

    /// Initialize every `Registered` plugin.
    ///
    /// Plugins initialize lowest priority first, except that a plugin always
    /// waits for the plugins it depends on. A failure only disposes the
    /// failing plugin (and anything depending on it); it never stops others.
    pub async fn initialize_all(&self) -> InitializationReport {
        let mut report = InitializationReport::default();

        let mut pending: Vec<Arc<RegisteredPlugin>> = self
            .snapshot()
            .into_iter()
            .filter(|p| p.state() == PluginState::Registered)
            .collect();
        pending.sort_by_key(|p| (p.priority, p.sequence));

        info!(count = pending.len(), "Initializing plugins");

        loop {
            let ready = pending.iter().position(|candidate| {
                candidate
                    .settings()
                    .depends_on
                    .iter()
                    .all(|dep| !pending.iter().any(|p| &p.name == dep))
            });

            match ready {
                Some(index) => {
                    let plugin = pending.remove(index);
                    self.initialize_one(&plugin, &mut report).await;
                }
                None => break,
            }
        }

        if !pending.is_empty() {
            let graph: HashMap<String, Vec<String>> = pending
                .iter()
                .map(|p| (p.name.clone(), p.settings().depends_on.clone()))
                .collect();
            let (cyclic, blocked): (Vec<_>, Vec<_>) = pending
                .iter()
                .partition(|p| reaches(&graph, &p.name, &p.name));

            let members: Vec<String> = cyclic.iter().map(|p| p.name.clone()).collect();
            let reason = format!("dependency cycle among plugins: {}", members.join(", "));
            for plugin in cyclic {
                self.fail_initialization(plugin, reason.clone(), &mut report);
            }
            for plugin in blocked {
                let reason = format!(
                    "depends on a plugin in a dependency cycle ({})",
                    members.join(", ")
                );
                self.fail_initialization(plugin, reason, &mut report);
            }
        }

        info!(
            initialized = report.initialized.len(),
            failed = report.failed.len(),
            "Plugin initialization complete"
        );
        report
    }

    async fn initialize_one(&self, plugin: &Arc<RegisteredPlugin>, report: &mut InitializationReport) {
        let settings = plugin.settings();

        for dep in &settings.depends_on {
            let dep_state = self.plugins.get(dep).map(|d| d.state());
            match dep_state {
                None => {
                    let reason = format!("depends on unknown plugin '{dep}'");
                    self.fail_initialization(plugin, reason, report);
                    return;
                }
                Some(PluginState::Active) | Some(PluginState::Unhealthy) => {}
                Some(state) => {
                    let reason = format!("dependency '{dep}' is not active (state {state:?})");
                    self.fail_initialization(plugin, reason, report);
                    return;
                }
            }
        }

        if !plugin.transition(PluginState::Registered, PluginState::Initializing) {
            debug!(plugin = %plugin.name, state = ?plugin.state(), "Skipping initialization");
            return;
        }

        let init_ctx = PluginInitContext {
            plugin_name: plugin.name.clone(),
            plugin_version: plugin.version.clone(),
            priority: plugin.priority,
            settings: (*settings).clone(),
        };
        let hook = plugin.plugin();
        let result = self
            .lifecycle_call(plugin, "initialization", async move {
                hook.initialize(&init_ctx).await
            })
            .await;

        match result {
            Ok(()) => {
                if plugin.transition(PluginState::Initializing, PluginState::Active) {
                    info!(plugin = %plugin.name, version = %plugin.version, "Plugin initialized");
                    report.initialized.push(plugin.name.clone());
                } else {
                    // Shut down while initializing
                    warn!(plugin = %plugin.name, "Plugin disposed during initialization");
                    let hook = plugin.plugin();
                    if let Err(reason) = self
                        .lifecycle_call(plugin, "teardown", async move { hook.destroy().await })
                        .await
                    {
                        error!(plugin = %plugin.name, error = %reason, "Plugin teardown failed");
                    }
                }
            }
            Err(reason) => {
                self.fail_initialization(plugin, reason, report);
            }
        }
    }

    /// Run one lifecycle method in its own task, bounded by the plugin's
    /// timeout. Errors, panics and timeouts all come back as a reason.
    async fn lifecycle_call<T, F>(
        &self,
        plugin: &RegisteredPlugin,
        action: &str,
        call: F,
    ) -> std::result::Result<T, String>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let timeout_ms = self.timeout_ms_for(plugin);
        let handle = tokio::spawn(call);
        match timeout(Duration::from_millis(timeout_ms), handle).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(join_error)) => Err(format!("{action} panicked: {join_error}")),
            Err(_) => Err(format!("{action} timed out after {timeout_ms}ms")),
        }
    }

    fn fail_initialization(
        &self,
        plugin: &RegisteredPlugin,
        reason: String,
        report: &mut InitializationReport,
    ) {
        plugin.set_state(PluginState::Disposed);
        let err = InterceptorError::PluginInitialization {
            plugin: plugin.name.clone(),
            reason: reason.clone(),
        };
        error!(plugin = %plugin.name, error = %err, "Plugin initialization failed");
        report.failed.push(PluginInitFailure {
            plugin: plugin.name.clone(),
            reason,
        });
    }

    /// Dispose all plugins, highest priority first.
    ///
    /// Idempotent: already disposed plugins are skipped. Teardown errors are
    /// logged and collected, never returned as errors.
    pub async fn shutdown_all(&self) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        let mut plugins = self.snapshot();
        plugins.sort_by_key(|p| std::cmp::Reverse((p.priority, p.sequence)));

        for plugin in plugins {
            let previous = plugin.state();
            let disposed = match previous {
                PluginState::Disposed => false,
                other => plugin.transition(other, PluginState::Disposed),
            };
            if !disposed {
                continue;
            }

            report.disposed.push(plugin.name.clone());

            if matches!(previous, PluginState::Active | PluginState::Unhealthy) {
                let hook = plugin.plugin();
                let result = self
                    .lifecycle_call(&plugin, "teardown", async move { hook.destroy().await })
                    .await;
                if let Err(reason) = result {
                    error!(plugin = %plugin.name, error = %reason, "Plugin teardown failed");
                    report.teardown_errors.push((plugin.name.clone(), reason));
                    continue;
                }
            }

            info!(plugin = %plugin.name, "Plugin disposed");
        }

        report
    }

    /// Run every live plugin's health check.
    ///
    /// Healthy active plugins stay `Active`; failing ones move to
    /// `Unhealthy` and recover on the next passing check. Disposed or
    /// uninitialized plugins report `false` without being called.
    pub async fn health_check(&self) -> HashMap<String, bool> {
        let plugins = self.snapshot();

        let checks = plugins.iter().map(|plugin| async move {
            let healthy = match plugin.state() {
                PluginState::Active | PluginState::Unhealthy => {
                    let hook = plugin.plugin();
                    let result = self
                        .lifecycle_call(plugin, "health check", async move {
                            hook.health_check().await
                        })
                        .await;
                    match result {
                        Ok(healthy) => healthy,
                        Err(reason) => {
                            warn!(plugin = %plugin.name, error = %reason, "Health check failed");
                            false
                        }
                    }
                }
                _ => return (plugin.name.clone(), false),
            };

            if healthy {
                if plugin.transition(PluginState::Unhealthy, PluginState::Active) {
                    info!(plugin = %plugin.name, "Plugin recovered");
                }
            } else if plugin.transition(PluginState::Active, PluginState::Unhealthy) {
                warn!(plugin = %plugin.name, "Plugin marked unhealthy");
            }

            (plugin.name.clone(), healthy)
        });

        futures::future::join_all(checks).await.into_iter().collect()
    }

    /// Plugins whose hooks run for `tool_name`, highest priority first
    /// (ties in registration order). State is read fresh on every call.
    pub fn execution_order(&self, tool_name: &str) -> Vec<Arc<RegisteredPlugin>> {
        let mut eligible: Vec<Arc<RegisteredPlugin>> = self
            .plugins
            .iter()
            .filter(|entry| entry.value().is_eligible(tool_name))
            .map(|entry| entry.value().clone())
            .collect();
        eligible.sort_by_key(|p| (std::cmp::Reverse(p.priority), p.sequence));
        eligible
    }

    /// Hybrid stages for `tool_name`.
    ///
    /// A plugin sits one stage after the latest stage of its eligible
    /// dependencies. Dependencies filtered out for this tool are ignored.
    /// Each stage keeps priority order.
    pub fn execution_stages(&self, tool_name: &str) -> Vec<Vec<Arc<RegisteredPlugin>>> {
        let order = self.execution_order(tool_name);
        let index: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.as_str(), i))
            .collect();
        let deps: Vec<Vec<usize>> = order
            .iter()
            .map(|p| {
                p.settings()
                    .depends_on
                    .iter()
                    .filter_map(|d| index.get(d.as_str()).copied())
                    .collect()
            })
            .collect();

        // Longest-path relaxation; bounded by the plugin count
        let mut stage = vec![0usize; order.len()];
        for _ in 0..order.len() {
            let mut changed = false;
            for i in 0..order.len() {
                for &d in &deps[i] {
                    if stage[d] + 1 > stage[i] {
                        stage[i] = stage[d] + 1;
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        let mut stages: BTreeMap<usize, Vec<Arc<RegisteredPlugin>>> = BTreeMap::new();
        for (i, plugin) in order.into_iter().enumerate() {
            stages.entry(stage[i]).or_default().push(plugin);
        }
        stages.into_values().collect()
    }

    /// Enable or disable a plugin at runtime; false if unknown
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.plugins.get(name) {
            Some(plugin) => {
                plugin.settings.rcu(|current| {
                    let mut next = (**current).clone();
                    next.enabled = enabled;
                    next
                });
                info!(plugin = %name, enabled, "Plugin enablement changed");
                true
            }
            None => false,
        }
    }

    /// Replace a plugin's settings at runtime.
    ///
    /// Dependencies must name registered plugins and must not close a cycle.
    pub fn update_settings(&self, name: &str, settings: PluginSettings) -> Result<()> {
        let invalid = |reason: String| InterceptorError::Config(ConfigError::Validation(reason));
        settings.validate(name).map_err(invalid)?;

        let _guard = self
            .settings_update
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let plugin = self
            .get(name)
            .ok_or_else(|| invalid(format!("Plugin '{name}' is not registered")))?;

        if let Some(unknown) = settings
            .depends_on
            .iter()
            .find(|dep| !self.plugins.contains_key(dep.as_str()))
        {
            return Err(invalid(format!(
                "Plugin '{name}' depends on unknown plugin '{unknown}'"
            )));
        }

        let mut graph: HashMap<String, Vec<String>> = self
            .snapshot()
            .iter()
            .map(|p| (p.name.clone(), p.settings().depends_on.clone()))
            .collect();
        graph.insert(name.to_string(), settings.depends_on.clone());
        if reaches(&graph, name, name) {
            return Err(invalid(format!(
                "Plugin '{name}' dependencies would form a dependency cycle"
            )));
        }

        plugin.settings.store(Arc::new(settings));
        info!(plugin = %name, "Plugin settings updated");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<RegisteredPlugin>> {
        self.plugins.get(name).map(|p| p.value().clone())
    }

    pub fn state_of(&self, name: &str) -> Option<PluginState> {
        self.plugins.get(name).map(|p| p.state())
    }

    /// Status of every plugin, highest priority first
    pub fn stats(&self) -> Vec<PluginStatus> {
        let mut plugins = self.snapshot();
        plugins.sort_by_key(|p| (std::cmp::Reverse(p.priority), p.sequence));
        plugins.iter().map(|p| p.status()).collect()
    }

    /// Effective hook timeout for a plugin (milliseconds)
    pub fn timeout_ms_for(&self, plugin: &RegisteredPlugin) -> u64 {
        plugin
            .settings
            .load()
            .timeout_ms
            .unwrap_or(self.default_timeout_ms)
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    fn snapshot(&self) -> Vec<Arc<RegisteredPlugin>> {
        self.plugins.iter().map(|e| e.value().clone()).collect()
    }
}

/// Whether `target` is reachable from `start` by following one or more
/// dependency edges
fn reaches(graph: &HashMap<String, Vec<String>>, start: &str, target: &str) -> bool {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = graph
        .get(start)
        .map(|deps| deps.iter().map(String::as_str).collect())
        .unwrap_or_default();

    while let Some(current) = stack.pop() {
        if current == target {
            return true;
        }
        if seen.insert(current) {
            if let Some(deps) = graph.get(current) {
                stack.extend(deps.iter().map(String::as_str));
            }
        }
    }
    false
}
