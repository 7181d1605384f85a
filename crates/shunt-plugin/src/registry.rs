//! Plugin registration and deterministic ordering.

use crate::plugin::Plugin;
use crate::{Pipeline, PluginError};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Query-chain processing order. Responses traverse it in reverse.
///
/// Plugins not named here sort after every named one; ties keep registration
/// order.
pub const PLUGIN_ORDER: [&str; 8] = [
    "metrics",
    "dns",
    "http",
    "https",
    "doq",
    "querylogger",
    "cache",
    "dnsclient",
];

fn rank(name: &str) -> usize {
    PLUGIN_ORDER
        .iter()
        .position(|&p| p == name)
        .unwrap_or(PLUGIN_ORDER.len())
}

/// Holds every registered plugin and, after [`Registry::configure`], knows
/// which of them are active.
///
/// Built explicitly in `main` rather than through static-init side effects;
/// ordering is recomputed after registration, so iteration order never
/// depends on registration order except to break priority ties.
pub struct Registry {
    plugins: Vec<Box<dyn Plugin>>,
    active: HashSet<&'static str>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            active: HashSet::new(),
        }
    }

    /// Adds a plugin and re-sorts by the priority table.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        debug!(plugin = plugin.name(), "registering");
        self.plugins.push(plugin);
        self.plugins.sort_by_key(|p| rank(p.name()));
    }

    /// Every registered plugin, in query order.
    pub fn plugins(&self) -> impl Iterator<Item = &dyn Plugin> {
        self.plugins.iter().map(|p| p.as_ref())
    }

    /// Fans the top-level TOML table out to plugins by name.
    ///
    /// Unknown keys are ignored for forward compatibility; a plugin whose key
    /// is absent stays inactive.
    pub fn configure(&mut self, config: &toml::Table) -> Result<(), PluginError> {
        for plugin in &mut self.plugins {
            let name = plugin.name();
            let Some(value) = config.get(name) else {
                continue;
            };
            let table = value.as_table().ok_or_else(|| {
                PluginError::Config(format!("[{}] must be a table", name))
            })?;
            plugin.configure(table)?;
            self.active.insert(name);
            debug!(plugin = name, "configured");
        }
        Ok(())
    }

    /// Returns true if the plugin's key appeared in the configuration.
    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains(name)
    }

    /// Freezes the registry into shared plugins plus the pipeline over the
    /// active ones.
    pub fn build(self) -> Built {
        let active = self.active;
        let plugins: Vec<Arc<dyn Plugin>> = self.plugins.into_iter().map(Arc::from).collect();

        let active_plugins: Vec<Arc<dyn Plugin>> = plugins
            .iter()
            .filter(|p| active.contains(p.name()))
            .cloned()
            .collect();

        let query_chain: Vec<Arc<dyn Plugin>> = active_plugins
            .iter()
            .filter(|p| p.query_stage().is_some())
            .cloned()
            .collect();

        let mut response_chain: Vec<Arc<dyn Plugin>> = active_plugins
            .iter()
            .filter(|p| p.response_stage().is_some())
            .cloned()
            .collect();
        response_chain.reverse();

        Built {
            plugins,
            pipeline: Arc::new(Pipeline::new(query_chain, response_chain)),
            active: active_plugins,
        }
    }
}

/// The frozen result of configuration: every plugin (for help output), the
/// active subset (for lifecycle) and the pipeline over the active stages.
pub struct Built {
    pub plugins: Vec<Arc<dyn Plugin>>,
    pub active: Vec<Arc<dyn Plugin>>,
    pub pipeline: Arc<Pipeline>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
