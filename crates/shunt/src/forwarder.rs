//! The forwarder: configured plugins plus their lifecycle.

use crate::memory::MemoryPlugin;
use crate::querylogger::QueryLoggerPlugin;
use anyhow::{Context, Result};
use shunt_cache::CachePlugin;
use shunt_client::DnsClientPlugin;
use shunt_metrics::MetricsPlugin;
use shunt_plugin::{Built, Plugin, Registry};
use shunt_server::DnsServerPlugin;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Registers the stock plugin set.
///
/// Registration order is irrelevant beyond tie-breaking; the registry orders
/// by the fixed priority table.
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(Box::new(MetricsPlugin::new()));
    registry.register(Box::new(DnsServerPlugin::new()));
    registry.register(Box::new(QueryLoggerPlugin::new()));
    registry.register(Box::new(CachePlugin::new()));
    registry.register(Box::new(DnsClientPlugin::new()));
    registry.register(Box::new(MemoryPlugin::new()));
    registry
}

/// A configured forwarder, ready to start.
pub struct Forwarder {
    built: Built,
}

impl Forwarder {
    /// Parses the TOML document and fans each top-level table out to the
    /// plugin of the same name.
    pub fn configure(mut registry: Registry, config: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(config).context("parsing configuration")?;
        registry
            .configure(&table)
            .context("configuring plugins")?;
        Ok(Self {
            built: registry.build(),
        })
    }

    /// Starts client services, then server services.
    pub async fn start(&self) -> Result<()> {
        for plugin in &self.built.active {
            if let Some(client) = plugin.client_service() {
                client
                    .start_client()
                    .await
                    .with_context(|| format!("starting client plugin {}", plugin.name()))?;
            }
        }
        for plugin in &self.built.active {
            if let Some(server) = plugin.server_service() {
                server
                    .start_server(self.built.pipeline.clone())
                    .await
                    .with_context(|| format!("starting server plugin {}", plugin.name()))?;
            }
        }
        info!("forwarder started");
        Ok(())
    }

    /// Stops client services, then server services.
    pub async fn stop(&self) {
        for plugin in &self.built.active {
            if let Some(client) = plugin.client_service() {
                client.stop_client().await;
            }
        }
        for plugin in &self.built.active {
            if let Some(server) = plugin.server_service() {
                server.stop_server().await;
            }
        }
        info!("forwarder stopped");
    }

    /// The DO53 listen address once started. Supports `:0` test listens.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.built
            .active
            .iter()
            .find_map(|p| p.server_service().and_then(|s| s.local_addr()))
    }

    /// Every registered plugin, active or not.
    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.built.plugins
    }

    /// Prints one plugin's configuration help to stdout.
    pub fn print_help(&self, name: &str) {
        for plugin in &self.built.plugins {
            if plugin.name() == name {
                print!("{}", plugin.config_help());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_plugins_sort_by_priority() {
        let registry = default_registry();
        let names: Vec<&str> = registry.plugins().map(|p| p.name()).collect();
        // `memory` is not in the priority table and sorts last.
        assert_eq!(
            names,
            vec!["metrics", "dns", "querylogger", "cache", "dnsclient", "memory"]
        );
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let registry = default_registry();
        assert!(Forwarder::configure(registry, "this is { not toml").is_err());
    }

    #[test]
    fn bad_duration_aborts_configuration() {
        let registry = default_registry();
        let config = "[cache]\nstaleTTL = \"soon\"\n";
        assert!(Forwarder::configure(registry, config).is_err());
    }

    #[test]
    fn absent_plugins_stay_inactive() {
        let registry = default_registry();
        let forwarder = Forwarder::configure(registry, "[cache]\n").unwrap();
        assert_eq!(forwarder.built.active.len(), 1);
        assert_eq!(forwarder.built.active[0].name(), "cache");
    }
}
