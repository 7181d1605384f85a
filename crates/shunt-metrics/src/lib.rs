//! # shunt-metrics
//!
//! Observability for the forwarder: the `metrics` plugin, which installs a
//! Prometheus exporter serving `GET /metrics`, and the tracing/logging
//! bootstrap used by the binary.
//!
//! The pipeline records through the `metrics` facade; nothing here is in the
//! request hot path beyond the exporter's own registry. Required series:
//!
//! - `dns_query_inflight_count` — gauge of queries currently being handled
//! - `dns_query_duration` — histogram of per-query latency in milliseconds

pub mod tracing_setup;

use metrics_exporter_prometheus::PrometheusBuilder;
use serde::{Deserialize, Serialize};
use shunt_plugin::{Plugin, PluginError};
use std::net::{Ipv4Addr, SocketAddr};
use tracing::info;

/// Metrics plugin configuration (`[metrics]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricsConfig {
    /// HTTP port for the Prometheus text endpoint.
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// The `metrics` plugin.
pub struct MetricsPlugin {
    config: MetricsConfig,
}

impl MetricsPlugin {
    pub fn new() -> Self {
        Self {
            config: MetricsConfig::default(),
        }
    }
}

impl Default for MetricsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for MetricsPlugin {
    fn name(&self) -> &'static str {
        "metrics"
    }

    /// Installs the exporter immediately; the endpoint is useful during the
    /// rest of startup, not just once serving begins.
    fn configure(&mut self, config: &toml::Table) -> Result<(), PluginError> {
        self.config = toml::Value::Table(config.clone())
            .try_into()
            .map_err(PluginError::config)?;

        let listen = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.port));
        PrometheusBuilder::new()
            .with_http_listener(listen)
            .install()
            .map_err(PluginError::config)?;

        info!(addr = %listen, "prometheus metrics endpoint up");
        Ok(())
    }

    fn config_help(&self) -> String {
        shunt_plugin::plugin::render_config_help(
            self.name(),
            &[("port", "int", "Metrics HTTP port")],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port() {
        assert_eq!(MetricsConfig::default().port, 8080);
    }

    #[test]
    fn port_parses_from_table() {
        let table: toml::Table = toml::from_str("port = 9153").unwrap();
        let config: MetricsConfig = toml::Value::Table(table).try_into().unwrap();
        assert_eq!(config.port, 9153);
    }
}
