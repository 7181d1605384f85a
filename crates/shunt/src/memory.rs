//! The `memory` plugin: process memory cap accounting.
//!
//! Parses `cap` as either an absolute size ("512MB") or a percentage of the
//! machine's total memory ("50%"). Rust has no collector to retune, so the
//! computed cap is advisory: it is logged at startup and exposed to whatever
//! supervises the process.

use serde::{Deserialize, Serialize};
use shunt_plugin::{Plugin, PluginError};
use tracing::info;

/// Memory plugin configuration (`[memory]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoryConfig {
    /// Cap as a size ("512MB") or a share of total memory ("50%").
    pub cap: String,
}

pub struct MemoryPlugin {
    config: MemoryConfig,
    cap_bytes: u64,
}

impl MemoryPlugin {
    pub fn new() -> Self {
        Self {
            config: MemoryConfig::default(),
            cap_bytes: 0,
        }
    }

    /// The computed cap in bytes; zero when uncapped.
    pub fn cap_bytes(&self) -> u64 {
        self.cap_bytes
    }
}

impl Default for MemoryPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for MemoryPlugin {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn configure(&mut self, config: &toml::Table) -> Result<(), PluginError> {
        self.config = toml::Value::Table(config.clone())
            .try_into()
            .map_err(PluginError::config)?;

        if self.config.cap.is_empty() {
            return Ok(());
        }

        self.cap_bytes = if let Some(percent) = self.config.cap.strip_suffix('%') {
            let share: f64 = percent
                .trim()
                .parse()
                .map_err(|_| PluginError::Config(format!("bad memory cap {:?}", self.config.cap)))?;
            let total = total_memory_bytes().ok_or_else(|| {
                PluginError::Config("total memory unavailable for a percentage cap".into())
            })?;
            (share * 0.01 * total as f64) as u64
        } else {
            parse_size(&self.config.cap)
                .ok_or_else(|| PluginError::Config(format!("bad memory cap {:?}", self.config.cap)))?
        };

        if self.cap_bytes > 0 {
            if let Some(total) = total_memory_bytes() {
                info!(total_bytes = total, "total system memory");
            }
            info!(cap_bytes = self.cap_bytes, "memory cap set");
        }
        Ok(())
    }

    fn config_help(&self) -> String {
        shunt_plugin::plugin::render_config_help(
            self.name(),
            &[(
                "cap",
                "string",
                "Cap memory use, either a size (10MB) or % of total",
            )],
        )
    }
}

/// Parses "512MB"-style sizes. Decimal units, case-insensitive.
fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit())?;
    let value: u64 = s[..split].parse().ok()?;
    let multiplier: u64 = match s[split..].trim().to_ascii_uppercase().as_str() {
        "B" => 1,
        "KB" => 1_000,
        "MB" => 1_000_000,
        "GB" => 1_000_000_000,
        "TB" => 1_000_000_000_000,
        _ => return None,
    };
    Some(value * multiplier)
}

/// Total machine memory from `/proc/meminfo`.
#[cfg(target_os = "linux")]
fn total_memory_bytes() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn total_memory_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_sizes() {
        assert_eq!(parse_size("512MB"), Some(512_000_000));
        assert_eq!(parse_size("10kb"), Some(10_000));
        assert_eq!(parse_size("2GB"), Some(2_000_000_000));
        assert_eq!(parse_size("64B"), Some(64));
        assert_eq!(parse_size("large"), None);
        assert_eq!(parse_size("10XB"), None);
    }

    #[test]
    fn absolute_cap_configures() {
        let mut plugin = MemoryPlugin::new();
        let table: toml::Table = toml::from_str("cap = \"512MB\"").unwrap();
        plugin.configure(&table).unwrap();
        assert_eq!(plugin.cap_bytes(), 512_000_000);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn percentage_cap_uses_total_memory() {
        let mut plugin = MemoryPlugin::new();
        let table: toml::Table = toml::from_str("cap = \"50%\"").unwrap();
        plugin.configure(&table).unwrap();
        assert!(plugin.cap_bytes() > 0);
        assert!(plugin.cap_bytes() <= total_memory_bytes().unwrap());
    }

    #[test]
    fn garbage_cap_is_rejected() {
        let mut plugin = MemoryPlugin::new();
        let table: toml::Table = toml::from_str("cap = \"plenty\"").unwrap();
        assert!(plugin.configure(&table).is_err());
    }
}
