//! The plugin trait and its capability traits.

use crate::context::RequestContext;
use crate::pipeline::Pipeline;
use crate::PluginError;
use async_trait::async_trait;
use shunt_proto::Message;
use std::net::SocketAddr;
use std::sync::Arc;

/// What a query stage wants done next.
#[derive(Debug)]
pub enum QueryAction {
    /// Hand the query to the next stage.
    Continue,
    /// Stop the chain without producing an answer.
    Break,
    /// An answer exists; the dispatcher runs the response chain with it.
    Respond(Message),
}

/// What a response stage wants done next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseAction {
    Continue,
    Break,
}

/// Processes queries on their way upstream.
#[async_trait]
pub trait QueryStage: Send + Sync {
    async fn query(
        &self,
        ctx: &mut RequestContext,
        query: &mut Message,
    ) -> Result<QueryAction, PluginError>;
}

/// Processes responses on their way back to the client.
///
/// Stages may rewrite `response` in place (the cache does, for stale
/// fallback). The server plugin's implementation is terminal: it writes the
/// bytes and marks the context written.
#[async_trait]
pub trait ResponseStage: Send + Sync {
    async fn response(
        &self,
        ctx: &mut RequestContext,
        response: &mut Message,
    ) -> Result<ResponseAction, PluginError>;
}

/// Owns client-side resources (upstream sockets). Started before servers,
/// stopped after them.
#[async_trait]
pub trait ClientService: Send + Sync {
    async fn start_client(&self) -> Result<(), PluginError>;
    async fn stop_client(&self);
}

/// Owns listeners and worker pools.
#[async_trait]
pub trait ServerService: Send + Sync {
    async fn start_server(&self, pipeline: Arc<Pipeline>) -> Result<(), PluginError>;
    async fn stop_server(&self);

    /// The concrete bound address, once listening. Lets callers (and tests)
    /// use `:0` listens.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// A named, configurable unit of the forwarder.
///
/// The default capability accessors return `None`; a plugin overrides the
/// ones it implements. Capability sets are static per plugin type, so the
/// registry can compute its ordered chains once at startup.
pub trait Plugin: Send + Sync {
    /// Stable name; also the plugin's top-level key in the TOML config.
    fn name(&self) -> &'static str;

    /// Applies the plugin's configuration sub-table. Called once, before
    /// anything is started; a plugin whose key is absent from the config is
    /// never configured and stays inactive.
    fn configure(&mut self, config: &toml::Table) -> Result<(), PluginError>;

    /// Human-readable description of the configuration schema.
    fn config_help(&self) -> String {
        String::new()
    }

    fn query_stage(&self) -> Option<&dyn QueryStage> {
        None
    }

    fn response_stage(&self) -> Option<&dyn ResponseStage> {
        None
    }

    fn client_service(&self) -> Option<&dyn ClientService> {
        None
    }

    fn server_service(&self) -> Option<&dyn ServerService> {
        None
    }
}

/// Renders a uniform help block for `--pluginConfig` / `--listPlugins`.
///
/// `fields` is `(name, type, comment)` per configurable key.
pub fn render_config_help(plugin: &str, fields: &[(&str, &str, &str)]) -> String {
    let mut out = String::new();
    out.push_str(&"-".repeat(50));
    out.push_str(&format!("\n[{}]\n", plugin));
    for (name, ty, comment) in fields {
        out.push_str(&format!("{}=({}) # {}\n", name, ty, comment));
    }
    out.push_str(&"-".repeat(50));
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_block_lists_fields() {
        let help = render_config_help(
            "cache",
            &[("maxElements", "int", "Max elements in cache")],
        );
        assert!(help.contains("[cache]"));
        assert!(help.contains("maxElements=(int) # Max elements in cache"));
    }
}
