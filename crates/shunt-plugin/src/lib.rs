//! # shunt-plugin
//!
//! The stage framework the forwarder is assembled from. A plugin is a named
//! unit that can claim any of four capabilities:
//!
//! - a **query stage**, run for each inbound query in priority order;
//! - a **response stage**, run in reverse priority order once a response
//!   exists;
//! - a **client service**, started before servers (owns upstream resources);
//! - a **server service**, started last (owns listeners and worker pools).
//!
//! Stages communicate through a typed [`RequestContext`] and three-valued
//! actions instead of sentinel errors: a query stage may `Continue`, `Break`
//! (stop without an answer) or `Respond` with a message, in which case the
//! dispatcher runs the response chain with it.

pub mod context;
pub mod duration;
pub mod pipeline;
pub mod plugin;
pub mod registry;

pub use context::{RequestContext, ResponseSink, Transport};
pub use pipeline::Pipeline;
pub use plugin::{
    ClientService, Plugin, QueryAction, QueryStage, ResponseAction, ResponseStage, ServerService,
};
pub use registry::{Built, Registry, PLUGIN_ORDER};

use thiserror::Error;

/// Errors surfaced by plugins.
///
/// Request-scoped errors never leave the pipeline: the dispatcher logs them
/// and the server answers SERVFAIL. Configuration errors abort startup.
#[derive(Error, Debug)]
pub enum PluginError {
    /// Malformed or contradictory configuration; fatal at startup.
    #[error("configuration: {0}")]
    Config(String),

    /// DNS codec failure (malformed upstream response, oversized message).
    #[error("codec: {0}")]
    Proto(#[from] shunt_proto::Error),

    /// Socket-level failure.
    #[error("transport: {0}")]
    Transport(#[from] std::io::Error),

    /// An upstream attempt ran past its deadline.
    #[error("upstream {upstream} timed out")]
    UpstreamTimeout { upstream: String },

    /// An upstream replied with bytes that do not parse.
    #[error("upstream {upstream} sent an unparseable response: {source}")]
    UpstreamParse {
        upstream: String,
        source: shunt_proto::Error,
    },

    /// The UDP socket pool had nothing to lend.
    #[error("udp socket pool exhausted")]
    PoolExhausted,
}

impl PluginError {
    /// Helper for plugins deserializing their TOML sub-table.
    pub fn config(err: impl std::fmt::Display) -> Self {
        Self::Config(err.to_string())
    }
}
