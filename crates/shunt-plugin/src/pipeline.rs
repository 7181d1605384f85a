//! The query/response chain dispatcher.

use crate::context::RequestContext;
use crate::plugin::{Plugin, QueryAction, ResponseAction};
use metrics::{gauge, histogram};
use shunt_proto::Message;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// In-flight query gauge, decremented on drop so early returns still count
/// down.
struct InflightGuard;

impl InflightGuard {
    fn new() -> Self {
        gauge!("dns_query_inflight_count").increment(1.0);
        Self
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        gauge!("dns_query_inflight_count").decrement(1.0);
    }
}

/// Drives configured stages over a request.
///
/// The query chain runs in priority order and short-circuits on `Break`, on
/// an error (logged, nothing written) or on `Respond`, which switches to the
/// response chain. The response chain is the reverse ordering; its terminal
/// stage (the server plugin) writes the wire bytes.
pub struct Pipeline {
    query_chain: Vec<Arc<dyn Plugin>>,
    response_chain: Vec<Arc<dyn Plugin>>,
}

impl Pipeline {
    pub fn new(query_chain: Vec<Arc<dyn Plugin>>, response_chain: Vec<Arc<dyn Plugin>>) -> Self {
        Self {
            query_chain,
            response_chain,
        }
    }

    /// Runs the query chain for one request.
    ///
    /// On return the caller checks `ctx.response_written`; if still false it
    /// owes the client a SERVFAIL.
    pub async fn handle_query(&self, ctx: &mut RequestContext, query: &mut Message) {
        let _inflight = InflightGuard::new();
        let started = Instant::now();

        for plugin in &self.query_chain {
            let Some(stage) = plugin.query_stage() else {
                continue;
            };
            debug!(plugin = plugin.name(), "query stage");

            match stage.query(ctx, query).await {
                Ok(QueryAction::Continue) => {}
                Ok(QueryAction::Break) => break,
                Ok(QueryAction::Respond(mut response)) => {
                    self.handle_response(ctx, &mut response).await;
                    break;
                }
                Err(err) => {
                    error!(plugin = plugin.name(), error = %err, "query stage failed");
                    break;
                }
            }
        }

        histogram!("dns_query_duration").record(started.elapsed().as_secs_f64() * 1000.0);
    }

    /// Runs the response chain over `response`, in reverse priority order.
    pub async fn handle_response(&self, ctx: &mut RequestContext, response: &mut Message) {
        for plugin in &self.response_chain {
            let Some(stage) = plugin.response_stage() else {
                continue;
            };
            debug!(plugin = plugin.name(), "response stage");

            match stage.response(ctx, response).await {
                Ok(ResponseAction::Continue) => {}
                Ok(ResponseAction::Break) => return,
                Err(err) => {
                    error!(plugin = plugin.name(), error = %err, "response stage failed");
                    return;
                }
            }
        }
    }

    /// Query-chain plugin names, in order.
    pub fn query_names(&self) -> Vec<&'static str> {
        self.query_chain.iter().map(|p| p.name()).collect()
    }

    /// Response-chain plugin names, in order.
    pub fn response_names(&self) -> Vec<&'static str> {
        self.response_chain.iter().map(|p| p.name()).collect()
    }
}
