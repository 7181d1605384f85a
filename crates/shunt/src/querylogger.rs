//! The `querylogger` plugin: one log line per query.

use async_trait::async_trait;
use shunt_plugin::{Plugin, PluginError, QueryAction, QueryStage, RequestContext};
use shunt_proto::Message;
use tracing::info;

pub struct QueryLoggerPlugin;

impl QueryLoggerPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for QueryLoggerPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for QueryLoggerPlugin {
    fn name(&self) -> &'static str {
        "querylogger"
    }

    fn configure(&mut self, _config: &toml::Table) -> Result<(), PluginError> {
        Ok(())
    }

    fn query_stage(&self) -> Option<&dyn QueryStage> {
        Some(self)
    }
}

#[async_trait]
impl QueryStage for QueryLoggerPlugin {
    async fn query(
        &self,
        ctx: &mut RequestContext,
        query: &mut Message,
    ) -> Result<QueryAction, PluginError> {
        match query.question() {
            Some(question) => info!(
                client = %ctx.remote_addr,
                transport = %ctx.transport,
                id = query.id(),
                qname = %question.qname,
                qtype = %question.qtype,
                "query"
            ),
            None => info!(
                client = %ctx.remote_addr,
                transport = %ctx.transport,
                id = query.id(),
                "query without question"
            ),
        }
        Ok(QueryAction::Continue)
    }
}
