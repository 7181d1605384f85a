//! # shunt-cache
//!
//! The response cache stage. On the query path it answers from memory and
//! short-circuits the chain; on the response path it admits qualifying
//! responses and, when the upstream failed, falls back to a stale entry.
//!
//! Keys are fingerprint strings `qname:qclass:qtype:CD:DO` with the qname in
//! canonical form (lowercase, trailing dot). Values keep the original
//! response plus its arrival time and admission TTL; lookups rewrite the
//! served copy's TTLs to the remaining lifetime, never the stored one.

mod store;

pub use store::{CacheEntry, CacheStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shunt_plugin::duration as duration_cfg;
use shunt_plugin::{
    ClientService, Plugin, PluginError, QueryAction, QueryStage, RequestContext, ResponseAction,
    ResponseStage,
};
use shunt_proto::{clamp_ttl, Message, Rcode};
use std::time::Duration;
use tracing::{debug, info};

/// Cache plugin configuration (`[cache]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Capacity when stale caching is off.
    pub max_elements: u64,
    /// Capacity when stale caching is on (the same store then holds entries
    /// past their TTL until `stale_duration`).
    pub max_stale_elements: u64,
    /// Hard expiry horizon; entries are never served past this. Capped at 24h.
    #[serde(with = "duration_cfg::serde_str")]
    pub stale_duration: Duration,
    /// Serve expired entries when the upstream answers SERVFAIL.
    pub stale_cache: bool,
    /// TTL stamped on a stale serve.
    #[serde(rename = "staleTTL", with = "duration_cfg::serde_str")]
    pub stale_ttl: Duration,
    /// Admit NXDOMAIN/NODATA answers.
    pub negative_answers: bool,
}

/// Ceiling on how long an entry may outlive its TTL.
const MAX_STALE_DURATION: Duration = Duration::from_secs(24 * 3600);

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_elements: 1000,
            max_stale_elements: 10_000,
            stale_duration: MAX_STALE_DURATION,
            stale_cache: false,
            stale_ttl: Duration::from_secs(30),
            negative_answers: false,
        }
    }
}

/// The `cache` plugin.
pub struct CachePlugin {
    config: CacheConfig,
    store: Option<CacheStore>,
}

impl CachePlugin {
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
            store: None,
        }
    }

    /// Builds the fingerprint for a message's first question.
    ///
    /// Returns `None` for questionless messages, which are simply not
    /// cacheable.
    fn fingerprint(msg: &Message) -> Option<String> {
        let question = msg.question()?;
        let cd = u8::from(msg.header().checking_disabled());
        let do_bit = u8::from(msg.dnssec_ok());
        Some(format!(
            "{}:{}:{}:{}:{}",
            question.qname.to_canonical(),
            question.qclass.0,
            question.qtype.0,
            cd,
            do_bit
        ))
    }

    fn store(&self) -> Option<&CacheStore> {
        self.store.as_ref()
    }
}

impl Default for CachePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for CachePlugin {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn configure(&mut self, config: &toml::Table) -> Result<(), PluginError> {
        self.config = toml::Value::Table(config.clone())
            .try_into()
            .map_err(PluginError::config)?;
        self.config.stale_duration = self.config.stale_duration.min(MAX_STALE_DURATION);

        let capacity = if self.config.stale_cache {
            self.config.max_stale_elements
        } else {
            self.config.max_elements
        };
        self.store = Some(CacheStore::new(capacity, self.config.stale_duration));

        debug!(config = ?self.config, "cache configured");
        Ok(())
    }

    fn config_help(&self) -> String {
        shunt_plugin::plugin::render_config_help(
            self.name(),
            &[
                ("maxElements", "int", "Max elements in cache"),
                ("maxStaleElements", "int", "Max elements in stale cache"),
                ("staleDuration", "duration", "How long entries may be served stale"),
                ("staleCache", "bool", "Enable stale caching"),
                ("staleTTL", "duration", "TTL returned on a stale serve"),
                ("negativeAnswers", "bool", "Enable negative answer caching"),
            ],
        )
    }

    fn query_stage(&self) -> Option<&dyn QueryStage> {
        Some(self)
    }

    fn response_stage(&self) -> Option<&dyn ResponseStage> {
        Some(self)
    }

    fn client_service(&self) -> Option<&dyn ClientService> {
        Some(self)
    }
}

#[async_trait]
impl QueryStage for CachePlugin {
    async fn query(
        &self,
        ctx: &mut RequestContext,
        query: &mut Message,
    ) -> Result<QueryAction, PluginError> {
        let Some(store) = self.store() else {
            return Ok(QueryAction::Continue);
        };
        let Some(key) = Self::fingerprint(query) else {
            return Ok(QueryAction::Continue);
        };

        // The normal query path never serves stale; that is reserved for the
        // SERVFAIL fallback on the response path.
        if let Some(mut response) = store.get(&key, false, self.config.stale_ttl) {
            debug!(key = %key, "cache hit");
            ctx.no_cache = true;
            response.set_reply(query);
            return Ok(QueryAction::Respond(response));
        }

        debug!(key = %key, "cache miss");
        Ok(QueryAction::Continue)
    }
}

#[async_trait]
impl ResponseStage for CachePlugin {
    async fn response(
        &self,
        ctx: &mut RequestContext,
        response: &mut Message,
    ) -> Result<ResponseAction, PluginError> {
        let Some(store) = self.store() else {
            return Ok(ResponseAction::Continue);
        };

        // Upstream failed: try to paper over it with a stale entry.
        if self.config.stale_cache && response.rcode() == Rcode::SERVFAIL {
            if let Some(key) = Self::fingerprint(response) {
                if let Some(mut stale) = store.get(&key, true, self.config.stale_ttl) {
                    debug!(key = %key, "stale cache hit");
                    ctx.no_cache = true;
                    stale.set_reply(response);
                    *response = stale;
                }
            }
            return Ok(ResponseAction::Continue);
        }

        if ctx.no_cache {
            return Ok(ResponseAction::Continue);
        }

        let ttl = response.min_ttl();
        if ttl.is_zero() {
            return Ok(ResponseAction::Continue);
        }

        if response.is_nxdomain() || response.is_nodata() {
            if !self.config.negative_answers {
                return Ok(ResponseAction::Continue);
            }
        } else if !response.rcode().is_success() {
            return Ok(ResponseAction::Continue);
        }

        let Some(key) = Self::fingerprint(response) else {
            return Ok(ResponseAction::Continue);
        };
        let ttl = clamp_ttl(ttl);
        debug!(key = %key, ttl = ?ttl, "cache admit");
        store.insert(key, response.clone(), ttl);

        Ok(ResponseAction::Continue)
    }
}

#[async_trait]
impl ClientService for CachePlugin {
    async fn start_client(&self) -> Result<(), PluginError> {
        info!("starting cache plugin");
        Ok(())
    }

    async fn stop_client(&self) {
        if let Some(store) = self.store() {
            store.clear();
        }
    }
}
