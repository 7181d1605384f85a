//! # shunt-client
//!
//! The `dnsclient` plugin: routes each query to the upstream resolver whose
//! configured domain is the longest suffix of the queried name, then performs
//! the exchange over a pooled UDP socket with TCP fallback on truncation or
//! (optionally) on any UDP failure.
//!
//! Per-domain clients live in an immutable radix tree keyed by the reversed
//! canonical domain; reconfiguration builds a new tree and publishes it with
//! one atomic swap.

pub mod pool;
pub mod router;
pub mod transport;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use pool::SocketPool;
use rand::Rng;
use router::{canonical_domain, reversed, RadixTree};
use serde::{Deserialize, Serialize};
use shunt_plugin::duration as duration_cfg;
use shunt_plugin::{
    ClientService, Plugin, PluginError, QueryAction, QueryStage, RequestContext,
};
use shunt_proto::Message;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info};

/// Per-domain upstream configuration (`[dnsclient."<domain>"]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpstreamConfig {
    /// Nameserver addresses, `host:port`.
    pub upstream: Vec<String>,
    /// Per-attempt deadline.
    #[serde(with = "duration_cfg::serde_str")]
    pub timeout: Duration,
    /// Retry any failed UDP exchange over TCP, not just truncated ones.
    #[serde(rename = "alwaysRetryOverTCP")]
    pub always_retry_over_tcp: bool,
    /// UDP socket pool capacity (base table only; rounded to a power of two).
    pub udp_connection_pool_size: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            upstream: Vec::new(),
            timeout: Duration::from_secs(2),
            always_retry_over_tcp: true,
            udp_connection_pool_size: 8192,
        }
    }
}

/// One configured upstream group, resolved to socket addresses at
/// configuration time so startup catches bad addresses.
pub struct UpstreamClient {
    domain: String,
    addrs: Vec<SocketAddr>,
    config: UpstreamConfig,
}

impl UpstreamClient {
    fn from_config(domain: &str, config: UpstreamConfig) -> Result<Self, PluginError> {
        if config.upstream.is_empty() {
            return Err(PluginError::Config(format!(
                "dnsclient domain {:?} has no upstream addresses",
                domain
            )));
        }
        let addrs = config
            .upstream
            .iter()
            .map(|s| {
                s.parse::<SocketAddr>().map_err(|_| {
                    PluginError::Config(format!("bad upstream address {:?}", s))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            domain: domain.to_string(),
            addrs,
            config,
        })
    }

    /// Uniform random pick per query. Retries reuse the same pick so a TCP
    /// fallback lands on the upstream that truncated.
    fn pick(&self) -> SocketAddr {
        let idx = rand::thread_rng().gen_range(0..self.addrs.len());
        self.addrs[idx]
    }

    /// Performs the upstream exchange for `query`.
    async fn resolve(&self, query: &Message, pool: &SocketPool) -> Result<Message, PluginError> {
        let wire = query.to_wire();
        let upstream = self.pick();
        let timeout = self.config.timeout;

        debug!(upstream = %upstream, domain = %self.domain, "udp query");
        let socket = pool.acquire().ok_or(PluginError::PoolExhausted)?;
        let udp_result = transport::udp_query(&socket, upstream, timeout, &wire).await;
        pool.release(socket);

        let udp_response: Result<Message, PluginError> = match udp_result {
            Ok(bytes) => match Message::parse(&bytes) {
                Ok(msg) if msg.id() == query.id() => Ok(msg),
                Ok(msg) => Err(PluginError::Transport(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("response id {} does not match query {}", msg.id(), query.id()),
                ))),
                Err(source) => Err(PluginError::UpstreamParse {
                    upstream: upstream.to_string(),
                    source,
                }),
            },
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {
                Err(PluginError::UpstreamTimeout {
                    upstream: upstream.to_string(),
                })
            }
            Err(err) => Err(PluginError::Transport(err)),
        };

        let truncated = matches!(&udp_response, Ok(msg) if msg.is_truncated());

        if truncated || (udp_response.is_err() && self.config.always_retry_over_tcp) {
            debug!(upstream = %upstream, truncated, "retrying over tcp");
            let bytes = transport::tcp_query(upstream, timeout, &wire)
                .await
                .map_err(|err| {
                    if err.kind() == std::io::ErrorKind::TimedOut {
                        PluginError::UpstreamTimeout {
                            upstream: upstream.to_string(),
                        }
                    } else {
                        PluginError::Transport(err)
                    }
                })?;
            return Message::parse(&bytes).map_err(|source| PluginError::UpstreamParse {
                upstream: upstream.to_string(),
                source,
            });
        }

        udp_response
    }
}

/// The `dnsclient` plugin.
pub struct DnsClientPlugin {
    base: UpstreamConfig,
    clients: ArcSwap<RadixTree<Arc<UpstreamClient>>>,
    pool: OnceLock<Arc<SocketPool>>,
}

impl DnsClientPlugin {
    pub fn new() -> Self {
        Self {
            base: UpstreamConfig::default(),
            clients: ArcSwap::from_pointee(RadixTree::new()),
            pool: OnceLock::new(),
        }
    }
}

impl Default for DnsClientPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for DnsClientPlugin {
    fn name(&self) -> &'static str {
        "dnsclient"
    }

    fn configure(&mut self, config: &toml::Table) -> Result<(), PluginError> {
        // Scalar keys configure the base (pool sizing); sub-tables are
        // per-domain upstream groups. serde ignores the sub-tables here.
        self.base = toml::Value::Table(config.clone())
            .try_into()
            .map_err(PluginError::config)?;

        let mut tree = RadixTree::new();
        for (domain, value) in config {
            let Some(sub) = value.as_table() else {
                continue;
            };
            let upstream_config: UpstreamConfig = toml::Value::Table(sub.clone())
                .try_into()
                .map_err(PluginError::config)?;
            let client = UpstreamClient::from_config(domain, upstream_config)?;

            let key = reversed(&canonical_domain(domain));
            debug!(domain = %domain, key = %key, "routing domain");
            tree.insert(key.as_bytes(), Arc::new(client));
        }

        self.clients.store(Arc::new(tree));
        Ok(())
    }

    fn config_help(&self) -> String {
        let base = shunt_plugin::plugin::render_config_help(
            self.name(),
            &[
                ("upstream", "[string]", "Address and port of upstream nameservers"),
                ("timeout", "duration", "Per-attempt deadline"),
                ("alwaysRetryOverTCP", "bool", "Retry any failed UDP query over TCP"),
                ("udpConnectionPoolSize", "int", "UDP socket pool capacity"),
            ],
        );
        let scoped = shunt_plugin::plugin::render_config_help(
            "dnsclient.\"<domain>\"",
            &[
                ("upstream", "[string]", "Address and port of upstream nameservers"),
                ("timeout", "duration", "Per-attempt deadline"),
                ("alwaysRetryOverTCP", "bool", "Retry any failed UDP query over TCP"),
            ],
        );
        format!("{}{}", base, scoped)
    }

    fn query_stage(&self) -> Option<&dyn QueryStage> {
        Some(self)
    }

    fn client_service(&self) -> Option<&dyn ClientService> {
        Some(self)
    }
}

#[async_trait]
impl QueryStage for DnsClientPlugin {
    async fn query(
        &self,
        _ctx: &mut RequestContext,
        query: &mut Message,
    ) -> Result<QueryAction, PluginError> {
        let Some(question) = query.question() else {
            return Ok(QueryAction::Continue);
        };

        let key = reversed(&question.qname.to_canonical());
        let tree = self.clients.load_full();
        let Some(client) = tree.longest_prefix(key.as_bytes()).cloned() else {
            // No route for this name; the next stage owns the problem.
            return Ok(QueryAction::Continue);
        };

        let pool = self.pool.get().ok_or(PluginError::PoolExhausted)?;
        let response = client.resolve(query, pool).await?;
        Ok(QueryAction::Respond(response))
    }
}

#[async_trait]
impl ClientService for DnsClientPlugin {
    async fn start_client(&self) -> Result<(), PluginError> {
        info!("starting do53 client");
        let pool = SocketPool::new(self.base.udp_connection_pool_size)
            .await
            .map_err(PluginError::config)?;
        let _ = self.pool.set(Arc::new(pool));
        Ok(())
    }

    async fn stop_client(&self) {
        debug!("stopping do53 client");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use shunt_plugin::{ResponseSink, Transport};
    use shunt_proto::{Flags, Name, Question, ResourceRecord};
    use std::net::Ipv4Addr;
    use std::str::FromStr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, UdpSocket};

    struct NullSink;

    #[async_trait]
    impl ResponseSink for NullSink {
        async fn send(&self, _wire: Bytes) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(
            Transport::Udp,
            "127.0.0.1:53".parse().unwrap(),
            "127.0.0.1:50000".parse().unwrap(),
            Arc::new(NullSink),
        )
    }

    async fn configured(toml_src: &str) -> DnsClientPlugin {
        let mut plugin = DnsClientPlugin::new();
        // Small pool so tests do not bind thousands of sockets.
        let source = format!("udpConnectionPoolSize = 16\n{}", toml_src);
        let table: toml::Table = toml::from_str(&source).unwrap();
        plugin.configure(&table).unwrap();
        plugin.start_client().await.unwrap();
        plugin
    }

    /// Mock upstream that answers every UDP query with `make` applied to the
    /// parsed query. Returns its address.
    async fn spawn_udp_upstream(
        make: fn(&Message) -> Message,
    ) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let Ok(query) = Message::parse(&buf[..len]) else {
                    continue;
                };
                let response = make(&query);
                let _ = socket.send_to(&response.to_wire(), from).await;
            }
        });
        addr
    }

    fn full_answer(query: &Message) -> Message {
        let mut resp = Message::response_to(query);
        let name = query.question().unwrap().qname.clone();
        resp.add_answer(ResourceRecord::a(name, 60, Ipv4Addr::new(192, 0, 2, 10)));
        resp
    }

    fn truncated_answer(query: &Message) -> Message {
        let mut resp = Message::response_to(query);
        resp.header_mut().set_flag(Flags::TC, true);
        resp
    }

    #[tokio::test]
    async fn resolves_over_udp() {
        let upstream = spawn_udp_upstream(full_answer).await;
        let plugin = configured(&format!(
            "[\"\"]\nupstream = [\"{}\"]\ntimeout = \"2s\"\n",
            upstream
        ))
        .await;

        let mut query = Message::query(Question::a(Name::from_str("test.example").unwrap()));
        match plugin.query(&mut ctx(), &mut query).await.unwrap() {
            QueryAction::Respond(resp) => {
                assert_eq!(resp.id(), query.id());
                assert_eq!(resp.answers().len(), 1);
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn truncation_falls_back_to_tcp_same_upstream() {
        // UDP half answers TC=1; TCP half on the same port answers fully.
        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = udp.local_addr().unwrap();
        let tcp = TcpListener::bind(addr).await.unwrap();

        let udp_hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let tcp_hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        {
            let udp_hits = udp_hits.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    let Ok((len, from)) = udp.recv_from(&mut buf).await else {
                        return;
                    };
                    udp_hits.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    let Ok(query) = Message::parse(&buf[..len]) else {
                        continue;
                    };
                    let _ = udp.send_to(&truncated_answer(&query).to_wire(), from).await;
                }
            });
        }
        {
            let tcp_hits = tcp_hits.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((mut stream, _)) = tcp.accept().await else {
                        return;
                    };
                    tcp_hits.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    let mut len_buf = [0u8; 2];
                    stream.read_exact(&mut len_buf).await.unwrap();
                    let len = u16::from_be_bytes(len_buf) as usize;
                    let mut body = vec![0u8; len];
                    stream.read_exact(&mut body).await.unwrap();

                    let query = Message::parse(&body).unwrap();
                    let wire = full_answer(&query).to_wire();
                    stream
                        .write_all(&(wire.len() as u16).to_be_bytes())
                        .await
                        .unwrap();
                    stream.write_all(&wire).await.unwrap();
                }
            });
        }

        let plugin =
            configured(&format!("[\"\"]\nupstream = [\"{}\"]\n", addr)).await;

        let mut query = Message::query(Question::a(Name::from_str("big.example").unwrap()));
        match plugin.query(&mut ctx(), &mut query).await.unwrap() {
            QueryAction::Respond(resp) => {
                assert!(!resp.is_truncated());
                assert_eq!(resp.answers().len(), 1);
            }
            other => panic!("expected response, got {:?}", other),
        }

        assert_eq!(udp_hits.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(tcp_hits.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unrouted_names_continue() {
        let upstream = spawn_udp_upstream(full_answer).await;
        let plugin = configured(&format!(
            "[\"example.com\"]\nupstream = [\"{}\"]\n",
            upstream
        ))
        .await;

        let mut query = Message::query(Question::a(Name::from_str("other.net").unwrap()));
        assert!(matches!(
            plugin.query(&mut ctx(), &mut query).await.unwrap(),
            QueryAction::Continue
        ));
    }

    #[tokio::test]
    async fn domain_override_routes_to_its_upstream() {
        let default_upstream = spawn_udp_upstream(full_answer).await;
        let special_upstream = spawn_udp_upstream(|query| {
            let mut resp = Message::response_to(query);
            let name = query.question().unwrap().qname.clone();
            resp.add_answer(ResourceRecord::a(name, 60, Ipv4Addr::new(10, 0, 0, 53)));
            resp
        })
        .await;

        let plugin = configured(&format!(
            "[\"\"]\nupstream = [\"{}\"]\n\n[\"example.com\"]\nupstream = [\"{}\"]\n",
            default_upstream, special_upstream
        ))
        .await;

        let mut query =
            Message::query(Question::a(Name::from_str("foo.example.com").unwrap()));
        match plugin.query(&mut ctx(), &mut query).await.unwrap() {
            QueryAction::Respond(resp) => {
                assert_eq!(
                    resp.answers()[0].rdata().as_a(),
                    Some(Ipv4Addr::new(10, 0, 0, 53))
                );
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn empty_upstream_list_is_a_config_error() {
        let mut plugin = DnsClientPlugin::new();
        let table: toml::Table = toml::from_str("[\"\"]\ntimeout = \"2s\"\n").unwrap();
        assert!(matches!(
            plugin.configure(&table),
            Err(PluginError::Config(_))
        ));
    }

    #[test]
    fn bad_upstream_address_is_a_config_error() {
        let mut plugin = DnsClientPlugin::new();
        let table: toml::Table =
            toml::from_str("[\"\"]\nupstream = [\"not-an-address\"]\n").unwrap();
        assert!(matches!(
            plugin.configure(&table),
            Err(PluginError::Config(_))
        ));
    }
}
