//! # shunt-server
//!
//! The `dns` server plugin: classic DO53 over UDP and TCP.
//!
//! Listening is split into per-CPU event loops, each owning its own
//! SO_REUSEPORT socket; accepted queries are parsed on the loop and handed
//! to a bounded worker pool per transport. The plugin's response stage is the
//! terminal writer of the response chain: it serializes with compression and
//! sends through the request's sink (the TCP sink adds the 2-byte length
//! prefix, the UDP sink does not).

pub mod sink;
pub mod tcp;
pub mod udp;
pub mod workers;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shunt_plugin::duration as duration_cfg;
use shunt_plugin::{
    Pipeline, Plugin, PluginError, RequestContext, ResponseAction, ResponseSink, ResponseStage,
    ServerService,
};
use shunt_proto::Message;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tcp::TcpLimits;
use tokio::sync::broadcast;
use tracing::info;
use workers::WorkerPool;

/// Server plugin configuration (`[dns]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Listen address; `":53"` binds every interface.
    pub listen: String,
    /// TCP worker pool size.
    pub tcp_pool_size: usize,
    /// UDP worker pool size.
    pub udp_pool_size: usize,
    /// TCP socket receive buffer in bytes.
    pub tcp_buffer_size: usize,
    /// UDP socket receive buffer in bytes.
    pub udp_buffer_size: usize,
    /// Queries served on one TCP connection before it is closed.
    #[serde(rename = "maxQueriesPerTCPStream")]
    pub max_queries_per_tcp_stream: usize,
    /// TCP idle timeout.
    #[serde(with = "duration_cfg::serde_str")]
    pub tcp_keep_alive: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: ":53".to_string(),
            tcp_pool_size: 10,
            udp_pool_size: 10,
            tcp_buffer_size: 10 * 1024,
            udp_buffer_size: 10 * 1024,
            max_queries_per_tcp_stream: 50,
            tcp_keep_alive: Duration::from_secs(10),
        }
    }
}

/// Parses a listen string; a bare `":port"` means every v4 interface.
pub fn parse_listen(listen: &str) -> Result<SocketAddr, PluginError> {
    let candidate = if let Some(port) = listen.strip_prefix(':') {
        format!("0.0.0.0:{}", port)
    } else {
        listen.to_string()
    };
    candidate
        .parse::<SocketAddr>()
        .map_err(|_| PluginError::Config(format!("bad listen address {:?}", listen)))
}

/// Serializes `response` and writes it through the request's sink.
///
/// This is the single exit point for bytes: the response chain's terminal
/// stage and the worker's SERVFAIL fallback both land here, so the
/// `response_written` flag cannot drift from reality.
pub async fn write_response(
    ctx: &mut RequestContext,
    response: &Message,
) -> Result<(), PluginError> {
    let wire = response.to_wire();
    let sink = ctx.sink().clone();
    sink.send(wire).await?;
    ctx.response_written = true;
    Ok(())
}

struct ServerState {
    local_addr: SocketAddr,
    shutdown: broadcast::Sender<()>,
}

/// The `dns` plugin.
pub struct DnsServerPlugin {
    config: ServerConfig,
    event_loops: usize,
    state: OnceLock<ServerState>,
}

impl DnsServerPlugin {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            event_loops: num_cpus::get(),
            state: OnceLock::new(),
        }
    }
}

impl Default for DnsServerPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for DnsServerPlugin {
    fn name(&self) -> &'static str {
        "dns"
    }

    fn configure(&mut self, config: &toml::Table) -> Result<(), PluginError> {
        self.config = toml::Value::Table(config.clone())
            .try_into()
            .map_err(PluginError::config)?;
        parse_listen(&self.config.listen)?;
        Ok(())
    }

    fn config_help(&self) -> String {
        shunt_plugin::plugin::render_config_help(
            self.name(),
            &[
                ("listen", "string", "Listen address and port"),
                ("tcpPoolSize", "int", "TCP worker pool size"),
                ("udpPoolSize", "int", "UDP worker pool size"),
                ("tcpBufferSize", "int", "TCP receive buffer in bytes"),
                ("udpBufferSize", "int", "UDP receive buffer in bytes"),
                ("maxQueriesPerTCPStream", "int", "Queries per TCP connection"),
                ("tcpKeepAlive", "duration", "TCP idle timeout"),
            ],
        )
    }

    fn response_stage(&self) -> Option<&dyn ResponseStage> {
        Some(self)
    }

    fn server_service(&self) -> Option<&dyn ServerService> {
        Some(self)
    }
}

#[async_trait]
impl ResponseStage for DnsServerPlugin {
    /// Terminal stage: puts the response on the wire.
    async fn response(
        &self,
        ctx: &mut RequestContext,
        response: &mut Message,
    ) -> Result<ResponseAction, PluginError> {
        write_response(ctx, response).await?;
        Ok(ResponseAction::Continue)
    }
}

#[async_trait]
impl ServerService for DnsServerPlugin {
    async fn start_server(&self, pipeline: Arc<Pipeline>) -> Result<(), PluginError> {
        let addr = parse_listen(&self.config.listen)?;
        let (shutdown, _) = broadcast::channel(1);

        let udp_pool = Arc::new(WorkerPool::new(self.config.udp_pool_size, pipeline.clone()));
        let tcp_pool = Arc::new(WorkerPool::new(self.config.tcp_pool_size, pipeline));

        let bound = udp::spawn_udp_loops(
            addr,
            self.event_loops,
            self.config.udp_buffer_size,
            udp_pool,
            &shutdown,
        )?;
        info!(addr = %bound, "started do53 udp server");

        // TCP joins the port UDP resolved, so `:0` listens stay symmetric.
        let tcp_addr = bound;
        let limits = TcpLimits {
            max_queries_per_stream: self.config.max_queries_per_tcp_stream,
            keep_alive: self.config.tcp_keep_alive,
        };
        tcp::spawn_tcp_loops(
            tcp_addr,
            self.event_loops,
            self.config.tcp_buffer_size,
            limits,
            tcp_pool,
            &shutdown,
        )?;
        info!(addr = %tcp_addr, "started do53 tcp server");

        let _ = self.state.set(ServerState {
            local_addr: bound,
            shutdown,
        });
        Ok(())
    }

    async fn stop_server(&self) {
        if let Some(state) = self.state.get() {
            let _ = state.shutdown.send(());
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.state.get().map(|s| s.local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shunt_proto::{Name, Question, Rcode};
    use std::str::FromStr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpStream, UdpSocket};

    #[test]
    fn listen_string_forms() {
        assert_eq!(
            parse_listen(":53").unwrap(),
            "0.0.0.0:53".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_listen("127.0.0.1:5353").unwrap(),
            "127.0.0.1:5353".parse::<SocketAddr>().unwrap()
        );
        assert!(parse_listen("nonsense").is_err());
    }

    #[test]
    fn config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.tcp_pool_size, 10);
        assert_eq!(config.udp_pool_size, 10);
        assert_eq!(config.max_queries_per_tcp_stream, 50);
        assert_eq!(config.tcp_keep_alive, Duration::from_secs(10));
    }

    #[test]
    fn config_camel_case_keys() {
        let table: toml::Table = toml::from_str(
            "listen = \":5353\"\nmaxQueriesPerTCPStream = 7\ntcpKeepAlive = \"3s\"\n",
        )
        .unwrap();
        let config: ServerConfig = toml::Value::Table(table).try_into().unwrap();
        assert_eq!(config.max_queries_per_tcp_stream, 7);
        assert_eq!(config.tcp_keep_alive, Duration::from_secs(3));
    }

    /// With no stages configured at all, every query must come back SERVFAIL
    /// with the client's id.
    async fn started_plugin() -> (DnsServerPlugin, SocketAddr) {
        let mut plugin = DnsServerPlugin::new();
        let table: toml::Table = toml::from_str("listen = \"127.0.0.1:0\"").unwrap();
        plugin.configure(&table).unwrap();

        let pipeline = Arc::new(Pipeline::new(Vec::new(), Vec::new()));
        plugin.start_server(pipeline).await.unwrap();
        let addr = ServerService::local_addr(&plugin).unwrap();
        (plugin, addr)
    }

    #[tokio::test]
    async fn empty_pipeline_yields_servfail_over_udp() {
        let (_plugin, addr) = started_plugin().await;

        let query = Message::query(Question::a(Name::from_str("example.com").unwrap()));
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.send_to(&query.to_wire(), addr).await.unwrap();

        let mut buf = [0u8; 4096];
        let (len, _) = tokio::time::timeout(
            Duration::from_secs(2),
            socket.recv_from(&mut buf),
        )
        .await
        .unwrap()
        .unwrap();

        let response = Message::parse(&buf[..len]).unwrap();
        assert_eq!(response.rcode(), Rcode::SERVFAIL);
        assert_eq!(response.id(), query.id());
        assert_eq!(response.questions(), query.questions());
        assert!(response.answers().is_empty());
    }

    #[tokio::test]
    async fn empty_pipeline_yields_servfail_over_tcp() {
        let (_plugin, addr) = started_plugin().await;

        let query = Message::query(Question::a(Name::from_str("example.com").unwrap()));
        let wire = query.to_wire();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&(wire.len() as u16).to_be_bytes())
            .await
            .unwrap();
        stream.write_all(&wire).await.unwrap();

        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await.unwrap();
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.unwrap();

        let response = Message::parse(&body).unwrap();
        assert_eq!(response.rcode(), Rcode::SERVFAIL);
        assert_eq!(response.id(), query.id());
    }

    #[tokio::test]
    async fn malformed_udp_packets_are_dropped_silently() {
        let (_plugin, addr) = started_plugin().await;

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.send_to(b"not dns", addr).await.unwrap();

        let mut buf = [0u8; 512];
        let result =
            tokio::time::timeout(Duration::from_millis(200), socket.recv_from(&mut buf)).await;
        assert!(result.is_err(), "expected no response to a malformed packet");
    }
}
