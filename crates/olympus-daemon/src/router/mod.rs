//! Payment route resolution against a Lightning node
//!
//! [`LnRouter`] asks the node for a path (`getroute`), looks up both
//! directions of every channel on it (`listchannels`) and resolves the
//! forwarding policy of each hop.

pub mod resolve;

use std::collections::HashMap;

use async_trait::async_trait;
use olympus_core::{PathHop, PaymentRoute, ShortChannelId};
use olympus_rpc::{BoxStream, ClientError, Endpoint, RpcClient};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

pub use resolve::{build_payment_route, ChannelPair};

/// Default path length limit passed to `getroute`
pub const DEFAULT_MAX_HOPS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("{method} failed: {source}")]
    Rpc {
        method: &'static str,
        #[source]
        source: ClientError,
    },

    #[error("Invalid channel id in path: {0}")]
    ChannelId(#[source] olympus_core::Error),

    #[error("Expected 2 edges for channel {scid}, got {count}")]
    EdgeCount { scid: ShortChannelId, count: usize },

    #[error("No edge of channel {scid} leaves {node_id}")]
    MissingEdge { scid: ShortChannelId, node_id: String },

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl RouteError {
    /// Whether this is a should-never-happen state rather than a failure to
    /// find a route
    pub fn is_invariant(&self) -> bool {
        matches!(self, RouteError::Invariant(_))
    }
}

pub type Result<T> = std::result::Result<T, RouteError>;

/// Anything that can produce payment routes towards a node
#[async_trait]
pub trait RouteFinder: Send + Sync {
    /// Find routes paying `amount_msat` to `to`. `from` lists candidate
    /// source identities and does not steer the search.
    async fn find_routes(
        &self,
        from: &[String],
        to: &str,
        amount_msat: u64,
    ) -> Result<Vec<PaymentRoute>>;
}

#[derive(Serialize)]
struct GetRouteParams<'a> {
    id: &'a str,
    msatoshi: u64,
    riskfactor: u32,
    maxhops: u32,
}

#[derive(Deserialize)]
struct GetRouteResult {
    #[serde(default)]
    route: Vec<PathHop>,
}

#[derive(Serialize)]
struct ListChannelsParams {
    short_channel_id: ShortChannelId,
}

#[derive(Deserialize)]
struct ListChannelsResult {
    #[serde(default)]
    channels: Vec<olympus_core::ChannelEdge>,
}

/// Route finder backed by a Lightning node's JSON-RPC interface
pub struct LnRouter<S = BoxStream> {
    client: RpcClient<S>,
    max_hops: u32,
}

impl LnRouter<BoxStream> {
    pub async fn connect(endpoint: &Endpoint, max_hops: u32) -> std::result::Result<Self, ClientError> {
        let client = RpcClient::connect(endpoint).await?;
        Ok(Self::new(client, max_hops))
    }
}

impl<S> LnRouter<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(client: RpcClient<S>, max_hops: u32) -> Self {
        Self { client, max_hops }
    }

    pub fn max_hops(&self) -> u32 {
        self.max_hops
    }

    /// Raw access to the node, for calls the router does not wrap
    pub fn client(&self) -> &RpcClient<S> {
        &self.client
    }

    pub async fn close(&self) -> std::result::Result<(), ClientError> {
        self.client.close().await
    }

    async fn get_route(&self, to: &str, amount_msat: u64) -> Result<Vec<PathHop>> {
        let params = GetRouteParams {
            id: to,
            msatoshi: amount_msat,
            riskfactor: 0,
            maxhops: self.max_hops,
        };
        let result: GetRouteResult = self
            .client
            .call("getroute", &params)
            .await
            .map_err(|source| RouteError::Rpc {
                method: "getroute",
                source,
            })?;
        Ok(result.route)
    }

    async fn list_channel(&self, scid: ShortChannelId) -> Result<ChannelPair> {
        let result: ListChannelsResult = self
            .client
            .call("listchannels", &ListChannelsParams { short_channel_id: scid })
            .await
            .map_err(|source| RouteError::Rpc {
                method: "listchannels",
                source,
            })?;

        let count = result.channels.len();
        <ChannelPair>::try_from(result.channels).map_err(|_| RouteError::EdgeCount { scid, count })
    }

    /// Resolve a single route to `to`
    pub async fn find_route(&self, to: &str, amount_msat: u64) -> Result<PaymentRoute> {
        let path = self.get_route(to, amount_msat).await?;
        tracing::debug!("getroute to {} returned {} hops", to, path.len());

        let mut channels: HashMap<ShortChannelId, ChannelPair> = HashMap::new();
        for scid in resolve::path_channel_ids(&path)? {
            if channels.contains_key(&scid) {
                continue;
            }
            let pair = self.list_channel(scid).await?;
            tracing::debug!("listchannels {}: {} -> {}", scid, pair[0].source, pair[0].destination);
            channels.insert(scid, pair);
        }

        build_payment_route(&path, &channels)
    }
}

#[async_trait]
impl<S> RouteFinder for LnRouter<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn find_routes(
        &self,
        from: &[String],
        to: &str,
        amount_msat: u64,
    ) -> Result<Vec<PaymentRoute>> {
        tracing::debug!(
            "Finding route to {} for {} msat ({} candidate sources)",
            to,
            amount_msat,
            from.len()
        );
        let route = self.find_route(to, amount_msat).await?;
        Ok(vec![route])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    /// Lightning node stand-in answering each request with `reply(method, params)`
    fn fake_node<F>(reply: F) -> (DuplexStream, tokio::task::JoinHandle<Vec<Value>>)
    where
        F: Fn(&str, &Value) -> Value + Send + 'static,
    {
        let (client, server) = tokio::io::duplex(16 * 1024);
        let handle = tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(server);
            let mut lines = BufReader::new(read_half).lines();
            let mut seen = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap();
                let result = reply(request["method"].as_str().unwrap(), &request["params"]);
                let response = json!({"jsonrpc": "2.0", "id": request["id"], "result": result});
                write_half
                    .write_all(format!("{}\n", response).as_bytes())
                    .await
                    .unwrap();
                seen.push(request);
            }
            seen
        });
        (client, handle)
    }

    fn edge(source: &str, destination: &str, scid: &str) -> Value {
        json!({
            "source": source,
            "destination": destination,
            "short_channel_id": scid,
            "base_fee_millisatoshi": 1000,
            "fee_per_millionth": 10,
            "delay": 40,
            "htlc_minimum_msat": "1000msat",
            "htlc_maximum_msat": "990000000msat"
        })
    }

    const ALICE: &str = "02aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "02bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[tokio::test]
    async fn test_getroute_request_shape() {
        let (stream, node) = fake_node(|method, _| match method {
            "getroute" => json!({"route": [
                {"id": BOB, "channel": "700000x1x0", "msatoshi": 5000, "delay": 9}
            ]}),
            _ => json!({"channels": [edge(ALICE, BOB, "700000x1x0"), edge(BOB, ALICE, "700000x1x0")]}),
        });
        let router = LnRouter::new(RpcClient::new(stream), 5);

        let routes = router.find_routes(&[], BOB, 5000).await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].hops[0].node_id, ALICE);
        router.close().await.unwrap();

        let seen = node.await.unwrap();
        assert_eq!(seen[0]["method"], "getroute");
        assert_eq!(
            seen[0]["params"],
            json!({"id": BOB, "msatoshi": 5000, "riskfactor": 0, "maxhops": 5})
        );
        assert_eq!(seen[1]["method"], "listchannels");
        assert_eq!(seen[1]["params"], json!({"short_channel_id": "700000x1x0"}));
    }

    #[tokio::test]
    async fn test_channel_looked_up_once() {
        let (stream, node) = fake_node(|method, _| match method {
            "getroute" => json!({"route": [
                {"id": BOB, "channel": "700000x1x0", "msatoshi": 5000, "delay": 9},
                {"id": ALICE, "channel": "700000x1x0", "msatoshi": 5000, "delay": 9}
            ]}),
            _ => json!({"channels": [edge(ALICE, BOB, "700000x1x0"), edge(BOB, ALICE, "700000x1x0")]}),
        });
        let router = LnRouter::new(RpcClient::new(stream), DEFAULT_MAX_HOPS);

        let route = router.find_route(BOB, 5000).await.unwrap();
        assert_eq!(route.len(), 2);
        assert_eq!(route.hops[1].node_id, BOB);
        router.close().await.unwrap();

        let seen = node.await.unwrap();
        let lookups = seen.iter().filter(|r| r["method"] == "listchannels").count();
        assert_eq!(lookups, 1);
    }

    #[tokio::test]
    async fn test_wrong_edge_count_fails() {
        for channels in [
            json!([edge(ALICE, BOB, "700000x1x0")]),
            json!([
                edge(ALICE, BOB, "700000x1x0"),
                edge(BOB, ALICE, "700000x1x0"),
                edge(BOB, ALICE, "700000x1x0")
            ]),
        ] {
            let (stream, _node) = fake_node(move |method, _| match method {
                "getroute" => json!({"route": [
                    {"id": BOB, "channel": "700000x1x0", "msatoshi": 5000, "delay": 9}
                ]}),
                _ => json!({"channels": channels.clone()}),
            });
            let router = LnRouter::new(RpcClient::new(stream), DEFAULT_MAX_HOPS);

            let err = router.find_route(BOB, 5000).await.unwrap_err();
            assert!(matches!(err, RouteError::EdgeCount { .. }));
            assert!(!err.is_invariant());
        }
    }

    #[tokio::test]
    async fn test_getroute_error_propagates() {
        let (stream, server) = tokio::io::duplex(4096);
        let peer = tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(server);
            let mut lines = BufReader::new(read_half).lines();
            if let Ok(Some(_)) = lines.next_line().await {
                write_half
                    .write_all(
                        b"{\"jsonrpc\":\"2.0\",\"id\":1,\"error\":{\"code\":205,\"message\":\"Could not find a route\"}}\n",
                    )
                    .await
                    .unwrap();
            }
        });
        let router = LnRouter::new(RpcClient::new(stream), DEFAULT_MAX_HOPS);

        let err = router.find_routes(&[], BOB, 1000).await.unwrap_err();
        match err {
            RouteError::Rpc { method, source: ClientError::Rpc(e) } => {
                assert_eq!(method, "getroute");
                assert_eq!(e.code, 205);
            }
            other => panic!("unexpected error: {other}"),
        }
        peer.await.unwrap();
    }
}
