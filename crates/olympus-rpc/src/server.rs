//! JSON-RPC server
//!
//! Serves newline-delimited JSON-RPC 2.0 over any [`Listener`]. Each accepted
//! connection runs in its own task and handles one request at a time. At most
//! one accept is pending at any moment: the accept permit is handed back as
//! soon as a connection arrives (or accept fails), before the connection is
//! serviced.
//!
//! Shutdown is cooperative. Cancelling the token stops the accept loop,
//! drops the listener and makes every connection task exit at its next
//! request boundary; `serve` returns once all of them have finished.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::endpoint::Listener;
use crate::framing::{self, Frame};
use crate::pool::{Scratch, ScratchPool};
use crate::protocol::{Request, RequestId, Response, RpcError};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Connection closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ServerError>;

type Handler = Box<dyn Fn(Value) -> BoxFuture<'static, std::result::Result<Value, RpcError>> + Send + Sync>;

pub struct RpcServer {
    handlers: HashMap<String, Handler>,
    pool: ScratchPool,
}

impl RpcServer {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            pool: ScratchPool::default(),
        }
    }

    /// Register `handler` for `method`, replacing any previous one.
    ///
    /// Params are decoded into `P` before the handler runs; a decode failure
    /// is answered with an invalid-params error. Params absent from the
    /// request decode from `null`.
    pub fn register<P, R, F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, RpcError>> + Send + 'static,
    {
        let handler: Handler = Box::new(move |params: Value| {
            let params = match serde_json::from_value::<P>(params) {
                Ok(params) => params,
                Err(e) => return future::ready(Err(RpcError::invalid_params(e.to_string()))).boxed(),
            };
            let call = handler(params);
            async move {
                let result = call.await?;
                serde_json::to_value(result).map_err(|e| RpcError::internal_error(e.to_string()))
            }
            .boxed()
        });
        self.handlers.insert(method.into(), handler);
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    pub fn pool(&self) -> &ScratchPool {
        &self.pool
    }

    /// Accept and serve connections until `shutdown` is cancelled, then wait
    /// for every connection task to finish.
    pub async fn serve<L: Listener>(self: Arc<Self>, listener: L, shutdown: CancellationToken) {
        tracing::info!("jsonrpc listening on {}", listener.describe());

        let listener = Arc::new(listener);
        let accept_permit = Arc::new(Semaphore::new(1));
        let tracker = TaskTracker::new();

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("jsonrpc: shutting down on cancel");
                    break;
                }
                permit = accept_permit.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let server = self.clone();
            let listener = listener.clone();
            let shutdown = shutdown.clone();
            tracker.spawn(async move {
                let accepted = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => return,
                    accepted = listener.accept() => accepted,
                };
                drop(listener);
                drop(permit);

                match accepted {
                    Ok(stream) => server.serve_connection(stream, shutdown).await,
                    Err(e) => tracing::error!("jsonrpc: failed to accept connection: {}", e),
                }
            });
        }

        drop(listener);
        tracker.close();
        tracker.wait().await;
        tracing::info!("jsonrpc: shutdown completed");
    }

    /// Serve one established connection until the peer disconnects, a
    /// transport error occurs, or `shutdown` is cancelled between requests.
    pub async fn serve_connection<S>(&self, stream: S, shutdown: CancellationToken)
    where
        S: AsyncRead + AsyncWrite + Send,
    {
        let (read_half, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);
        let mut scratch = self.pool.acquire();
        tracing::debug!("jsonrpc: new client");

        loop {
            let readable = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("jsonrpc: shutdown requested, closing client connection");
                    break;
                }
                ready = reader.fill_buf() => ready.map(|_| ()),
            };
            if let Err(e) = readable {
                tracing::warn!("jsonrpc: failed to read request: {}", e);
                break;
            }

            match self.handle_request(&mut reader, &mut writer, &mut scratch).await {
                Ok(()) => {}
                Err(ServerError::Closed) => {
                    tracing::debug!("jsonrpc: client EOF");
                    break;
                }
                Err(e) => {
                    tracing::warn!("jsonrpc: connection error: {}", e);
                    break;
                }
            }
        }

        if let Err(e) = writer.shutdown().await {
            tracing::debug!("jsonrpc: error closing client connection: {}", e);
        }
    }

    async fn handle_request<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        scratch: &mut Scratch,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let frame = match framing::read_record(reader, &mut scratch.rx).await {
            Ok(frame) => frame,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                tracing::debug!("jsonrpc: discarding {} byte partial request", scratch.rx.len());
                return Err(ServerError::Closed);
            }
            Err(e) => return Err(e.into()),
        };

        let response = match frame {
            Frame::Eof => return Err(ServerError::Closed),
            Frame::Blank => Response::error(RpcError::invalid_request("Empty request"), RequestId::Null),
            Frame::Record => self.dispatch(&scratch.rx).await,
        };

        scratch.tx.clear();
        serde_json::to_writer(&mut scratch.tx, &response)?;
        framing::write_record(writer, &scratch.tx).await?;
        Ok(())
    }

    async fn dispatch(&self, raw: &[u8]) -> Response {
        let value: Value = match serde_json::from_slice(raw) {
            Ok(value) => value,
            Err(e) => return Response::error(RpcError::parse_error(e.to_string()), RequestId::Null),
        };

        let id = value
            .get("id")
            .and_then(|id| RequestId::deserialize(id).ok())
            .unwrap_or_default();

        let request: Request = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => return Response::error(RpcError::invalid_request(e.to_string()), id),
        };
        if let Err(error) = request.validate() {
            return Response::error(error, request.id);
        }

        let Some(handler) = self.handlers.get(&request.method) else {
            tracing::debug!("jsonrpc: unknown method {}", request.method);
            return Response::error(RpcError::method_not_found(&request.method), request.id);
        };

        tracing::debug!("jsonrpc: handling {}", request.method);
        match handler(request.params).await {
            Ok(result) => Response::success(result, request.id),
            Err(error) => Response::error(error, request.id),
        }
    }
}

impl Default for RpcServer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::DuplexStream;

    #[derive(Deserialize)]
    struct AddParams {
        a: i64,
        b: i64,
    }

    fn test_server() -> Arc<RpcServer> {
        let mut server = RpcServer::new();
        server.register("add", |p: AddParams| async move { Ok::<_, RpcError>(p.a + p.b) });
        server.register("fail", |_: Value| async move {
            Err::<(), _>(RpcError::application_error(-1, "boom"))
        });
        Arc::new(server)
    }

    async fn exchange(lines: &str) -> Vec<Value> {
        let server = test_server();
        let (mut client, stream): (DuplexStream, DuplexStream) = tokio::io::duplex(4096);
        let handle = tokio::spawn(async move {
            server.serve_connection(stream, CancellationToken::new()).await;
        });

        client.write_all(lines.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();

        let mut out = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut client, &mut out)
            .await
            .unwrap();
        handle.await.unwrap();

        out.lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let replies = exchange("{\"jsonrpc\":\"2.0\",\"id\":5,\"method\":\"add\",\"params\":{\"a\":2,\"b\":3}}\n").await;
        assert_eq!(replies, vec![json!({"jsonrpc": "2.0", "id": 5, "result": 5})]);
    }

    #[tokio::test]
    async fn test_error_codes_keep_connection_open() {
        let replies = exchange(concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"missing\"}\n",
            "not json\n",
            "\n",
            "{\"jsonrpc\":\"1.0\",\"id\":2,\"method\":\"add\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"add\",\"params\":{\"a\":\"x\"}}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":4,\"method\":\"fail\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":\"s\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":6,\"method\":\"add\",\"params\":{\"a\":1,\"b\":1}}\n",
        ))
        .await;

        let codes: Vec<i64> = replies
            .iter()
            .take(7)
            .map(|r| r["error"]["code"].as_i64().unwrap())
            .collect();
        assert_eq!(codes, vec![-32601, -32700, -32600, -32600, -32602, -1, -32600]);

        assert_eq!(replies[0]["id"], 1);
        assert_eq!(replies[1]["id"], Value::Null);
        assert_eq!(replies[3]["id"], 2);
        assert_eq!(replies[6]["id"], "s");
        assert_eq!(replies[7]["result"], 2);
    }

    #[tokio::test]
    async fn test_scratch_returned_after_connection() {
        let server = test_server();
        let (client, stream) = tokio::io::duplex(64);
        drop(client);

        server.serve_connection(stream, CancellationToken::new()).await;
        assert_eq!(server.pool().idle(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_connection_answers_nothing() {
        let server = test_server();
        let (mut client, stream) = tokio::io::duplex(4096);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        client
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"add\",\"params\":{\"a\":1,\"b\":1}}\n")
            .await
            .unwrap();
        server.serve_connection(stream, shutdown).await;

        let mut out = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut client, &mut out)
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    /// In-memory listener that records how many accepts are pending at once
    struct CountingListener {
        incoming: tokio::sync::Mutex<tokio::sync::mpsc::Receiver<DuplexStream>>,
        pending: AtomicUsize,
        max_pending: Arc<AtomicUsize>,
    }

    impl Listener for CountingListener {
        type Stream = DuplexStream;

        fn accept(&self) -> impl Future<Output = std::io::Result<DuplexStream>> + Send {
            async move {
                let pending = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_pending.fetch_max(pending, Ordering::SeqCst);
                let stream = self.incoming.lock().await.recv().await;
                self.pending.fetch_sub(1, Ordering::SeqCst);
                stream.ok_or_else(|| std::io::Error::from(std::io::ErrorKind::ConnectionAborted))
            }
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    #[tokio::test]
    async fn test_one_accept_pending_at_a_time() {
        let (connect, incoming) = tokio::sync::mpsc::channel(8);
        let max_pending = Arc::new(AtomicUsize::new(0));
        let listener = CountingListener {
            incoming: tokio::sync::Mutex::new(incoming),
            pending: AtomicUsize::new(0),
            max_pending: max_pending.clone(),
        };
        let shutdown = CancellationToken::new();
        let serving = tokio::spawn(test_server().serve(listener, shutdown.clone()));

        let mut clients = Vec::new();
        for n in 0..4i64 {
            let (client, stream) = tokio::io::duplex(4096);
            connect.send(stream).await.unwrap();

            let (read_half, mut write_half) = tokio::io::split(client);
            let request = json!({"jsonrpc": "2.0", "id": n, "method": "add", "params": {"a": n, "b": 1}});
            write_half
                .write_all(format!("{}\n", request).as_bytes())
                .await
                .unwrap();
            let mut reply = String::new();
            BufReader::new(read_half).read_line(&mut reply).await.unwrap();
            assert_eq!(serde_json::from_str::<Value>(&reply).unwrap()["result"], n + 1);
            clients.push(write_half);
        }

        assert_eq!(max_pending.load(Ordering::SeqCst), 1);

        shutdown.cancel();
        serving.await.unwrap();
    }
}

