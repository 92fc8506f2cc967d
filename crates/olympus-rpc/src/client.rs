//! JSON-RPC client over a single stream connection
//!
//! One call is in flight per connection at a time: the connection lock is
//! held from the request write until its response is read, so
//! concurrent callers queue rather than interleave. Replies are therefore
//! matched to requests by order. A reply carrying a different non-null id is
//! rejected and the connection dropped, since later replies can no longer
//! be matched either.
//!
//! The exchange itself runs in a spawned task that owns the lock. A caller
//! that stops waiting (a timeout, a dropped request handler) leaves that task
//! to read the reply, so the next call starts on a record boundary.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::task::JoinError;

use crate::endpoint::{BoxStream, Endpoint};
use crate::framing::{self, Frame};
use crate::protocol::{RequestId, Response, RpcError, JSONRPC_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("Response id {actual:?} does not match request id {expected}")]
    IdMismatch { expected: i64, actual: RequestId },

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Client is closed")]
    Closed,

    #[error("Call task failed: {0}")]
    Task(#[from] JoinError),
}

impl ClientError {
    /// Whether the connection can no longer be trusted to sit on a record
    /// boundary
    fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::ConnectionClosed | ClientError::IdMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Serialize)]
struct OutgoingRequest<'a, P: ?Sized> {
    jsonrpc: &'static str,
    id: i64,
    method: &'a str,
    params: &'a P,
}

struct Connection<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    next_id: i64,
    rx: Vec<u8>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send,
{
    async fn round_trip(&mut self, id: i64, request: &[u8]) -> Result<Response> {
        framing::write_record(&mut self.writer, request).await?;

        loop {
            match framing::read_record(&mut self.reader, &mut self.rx).await? {
                Frame::Record => break,
                Frame::Blank => continue,
                Frame::Eof => return Err(ClientError::ConnectionClosed),
            }
        }

        let response: Response = serde_json::from_slice(&self.rx).map_err(ClientError::Decode)?;
        match &response.id {
            RequestId::Null => Ok(response),
            RequestId::Number(n) if *n == id => Ok(response),
            other => Err(ClientError::IdMismatch {
                expected: id,
                actual: other.clone(),
            }),
        }
    }
}

/// JSON-RPC client owning one stream connection
pub struct RpcClient<S = BoxStream> {
    connection: Arc<Mutex<Option<Connection<S>>>>,
}

impl RpcClient<BoxStream> {
    /// Connect to a JSON-RPC peer such as a Lightning node's RPC socket
    pub async fn connect(endpoint: &Endpoint) -> Result<Self> {
        let stream = endpoint.connect().await?;
        tracing::info!("Connected to JSON-RPC endpoint {}", endpoint);
        Ok(Self::new(stream))
    }
}

impl<S> RpcClient<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            connection: Arc::new(Mutex::new(Some(Connection {
                reader: BufReader::new(read_half),
                writer: write_half,
                next_id: 1,
                rx: Vec::new(),
            }))),
        }
    }

    /// Call `method` and decode its result into `R`.
    ///
    /// An error reply fails with [`ClientError::Rpc`]. A transport failure or
    /// a reply for another request closes the client, since the stream may be
    /// left mid-record. Dropping the returned future does not abandon the
    /// exchange on the wire.
    pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut guard = self.connection.clone().lock_owned().await;
        let connection = guard.as_mut().ok_or(ClientError::Closed)?;

        let id = connection.next_id;
        connection.next_id += 1;
        let request = serde_json::to_vec(&OutgoingRequest {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        })
        .map_err(ClientError::Encode)?;
        tracing::debug!("jsonrpc: call {} (id {})", method, id);

        let method = method.to_string();
        let exchange = tokio::spawn(async move {
            let connection = guard.as_mut().ok_or(ClientError::Closed)?;
            let outcome = connection.round_trip(id, &request).await;
            if let Err(e) = &outcome {
                if e.is_transport() {
                    tracing::warn!("jsonrpc: dropping connection after {}: {}", method, e);
                    *guard = None;
                }
            }
            outcome
        });
        let response = exchange.await??;

        if let Some(error) = response.error {
            return Err(ClientError::Rpc(error));
        }

        serde_json::from_value(response.result.unwrap_or(Value::Null)).map_err(ClientError::Decode)
    }

    /// Shut down the connection. Later calls fail with [`ClientError::Closed`].
    pub async fn close(&self) -> Result<()> {
        if let Some(mut connection) = self.connection.lock().await.take() {
            connection.writer.shutdown().await?;
        }
        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        self.connection.lock().await.is_none()
    }
}
