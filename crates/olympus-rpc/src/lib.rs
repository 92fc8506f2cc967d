//! Olympus JSON-RPC
//!
//! Newline-delimited JSON-RPC 2.0 over stream sockets: record framing, a
//! single-flight client, and a concurrent server with cooperative shutdown.

pub mod client;
pub mod endpoint;
pub mod framing;
pub mod pool;
pub mod protocol;
pub mod server;

pub use client::{ClientError, RpcClient};
pub use endpoint::{AnyListener, BoxStream, Endpoint, Listener};
pub use framing::{read_record, write_record, Frame};
pub use protocol::{Request, RequestId, Response, RpcError};
pub use server::{RpcServer, ServerError};
pub use tokio_util::sync::CancellationToken;
