//! Stream endpoints: where a client connects and where a server listens

use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};

/// Any bidirectional byte stream the RPC layer can run over
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxStream = Box<dyn Stream>;

/// Source of inbound connections for the RPC server
pub trait Listener: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    fn accept(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// Human-readable address, for logs
    fn describe(&self) -> String;
}

impl Listener for TcpListener {
    type Stream = TcpStream;

    fn accept(&self) -> impl Future<Output = io::Result<TcpStream>> + Send {
        async move { TcpListener::accept(self).await.map(|(stream, _)| stream) }
    }

    fn describe(&self) -> String {
        match self.local_addr() {
            Ok(addr) => format!("tcp://{}", addr),
            Err(_) => "tcp://<unbound>".to_string(),
        }
    }
}

impl Listener for UnixListener {
    type Stream = UnixStream;

    fn accept(&self) -> impl Future<Output = io::Result<UnixStream>> + Send {
        async move { UnixListener::accept(self).await.map(|(stream, _)| stream) }
    }

    fn describe(&self) -> String {
        match self.local_addr().ok().and_then(|a| a.as_pathname().map(Path::to_path_buf)) {
            Some(path) => format!("unix://{}", path.display()),
            None => "unix://<unnamed>".to_string(),
        }
    }
}

/// Either kind of bound listener, as produced by [`Endpoint::bind`]
pub enum AnyListener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl Listener for AnyListener {
    type Stream = BoxStream;

    fn accept(&self) -> impl Future<Output = io::Result<BoxStream>> + Send {
        async move {
            match self {
                AnyListener::Tcp(listener) => {
                    let stream = Listener::accept(listener).await?;
                    Ok(Box::new(stream) as BoxStream)
                }
                AnyListener::Unix(listener) => {
                    let stream = Listener::accept(listener).await?;
                    Ok(Box::new(stream) as BoxStream)
                }
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            AnyListener::Tcp(listener) => listener.describe(),
            AnyListener::Unix(listener) => listener.describe(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported network {0:?}, expected \"tcp\" or \"unix\"")]
pub struct UnsupportedNetwork(pub String);

/// A network/address pair such as `("unix", "/run/lightning/lightning-rpc")`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(String),
    Unix(PathBuf),
}

impl Endpoint {
    pub fn new(network: &str, address: impl Into<String>) -> Result<Self, UnsupportedNetwork> {
        match network {
            "tcp" | "tcp4" | "tcp6" => Ok(Endpoint::Tcp(address.into())),
            "unix" => Ok(Endpoint::Unix(PathBuf::from(address.into()))),
            other => Err(UnsupportedNetwork(other.to_string())),
        }
    }

    pub async fn connect(&self) -> io::Result<BoxStream> {
        match self {
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr).await?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
            Endpoint::Unix(path) => Ok(Box::new(UnixStream::connect(path).await?)),
        }
    }

    /// Bind a listener. A stale Unix socket file is removed first.
    pub async fn bind(&self) -> io::Result<AnyListener> {
        match self {
            Endpoint::Tcp(addr) => Ok(AnyListener::Tcp(TcpListener::bind(addr).await?)),
            Endpoint::Unix(path) => {
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
                Ok(AnyListener::Unix(UnixListener::bind(path)?))
            }
        }
    }
}

impl FromStr for Endpoint {
    type Err = UnsupportedNetwork;

    /// Parse `tcp://host:port` or `unix:///path/to/socket`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once("://") {
            Some((network, address)) => Endpoint::new(network, address),
            None => Err(UnsupportedNetwork(s.to_string())),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_endpoint_from_network_and_address() {
        assert_eq!(
            Endpoint::new("unix", "/tmp/lightning-rpc").unwrap(),
            Endpoint::Unix(PathBuf::from("/tmp/lightning-rpc"))
        );
        assert_eq!(
            Endpoint::new("tcp", "127.0.0.1:9835").unwrap(),
            Endpoint::Tcp("127.0.0.1:9835".to_string())
        );
        assert!(Endpoint::new("udp", "127.0.0.1:9835").is_err());
    }

    #[test]
    fn test_endpoint_url_form() {
        let endpoint: Endpoint = "unix:///tmp/lightning-rpc".parse().unwrap();
        assert_eq!(endpoint.to_string(), "unix:///tmp/lightning-rpc");
        assert!("/tmp/lightning-rpc".parse::<Endpoint>().is_err());
    }

    #[tokio::test]
    async fn test_unix_bind_replaces_stale_socket() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("stale.sock");
        std::fs::write(&socket_path, b"").unwrap();

        let endpoint = Endpoint::Unix(socket_path.clone());
        let listener = endpoint.bind().await.unwrap();
        assert!(listener.describe().ends_with("stale.sock"));

        let connect = tokio::spawn(async move { endpoint.connect().await });
        let _accepted = Listener::accept(&listener).await.unwrap();
        assert!(connect.await.unwrap().is_ok());
    }
}
