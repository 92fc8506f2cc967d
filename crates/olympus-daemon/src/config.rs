//! Daemon configuration
//!
//! Every option can be given on the command line or through the
//! environment. A `.env` file in the working directory is loaded before
//! parsing.

use std::net::SocketAddr;

use clap::Parser;
use olympus_rpc::endpoint::UnsupportedNetwork;
use olympus_rpc::Endpoint;

use crate::fetcher::DEFAULT_PRICE_API_URL;
use crate::router::DEFAULT_MAX_HOPS;

/// Longest route an onion packet can carry
pub const MAX_ROUTE_HOPS: u32 = 20;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Network(#[from] UnsupportedNetwork),

    #[error("LN_MAX_HOPS must be between 1 and {max}, got {value}")]
    MaxHops { value: u32, max: u32 },

    #[error("{name} must not be empty")]
    Empty { name: &'static str },
}

#[derive(Parser, Debug, Clone)]
#[command(name = "olympusd")]
#[command(about = "Olympus gateway - fee rates, prices and Lightning routes over HTTP", long_about = None)]
pub struct Config {
    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8088")]
    pub listen_addr: SocketAddr,

    /// bitcoind JSON-RPC URL
    #[arg(long, env = "BTC_URL")]
    pub btc_url: String,

    #[arg(long, env = "BTC_USER")]
    pub btc_user: String,

    #[arg(long, env = "BTC_PASSWORD", hide_env_values = true)]
    pub btc_password: String,

    /// Lightning node RPC network: unix or tcp
    #[arg(long, env = "LN_NETWORK")]
    pub ln_network: String,

    /// Lightning node RPC socket path or host:port
    #[arg(long, env = "LN_ADDRESS")]
    pub ln_address: String,

    /// Maximum route length asked of the Lightning node
    #[arg(long, env = "LN_MAX_HOPS", default_value_t = DEFAULT_MAX_HOPS)]
    pub ln_max_hops: u32,

    /// Base URL of the coingecko-compatible price API
    #[arg(long, env = "PRICE_API_URL", default_value = DEFAULT_PRICE_API_URL)]
    pub price_api_url: String,

    /// Log level or tracing filter directive
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn ln_endpoint(&self) -> Result<Endpoint, ConfigError> {
        Ok(Endpoint::new(&self.ln_network, self.ln_address.clone())?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("BTC_URL", &self.btc_url),
            ("LN_ADDRESS", &self.ln_address),
            ("PRICE_API_URL", &self.price_api_url),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty { name });
            }
        }
        if self.ln_max_hops == 0 || self.ln_max_hops > MAX_ROUTE_HOPS {
            return Err(ConfigError::MaxHops {
                value: self.ln_max_hops,
                max: MAX_ROUTE_HOPS,
            });
        }
        self.ln_endpoint()?;
        Ok(())
    }
}
