//! Cached fee-rate and price sources

pub mod cache;
pub mod feerate;
pub mod price;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use olympus_rpc::RpcError;

pub use cache::{Lookup, TtlCache, DEFAULT_MAX_AGE};
pub use feerate::FeerateFetcher;
pub use price::{PriceFetcher, DEFAULT_PRICE_API_URL, SYMBOLS};

/// Timeout applied to every upstream HTTP request
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {service}")]
    Status { service: &'static str, status: u16 },

    #[error("bitcoind error: {0}")]
    Rpc(#[from] RpcError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Bitcoin prices in fiat currencies
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Price of one bitcoin in each of `symbols` (lowercase currency codes)
    async fn fetch_prices(&self, symbols: &[&str]) -> Result<HashMap<String, f64>>;
}

/// Fee-rate estimates, in BTC per kvB, keyed by confirmation target
#[async_trait]
pub trait FeerateSource: Send + Sync {
    async fn fetch_feerates(&self, targets: &[u16]) -> Result<HashMap<u16, f64>>;
}

fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?)
}
