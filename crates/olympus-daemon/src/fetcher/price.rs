//! Bitcoin spot prices from a coingecko-compatible API

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::cache::{Lookup, TtlCache, DEFAULT_MAX_AGE};
use super::{http_client, FetchError, PriceSource, Result};

pub const DEFAULT_PRICE_API_URL: &str = "https://api.coingecko.com/api/v3";

/// Currencies served by `/rates/get`
pub const SYMBOLS: [&str; 5] = ["usd", "eur", "jpy", "cny", "brl"];

#[derive(Deserialize)]
struct SimplePrice {
    #[serde(default)]
    bitcoin: HashMap<String, f64>,
}

pub struct PriceFetcher {
    http: reqwest::Client,
    base_url: String,
    cache: Mutex<TtlCache<String, f64>>,
    fetch_count: AtomicU64,
}

impl PriceFetcher {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache: Mutex::new(TtlCache::new(DEFAULT_MAX_AGE)),
            fetch_count: AtomicU64::new(0),
        })
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.cache = Mutex::new(TtlCache::new(max_age));
        self
    }

    /// Number of upstream requests made so far
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    async fn fetch_remote(&self, symbols: &[String]) -> Result<HashMap<String, f64>> {
        let currencies = symbols.join(",");
        tracing::info!("Fetching bitcoin prices in {}", currencies);
        self.fetch_count.fetch_add(1, Ordering::Relaxed);

        let response = self
            .http
            .get(format!("{}/simple/price", self.base_url))
            .query(&[("ids", "bitcoin"), ("vs_currencies", currencies.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                service: "price api",
                status: status.as_u16(),
            });
        }

        let prices: SimplePrice = response.json().await?;
        Ok(prices.bitcoin)
    }
}

#[async_trait]
impl PriceSource for PriceFetcher {
    async fn fetch_prices(&self, symbols: &[&str]) -> Result<HashMap<String, f64>> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }
        let keys: Vec<String> = symbols.iter().map(|s| s.to_string()).collect();

        let mut cache = self.cache.lock().await;
        let Lookup { mut fresh, stale } = cache.lookup(&keys);
        if stale.is_empty() {
            return Ok(fresh);
        }

        for (symbol, price) in self.fetch_remote(&stale).await? {
            cache.insert(symbol, price);
        }

        for symbol in stale {
            let price = match cache.get(&symbol) {
                Some(price) => *price,
                None => {
                    tracing::warn!("No price returned for btc{}", symbol);
                    0.0
                }
            };
            fresh.insert(symbol, price);
        }
        Ok(fresh)
    }
}
