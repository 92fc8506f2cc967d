//! Fee-rate estimates from bitcoind's `estimatesmartfee`

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use olympus_rpc::{Request, RequestId, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::cache::{Lookup, TtlCache, DEFAULT_MAX_AGE};
use super::{http_client, FeerateSource, FetchError, Result};

#[derive(Serialize)]
struct EstimateSmartFeeParams {
    conf_target: u16,
}

#[derive(Debug, Deserialize)]
struct EstimateSmartFee {
    /// BTC/kvB; absent when bitcoind has no estimate yet
    feerate: Option<f64>,
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    blocks: u32,
}

pub struct FeerateFetcher {
    http: reqwest::Client,
    url: String,
    user: String,
    password: String,
    cache: Mutex<TtlCache<u16, f64>>,
    next_id: AtomicI64,
}

impl FeerateFetcher {
    pub fn new(
        url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            url: url.into(),
            user: user.into(),
            password: password.into(),
            cache: Mutex::new(TtlCache::new(DEFAULT_MAX_AGE)),
            next_id: AtomicI64::new(0),
        })
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.cache = Mutex::new(TtlCache::new(max_age));
        self
    }

    /// Number of bitcoind calls made so far
    pub fn call_count(&self) -> i64 {
        self.next_id.load(Ordering::Relaxed)
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request::new(method, serde_json::to_value(params)?, RequestId::Number(id));

        let response = self
            .http
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&request)
            .send()
            .await?;

        // bitcoind answers RPC errors with a non-2xx status and a JSON body
        let status = response.status();
        let body = response.bytes().await?;
        let response: Response = match serde_json::from_slice(&body) {
            Ok(response) => response,
            Err(_) if !status.is_success() => {
                return Err(FetchError::Status {
                    service: "bitcoind",
                    status: status.as_u16(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(error) = response.error {
            return Err(error.into());
        }
        Ok(serde_json::from_value(response.result.unwrap_or_default())?)
    }

    async fn estimate_smart_fee(&self, conf_target: u16) -> Result<f64> {
        let estimate: EstimateSmartFee = self
            .call("estimatesmartfee", EstimateSmartFeeParams { conf_target })
            .await?;

        match estimate.feerate {
            Some(feerate) => Ok(feerate),
            None => {
                tracing::warn!(
                    "No fee estimate for {} blocks (blocks: {}, errors: {:?})",
                    conf_target,
                    estimate.blocks,
                    estimate.errors
                );
                Ok(0.0)
            }
        }
    }
}

#[async_trait]
impl FeerateSource for FeerateFetcher {
    async fn fetch_feerates(&self, targets: &[u16]) -> Result<HashMap<u16, f64>> {
        let mut cache = self.cache.lock().await;
        let Lookup { mut fresh, stale } = cache.lookup(targets);
        if stale.is_empty() {
            return Ok(fresh);
        }

        tracing::info!("Fetching {} fee estimates from bitcoind", stale.len());
        for target in stale {
            let feerate = self.estimate_smart_fee(target).await?;
            cache.insert(target, feerate);
            fresh.insert(target, feerate);
        }
        Ok(fresh)
    }
}
