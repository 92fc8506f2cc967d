//! `POST /router/routesplus`

use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;
use olympus_core::wire;
use serde::Deserialize;

use super::{ok_reply, ApiError, Result, SharedState};

/// Decoded `params` form field
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoutesRequest {
    pub sat: u64,
    #[serde(rename = "badNodes", default)]
    pub bad_nodes: Vec<String>,
    #[serde(rename = "badChans", default)]
    pub bad_chans: Vec<u64>,
    #[serde(default)]
    pub from: Vec<String>,
    pub to: String,
}

impl RoutesRequest {
    /// Parse the hex-encoded JSON carried in the `params` field
    pub fn from_hex(params: &str) -> Result<Self> {
        let json = hex::decode(params.trim())
            .map_err(|e| ApiError::InvalidParams(format!("params is not hex: {}", e)))?;
        serde_json::from_slice(&json)
            .map_err(|e| ApiError::InvalidParams(format!("params is not a route request: {}", e)))
    }

    pub fn amount_msat(&self) -> Result<u64> {
        self.sat
            .checked_mul(1000)
            .ok_or_else(|| ApiError::InvalidParams(format!("amount of {} sat is too large", self.sat)))
    }
}

/// Value of `key` in a url-encoded form body. The request content type is
/// not checked.
fn form_value(body: &[u8], key: &str) -> Option<String> {
    url::form_urlencoded::parse(body)
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
}

/// `["ok", [[hop_hex, ...], ...]]`
///
/// A route that cannot be found yields `["ok", []]`.
pub async fn routes_plus(State(state): State<SharedState>, body: Bytes) -> Result<Response> {
    tracing::info!("request on POST /router/routesplus");

    let params = form_value(&body, "params")
        .ok_or_else(|| ApiError::InvalidParams("missing params field".to_string()))?;
    let request = RoutesRequest::from_hex(&params)?;
    tracing::debug!("-> {:?}", request);

    let amount_msat = request.amount_msat()?;
    let routes = match state
        .routes
        .find_routes(&request.from, &request.to, amount_msat)
        .await
    {
        Ok(routes) => routes,
        Err(e) if e.is_invariant() => return Err(e.into()),
        Err(e) => {
            tracing::warn!("error getting routes, returning empty routes: {}", e);
            Vec::new()
        }
    };

    let encoded = wire::encode_routes(&routes)?;
    tracing::debug!("<- {:?}", encoded);
    ok_reply(encoded)
}
