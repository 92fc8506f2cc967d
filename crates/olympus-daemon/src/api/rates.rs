//! `POST /rates/get`

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use axum::extract::State;
use axum::response::Response;

use super::{ok_reply, Result, SharedState};
use crate::fetcher::SYMBOLS;

/// Confirmation targets, in blocks, reported by `/rates/get`
pub const CONF_TARGETS: RangeInclusive<u16> = 1..=12;

/// `["ok", [{"1": feerate, ..., "12": feerate}, {"usd": price, ...}]]`
pub async fn get_rates(State(state): State<SharedState>) -> Result<Response> {
    tracing::info!("request on POST /rates/get");

    let targets: Vec<u16> = CONF_TARGETS.collect();
    let feerates: BTreeMap<String, f64> = state
        .feerates
        .fetch_feerates(&targets)
        .await?
        .into_iter()
        .map(|(target, feerate)| (target.to_string(), feerate))
        .collect();

    let prices: BTreeMap<String, f64> = state
        .prices
        .fetch_prices(&SYMBOLS)
        .await?
        .into_iter()
        .collect();

    ok_reply([feerates, prices])
}
