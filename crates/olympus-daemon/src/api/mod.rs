//! HTTP front end
//!
//! Replies are JSON arrays tagged `"ok"`, served as `text/plain` for
//! compatibility with existing wallet clients.

pub mod rates;
pub mod routes;

use std::sync::Arc;

use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde::Serialize;

use crate::fetcher::{FeerateSource, FetchError, PriceSource};
use crate::router::{RouteError, RouteFinder};

pub const CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

/// API error
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Rate fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Route resolution failed: {0}")]
    Route(#[from] RouteError),

    #[error("Route encoding failed: {0}")]
    Encode(#[from] olympus_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InvalidParams(message) => {
                tracing::warn!("Rejecting request: {}", message);
                (StatusCode::BAD_REQUEST, [(header::CONTENT_TYPE, CONTENT_TYPE)], message)
                    .into_response()
            }
            other => {
                tracing::error!("Request failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, [(header::CONTENT_TYPE, CONTENT_TYPE)])
                    .into_response()
            }
        }
    }
}

/// Shared handler state
pub struct AppState {
    pub prices: Arc<dyn PriceSource>,
    pub feerates: Arc<dyn FeerateSource>,
    pub routes: Arc<dyn RouteFinder>,
}

pub type SharedState = Arc<AppState>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rates/get", post(rates::get_rates))
        .route("/router/routesplus", post(routes::routes_plus))
        .fallback(index)
        .with_state(Arc::new(state))
}

async fn index(method: Method, uri: Uri) -> StatusCode {
    tracing::info!("request on {} {}", method, uri);
    StatusCode::OK
}

/// `["ok", payload]` followed by a newline
fn ok_reply<T: Serialize>(payload: T) -> Result<Response> {
    let mut body = serde_json::to_vec(&("ok", payload))?;
    body.push(b'\n');
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response())
}
