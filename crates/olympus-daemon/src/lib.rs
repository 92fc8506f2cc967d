//! Olympus Daemon Library
//!
//! Gateway functionality exposed as a library for testing: Lightning route
//! resolution, cached rate fetchers and the HTTP front end.

pub mod api;
pub mod config;
pub mod fetcher;
pub mod router;

pub use api::{router as http_router, AppState};
pub use config::{Config, ConfigError};
pub use fetcher::{FeerateFetcher, FeerateSource, FetchError, PriceFetcher, PriceSource};
pub use router::{LnRouter, RouteError, RouteFinder};
