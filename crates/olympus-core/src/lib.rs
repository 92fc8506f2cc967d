//! Olympus core
//!
//! Value types shared by the gateway: short channel ids, channel policies,
//! resolved payment routes and their onion-hop wire encoding.

pub mod error;
pub mod models;
pub mod wire;

pub use error::{Error, Result};
pub use models::{ChannelEdge, PathHop, PaymentRoute, ResolvedHop, ShortChannelId};
