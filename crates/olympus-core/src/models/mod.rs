pub mod route;
pub mod scid;

pub use route::{parse_msat, ChannelEdge, PathHop, PaymentRoute, ResolvedHop};
pub use scid::ShortChannelId;
