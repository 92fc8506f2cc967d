//! Error types for the core value codecs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid short channel id: {0}")]
    ShortChannelId(String),

    #[error("Invalid msat amount: {0}")]
    Msat(String),

    #[error("Invalid node id {node_id:?}: {reason}")]
    NodeId { node_id: String, reason: String },

    #[error("Invalid hop encoding: expected {expected} bytes, got {actual}")]
    HopLength { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
