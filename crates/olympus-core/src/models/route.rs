//! Channel policy and payment route models

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

use super::ShortChannelId;

const MSAT_SUFFIX: &str = "msat";

/// One direction of a channel as advertised by the Lightning node.
///
/// A channel is always reported as a pair of edges sharing the short channel
/// id, with source and destination swapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEdge {
    pub source: String,
    pub destination: String,
    pub short_channel_id: ShortChannelId,
    #[serde(rename = "base_fee_millisatoshi")]
    pub base_fee_msat: u32,
    #[serde(rename = "fee_per_millionth")]
    pub fee_proportional_millionths: u32,
    #[serde(rename = "delay")]
    pub cltv_delta: u16,
    #[serde(rename = "htlc_minimum_msat")]
    pub htlc_min_msat: String,
    #[serde(rename = "htlc_maximum_msat", default)]
    pub htlc_max_msat: String,
}

impl ChannelEdge {
    pub fn htlc_minimum_msat(&self) -> Result<u64> {
        parse_msat(&self.htlc_min_msat)
    }

    pub fn htlc_maximum_msat(&self) -> Result<u64> {
        parse_msat(&self.htlc_max_msat)
    }
}

/// Parse a millisatoshi amount such as `"1000msat"`. A bare number is accepted.
pub fn parse_msat(value: &str) -> Result<u64> {
    let digits = value.strip_suffix(MSAT_SUFFIX).unwrap_or(value);
    digits
        .parse::<u64>()
        .map_err(|e| Error::Msat(format!("{:?}: {}", value, e)))
}

/// One step of a discovered path, as returned by path discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathHop {
    #[serde(rename = "id")]
    pub next_node_id: String,
    #[serde(rename = "channel")]
    pub short_channel_id: String,
    #[serde(rename = "msatoshi", default)]
    pub amount_msat: u64,
    #[serde(rename = "delay", default)]
    pub cltv_delay: u32,
}

/// The forwarding policy charged by `node_id` for sending through
/// `short_channel_id`: everything an onion hop payload needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedHop {
    pub node_id: String,
    pub short_channel_id: u64,
    pub cltv_expiry_delta: u16,
    pub htlc_minimum_msat: u64,
    pub fee_base_msat: u32,
    pub fee_proportional_millionths: u32,
}

impl ResolvedHop {
    pub fn short_channel_id(&self) -> ShortChannelId {
        ShortChannelId::from_u64(self.short_channel_id)
    }
}

/// Ordered hops from the local node towards the destination
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentRoute {
    pub hops: Vec<ResolvedHop>,
}

impl PaymentRoute {
    pub fn new(hops: Vec<ResolvedHop>) -> Self {
        Self { hops }
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResolvedHop> {
        self.hops.iter()
    }
}

impl From<Vec<ResolvedHop>> for PaymentRoute {
    fn from(hops: Vec<ResolvedHop>) -> Self {
        Self::new(hops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_msat() {
        assert_eq!(parse_msat("1msat").unwrap(), 1);
        assert_eq!(parse_msat("2070588000msat").unwrap(), 2070588000);
        assert_eq!(parse_msat("1000").unwrap(), 1000);
        assert!(parse_msat("msat").is_err());
        assert!(parse_msat("12sat").is_err());
        assert!(parse_msat("-5msat").is_err());
    }

    #[test]
    fn test_channel_edge_from_listchannels() {
        let edge: ChannelEdge = serde_json::from_value(json!({
            "source": "02aa",
            "destination": "02bb",
            "short_channel_id": "877236x1111x0",
            "public": true,
            "base_fee_millisatoshi": 1000,
            "fee_per_millionth": 100,
            "delay": 34,
            "htlc_minimum_msat": "1msat",
            "htlc_maximum_msat": "2070588000msat"
        }))
        .unwrap();

        assert_eq!(edge.short_channel_id.to_u64(), 964531182376517632);
        assert_eq!(edge.base_fee_msat, 1000);
        assert_eq!(edge.fee_proportional_millionths, 100);
        assert_eq!(edge.cltv_delta, 34);
        assert_eq!(edge.htlc_minimum_msat().unwrap(), 1);
        assert_eq!(edge.htlc_maximum_msat().unwrap(), 2070588000);
    }

    #[test]
    fn test_channel_edge_rejects_oversized_delay() {
        let result = serde_json::from_value::<ChannelEdge>(json!({
            "source": "02aa",
            "destination": "02bb",
            "short_channel_id": "1x1x1",
            "base_fee_millisatoshi": 0,
            "fee_per_millionth": 0,
            "delay": 70000,
            "htlc_minimum_msat": "1msat"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_path_hop_from_getroute() {
        let hop: PathHop = serde_json::from_value(json!({
            "id": "03cc",
            "channel": "877236x1112x0",
            "direction": 1,
            "msatoshi": 1003000,
            "amount_msat": "1003000msat",
            "delay": 219,
            "style": "tlv"
        }))
        .unwrap();

        assert_eq!(hop.next_node_id, "03cc");
        assert_eq!(hop.short_channel_id, "877236x1112x0");
        assert_eq!(hop.amount_msat, 1003000);
        assert_eq!(hop.cltv_delay, 219);
    }

    #[test]
    fn test_resolved_hop_serialization() {
        let hop = ResolvedHop {
            node_id: "02bb".to_string(),
            short_channel_id: 964531182376517632,
            cltv_expiry_delta: 34,
            htlc_minimum_msat: 1,
            fee_base_msat: 1000,
            fee_proportional_millionths: 100,
        };

        let json = serde_json::to_value(PaymentRoute::new(vec![hop.clone()])).unwrap();
        assert_eq!(json[0]["nodeId"], "02bb");
        assert_eq!(json[0]["cltvExpiryDelta"], 34);
        assert_eq!(hop.short_channel_id().to_string(), "877236x1111x0");
    }
}
