//! Onion hop wire encoding
//!
//! Each resolved hop is written as a fixed 59-byte big-endian record:
//!
//! | offset | size | field                         |
//! |--------|------|-------------------------------|
//! | 0      | 33   | node id (compressed pubkey)   |
//! | 33     | 8    | short channel id              |
//! | 41     | 2    | cltv expiry delta             |
//! | 43     | 8    | htlc minimum msat             |
//! | 51     | 4    | fee base msat                 |
//! | 55     | 4    | fee proportional millionths   |
//!
//! and transported as 118 lowercase hex characters.

use crate::{Error, PaymentRoute, ResolvedHop, Result};

pub const NODE_ID_LEN: usize = 33;
pub const HOP_LEN: usize = 59;

const SCID_OFFSET: usize = 33;
const CLTV_OFFSET: usize = 41;
const HTLC_MIN_OFFSET: usize = 43;
const FEE_BASE_OFFSET: usize = 51;
const FEE_PROP_OFFSET: usize = 55;

/// Encode one hop. Fails only if the node id is not 33 bytes of hex.
pub fn encode_hop(hop: &ResolvedHop) -> Result<[u8; HOP_LEN]> {
    let mut out = [0u8; HOP_LEN];

    hex::decode_to_slice(&hop.node_id, &mut out[..NODE_ID_LEN]).map_err(|e| {
        Error::NodeId {
            node_id: hop.node_id.clone(),
            reason: e.to_string(),
        }
    })?;
    out[SCID_OFFSET..CLTV_OFFSET].copy_from_slice(&hop.short_channel_id.to_be_bytes());
    out[CLTV_OFFSET..HTLC_MIN_OFFSET].copy_from_slice(&hop.cltv_expiry_delta.to_be_bytes());
    out[HTLC_MIN_OFFSET..FEE_BASE_OFFSET].copy_from_slice(&hop.htlc_minimum_msat.to_be_bytes());
    out[FEE_BASE_OFFSET..FEE_PROP_OFFSET].copy_from_slice(&hop.fee_base_msat.to_be_bytes());
    out[FEE_PROP_OFFSET..HOP_LEN].copy_from_slice(&hop.fee_proportional_millionths.to_be_bytes());

    Ok(out)
}

/// Decode a 59-byte hop record
pub fn decode_hop(bytes: &[u8]) -> Result<ResolvedHop> {
    let bytes: &[u8; HOP_LEN] = bytes.try_into().map_err(|_| Error::HopLength {
        expected: HOP_LEN,
        actual: bytes.len(),
    })?;

    let mut scid = [0u8; 8];
    scid.copy_from_slice(&bytes[SCID_OFFSET..CLTV_OFFSET]);
    let mut cltv = [0u8; 2];
    cltv.copy_from_slice(&bytes[CLTV_OFFSET..HTLC_MIN_OFFSET]);
    let mut htlc_min = [0u8; 8];
    htlc_min.copy_from_slice(&bytes[HTLC_MIN_OFFSET..FEE_BASE_OFFSET]);
    let mut fee_base = [0u8; 4];
    fee_base.copy_from_slice(&bytes[FEE_BASE_OFFSET..FEE_PROP_OFFSET]);
    let mut fee_prop = [0u8; 4];
    fee_prop.copy_from_slice(&bytes[FEE_PROP_OFFSET..HOP_LEN]);

    Ok(ResolvedHop {
        node_id: hex::encode(&bytes[..NODE_ID_LEN]),
        short_channel_id: u64::from_be_bytes(scid),
        cltv_expiry_delta: u16::from_be_bytes(cltv),
        htlc_minimum_msat: u64::from_be_bytes(htlc_min),
        fee_base_msat: u32::from_be_bytes(fee_base),
        fee_proportional_millionths: u32::from_be_bytes(fee_prop),
    })
}

pub fn encode_route(route: &PaymentRoute) -> Result<Vec<String>> {
    route
        .iter()
        .map(|hop| encode_hop(hop).map(hex::encode))
        .collect()
}

pub fn encode_routes(routes: &[PaymentRoute]) -> Result<Vec<Vec<String>>> {
    routes.iter().map(encode_route).collect()
}
