//! Turn a discovered path plus both directions of every channel on it into
//! an ordered route of per-hop forwarding policies.

use std::collections::HashMap;

use olympus_core::{ChannelEdge, PathHop, PaymentRoute, ResolvedHop, ShortChannelId};

use super::RouteError;

/// Both directions of one channel, as returned by the node
pub type ChannelPair = [ChannelEdge; 2];

/// Parse the channel id of every hop on the path, in order
pub fn path_channel_ids(path: &[PathHop]) -> Result<Vec<ShortChannelId>, RouteError> {
    path.iter()
        .map(|hop| {
            hop.short_channel_id
                .parse::<ShortChannelId>()
                .map_err(RouteError::ChannelId)
        })
        .collect()
}

/// Node that forwards through the first channel of the path.
///
/// The edge ending at the path's first advertised node is taken and its
/// source returned. When neither edge ends there the second edge is used
/// anyway.
fn first_forwarding_node<'a>(first: &PathHop, channel: &'a ChannelPair) -> &'a str {
    if channel[0].destination == first.next_node_id {
        return &channel[0].source;
    }
    if channel[1].destination != first.next_node_id {
        tracing::warn!(
            "Neither edge of {} ends at {}, falling back to the second edge",
            channel[1].short_channel_id,
            first.next_node_id
        );
    }
    &channel[1].source
}

/// Build the payment route for `path`. `channels` must hold the edge pair of
/// every channel the path crosses.
pub fn build_payment_route(
    path: &[PathHop],
    channels: &HashMap<ShortChannelId, ChannelPair>,
) -> Result<PaymentRoute, RouteError> {
    let scids = path_channel_ids(path)?;
    let mut hops = Vec::with_capacity(path.len());

    for (i, (path_hop, scid)) in path.iter().zip(&scids).enumerate() {
        let channel = channels.get(scid).ok_or_else(|| {
            RouteError::Invariant(format!("channel {} was not looked up", scid))
        })?;

        let forwarding_node = if i == 0 {
            first_forwarding_node(path_hop, channel)
        } else {
            path[i - 1].next_node_id.as_str()
        };

        let edge = channel
            .iter()
            .find(|edge| edge.source == forwarding_node)
            .ok_or_else(|| RouteError::MissingEdge {
                scid: *scid,
                node_id: forwarding_node.to_string(),
            })?;

        let htlc_minimum_msat = edge.htlc_minimum_msat().map_err(|e| {
            RouteError::Invariant(format!("htlc minimum of {} from {}: {}", scid, edge.source, e))
        })?;

        hops.push(ResolvedHop {
            node_id: forwarding_node.to_string(),
            short_channel_id: scid.to_u64(),
            cltv_expiry_delta: edge.cltv_delta,
            htlc_minimum_msat,
            fee_base_msat: edge.base_fee_msat,
            fee_proportional_millionths: edge.fee_proportional_millionths,
        });
    }

    Ok(PaymentRoute::new(hops))
}
