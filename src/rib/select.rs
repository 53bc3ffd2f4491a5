use std::net::Ipv4Addr;

use itertools::Itertools;
use log::debug;

use super::RouteEntry;
use crate::config::{Relationship, RouterConfig};

/// Best matching route for `dst`, ignoring policy: longest-prefix match,
/// then the tie-break cascade. As long as some prefix matches, the cascade
/// narrows the field without ever emptying it.
pub fn best_route(view: &[RouteEntry], dst: Ipv4Addr) -> Option<&RouteEntry> {
    let candidates: Vec<&RouteEntry> = view.iter().filter(|r| r.contains(dst)).collect();

    // Longest prefix wins before any attribute is considered
    let candidates = candidates.into_iter().max_set_by_key(|r| r.prefix_len());
    let candidates = candidates
        .into_iter()
        .max_set_by_key(|r| r.attributes.local_pref);
    // A self-originated route beats anything learned
    let candidates = if candidates.iter().any(|r| r.attributes.self_origin) {
        candidates
            .into_iter()
            .filter(|r| r.attributes.self_origin)
            .collect::<Vec<_>>()
    } else {
        candidates
    };
    let candidates = candidates
        .into_iter()
        .min_set_by_key(|r| r.attributes.as_path.len());
    let candidates = candidates
        .into_iter()
        .max_set_by_key(|r| r.attributes.origin.preference());

    // Final tie-break cannot tie: two routes cannot share a next-hop address
    // and still be distinct survivors here
    candidates.into_iter().min_by_key(|r| u32::from(r.next_hop))
}

/// Full selection for a data packet that arrived from `ingress`: the cascade
/// plus the relationship filter. Returns the egress neighbor, or None when
/// there is no route or policy forbids the pairing.
pub fn select_egress(
    view: &[RouteEntry],
    config: &RouterConfig,
    ingress: Ipv4Addr,
    dst: Ipv4Addr,
) -> Option<Ipv4Addr> {
    let best = best_route(view, dst)?;
    let ingress_rel = config.relationship_of(ingress)?;
    let egress_rel = config.relationship_of(best.next_hop)?;
    if !Relationship::permits(ingress_rel, egress_rel) {
        debug!(
            "Best route to {} is {} but {} -> {} is not allowed",
            dst, best, ingress_rel, egress_rel
        );
        return None;
    }
    Some(best.next_hop)
}
