use std::cmp;

use super::RouteEntry;
use crate::utils::{prefixes_adjacent, shorten_mask};

/// Coalesce adjacent, attribute-equal routes into covering supernets.
///
/// Runs to a fixed point: after every merge the scan restarts, so chains of
/// three or more mergeable routes collapse completely. The survivors keep
/// their input order, which makes the result deterministic for a given RIB
/// snapshot.
pub fn coalesce(entries: &[RouteEntry]) -> Vec<RouteEntry> {
    let mut routes: Vec<RouteEntry> = entries.to_vec();
    'merge: loop {
        for i in 0..routes.len() {
            for j in (i + 1)..routes.len() {
                if let Some(merged) = merge_pair(&routes[i], &routes[j]) {
                    routes.remove(j);
                    routes[i] = merged;
                    continue 'merge;
                }
            }
        }
        return routes;
    }
}

/// One merge step: the covering supernet when the pair is attribute-equal
/// and adjacent, None otherwise
fn merge_pair(a: &RouteEntry, b: &RouteEntry) -> Option<RouteEntry> {
    if !a.mergeable_with(b) || !prefixes_adjacent(a.network, b.network, a.netmask) {
        return None;
    }
    Some(RouteEntry {
        network: cmp::min(a.network, b.network),
        netmask: shorten_mask(a.netmask),
        next_hop: a.next_hop,
        attributes: a.attributes.clone(),
    })
}
