mod aggregate;
mod select;

pub use aggregate::coalesce;
pub use select::{best_route, select_egress};

use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use log::trace;

use crate::message::{Envelope, Origin, RouteAdvertisement};
use crate::utils::{format_time_as_elapsed, mask_len, prefix_matches};

/// The five selection attributes carried by a learned route
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteAttributes {
    pub local_pref: u32,
    pub self_origin: bool,
    pub as_path: Vec<u32>,
    pub origin: Origin,
}

/// One learned route: a prefix and the neighbor it was learned from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    pub network: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub attributes: RouteAttributes,
}

impl RouteEntry {
    pub fn from_advertisement(adv: &RouteAdvertisement, next_hop: Ipv4Addr) -> Self {
        Self {
            network: adv.network,
            netmask: adv.netmask,
            next_hop,
            attributes: RouteAttributes {
                local_pref: adv.localpref,
                self_origin: adv.self_origin,
                as_path: adv.as_path.clone(),
                origin: adv.origin,
            },
        }
    }

    pub fn prefix_len(&self) -> u8 {
        mask_len(self.netmask)
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        prefix_matches(addr, self.network, self.netmask)
    }

    /// Attribute-equality for aggregation: same egress and selection
    /// attributes at the same mask length
    pub fn mergeable_with(&self, other: &RouteEntry) -> bool {
        self.next_hop == other.next_hop
            && self.netmask == other.netmask
            && self.attributes == other.attributes
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<Route {}/{} via {}>",
            self.network,
            self.prefix_len(),
            self.next_hop
        )
    }
}

/// A raw announcement retained verbatim, in arrival order
#[derive(Debug)]
pub struct ArchivedMessage {
    pub(crate) received_at: DateTime<Utc>,
    pub(crate) envelope: Envelope,
}

impl fmt::Display for ArchivedMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<Archived {} from {} age={}>",
            self.envelope.payload.kind(),
            self.envelope.src,
            format_time_as_elapsed(self.received_at),
        )
    }
}

/// The authoritative routing information base: every learned route in
/// insertion order, plus the announcement archive. Forwarding never reads
/// this directly; it reads the coalesced view derived by `coalesce`
#[derive(Debug, Default)]
pub struct Rib {
    entries: Vec<RouteEntry>,
    archive: Vec<ArchivedMessage>,
}

impl Rib {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stable-order snapshot for the aggregator
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn insert(&mut self, entry: RouteEntry) {
        trace!("Learned {}", entry);
        self.entries.push(entry);
    }

    /// Remove every route with an exact (prefix, next-hop) match; returns
    /// how many were removed
    pub fn withdraw(&mut self, network: Ipv4Addr, netmask: Ipv4Addr, next_hop: Ipv4Addr) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            !(entry.network == network && entry.netmask == netmask && entry.next_hop == next_hop)
        });
        let removed = before - self.entries.len();
        trace!(
            "Withdrew {} route(s) for {}/{} via {}",
            removed,
            network,
            mask_len(netmask),
            next_hop
        );
        removed
    }

    /// Retain a raw update/revoke so state can be rebuilt without replay
    pub fn archive(&mut self, envelope: Envelope) {
        self.archive.push(ArchivedMessage {
            received_at: Utc::now(),
            envelope,
        });
    }

    pub fn archived(&self) -> usize {
        self.archive.len()
    }
}
