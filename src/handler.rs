use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;

use log::{debug, info, trace, warn};

use crate::config::{Relationship, RouterConfig};
use crate::message::{EmptyBody, Envelope, Payload, PrefixSpec, RouteAdvertisement, TableEntry};
use crate::rib::{coalesce, select_egress, Rib, RouteEntry};
use crate::session::{SessionError, SessionManager};
use crate::utils::link_local_source;

/// Messages to hand back to the transport: (egress neighbor, envelope)
pub type Outbound = Vec<(Ipv4Addr, Envelope)>;

/// The router core: authoritative RIB, derived coalesced view, dispatch and
/// propagation. Transport-free; the event loop feeds it one message at a
/// time and writes out whatever it returns.
pub struct Router {
    config: Arc<RouterConfig>,
    rib: Rib,
    view: Vec<RouteEntry>,
}

impl Router {
    pub fn new(config: Arc<RouterConfig>) -> Self {
        Self {
            config,
            rib: Rib::new(),
            view: Vec::new(),
        }
    }

    /// Classify one inbound message and run the matching handler
    pub fn handle_message(&mut self, ingress: Ipv4Addr, envelope: Envelope) -> Outbound {
        trace!("[{}] Incoming: {}", ingress, envelope.payload.kind());
        match &envelope.payload {
            Payload::Update(adv) => {
                let adv = adv.clone();
                self.handle_update(ingress, adv, envelope)
            }
            Payload::Revoke(withdrawals) => {
                let withdrawals = withdrawals.clone();
                self.handle_revoke(ingress, withdrawals, envelope)
            }
            Payload::Data(_) => self.handle_data(ingress, envelope),
            Payload::Dump(_) => self.handle_dump(ingress, envelope),
            // Only the router generates these; a neighbor sending one is noise
            Payload::NoRoute(_) | Payload::Table(_) => {
                warn!(
                    "[{}] Dropping unexpected '{}' message",
                    ingress,
                    envelope.payload.kind()
                );
                Vec::new()
            }
        }
    }

    /// The coalesced view is a function of the RIB; recompute it after every
    /// mutation rather than patching it in place
    pub fn coalesced_view(&self) -> &[RouteEntry] {
        &self.view
    }

    fn handle_update(
        &mut self,
        ingress: Ipv4Addr,
        adv: RouteAdvertisement,
        envelope: Envelope,
    ) -> Outbound {
        self.rib.archive(envelope);
        self.rib
            .insert(RouteEntry::from_advertisement(&adv, ingress));
        self.rebuild_view();
        self.propagate_update(ingress, adv)
    }

    fn handle_revoke(
        &mut self,
        ingress: Ipv4Addr,
        withdrawals: Vec<PrefixSpec>,
        envelope: Envelope,
    ) -> Outbound {
        self.rib.archive(envelope);
        for withdrawal in &withdrawals {
            let removed = self
                .rib
                .withdraw(withdrawal.network, withdrawal.netmask, ingress);
            if removed == 0 {
                warn!(
                    "[{}] Revoke for a route never announced: {}",
                    ingress, withdrawal.network
                );
            }
        }
        self.rebuild_view();
        self.propagate_revoke(ingress, withdrawals)
    }

    fn handle_data(&mut self, ingress: Ipv4Addr, envelope: Envelope) -> Outbound {
        match select_egress(&self.view, &self.config, ingress, envelope.dst) {
            Some(egress) => {
                debug!("Forwarding data for {} via {}", envelope.dst, egress);
                vec![(egress, envelope)]
            }
            None => {
                debug!("No usable route to {}, answering {}", envelope.dst, envelope.src);
                vec![(
                    ingress,
                    Envelope {
                        src: link_local_source(ingress),
                        dst: envelope.src,
                        payload: Payload::NoRoute(EmptyBody::default()),
                    },
                )]
            }
        }
    }

    fn handle_dump(&mut self, ingress: Ipv4Addr, envelope: Envelope) -> Outbound {
        let table: Vec<TableEntry> = self
            .view
            .iter()
            .map(|route| TableEntry {
                network: route.network,
                netmask: route.netmask,
                peer: route.next_hop,
            })
            .collect();
        vec![(
            ingress,
            Envelope {
                src: link_local_source(ingress),
                dst: envelope.src,
                payload: Payload::Table(table),
            },
        )]
    }

    /// Every neighbor that must hear about an announcement from `ingress`:
    /// export to a peer or provider only what was learned from a customer
    fn propagation_targets(&self, ingress: Ipv4Addr) -> Vec<Ipv4Addr> {
        let ingress_rel = match self.config.relationship_of(ingress) {
            Some(rel) => rel,
            None => return Vec::new(),
        };
        self.config
            .neighbors
            .iter()
            .filter(|n| n.addr != ingress)
            .filter(|n| Relationship::permits(ingress_rel, n.relationship))
            .map(|n| n.addr)
            .collect()
    }

    fn propagate_update(&self, ingress: Ipv4Addr, mut adv: RouteAdvertisement) -> Outbound {
        // The local AS joins the path on update only; revokes pass through
        adv.as_path.push(self.config.local_as);
        self.propagation_targets(ingress)
            .into_iter()
            .map(|neighbor| {
                (
                    neighbor,
                    Envelope {
                        src: link_local_source(neighbor),
                        dst: neighbor,
                        payload: Payload::Update(adv.clone()),
                    },
                )
            })
            .collect()
    }

    fn propagate_revoke(&self, ingress: Ipv4Addr, withdrawals: Vec<PrefixSpec>) -> Outbound {
        self.propagation_targets(ingress)
            .into_iter()
            .map(|neighbor| {
                (
                    neighbor,
                    Envelope {
                        src: link_local_source(neighbor),
                        dst: neighbor,
                        payload: Payload::Revoke(withdrawals.clone()),
                    },
                )
            })
            .collect()
    }

    fn rebuild_view(&mut self) {
        self.view = coalesce(self.rib.entries());
        trace!(
            "Coalesced view rebuilt: {} RIB route(s) -> {} visible",
            self.rib.len(),
            self.view.len()
        );
    }
}

/// Connect every neighbor channel and run the event loop until a channel
/// closes or fails
pub fn serve(config: RouterConfig) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    match runtime.block_on(run(Arc::new(config))) {
        // EOF on any channel is the one clean shutdown path
        Err(SessionError::Closed(addr)) => {
            info!("Channel to {} closed, shutting down", addr);
            Ok(())
        }
        Err(SessionError::Transport(err)) => Err(err),
        Ok(()) => Ok(()),
    }
}

async fn run(config: Arc<RouterConfig>) -> Result<(), SessionError> {
    let mut sessions = SessionManager::connect(&config).await?;
    let mut router = Router::new(Arc::clone(&config));
    info!(
        "Serving AS {} with {} neighbor(s)",
        config.local_as,
        config.neighbors.len()
    );

    loop {
        if let Some((ingress, envelope)) = sessions.poll_message().await? {
            for (egress, outbound) in router.handle_message(ingress, envelope) {
                sessions.send(egress, outbound).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Origin;
    use serde_json::json;

    const CUST_A: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 2);
    const CUST_B: Ipv4Addr = Ipv4Addr::new(172, 16, 0, 2);
    const PEER_C: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
    const PEER_D: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 2);
    const PROV_E: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 2);

    fn router() -> Router {
        let config = RouterConfig::from_tokens(
            7,
            &[
                "192.168.0.2-cust",
                "172.16.0.2-cust",
                "10.0.0.2-peer",
                "10.0.1.2-peer",
                "10.0.2.2-prov",
            ],
        )
        .unwrap();
        Router::new(Arc::new(config))
    }

    fn update(from: Ipv4Addr, network: [u8; 4], netmask: [u8; 4], origin: Origin) -> Envelope {
        Envelope {
            src: from,
            dst: link_local_source(from),
            payload: Payload::Update(RouteAdvertisement {
                network: network.into(),
                netmask: netmask.into(),
                localpref: 100,
                as_path: vec![1],
                origin,
                self_origin: false,
            }),
        }
    }

    fn data(src: Ipv4Addr, dst: Ipv4Addr) -> Envelope {
        Envelope {
            src,
            dst,
            payload: Payload::Data(json!({"payload": "xyz"})),
        }
    }

    fn revoke(from: Ipv4Addr, network: [u8; 4], netmask: [u8; 4]) -> Envelope {
        Envelope {
            src: from,
            dst: link_local_source(from),
            payload: Payload::Revoke(vec![PrefixSpec {
                network: network.into(),
                netmask: netmask.into(),
            }]),
        }
    }

    fn dump(from: Ipv4Addr) -> Envelope {
        Envelope {
            src: from,
            dst: link_local_source(from),
            payload: Payload::Dump(EmptyBody::default()),
        }
    }

    fn table_of(outbound: &Outbound) -> Vec<TableEntry> {
        assert_eq!(outbound.len(), 1);
        match &outbound[0].1.payload {
            Payload::Table(entries) => entries.clone(),
            other => panic!("Expected a table reply, got {:?}", other),
        }
    }

    #[test]
    fn test_basic_forward() {
        let mut router = router();
        router.handle_message(
            CUST_A,
            update(CUST_A, [192, 168, 0, 0], [255, 255, 255, 0], Origin::Egp),
        );

        let pkt = data(Ipv4Addr::new(172, 16, 0, 25), Ipv4Addr::new(192, 168, 0, 25));
        let outbound = router.handle_message(CUST_B, pkt.clone());
        // Forwarded verbatim to the neighbor the prefix was learned from
        assert_eq!(outbound, vec![(CUST_A, pkt)]);
    }

    #[test]
    fn test_no_route_reply() {
        let mut router = router();
        router.handle_message(
            CUST_A,
            update(CUST_A, [192, 168, 0, 0], [255, 255, 255, 0], Origin::Egp),
        );

        let outbound = router.handle_message(
            CUST_B,
            data(Ipv4Addr::new(172, 16, 0, 25), Ipv4Addr::new(10, 9, 9, 1)),
        );
        assert_eq!(outbound.len(), 1);
        let (egress, reply) = &outbound[0];
        assert_eq!(*egress, CUST_B);
        assert_eq!(reply.src, Ipv4Addr::new(172, 16, 0, 1));
        assert_eq!(reply.dst, Ipv4Addr::new(172, 16, 0, 25));
        assert_eq!(reply.payload, Payload::NoRoute(EmptyBody::default()));
    }

    #[test]
    fn test_policy_reject_gets_no_route() {
        let mut router = router();
        // Route learned from peer D; data arrives from peer C. The selector
        // finds the route, the relationship filter throws it away.
        router.handle_message(
            PEER_D,
            update(PEER_D, [192, 168, 0, 0], [255, 255, 255, 0], Origin::Egp),
        );

        let outbound = router.handle_message(
            PEER_C,
            data(Ipv4Addr::new(10, 0, 0, 25), Ipv4Addr::new(192, 168, 0, 25)),
        );
        assert_eq!(outbound.len(), 1);
        let (egress, reply) = &outbound[0];
        assert_eq!(*egress, PEER_C);
        assert_eq!(reply.payload, Payload::NoRoute(EmptyBody::default()));
    }

    #[test]
    fn test_aggregation_visible_in_dump() {
        let mut router = router();
        router.handle_message(
            CUST_A,
            update(CUST_A, [192, 168, 0, 0], [255, 255, 255, 0], Origin::Egp),
        );
        router.handle_message(
            CUST_A,
            update(CUST_A, [192, 168, 1, 0], [255, 255, 255, 0], Origin::Egp),
        );

        let outbound = router.handle_message(CUST_B, dump(Ipv4Addr::new(172, 16, 0, 25)));
        let table = table_of(&outbound);
        assert_eq!(
            table,
            vec![TableEntry {
                network: Ipv4Addr::new(192, 168, 0, 0),
                netmask: Ipv4Addr::new(255, 255, 254, 0),
                peer: CUST_A,
            }]
        );
        // The reply goes back to the requester from the link-local address
        assert_eq!(outbound[0].1.src, Ipv4Addr::new(172, 16, 0, 1));
        assert_eq!(outbound[0].1.dst, Ipv4Addr::new(172, 16, 0, 25));
    }

    #[test]
    fn test_disaggregation_after_revoke() {
        let mut router = router();
        router.handle_message(
            CUST_A,
            update(CUST_A, [192, 168, 0, 0], [255, 255, 255, 0], Origin::Egp),
        );
        router.handle_message(
            CUST_A,
            update(CUST_A, [192, 168, 1, 0], [255, 255, 255, 0], Origin::Egp),
        );
        router.handle_message(CUST_A, revoke(CUST_A, [192, 168, 1, 0], [255, 255, 255, 0]));

        let outbound = router.handle_message(CUST_B, dump(Ipv4Addr::new(172, 16, 0, 25)));
        let table = table_of(&outbound);
        assert_eq!(
            table,
            vec![TableEntry {
                network: Ipv4Addr::new(192, 168, 0, 0),
                netmask: Ipv4Addr::new(255, 255, 255, 0),
                peer: CUST_A,
            }]
        );
    }

    #[test]
    fn test_tie_break_prefers_igp() {
        let mut router = router();
        router.handle_message(
            CUST_A,
            update(CUST_A, [192, 168, 0, 0], [255, 255, 255, 0], Origin::Igp),
        );
        router.handle_message(
            CUST_B,
            update(CUST_B, [192, 168, 0, 0], [255, 255, 255, 0], Origin::Egp),
        );

        let pkt = data(Ipv4Addr::new(10, 0, 0, 25), Ipv4Addr::new(192, 168, 0, 25));
        let outbound = router.handle_message(PEER_C, pkt.clone());
        assert_eq!(outbound, vec![(CUST_A, pkt)]);
    }

    #[test]
    fn test_update_from_customer_reaches_everyone() {
        let mut router = router();
        let outbound = router.handle_message(
            CUST_A,
            update(CUST_A, [192, 168, 0, 0], [255, 255, 255, 0], Origin::Egp),
        );
        let mut targets: Vec<Ipv4Addr> = outbound.iter().map(|(addr, _)| *addr).collect();
        targets.sort();
        let mut expected = vec![CUST_B, PEER_C, PEER_D, PROV_E];
        expected.sort();
        assert_eq!(targets, expected);

        for (neighbor, envelope) in &outbound {
            assert_eq!(envelope.dst, *neighbor);
            assert_eq!(envelope.src, link_local_source(*neighbor));
            match &envelope.payload {
                // The local AS is appended on the way out
                Payload::Update(adv) => assert_eq!(adv.as_path, vec![1, 7]),
                other => panic!("Expected an update, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_update_from_peer_reaches_customers_only() {
        let mut router = router();
        let outbound = router.handle_message(
            PEER_C,
            update(PEER_C, [192, 168, 0, 0], [255, 255, 255, 0], Origin::Egp),
        );
        let mut targets: Vec<Ipv4Addr> = outbound.iter().map(|(addr, _)| *addr).collect();
        targets.sort();
        let mut expected = vec![CUST_A, CUST_B];
        expected.sort();
        assert_eq!(targets, expected);
    }

    #[test]
    fn test_revoke_propagates_unmodified() {
        let mut router = router();
        router.handle_message(
            CUST_A,
            update(CUST_A, [192, 168, 0, 0], [255, 255, 255, 0], Origin::Egp),
        );
        let outbound =
            router.handle_message(CUST_A, revoke(CUST_A, [192, 168, 0, 0], [255, 255, 255, 0]));
        assert_eq!(outbound.len(), 4);
        for (_, envelope) in &outbound {
            match &envelope.payload {
                Payload::Revoke(withdrawals) => {
                    assert_eq!(withdrawals[0].network, Ipv4Addr::new(192, 168, 0, 0));
                }
                other => panic!("Expected a revoke, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_revoke_roundtrip_empties_rib() {
        let mut router = router();
        router.handle_message(
            CUST_A,
            update(CUST_A, [192, 168, 0, 0], [255, 255, 255, 0], Origin::Egp),
        );
        router.handle_message(CUST_A, revoke(CUST_A, [192, 168, 0, 0], [255, 255, 255, 0]));
        assert!(router.coalesced_view().is_empty());

        // Both announcements stay archived even though the route is gone
        assert_eq!(router.rib.archived(), 2);
    }

    #[test]
    fn test_unexpected_types_are_dropped() {
        let mut router = router();
        let outbound = router.handle_message(
            CUST_A,
            Envelope {
                src: CUST_A,
                dst: link_local_source(CUST_A),
                payload: Payload::NoRoute(EmptyBody::default()),
            },
        );
        assert!(outbound.is_empty());
    }

    #[test]
    fn test_coverage_preserved_by_aggregation() {
        let mut router = router();
        router.handle_message(
            CUST_A,
            update(CUST_A, [192, 168, 0, 0], [255, 255, 255, 0], Origin::Egp),
        );
        router.handle_message(
            CUST_A,
            update(CUST_A, [192, 168, 1, 0], [255, 255, 255, 0], Origin::Egp),
        );

        // Addresses in either /24 still route after coalescing to the /23
        for dst in &[
            Ipv4Addr::new(192, 168, 0, 77),
            Ipv4Addr::new(192, 168, 1, 77),
        ] {
            let pkt = data(Ipv4Addr::new(172, 16, 0, 25), *dst);
            let outbound = router.handle_message(CUST_B, pkt.clone());
            assert_eq!(outbound, vec![(CUST_A, pkt)]);
        }
        // An address just outside the /23 does not
        let outbound = router.handle_message(
            CUST_B,
            data(Ipv4Addr::new(172, 16, 0, 25), Ipv4Addr::new(192, 168, 2, 77)),
        );
        assert_eq!(outbound[0].1.payload, Payload::NoRoute(EmptyBody::default()));
    }
}
