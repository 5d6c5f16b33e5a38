use crate::{
    packet::Packet,
    routing::RoutingTables,
    topology::{EdgeId, IfaceId, NodeId, Side, Topology},
};

/// A network node. It owns one address per incident edge and forwards by `(flow, destination)`.
#[derive(Debug, Clone, derive_new::new)]
pub(crate) struct Node {
    id: NodeId,
    #[new(default)]
    pub(crate) dropped: u64,
}

impl Node {
    /// Decides what happens to `pkt` arriving at this node.
    pub(crate) fn forward(
        &mut self,
        pkt: &Packet,
        topology: &Topology,
        routing: &RoutingTables,
    ) -> Forward {
        if topology.owner(pkt.dst) == Some(self.id) {
            return Forward::Deliver;
        }
        let decision = match routing.lookup(self.id, pkt.flow, pkt.dst) {
            None => Forward::Drop(DropReason::NoRoute),
            Some(route) if route.iface == IfaceId::LOOPBACK => Forward::Drop(DropReason::Loopback),
            Some(route) => match topology.iface(self.id, route.iface) {
                Some(iface) => Forward::Transmit {
                    edge: iface.edge,
                    side: iface.side,
                },
                None => Forward::Drop(DropReason::NoInterface),
            },
        };
        if let Forward::Drop(reason) = decision {
            self.dropped += 1;
            tracing::debug!(
                node = %self.id,
                flow = %pkt.flow,
                dst = %pkt.dst,
                ?reason,
                "dropping packet"
            );
        }
        decision
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Forward {
    /// The packet is addressed to this node.
    Deliver,
    /// Hand the packet to the device on `side` of `edge`.
    Transmit { edge: EdgeId, side: Side },
    Drop(DropReason),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum DropReason {
    NoRoute,
    Loopback,
    NoInterface,
}

#[derive(Debug, Clone, derive_new::new)]
pub(crate) enum NodeCmd {
    Receive { node: NodeId, pkt: Packet },
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::{
        demand::{Demands, FlowId},
        params::Params,
        routing::{Route, RoutingTable},
        units::Bytes,
    };

    // 0 - 1 - 2, one demand 0 -> 2 with flow 7
    fn setup() -> (Topology, RoutingTables) {
        let params = Params::default();
        let topo = Topology::parse("graph", "3 2\n0 1\n1 2\n1 1\n", &params).unwrap();
        let demands = Demands::parse(
            "routing",
            "1\n0 0 2 1 1\n0 7 2 1\n0 0 1\n1 1 2\n",
            &params,
            &topo,
        )
        .unwrap();
        let routing = RoutingTables::build(&topo, &demands);
        (topo, routing)
    }

    fn pkt(flow: usize, dst: Ipv4Addr) -> Packet {
        Packet::builder()
            .flow(FlowId::new(flow))
            .dst(dst)
            .size(Bytes::new(100))
            .build()
    }

    #[test]
    fn forwards_along_the_path_and_delivers() {
        let (topo, routing) = setup();
        let dst = Ipv4Addr::new(10, 1, 2, 2);
        let mut n0 = Node::new(NodeId::new(0));
        let mut n1 = Node::new(NodeId::new(1));
        let mut n2 = Node::new(NodeId::new(2));
        assert_eq!(
            n0.forward(&pkt(7, dst), &topo, &routing),
            Forward::Transmit {
                edge: EdgeId::new(0),
                side: Side::A
            }
        );
        assert_eq!(
            n1.forward(&pkt(7, dst), &topo, &routing),
            Forward::Transmit {
                edge: EdgeId::new(1),
                side: Side::A
            }
        );
        assert_eq!(n2.forward(&pkt(7, dst), &topo, &routing), Forward::Deliver);
    }

    #[test]
    fn unknown_flow_is_dropped() {
        let (topo, routing) = setup();
        let mut n0 = Node::new(NodeId::new(0));
        let decision = n0.forward(&pkt(8, Ipv4Addr::new(10, 1, 2, 2)), &topo, &routing);
        assert_eq!(decision, Forward::Drop(DropReason::NoRoute));
        assert_eq!(n0.dropped, 1);
    }

    #[test]
    fn loopback_route_is_dropped() {
        let (topo, _) = setup();
        let dst = Ipv4Addr::new(10, 1, 2, 2);
        let mut table = RoutingTable::default();
        table.add_host_route(
            FlowId::new(7),
            dst,
            Route {
                next_hop: dst,
                iface: IfaceId::LOOPBACK,
            },
        );
        let routing = RoutingTables::from_tables(vec![table]);
        let mut n0 = Node::new(NodeId::new(0));
        assert_eq!(
            n0.forward(&pkt(7, dst), &topo, &routing),
            Forward::Drop(DropReason::Loopback)
        );
    }
}
