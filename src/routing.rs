use std::net::Ipv4Addr;

use rustc_hash::FxHashMap;

use crate::{
    demand::{Demand, Demands, FlowId, Path},
    topology::{IfaceId, NodeId, Side, Topology},
};

/// Where a node sends a packet of a given flow.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Route {
    pub next_hop: Ipv4Addr,
    pub iface: IfaceId,
}

/// A per-node forwarding table keyed by flow id as well as destination, so that several paths
/// towards the same destination can leave a node on different interfaces.
#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    entries: FxHashMap<(FlowId, Ipv4Addr), Route>,
}

impl RoutingTable {
    /// Installs a host route. An existing entry for the same key is replaced and returned.
    pub fn add_host_route(&mut self, flow: FlowId, dst: Ipv4Addr, route: Route) -> Option<Route> {
        self.entries.insert((flow, dst), route)
    }

    pub fn lookup(&self, flow: FlowId, dst: Ipv4Addr) -> Option<Route> {
        self.entries.get(&(flow, dst)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One routing table per node of the topology.
#[derive(Debug, Clone)]
pub struct RoutingTables {
    tables: Vec<RoutingTable>,
}

impl RoutingTables {
    /// Installs, for every hop of every path, the route that reproduces the hop.
    pub fn build(topology: &Topology, demands: &Demands) -> Self {
        let mut tables = vec![RoutingTable::default(); topology.nr_nodes()];
        for (id, demand, path) in demands.paths() {
            let Some(dst) = destination_address(topology, demand, path) else {
                continue;
            };
            for hop in &path.hops {
                let Some(next_hop) = topology
                    .edge(hop.edge)
                    .and_then(|edge| edge.side_of(hop.node))
                    .and_then(|side| topology.address(hop.edge, side.other()))
                else {
                    continue;
                };
                let route = Route {
                    next_hop,
                    iface: hop.iface,
                };
                tracing::trace!(
                    path = %id,
                    flow = %path.flow,
                    node = %hop.node,
                    %dst,
                    %next_hop,
                    iface = %hop.iface,
                    "adding routing entry"
                );
                if let Some(table) = tables.get_mut(hop.node.into_usize()) {
                    table.add_host_route(path.flow, dst, route);
                }
            }
        }
        let routes: usize = tables.iter().map(RoutingTable::len).sum();
        tracing::info!(routes, "routing tables built");
        Self { tables }
    }

    #[cfg(test)]
    pub(crate) fn from_tables(tables: Vec<RoutingTable>) -> Self {
        Self { tables }
    }

    pub fn table(&self, node: NodeId) -> Option<&RoutingTable> {
        self.tables.get(node.into_usize())
    }

    pub fn lookup(&self, node: NodeId, flow: FlowId, dst: Ipv4Addr) -> Option<Route> {
        self.table(node)?.lookup(flow, dst)
    }
}

/// The address a path delivers to: the interface on its final edge that sits on the demand's
/// destination node. Edges are undirected, so either side may be the destination.
pub fn destination_address(topology: &Topology, demand: &Demand, path: &Path) -> Option<Ipv4Addr> {
    let last = path.last_hop()?;
    let edge = topology.edge(last.edge)?;
    let side = if edge.from == demand.to {
        Side::A
    } else {
        Side::B
    };
    topology.address(last.edge, side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        demand::{DemandId, PathId, PathRef},
        params::Params,
        topology::EdgeId,
    };

    fn setup() -> (Topology, Demands) {
        // 0-1, 3-1 (reversed), 0-2, 2-3
        let topo =
            Topology::parse("graph", "4 4\n0 1\n3 1\n0 2\n2 3\n1 1 1 1\n", &Params::default())
                .unwrap();
        let text = "2
0 0 3 10 2
0 7 2 6
0 0 1
1 1 2
1 9 2 4
2 0 2
3 2 2
1 3 0 5 1
0 4 2 5
1 3 1
0 1 1
";
        let demands = Demands::parse("routing", text, &Params::default(), &topo).unwrap();
        (topo, demands)
    }

    #[test]
    fn every_hop_reproduces_its_path() {
        let (topo, demands) = setup();
        let tables = RoutingTables::build(&topo, &demands);
        for (_, demand, path) in demands.paths() {
            let dst = destination_address(&topo, demand, path).unwrap();
            for hop in &path.hops {
                let route = tables.lookup(hop.node, path.flow, dst).unwrap();
                let edge = topo.edge(hop.edge).unwrap();
                let far = edge.side_of(hop.node).unwrap().other();
                assert_eq!(route.next_hop, topo.address(hop.edge, far).unwrap());
                assert_eq!(route.iface, hop.iface);
            }
        }
    }

    #[test]
    fn destination_follows_edge_orientation() {
        let (topo, demands) = setup();
        // Demand 0 ends on edge 1 (3-1), whose `from` side is the destination node 3
        let demand = demands.demand(DemandId::ZERO).unwrap();
        let path = demands.path(PathRef::new(DemandId::ZERO, PathId::ZERO)).unwrap();
        assert_eq!(
            destination_address(&topo, demand, path),
            topo.address(EdgeId::new(1), Side::A)
        );
        // Path 1 ends on edge 3 (2-3), whose `to` side is node 3
        let path = demands.path(PathRef::new(DemandId::ZERO, PathId::ONE)).unwrap();
        assert_eq!(
            destination_address(&topo, demand, path),
            topo.address(EdgeId::new(3), Side::B)
        );
    }

    #[test]
    fn flows_to_the_same_destination_split_at_a_node() {
        let (topo, demands) = setup();
        let tables = RoutingTables::build(&topo, &demands);
        let table = tables.table(NodeId::ZERO).unwrap();
        // Both paths of demand 0 leave node 0, each on its own interface
        let demand = demands.demand(DemandId::ZERO).unwrap();
        let routes: Vec<_> = demand
            .paths
            .iter()
            .map(|p| {
                let dst = destination_address(&topo, demand, p).unwrap();
                table.lookup(p.flow, dst).unwrap().iface
            })
            .collect();
        assert_eq!(routes, vec![IfaceId::new(1), IfaceId::new(2)]);
        assert!(table.lookup(FlowId::new(4), topo.address(EdgeId::ZERO, Side::A).unwrap()).is_none());
    }

    #[test]
    fn later_write_wins() {
        let mut table = RoutingTable::default();
        let dst = Ipv4Addr::new(10, 1, 1, 2);
        let first = Route {
            next_hop: dst,
            iface: IfaceId::ONE,
        };
        let second = Route {
            next_hop: dst,
            iface: IfaceId::new(2),
        };
        assert_eq!(table.add_host_route(FlowId::ONE, dst, first), None);
        assert_eq!(table.add_host_route(FlowId::ONE, dst, second), Some(first));
        assert_eq!(table.lookup(FlowId::ONE, dst), Some(second));
        assert_eq!(table.len(), 1);
    }
}
