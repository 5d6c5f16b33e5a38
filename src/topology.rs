use std::{fmt, net::Ipv4Addr, path::Path};

use rustc_hash::FxHashMap;

use crate::{
    driver::Error,
    params::Params,
    reader::{self, Tokens},
};

identifier!(NodeId);
identifier!(EdgeId);
identifier!(IfaceId);

impl IfaceId {
    /// Interface zero of every node is its loopback interface.
    pub const LOOPBACK: IfaceId = IfaceId::ZERO;
}

/// Subnet base for link addresses; edge `e` gets `10.1.(e+1).0/30`.
const SUBNET_BASE: Ipv4Addr = Ipv4Addr::new(10, 1, 0, 0);

/// One end of a link. Side `A` sits on the edge's `from` node, side `B` on its `to` node.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::A, Side::B];

    pub const fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => f.write_str("A"),
            Side::B => f.write_str("B"),
        }
    }
}

/// An undirected link. `capacity` is in scaled flow units and applies to both directions.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub capacity: f64,
}

impl Edge {
    pub fn endpoint(&self, side: Side) -> NodeId {
        match side {
            Side::A => self.from,
            Side::B => self.to,
        }
    }

    /// The side of this edge that sits on `node`, if any. For a self-loop this is side `A`.
    pub fn side_of(&self, node: NodeId) -> Option<Side> {
        if self.from == node {
            Some(Side::A)
        } else if self.to == node {
            Some(Side::B)
        } else {
            None
        }
    }
}

/// A non-loopback interface of a node: the device on one side of an edge.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Interface {
    pub edge: EdgeId,
    pub side: Side,
    pub addr: Ipv4Addr,
}

#[derive(Debug, Clone)]
pub struct Topology {
    nr_nodes: usize,
    edges: Vec<Edge>,
    // `interfaces[n][i]` is interface `i + 1` of node `n`
    interfaces: Vec<Vec<Interface>>,
    owners: FxHashMap<Ipv4Addr, NodeId>,
}

impl Topology {
    /// Builds a topology and assigns interfaces and addresses in edge order.
    pub fn new(nr_nodes: usize, edges: Vec<Edge>) -> Result<Self, Error> {
        let mut interfaces = vec![Vec::new(); nr_nodes];
        let mut owners = FxHashMap::default();
        for (i, edge) in edges.iter().enumerate() {
            let id = EdgeId::new(i);
            if !(edge.capacity > 0.0) {
                return Err(Error::InvalidCapacity {
                    context: format!("edge {id}"),
                    value: edge.capacity,
                });
            }
            for side in Side::BOTH {
                let node = edge.endpoint(side);
                let Some(ifaces) = interfaces.get_mut(node.into_usize()) else {
                    return Err(Error::UnknownNode {
                        context: format!("edge {id}"),
                        node,
                    });
                };
                let addr = Self::address_of(id, side);
                ifaces.push(Interface {
                    edge: id,
                    side,
                    addr,
                });
                owners.insert(addr, node);
            }
        }
        Ok(Self {
            nr_nodes,
            edges,
            interfaces,
            owners,
        })
    }

    pub fn load(path: impl AsRef<Path>, params: &Params) -> Result<Self, Error> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "reading topology");
        let text = reader::read_required(path)?;
        Self::parse(&path.display().to_string(), &text, params)
    }

    /// Parses `V E`, then `E` endpoint pairs, then `E` raw capacities in edge order.
    pub fn parse(file: &str, text: &str, params: &Params) -> Result<Self, Error> {
        let mut toks = Tokens::new(file, text);
        let nr_nodes: usize = toks.next("vertex count")?;
        let nr_edges: usize = toks.next("edge count")?;
        let mut endpoints = Vec::with_capacity(nr_edges);
        for _ in 0..nr_edges {
            let from: NodeId = toks.next("edge source node")?;
            let to: NodeId = toks.next("edge target node")?;
            endpoints.push((from, to));
        }
        let mut edges = Vec::with_capacity(nr_edges);
        for (from, to) in endpoints {
            let raw: f64 = toks.next("edge capacity")?;
            edges.push(Edge {
                from,
                to,
                capacity: params.capacity(raw),
            });
        }
        let topology = Self::new(nr_nodes, edges)?;
        tracing::info!(
            nodes = topology.nr_nodes(),
            edges = topology.nr_edges(),
            "topology loaded"
        );
        for (id, edge) in topology.edges() {
            tracing::debug!(edge = %id, from = %edge.from, to = %edge.to, capacity = edge.capacity);
        }
        Ok(topology)
    }

    pub fn nr_nodes(&self) -> usize {
        self.nr_nodes
    }

    pub fn nr_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges
            .iter()
            .enumerate()
            .map(|(i, e)| (EdgeId::new(i), e))
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.into_usize())
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        id.into_usize() < self.nr_nodes
    }

    /// Sets a new capacity for both directions of `id`.
    pub(crate) fn set_capacity(&mut self, id: EdgeId, capacity: f64) -> Result<(), Error> {
        let edge = self
            .edges
            .get_mut(id.into_usize())
            .ok_or_else(|| Error::UnknownEdge {
                context: "capacity change".to_owned(),
                edge: id,
            })?;
        edge.capacity = capacity;
        Ok(())
    }

    /// Every `(edge, side)` pair in edge order, together with the node on that side.
    pub fn sides(&self) -> impl Iterator<Item = (EdgeId, Side, NodeId)> + '_ {
        self.edges().flat_map(|(id, edge)| {
            Side::BOTH
                .into_iter()
                .map(move |side| (id, side, edge.endpoint(side)))
        })
    }

    /// The address of the interface on `side` of edge `id`.
    pub fn address(&self, id: EdgeId, side: Side) -> Option<Ipv4Addr> {
        self.edge(id).map(|_| Self::address_of(id, side))
    }

    fn address_of(id: EdgeId, side: Side) -> Ipv4Addr {
        let subnet = u32::from(SUBNET_BASE) + ((id.into_usize() as u32 + 1) << 8);
        Ipv4Addr::from(subnet + side.index() as u32 + 1)
    }

    /// Looks up a non-loopback interface of `node`.
    pub fn iface(&self, node: NodeId, iface: IfaceId) -> Option<&Interface> {
        let idx = iface.into_usize().checked_sub(1)?;
        self.interfaces.get(node.into_usize())?.get(idx)
    }

    /// The interface `node` uses to reach edge `edge`, if the node is an endpoint of it.
    pub fn iface_to(&self, node: NodeId, edge: EdgeId) -> Option<IfaceId> {
        self.interfaces
            .get(node.into_usize())?
            .iter()
            .position(|iface| iface.edge == edge)
            .map(|idx| IfaceId::new(idx + 1))
    }

    /// The node owning `addr`, if it is assigned to any interface.
    pub fn owner(&self, addr: Ipv4Addr) -> Option<NodeId> {
        self.owners.get(&addr).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> Topology {
        let params = Params::builder().scale(10.0).edge_bandwidth_margin(1.5).build();
        Topology::parse("graph", "3 2\n0 1\n1 2\n4 8\n", &params).unwrap()
    }

    #[test]
    fn capacities_are_scaled_with_margin() {
        let topo = line();
        assert!((topo.edge(EdgeId::new(0)).unwrap().capacity - 60.0).abs() < 1e-6);
        assert!((topo.edge(EdgeId::new(1)).unwrap().capacity - 120.0).abs() < 1e-6);
    }

    #[test]
    fn addresses_per_edge_side() {
        let topo = line();
        assert_eq!(
            topo.address(EdgeId::new(0), Side::A),
            Some(Ipv4Addr::new(10, 1, 1, 1))
        );
        assert_eq!(
            topo.address(EdgeId::new(1), Side::B),
            Some(Ipv4Addr::new(10, 1, 2, 2))
        );
        assert_eq!(topo.owner(Ipv4Addr::new(10, 1, 2, 2)), Some(NodeId::new(2)));
        assert_eq!(topo.address(EdgeId::new(2), Side::A), None);
    }

    #[test]
    fn large_edge_ids_carry_into_second_octet() {
        assert_eq!(
            Topology::address_of(EdgeId::new(255), Side::A),
            Ipv4Addr::new(10, 2, 0, 1)
        );
    }

    #[test]
    fn interfaces_follow_edge_order() {
        let topo = line();
        // Node 1 sits on both edges: interface 1 is edge 0, interface 2 is edge 1
        let i1 = topo.iface(NodeId::new(1), IfaceId::new(1)).unwrap();
        let i2 = topo.iface(NodeId::new(1), IfaceId::new(2)).unwrap();
        assert_eq!((i1.edge, i1.side), (EdgeId::new(0), Side::B));
        assert_eq!((i2.edge, i2.side), (EdgeId::new(1), Side::A));
        assert!(topo.iface(NodeId::new(1), IfaceId::LOOPBACK).is_none());
        assert_eq!(topo.iface_to(NodeId::new(2), EdgeId::new(1)), Some(IfaceId::ONE));
        assert_eq!(topo.iface_to(NodeId::new(0), EdgeId::new(1)), None);
    }

    #[test]
    fn unknown_node_is_rejected() {
        let err = Topology::parse("graph", "2 1\n0 5\n1\n", &Params::default()).unwrap_err();
        assert!(matches!(err, Error::UnknownNode { .. }));
    }

    #[test]
    fn non_positive_capacity_is_rejected() {
        let err = Topology::parse("graph", "2 1\n0 1\n0\n", &Params::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidCapacity { .. }));
    }

    #[test]
    fn truncated_capacities() {
        let err = Topology::parse("graph", "3 2\n0 1\n1 2\n4\n", &Params::default()).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn missing_file_is_fatal() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let err = Topology::load(dir.path().join("graph.txt"), &Params::default()).unwrap_err();
        assert!(matches!(err, Error::Missing(_)));
        Ok(())
    }
}
