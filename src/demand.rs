use std::{fmt, path::Path as FsPath};

use rustc_hash::FxHashMap;

use crate::{
    driver::Error,
    params::Params,
    reader::{self, Tokens},
    topology::{EdgeId, IfaceId, NodeId, Topology},
};

identifier!(DemandId);
identifier!(PathId);
identifier!(FlowId);

/// Names one path of one demand; both ids are positions in the demand/path file.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_new::new,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PathRef {
    pub demand: DemandId,
    pub path: PathId,
}

impl fmt::Display for PathRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "demand {} path {}", self.demand, self.path)
    }
}

/// One hop of a path: the node the packet is at, the edge it leaves on, and the interface of
/// that node that leads onto the edge.
#[derive(Debug, Copy, Clone, PartialEq, Eq, derive_new::new, serde::Serialize)]
pub struct Hop {
    pub edge: EdgeId,
    pub node: NodeId,
    pub iface: IfaceId,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Path {
    pub flow: FlowId,
    /// Initial offered load, in scaled flow units. Zero means provisioned but idle.
    pub initial_rate: f64,
    /// Every traversed vertex except the destination, in order.
    pub hops: Vec<Hop>,
}

impl Path {
    pub fn last_hop(&self) -> Option<&Hop> {
        self.hops.last()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Demand {
    pub from: NodeId,
    pub to: NodeId,
    /// Aggregate offered traffic, in scaled flow units.
    pub volume: f64,
    pub paths: Vec<Path>,
}

/// The demands of a run together with the flow id index over all of their paths.
#[derive(Debug, Clone)]
pub struct Demands {
    demands: Vec<Demand>,
    flows: FxHashMap<FlowId, PathRef>,
}

impl Demands {
    /// Validates `demands` against `topology` and indexes every path by its flow id.
    pub fn new(demands: Vec<Demand>, topology: &Topology) -> Result<Self, Error> {
        let mut flows = FxHashMap::default();
        for (d, demand) in demands.iter().enumerate() {
            let demand_id = DemandId::new(d);
            for node in [demand.from, demand.to] {
                if !topology.contains_node(node) {
                    return Err(Error::UnknownNode {
                        context: format!("demand {demand_id}"),
                        node,
                    });
                }
            }
            for (p, path) in demand.paths.iter().enumerate() {
                let path_ref = PathRef::new(demand_id, PathId::new(p));
                check_path(path_ref, demand, path, topology)?;
                if let Some(first) = flows.insert(path.flow, path_ref) {
                    return Err(Error::DuplicateFlow {
                        flow: path.flow,
                        first,
                        second: path_ref,
                    });
                }
            }
            check_split(demand_id, demand);
        }
        Ok(Self { demands, flows })
    }

    pub fn load(path: impl AsRef<FsPath>, params: &Params, topology: &Topology) -> Result<Self, Error> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "reading demands and paths");
        let text = reader::read_required(path)?;
        Self::parse(&path.display().to_string(), &text, params, topology)
    }

    /// Parses `D`, then per demand `id from to volume numPaths`, per path
    /// `id flowId numHops initialRate`, per hop `edgeId nodeId outputInterface`.
    pub fn parse(file: &str, text: &str, params: &Params, topology: &Topology) -> Result<Self, Error> {
        let mut toks = Tokens::new(file, text);
        let nr_demands: usize = toks.next("demand count")?;
        let mut demands = Vec::with_capacity(nr_demands);
        for d in 0..nr_demands {
            let label: usize = toks.next("demand id")?;
            if label != d {
                tracing::warn!(position = d, label, "demand id differs from its position; using the position");
            }
            let from: NodeId = toks.next("demand source node")?;
            let to: NodeId = toks.next("demand destination node")?;
            let volume: f64 = toks.next("demand volume")?;
            let nr_paths: usize = toks.next("path count")?;
            let mut paths = Vec::with_capacity(nr_paths);
            for _ in 0..nr_paths {
                let _label: usize = toks.next("path id")?;
                let flow: FlowId = toks.next("flow id")?;
                let nr_hops: usize = toks.next("hop count")?;
                let initial_rate: f64 = toks.next("initial path rate")?;
                let mut hops = Vec::with_capacity(nr_hops);
                for _ in 0..nr_hops {
                    let edge = toks.next("hop edge id")?;
                    let node = toks.next("hop node id")?;
                    let iface = toks.next("hop output interface")?;
                    hops.push(Hop::new(edge, node, iface));
                }
                paths.push(Path {
                    flow,
                    initial_rate: params.volume(initial_rate),
                    hops,
                });
            }
            demands.push(Demand {
                from,
                to,
                volume: params.volume(volume),
                paths,
            });
        }
        let demands = Self::new(demands, topology)?;
        tracing::info!(
            demands = demands.nr_demands(),
            paths = demands.nr_paths(),
            "demands loaded"
        );
        Ok(demands)
    }

    pub fn nr_demands(&self) -> usize {
        self.demands.len()
    }

    pub fn nr_paths(&self) -> usize {
        self.flows.len()
    }

    pub fn demand(&self, id: DemandId) -> Option<&Demand> {
        self.demands.get(id.into_usize())
    }

    pub fn path(&self, id: PathRef) -> Option<&Path> {
        self.demand(id.demand)?.paths.get(id.path.into_usize())
    }

    /// Every path of every demand, in demand order and then path order.
    pub fn paths(&self) -> impl Iterator<Item = (PathRef, &Demand, &Path)> {
        self.demands.iter().enumerate().flat_map(|(d, demand)| {
            demand.paths.iter().enumerate().map(move |(p, path)| {
                (PathRef::new(DemandId::new(d), PathId::new(p)), demand, path)
            })
        })
    }

    /// Resolves a flow id to the unique path that carries it.
    pub fn resolve(&self, flow: FlowId) -> Option<PathRef> {
        self.flows.get(&flow).copied()
    }
}

fn check_path(id: PathRef, demand: &Demand, path: &Path, topology: &Topology) -> Result<(), Error> {
    if path.hops.is_empty() {
        return Err(Error::EmptyPath { path: id });
    }
    for (h, hop) in path.hops.iter().enumerate() {
        let context = || format!("{id} hop {h}");
        let edge = topology.edge(hop.edge).ok_or_else(|| Error::UnknownEdge {
            context: context(),
            edge: hop.edge,
        })?;
        if !topology.contains_node(hop.node) {
            return Err(Error::UnknownNode {
                context: context(),
                node: hop.node,
            });
        }
        if edge.side_of(hop.node).is_none() {
            return Err(Error::DetachedHop {
                context: context(),
                node: hop.node,
                edge: hop.edge,
            });
        }
        if topology.iface_to(hop.node, hop.edge) != Some(hop.iface) {
            tracing::warn!(
                path = %id,
                hop = h,
                iface = %hop.iface,
                edge = %hop.edge,
                "output interface does not lead onto the hop's edge; installing it as given"
            );
        }
    }
    let last = path.hops[path.hops.len() - 1];
    if topology
        .edge(last.edge)
        .and_then(|edge| edge.side_of(demand.to))
        .is_none()
    {
        tracing::warn!(path = %id, edge = %last.edge, "final edge does not reach the demand's destination");
    }
    Ok(())
}

fn check_split(id: DemandId, demand: &Demand) {
    let total: f64 = demand.paths.iter().map(|p| p.initial_rate).sum();
    let tolerance = 1e-6 * demand.volume.abs().max(1.0);
    if (total - demand.volume).abs() > tolerance {
        tracing::warn!(
            demand = %id,
            volume = demand.volume,
            path_total = total,
            "initial path rates do not add up to the demand volume"
        );
    }
}
