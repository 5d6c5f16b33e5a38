use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use crate::{
    context::SimulationContext,
    data::Report,
    demand::{Demands, FlowId, PathRef},
    params::Params,
    simulation,
    timeline::Timeline,
    topology::{EdgeId, NodeId, Topology},
    units::UnknownFlowUnit,
};

/// The input files of a run.
#[derive(Debug, Clone, typed_builder::TypedBuilder)]
pub struct Inputs {
    /// Optional; defaults apply when the file is missing.
    #[builder(setter(into))]
    pub params: PathBuf,
    #[builder(setter(into))]
    pub topology: PathBuf,
    #[builder(setter(into))]
    pub demands: PathBuf,
    /// Optional; a missing file means no events.
    #[builder(setter(into))]
    pub events: PathBuf,
}

impl Inputs {
    /// The conventional file names inside `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::builder()
            .params(dir.join("params.txt"))
            .topology(dir.join("graph.txt"))
            .demands(dir.join("routing.txt"))
            .events(dir.join("events.txt"))
            .build()
    }
}

/// Loads every input in dependency order and builds the simulation context.
pub fn load(inputs: &Inputs) -> Result<SimulationContext, Error> {
    let params = Params::load(&inputs.params)?;
    tracing::info!(
        flow_unit = %params.flow_unit,
        scale = params.scale,
        margin = params.edge_bandwidth_margin,
        end_secs = params.end_simulation_time.into_secs_f64(),
        "parameters ready"
    );
    let topology = Topology::load(&inputs.topology, &params)?;
    let demands = Demands::load(&inputs.demands, &params, &topology)?;
    let timeline = Timeline::load(&inputs.events, &params)?;
    SimulationContext::new(params, topology, demands, &timeline)
}

/// Runs a loaded context to the end of the simulation.
pub fn run(context: SimulationContext) -> Report {
    let sim = simulation::build(context);
    let (stats, summary) = sim.run();
    Report { stats, summary }
}

/// Loads, runs and times a whole simulation.
pub fn execute(inputs: &Inputs) -> Result<Report, Error> {
    let started = Instant::now();
    let context = load(inputs)?;
    let init_secs = started.elapsed().as_secs_f64();
    tracing::info!(init_secs, "initialization finished");

    let started = Instant::now();
    let mut report = run(context);
    let run_secs = started.elapsed().as_secs_f64();
    report.summary.init_secs = init_secs;
    report.summary.run_secs = run_secs;
    tracing::info!(
        run_secs,
        lost_bytes = %report.summary.lost(),
        queue_drops = report.summary.queue_drops(),
        "run finished"
    );
    Ok(report)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("missing input file {}", .0.display())]
    Missing(PathBuf),

    #[error("{file}: token {token}: expected {expected}{}", .found.as_ref().map(|f| format!(", found `{f}`")).unwrap_or_default())]
    Parse {
        file: String,
        token: usize,
        expected: &'static str,
        found: Option<String>,
    },

    #[error("{file}: unknown parameter `{name}`")]
    UnknownParameter { file: String, name: String },

    #[error("invalid {name}: {reason}")]
    InvalidParameter {
        name: &'static str,
        reason: &'static str,
    },

    #[error(transparent)]
    UnknownFlowUnit(#[from] UnknownFlowUnit),

    #[error("{context}: unknown edge {edge}")]
    UnknownEdge { context: String, edge: EdgeId },

    #[error("{context}: unknown node {node}")]
    UnknownNode { context: String, node: NodeId },

    #[error("traffic event at {time}s: no path carries flow {flow}")]
    UnknownFlow { time: f64, flow: FlowId },

    #[error("flow {flow} is used by both {first} and {second}")]
    DuplicateFlow {
        flow: FlowId,
        first: PathRef,
        second: PathRef,
    },

    #[error("{context}: capacity must be positive, got {value}")]
    InvalidCapacity { context: String, value: f64 },

    #[error("{path} has no hops")]
    EmptyPath { path: PathRef },

    #[error("{context}: node {node} is not an endpoint of edge {edge}")]
    DetachedHop {
        context: String,
        node: NodeId,
        edge: EdgeId,
    },

    #[error("serde error")]
    Serde(#[from] serde_json::Error),
}
