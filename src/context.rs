use crate::{
    demand::Demands,
    driver::Error,
    params::Params,
    routing::RoutingTables,
    stats::Stats,
    timeline::{Scheduled, Timeline},
    topology::Topology,
};

/// Everything a run knows before its clock starts, plus the sample buffers it fills.
///
/// The context is built once from the loaded inputs and then handed to the kernel, which is the
/// only place that mutates it (link capacities and sample buffers).
#[derive(Debug)]
pub struct SimulationContext {
    pub(crate) params: Params,
    pub(crate) topology: Topology,
    pub(crate) demands: Demands,
    pub(crate) routing: RoutingTables,
    pub(crate) scheduled: Vec<Scheduled>,
    pub(crate) stats: Stats,
}

impl SimulationContext {
    /// Derives the routing tables, resolves the timeline against the model and allocates the
    /// sample buffers.
    pub fn new(
        params: Params,
        topology: Topology,
        demands: Demands,
        timeline: &Timeline,
    ) -> Result<Self, Error> {
        let routing = RoutingTables::build(&topology, &demands);
        let scheduled = timeline.resolve(&params, &topology, &demands)?;
        let stats = Stats::new(&params, &topology, &demands);
        Ok(Self {
            params,
            topology,
            demands,
            routing,
            scheduled,
            stats,
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn demands(&self) -> &Demands {
        &self.demands
    }

    pub fn routing(&self) -> &RoutingTables {
        &self.routing
    }

    pub fn scheduled(&self) -> &[Scheduled] {
        &self.scheduled
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }
}
