pub(crate) mod event;
mod schedule;

use std::net::Ipv4Addr;

use rustc_hash::FxHashMap;

use crate::{
    context::SimulationContext,
    data::{PathRecord, QueueRecord, Summary},
    demand::{FlowId, PathRef},
    entities::{
        device::{Device, DeviceCmd},
        endpoint::{AppCmd, Role, TrafficEndpoint},
        generator::{Generator, GeneratorCmd},
        node::{Forward, Node, NodeCmd},
        sink::Sink,
    },
    packet::Packet,
    stats::{Stats, StatsCmd},
    time::{Delta, Time},
    timeline::{Action, TimelineCmd},
    topology::{EdgeId, NodeId, Side},
    units::Bytes,
};

use self::{
    event::{Event, EventList},
    schedule::Schedule,
};

#[derive(Debug, typed_builder::TypedBuilder)]
pub(crate) struct Simulation {
    // Run-time
    #[builder(default, setter(skip))]
    cur_time: Time,
    #[builder(default, setter(skip))]
    schedule: Schedule,
    #[builder(default, setter(skip))]
    nr_events: u64,

    // Static model and sample buffers
    context: SimulationContext,

    // Entities
    nodes: Vec<Node>,
    // The device on side `s` of edge `e` sits at `2 * e + s`
    devices: Vec<Device>,
    generators: FxHashMap<PathRef, Generator>,
    sinks: FxHashMap<PathRef, Sink>,
    // Sinks by the node they run on and the port (flow id) they are bound to
    bindings: FxHashMap<(NodeId, FlowId), PathRef>,

    // Packets that reached their destination node but no listening sink
    #[builder(default, setter(skip))]
    undelivered: u64,
}

impl Simulation {
    pub(crate) fn run(mut self) -> (Stats, Summary) {
        self.register_all();
        tracing::info!(
            pending = self.schedule.len(),
            horizon_secs = self.horizon().into_secs_f64(),
            "starting simulation"
        );
        while !self.should_stop() {
            self.step();
        }
        tracing::info!(
            events = self.nr_events,
            sim_time_secs = self.cur_time.into_secs_f64(),
            "simulation finished"
        );
        self.finish()
    }

    /// Registers every action known before the clock starts: application start and stop times,
    /// then timeline events, then sampling ticks. Same-time events fire in this order.
    fn register_all(&mut self) {
        let params = &self.context.params;
        let (start, end_apps) = (params.start_time, params.end_apps_time);
        let paths: Vec<_> = self.context.demands.paths().map(|(id, _, _)| id).collect();
        for path in paths {
            self.register(start, AppCmd::new_start(path, Role::Sink));
            self.register(start, AppCmd::new_start(path, Role::Generator));
            self.register(end_apps, AppCmd::new_stop(path, Role::Generator));
        }
        let scheduled = self.context.scheduled.clone();
        for s in scheduled {
            self.register(s.time, TimelineCmd::new_apply(s.action));
        }
        let ticks: Vec<_> = self.context.stats.sample_times().collect();
        for t in ticks {
            self.register(t, StatsCmd::new_sample());
        }
    }

    pub(crate) fn register(&mut self, time: Time, cmd: impl Into<Command>) {
        self.schedule.push(Event::new(time, cmd));
    }

    fn step(&mut self) {
        let Some(next) = self.schedule.pop() else {
            return;
        };

        let (time, cmd) = (next.time(), next.cmd);
        assert!(self.cur_time <= time);
        self.cur_time = time;
        self.nr_events += 1;

        let events = self.apply(cmd);
        for ev in events.into_iter() {
            self.schedule.push(ev);
        }
    }

    fn horizon(&self) -> Time {
        self.context.params.end_simulation_time
    }

    // Events at or after the horizon are never dispatched
    fn should_stop(&self) -> bool {
        self.schedule.is_empty()
            || self
                .schedule
                .peek()
                .is_some_and(|ev| ev.time() >= self.horizon())
    }

    fn context(&self) -> Context {
        Context::new(self.cur_time)
    }

    fn device_mut(&mut self, edge: EdgeId, side: Side) -> &mut Device {
        self.devices
            .get_mut(device_index(edge, side))
            .expect("invalid device")
    }

    fn finish(self) -> (Stats, Summary) {
        let paths = self
            .context
            .demands
            .paths()
            .map(|(id, _, path)| {
                let gen = self.generators.get(&id);
                let sink = self.sinks.get(&id);
                PathRecord {
                    demand: id.demand,
                    path: id.path,
                    flow: path.flow,
                    bytes_sent: gen.map_or(Bytes::ZERO, |g| g.bytes_sent()),
                    bytes_received: sink.map_or(Bytes::ZERO, |s| s.bytes_received()),
                    packets_sent: gen.map_or(0, |g| g.packets_sent),
                    packets_received: sink.map_or(0, |s| s.packets_received),
                    final_rate: gen.filter(|g| g.is_enabled()).map(|g| g.offered_rate()),
                    enabled: gen.is_some_and(|g| g.is_enabled()),
                    last_arrival_secs: sink
                        .and_then(|s| s.last_arrival)
                        .map(Time::into_secs_f64),
                }
            })
            .collect();
        let queues = self
            .context
            .topology
            .sides()
            .filter_map(|(edge, side, node)| {
                let dev = self.devices.get(device_index(edge, side))?;
                let capacity = self.context.topology.edge(edge)?.capacity;
                Some(QueueRecord {
                    edge,
                    side,
                    node,
                    capacity,
                    rate: dev.rate(),
                    transmitted: dev.transmitted,
                    dropped: dev.dropped,
                    queued_at_end: dev.queue_len(),
                })
            })
            .collect();
        let summary = Summary::builder()
            .events(self.nr_events)
            .sim_end_secs(self.cur_time.into_secs_f64())
            .routing_drops(self.nodes.iter().map(|n| n.dropped).sum::<u64>())
            .undelivered(self.undelivered)
            .paths(paths)
            .queues(queues)
            .build();
        (self.context.stats, summary)
    }
}

fn device_index(edge: EdgeId, side: Side) -> usize {
    2 * edge.into_usize() + side.index()
}

// Command handlers
impl Simulation {
    fn apply(&mut self, cmd: Command) -> EventList {
        match cmd {
            Command::App(cmd) => self.apply_app(cmd),
            Command::Generator(cmd) => self.apply_generator(cmd),
            Command::Device(cmd) => self.apply_device(cmd),
            Command::Node(cmd) => self.apply_node(cmd),
            Command::Timeline(cmd) => self.apply_timeline(cmd),
            Command::Stats(cmd) => self.apply_stats(cmd),
            Command::Test => unreachable!(),
        }
    }

    fn apply_app(&mut self, cmd: AppCmd) -> EventList {
        let ctx = self.context();
        let (path, role, start) = match cmd {
            AppCmd::Start { path, role } => (path, role, true),
            AppCmd::Stop { path, role } => (path, role, false),
        };
        let endpoint: &mut dyn TrafficEndpoint = match role {
            Role::Generator => self.generators.get_mut(&path).expect("invalid path"),
            Role::Sink => self.sinks.get_mut(&path).expect("invalid path"),
        };
        tracing::trace!(%path, ?role, start, "application event");
        if start {
            endpoint.start(ctx)
        } else {
            endpoint.stop(ctx)
        }
    }

    fn apply_generator(&mut self, cmd: GeneratorCmd) -> EventList {
        let ctx = self.context();
        match cmd {
            GeneratorCmd::Send { path, version } => self.generator_mut(path).send(version, ctx),
            GeneratorCmd::StopCycle { path } => self.generator_mut(path).stop_cycle(ctx),
            GeneratorCmd::RestartCycle { path } => self.generator_mut(path).restart_cycle(ctx),
        }
    }

    fn generator_mut(&mut self, path: PathRef) -> &mut Generator {
        self.generators.get_mut(&path).expect("invalid path")
    }

    fn apply_device(&mut self, cmd: DeviceCmd) -> EventList {
        let ctx = self.context();
        match cmd {
            DeviceCmd::TxComplete { edge, side } => self.device_mut(edge, side).step(ctx),
        }
    }

    fn apply_node(&mut self, cmd: NodeCmd) -> EventList {
        let ctx = self.context();
        match cmd {
            NodeCmd::Receive { node, pkt } => {
                let decision = self
                    .nodes
                    .get_mut(node.into_usize())
                    .expect("invalid node")
                    .forward(&pkt, &self.context.topology, &self.context.routing);
                match decision {
                    Forward::Deliver => {
                        self.deliver(node, &pkt);
                        ctx.into_events()
                    }
                    Forward::Transmit { edge, side } => self.device_mut(edge, side).send(pkt, ctx),
                    Forward::Drop(_) => ctx.into_events(),
                }
            }
        }
    }

    fn deliver(&mut self, node: NodeId, pkt: &Packet) {
        let now = self.cur_time;
        let sink = self
            .bindings
            .get(&(node, pkt.flow))
            .and_then(|path| self.sinks.get_mut(path));
        let delivered = sink.is_some_and(|sink| sink.receive(pkt, now));
        if !delivered {
            self.undelivered += 1;
            tracing::debug!(node = %node, flow = %pkt.flow, dst = %pkt.dst, "no sink for packet");
        }
    }

    fn apply_timeline(&mut self, cmd: TimelineCmd) -> EventList {
        let ctx = self.context();
        match cmd {
            TimelineCmd::Apply(Action::SetCapacity { edge, capacity }) => {
                if let Err(e) = self.context.topology.set_capacity(edge, capacity) {
                    tracing::error!(error = %e, "dropping edge event");
                    return ctx.into_events();
                }
                let rate = self.context.params.rate(capacity);
                for side in Side::BOTH {
                    self.device_mut(edge, side).set_rate(rate);
                }
                tracing::info!(
                    time_secs = ctx.cur_time.into_secs_f64(),
                    %edge,
                    capacity,
                    %rate,
                    "edge capacity changed"
                );
                ctx.into_events()
            }
            TimelineCmd::Apply(Action::SetRate { path, flow, rate }) => {
                let params = &self.context.params;
                let offered = Generator::rate_for(rate, |r| params.rate(r));
                tracing::info!(
                    time_secs = ctx.cur_time.into_secs_f64(),
                    %path,
                    %flow,
                    rate = ?offered,
                    "path rate changed"
                );
                self.generator_mut(path).change_rate(offered, ctx)
            }
        }
    }

    fn apply_stats(&mut self, cmd: StatsCmd) -> EventList {
        let ctx = self.context();
        match cmd {
            StatsCmd::Sample => {
                let (generators, sinks, devices) = (&self.generators, &self.sinks, &self.devices);
                self.context.stats.sample(
                    ctx.cur_time,
                    |path| {
                        (
                            generators.get(&path).map_or(Bytes::ZERO, |g| g.bytes_sent()),
                            sinks.get(&path).map_or(Bytes::ZERO, |s| s.bytes_received()),
                        )
                    },
                    |edge, side| {
                        devices
                            .get(device_index(edge, side))
                            .map_or(0, Device::queue_len)
                    },
                );
            }
        }
        ctx.into_events()
    }
}

/// Builds the entities of a run from its context.
pub(crate) fn build(context: SimulationContext) -> Simulation {
    let params = &context.params;
    let topology = &context.topology;
    let nodes = (0..topology.nr_nodes())
        .map(|n| Node::new(NodeId::new(n)))
        .collect();
    let devices = topology
        .sides()
        .map(|(edge, side, _)| {
            let (capacity, peer) = topology
                .edge(edge)
                .map(|e| (e.capacity, e.endpoint(side.other())))
                .unwrap_or_default();
            tracing::debug!(%edge, %side, %peer, capacity, "installing device");
            Device::builder()
                .edge(edge)
                .side(side)
                .peer(peer)
                .rate(params.rate(capacity))
                .delay(params.link_delay)
                .queue(crate::queue::DropTailQ::new(params.queue_size))
                .build()
        })
        .collect();
    let mut generators = FxHashMap::default();
    let mut sinks = FxHashMap::default();
    let mut bindings = FxHashMap::default();
    for (id, demand, path) in context.demands.paths() {
        let dst = crate::routing::destination_address(topology, demand, path)
            .unwrap_or(Ipv4Addr::UNSPECIFIED);
        let offered = Generator::rate_for(path.initial_rate, |r| params.rate(r));
        tracing::debug!(path = %id, flow = %path.flow, %dst, rate = ?offered, "installing applications");
        let generator = Generator::builder()
            .path(id)
            .flow(path.flow)
            .node(demand.from)
            .dst(dst)
            .packet_size(params.packet_size)
            .rate(offered.unwrap_or(Generator::PLACEHOLDER))
            .enabled(offered.is_some())
            .end(params.end_apps_time)
            .build();
        let sink = Sink::builder().path(id).node(demand.to).build();
        generators.insert(id, generator);
        sinks.insert(id, sink);
        bindings.insert((demand.to, path.flow), id);
    }
    Simulation::builder()
        .context(context)
        .nodes(nodes)
        .devices(devices)
        .generators(generators)
        .sinks(sinks)
        .bindings(bindings)
        .build()
}

#[derive(Debug, Clone, derive_more::From)]
pub(crate) enum Command {
    App(AppCmd),
    Generator(GeneratorCmd),
    Device(DeviceCmd),
    Node(NodeCmd),
    Timeline(TimelineCmd),
    Stats(StatsCmd),
    Test,
}

#[derive(Debug)]
pub(crate) struct Context {
    pub(crate) cur_time: Time,
    events: EventList,
}

impl Context {
    pub(crate) fn new(cur_time: Time) -> Self {
        Self {
            cur_time,
            events: EventList::new(),
        }
    }

    pub(crate) fn schedule(&mut self, delta: Delta, cmd: impl Into<Command>) {
        let time = self.cur_time + delta;
        self.events.push(Event::new(time, cmd.into()));
    }

    pub(crate) fn schedule_now(&mut self, cmd: impl Into<Command>) {
        self.schedule(Delta::ZERO, cmd);
    }

    pub(crate) fn into_events(self) -> EventList {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{demand::Demands, params::Params, timeline::Timeline, topology::Topology};

    fn simulation(events: &str) -> anyhow::Result<Simulation> {
        let params = Params::builder()
            .flow_unit("kbps".parse()?)
            .scale(2.0)
            .edge_bandwidth_margin(1.0)
            .end_simulation_time(Time::from_secs_f64(5.0))
            .build();
        let topology = Topology::parse("graph", "3 2\n0 1\n1 2\n500 500\n", &params)?;
        let demands = Demands::parse(
            "routing",
            "1\n0 0 2 50 1\n0 7 2 50\n0 0 1\n1 1 2\n",
            &params,
            &topology,
        )?;
        let timeline = Timeline::parse("events", events, &params)?;
        let context = SimulationContext::new(params, topology, demands, &timeline)?;
        Ok(build(context))
    }

    fn run_to_end(sim: &mut Simulation) {
        sim.register_all();
        while !sim.should_stop() {
            sim.step();
        }
    }

    #[test]
    fn same_time_edge_events_apply_in_file_order_to_both_sides() -> anyhow::Result<()> {
        let mut sim = simulation("2\n3 1 200\n3 1 400\n0\n")?;
        run_to_end(&mut sim);
        let edge = sim.context.topology.edge(EdgeId::ONE).unwrap();
        assert!((edge.capacity - 800.0).abs() < 1e-9);
        for side in Side::BOTH {
            assert_eq!(sim.device_mut(EdgeId::ONE, side).rate().into_u64(), 800_000);
        }
        // The other link is untouched
        assert_eq!(sim.device_mut(EdgeId::ZERO, Side::B).rate().into_u64(), 1_000_000);
        Ok(())
    }

    #[test]
    fn edge_events_past_the_horizon_never_fire() -> anyhow::Result<()> {
        let mut sim = simulation("1\n5 1 200\n0\n")?;
        run_to_end(&mut sim);
        let edge = sim.context.topology.edge(EdgeId::ONE).unwrap();
        assert!((edge.capacity - 1_000.0).abs() < 1e-9);
        assert!(sim.cur_time < Time::from_secs_f64(5.0));
        Ok(())
    }
}
