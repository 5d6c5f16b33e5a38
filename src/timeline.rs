use std::path::Path;

use crate::{
    demand::{Demands, FlowId, PathRef},
    driver::Error,
    params::Params,
    reader::{self, Tokens},
    time::Time,
    topology::{EdgeId, Topology},
};

/// A change of a link's capacity, applied to both of its directions.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EdgeRateEvent {
    pub time: Time,
    pub edge: EdgeId,
    /// New capacity in scaled flow units.
    pub capacity: f64,
}

/// A change of the offered rate of the path carrying `flow`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TrafficRateEvent {
    pub time: Time,
    pub flow: FlowId,
    /// New rate in scaled flow units. Zero disables the path's generator.
    pub rate: f64,
}

/// The two event streams of a run, in file order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Timeline {
    pub edge_events: Vec<EdgeRateEvent>,
    pub traffic_events: Vec<TrafficRateEvent>,
}

impl Timeline {
    /// Loads the events file. A missing file yields an empty timeline.
    pub fn load(path: impl AsRef<Path>, params: &Params) -> Result<Self, Error> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "reading events");
        match reader::read_optional(path)? {
            Some(text) => Self::parse(&path.display().to_string(), &text, params),
            None => {
                tracing::warn!(path = %path.display(), "no events file, running without events");
                Ok(Self::default())
            }
        }
    }

    /// Parses a count and `time edgeId capacity` rows, then a count and `time flowId rate` rows.
    pub fn parse(file: &str, text: &str, params: &Params) -> Result<Self, Error> {
        let mut toks = Tokens::new(file, text);
        let nr_edge_events: usize = toks.next("edge event count")?;
        let mut edge_events = Vec::with_capacity(nr_edge_events);
        for _ in 0..nr_edge_events {
            let time = Time::from_secs_f64(toks.next("edge event time")?);
            let edge = toks.next("edge event edge id")?;
            let capacity = params.capacity(toks.next("edge event capacity")?);
            edge_events.push(EdgeRateEvent {
                time,
                edge,
                capacity,
            });
        }
        let nr_traffic_events: usize = toks.next("traffic event count")?;
        let mut traffic_events = Vec::with_capacity(nr_traffic_events);
        for _ in 0..nr_traffic_events {
            let time = Time::from_secs_f64(toks.next("traffic event time")?);
            let flow = toks.next("traffic event flow id")?;
            let rate = params.volume(toks.next("traffic event rate")?);
            traffic_events.push(TrafficRateEvent { time, flow, rate });
        }
        tracing::info!(
            edge_events = edge_events.len(),
            traffic_events = traffic_events.len(),
            "events loaded"
        );
        Ok(Self {
            edge_events,
            traffic_events,
        })
    }

    pub fn len(&self) -> usize {
        self.edge_events.len() + self.traffic_events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks every event against the model and resolves traffic events to their paths.
    ///
    /// The result holds edge events first and then traffic events, each in file order, which is
    /// the order they are registered with the scheduler.
    pub fn resolve(
        &self,
        params: &Params,
        topology: &Topology,
        demands: &Demands,
    ) -> Result<Vec<Scheduled>, Error> {
        let mut scheduled = Vec::with_capacity(self.len());
        for (i, ev) in self.edge_events.iter().enumerate() {
            if topology.edge(ev.edge).is_none() {
                return Err(Error::UnknownEdge {
                    context: format!("edge event {i}"),
                    edge: ev.edge,
                });
            }
            if !(ev.capacity > 0.0) {
                return Err(Error::InvalidCapacity {
                    context: format!("edge event {i}"),
                    value: ev.capacity,
                });
            }
            scheduled.push(Scheduled {
                time: ev.time,
                action: Action::SetCapacity {
                    edge: ev.edge,
                    capacity: ev.capacity,
                },
            });
        }
        for ev in &self.traffic_events {
            let path = demands.resolve(ev.flow).ok_or(Error::UnknownFlow {
                time: ev.time.into_secs_f64(),
                flow: ev.flow,
            })?;
            scheduled.push(Scheduled {
                time: ev.time,
                action: Action::SetRate {
                    path,
                    flow: ev.flow,
                    rate: ev.rate,
                },
            });
        }
        let late = scheduled
            .iter()
            .filter(|s| s.time >= params.end_simulation_time)
            .count();
        if late > 0 {
            tracing::warn!(late, "events at or after the end of the simulation will not fire");
        }
        Ok(scheduled)
    }
}

/// A resolved event, ready to be registered with the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct Scheduled {
    pub time: Time,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetCapacity {
        edge: EdgeId,
        capacity: f64,
    },
    SetRate {
        path: PathRef,
        flow: FlowId,
        rate: f64,
    },
}

#[derive(Debug, Clone, derive_new::new)]
pub(crate) enum TimelineCmd {
    Apply(Action),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demand::{DemandId, PathId};

    fn params() -> Params {
        Params::builder().scale(10.0).edge_bandwidth_margin(2.0).build()
    }

    fn model(params: &Params) -> (Topology, Demands) {
        let topo = Topology::parse("graph", "3 2\n0 1\n1 2\n1 1\n", params).unwrap();
        let demands = Demands::parse(
            "routing",
            "1\n0 0 2 1 1\n0 7 2 1\n0 0 1\n1 1 2\n",
            params,
            &topo,
        )
        .unwrap();
        (topo, demands)
    }

    #[test]
    fn parse_scales_values() -> anyhow::Result<()> {
        let timeline = Timeline::parse("events", "1\n2.5 1 3\n2\n5 7 0\n10 7 1.5\n", &params())?;
        assert_eq!(timeline.len(), 3);
        let edge = &timeline.edge_events[0];
        assert_eq!(edge.time, Time::from_secs_f64(2.5));
        assert_eq!(edge.edge, EdgeId::ONE);
        assert!((edge.capacity - 60.0).abs() < 1e-9);
        let traffic = &timeline.traffic_events[1];
        assert_eq!(traffic.flow, FlowId::new(7));
        assert!((traffic.rate - 15.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn resolve_orders_edge_events_first() -> anyhow::Result<()> {
        let params = params();
        let (topo, demands) = model(&params);
        let timeline = Timeline::parse("events", "1\n5 0 3\n1\n1 7 0\n", &params)?;
        let scheduled = timeline.resolve(&params, &topo, &demands)?;
        let path = PathRef::new(DemandId::ZERO, PathId::ZERO);
        assert!(matches!(scheduled[0].action, Action::SetCapacity { edge, .. } if edge == EdgeId::ZERO));
        assert!(matches!(scheduled[1].action, Action::SetRate { path: p, .. } if p == path));
        Ok(())
    }

    #[test]
    fn unresolvable_flow_is_fatal() -> anyhow::Result<()> {
        let params = params();
        let (topo, demands) = model(&params);
        let timeline = Timeline::parse("events", "0\n1\n1 8 0\n", &params)?;
        let err = timeline.resolve(&params, &topo, &demands).unwrap_err();
        assert!(matches!(err, Error::UnknownFlow { flow, .. } if flow == FlowId::new(8)));
        Ok(())
    }

    #[test]
    fn unknown_edge_is_fatal() -> anyhow::Result<()> {
        let params = params();
        let (topo, demands) = model(&params);
        let timeline = Timeline::parse("events", "1\n1 5 1\n0\n", &params)?;
        let err = timeline.resolve(&params, &topo, &demands).unwrap_err();
        assert!(matches!(err, Error::UnknownEdge { edge, .. } if edge == EdgeId::new(5)));
        Ok(())
    }

    #[test]
    fn missing_file_is_an_empty_timeline() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let timeline = Timeline::load(dir.path().join("events.txt"), &params())?;
        assert!(timeline.is_empty());
        Ok(())
    }

    #[test]
    fn truncated_traffic_events() {
        let err = Timeline::parse("events", "0\n2\n1 7 0\n", &params()).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
