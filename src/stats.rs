use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use crate::{
    demand::{Demands, PathRef},
    driver::Error,
    params::Params,
    time::{Delta, Time},
    topology::{EdgeId, NodeId, Side, Topology},
    units::Bytes,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FlowSample {
    pub time: Time,
    pub sent: Bytes,
    pub received: Bytes,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
pub struct QueueSample {
    pub time: Time,
    pub packets: usize,
}

/// The samples of one path.
#[derive(Debug, Clone)]
pub struct FlowSeries {
    pub path: PathRef,
    pub samples: Vec<FlowSample>,
}

impl FlowSeries {
    pub fn file_name(&self) -> String {
        format!("d{}p{}.txt", self.path.demand, self.path.path)
    }
}

/// The samples of the device on one side of an edge; `node` is the node on that side.
#[derive(Debug, Clone)]
pub struct QueueSeries {
    pub edge: EdgeId,
    pub side: Side,
    pub node: NodeId,
    pub samples: Vec<QueueSample>,
}

impl QueueSeries {
    pub fn file_name(&self) -> String {
        format!("e{}n{}.txt", self.edge, self.node)
    }
}

/// Append-only sample buffers for every path and every `(edge, side)`.
#[derive(Debug, Clone)]
pub struct Stats {
    delta: Delta,
    end: Time,
    flows: Vec<FlowSeries>,
    queues: Vec<QueueSeries>,
}

impl Stats {
    /// Allocates one series per path and per `(edge, side)`, each sized for the whole run.
    pub fn new(params: &Params, topology: &Topology, demands: &Demands) -> Self {
        let capacity = Self::nr_samples(params.stats_delta, params.end_simulation_time);
        let flows = demands
            .paths()
            .map(|(path, _, _)| FlowSeries {
                path,
                samples: Vec::with_capacity(capacity),
            })
            .collect();
        let queues = topology
            .sides()
            .map(|(edge, side, node)| QueueSeries {
                edge,
                side,
                node,
                samples: Vec::with_capacity(capacity),
            })
            .collect();
        Self {
            delta: params.stats_delta,
            end: params.end_simulation_time,
            flows,
            queues,
        }
    }

    /// The number of multiples of `delta` in `[0, end)`.
    pub fn nr_samples(delta: Delta, end: Time) -> usize {
        if delta == Delta::ZERO {
            return 0;
        }
        let count = end.into_u128().div_ceil(delta.into_u128());
        usize::try_from(count).unwrap_or(usize::MAX)
    }

    /// Every sampling instant of the run, in increasing order.
    pub fn sample_times(&self) -> impl Iterator<Item = Time> {
        let delta = self.delta;
        (0..Self::nr_samples(self.delta, self.end) as u128).map(move |k| delta.times(k).into_time())
    }

    /// Appends one sample to every series.
    pub fn sample(
        &mut self,
        now: Time,
        mut flow: impl FnMut(PathRef) -> (Bytes, Bytes),
        mut queue: impl FnMut(EdgeId, Side) -> usize,
    ) {
        for series in &mut self.flows {
            let (sent, received) = flow(series.path);
            series.samples.push(FlowSample {
                time: now,
                sent,
                received,
            });
        }
        for series in &mut self.queues {
            series.samples.push(QueueSample {
                time: now,
                packets: queue(series.edge, series.side),
            });
        }
    }

    pub fn flows(&self) -> &[FlowSeries] {
        &self.flows
    }

    pub fn queues(&self) -> &[QueueSeries] {
        &self.queues
    }

    /// Writes every series to its own file under `dir`, creating the directory if needed.
    pub fn flush(&self, dir: impl AsRef<Path>) -> Result<(), Error> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        for series in &self.flows {
            let mut w = BufWriter::new(File::create(dir.join(series.file_name()))?);
            writeln!(w, "time sent received")?;
            for s in &series.samples {
                writeln!(w, "{:.6} {} {}", s.time.into_secs_f64(), s.sent, s.received)?;
            }
            w.flush()?;
        }
        for series in &self.queues {
            let mut w = BufWriter::new(File::create(dir.join(series.file_name()))?);
            writeln!(w, "time noPackets")?;
            for s in &series.samples {
                writeln!(w, "{:.6} {}", s.time.into_secs_f64(), s.packets)?;
            }
            w.flush()?;
        }
        tracing::info!(
            dir = %dir.display(),
            flow_series = self.flows.len(),
            queue_series = self.queues.len(),
            "statistics written"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, derive_new::new)]
pub(crate) enum StatsCmd {
    Sample,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_count_is_half_open() {
        let delta = Delta::from_secs_f64(0.01);
        assert_eq!(Stats::nr_samples(delta, Time::from_secs_f64(25.0)), 2_500);
        assert_eq!(Stats::nr_samples(delta, Time::from_secs_f64(0.025)), 3);
        assert_eq!(Stats::nr_samples(delta, Time::ZERO), 0);
        assert_eq!(Stats::nr_samples(Delta::ZERO, Time::from_secs_f64(1.0)), 0);
    }

    #[test]
    fn sample_count_at_the_largest_horizon() {
        let end = Time::new(u128::MAX);
        assert_eq!(Stats::nr_samples(Delta::new(u128::MAX), end), 1);
        assert_eq!(Stats::nr_samples(Delta::new(u128::MAX - 1), end), 2);
        assert_eq!(Stats::nr_samples(Delta::ONE, end), usize::MAX);
    }

    fn stats(end: f64, delta: f64) -> Stats {
        let params = Params::builder()
            .end_simulation_time(Time::from_secs_f64(end))
            .stats_delta(Delta::from_secs_f64(delta))
            .build();
        let topo = Topology::parse("graph", "2 1\n0 1\n1\n", &params).unwrap();
        let demands =
            Demands::parse("routing", "1\n0 0 1 1 1\n0 3 1 1\n0 0 1\n", &params, &topo).unwrap();
        Stats::new(&params, &topo, &demands)
    }

    #[test]
    fn sample_times_are_exact_multiples() {
        let stats = stats(1.0, 0.1);
        let times: Vec<_> = stats.sample_times().collect();
        assert_eq!(times.len(), 10);
        assert_eq!(times[0], Time::ZERO);
        assert_eq!(times[9], Time::from_secs_f64(0.9));
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn flush_writes_one_row_per_sample() -> anyhow::Result<()> {
        let mut stats = stats(0.3, 0.1);
        assert_eq!(stats.flows().len(), 1);
        assert_eq!(stats.queues().len(), 2);
        let times: Vec<_> = stats.sample_times().collect();
        for (k, t) in times.into_iter().enumerate() {
            let k = k as u64;
            stats.sample(t, |_| (Bytes::new(100 * k), Bytes::new(50 * k)), |_, side| side.index());
        }
        let dir = tempfile::tempdir()?;
        stats.flush(dir.path())?;

        let flow = fs::read_to_string(dir.path().join("d0p0.txt"))?;
        assert_eq!(
            flow,
            "time sent received\n0.000000 0 0\n0.100000 100 50\n0.200000 200 100\n"
        );
        let queue = fs::read_to_string(dir.path().join("e0n1.txt"))?;
        assert_eq!(queue, "time noPackets\n0.000000 1\n0.100000 1\n0.200000 1\n");
        assert!(dir.path().join("e0n0.txt").exists());
        Ok(())
    }
}
