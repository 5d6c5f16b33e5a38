use std::{
    fs::{self, File},
    io::BufWriter,
    path::Path,
};

use crate::{
    demand::{DemandId, FlowId, PathId},
    driver::Error,
    stats::Stats,
    topology::{EdgeId, NodeId, Side},
    units::{BitsPerSec, Bytes},
};

/// End-of-run totals for one path.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PathRecord {
    pub demand: DemandId,
    pub path: PathId,
    pub flow: FlowId,
    /// Payload bytes emitted by the generator.
    pub bytes_sent: Bytes,
    /// Payload bytes accepted by the sink.
    pub bytes_received: Bytes,
    pub packets_sent: u64,
    pub packets_received: u64,
    /// The generator's rate when the run ended, unless it was disabled.
    pub final_rate: Option<BitsPerSec>,
    /// Whether the generator ended the run with a non-zero rate.
    pub enabled: bool,
    pub last_arrival_secs: Option<f64>,
}

impl PathRecord {
    /// Bytes sent but never delivered, whether dropped or still in flight.
    pub fn lost(&self) -> Bytes {
        self.bytes_sent.saturating_sub(self.bytes_received)
    }
}

/// End-of-run totals for the device on one side of an edge.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueueRecord {
    pub edge: EdgeId,
    pub side: Side,
    pub node: NodeId,
    /// Link capacity at the end of the run, in scaled flow units.
    pub capacity: f64,
    pub rate: BitsPerSec,
    pub transmitted: u64,
    pub dropped: u64,
    pub queued_at_end: usize,
}

/// A machine-readable digest of a run, written next to the sample files.
#[derive(Debug, Clone, typed_builder::TypedBuilder, serde::Serialize, serde::Deserialize)]
pub struct Summary {
    pub events: u64,
    pub sim_end_secs: f64,
    /// Wall-clock time spent loading inputs and building the model.
    #[builder(default)]
    pub init_secs: f64,
    /// Wall-clock time spent running the simulation.
    #[builder(default)]
    pub run_secs: f64,
    /// Packets dropped by nodes for lack of a usable route.
    pub routing_drops: u64,
    /// Packets that reached their destination node while no sink was listening.
    pub undelivered: u64,
    pub paths: Vec<PathRecord>,
    pub queues: Vec<QueueRecord>,
}

impl Summary {
    pub fn lost(&self) -> Bytes {
        self.paths.iter().map(PathRecord::lost).sum()
    }

    pub fn queue_drops(&self) -> u64 {
        self.queues.iter().map(|q| q.dropped).sum()
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct Report {
    pub stats: Stats,
    pub summary: Summary,
}

impl Report {
    /// Flushes the sample series to `dir`, and the summary too when `summary` is set.
    pub fn write(&self, dir: impl AsRef<Path>, summary: bool) -> Result<(), Error> {
        let dir = dir.as_ref();
        self.stats.flush(dir)?;
        if summary {
            fs::create_dir_all(dir)?;
            let path = dir.join("summary.json");
            let w = BufWriter::new(File::create(&path)?);
            serde_json::to_writer_pretty(w, &self.summary)?;
            tracing::info!(path = %path.display(), "summary written");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sent: u64, received: u64) -> PathRecord {
        PathRecord {
            demand: DemandId::ZERO,
            path: PathId::ZERO,
            flow: FlowId::new(7),
            bytes_sent: Bytes::new(sent),
            bytes_received: Bytes::new(received),
            packets_sent: sent / 1_000,
            packets_received: received / 1_000,
            final_rate: Some(BitsPerSec::new(8_000)),
            enabled: true,
            last_arrival_secs: None,
        }
    }

    #[test]
    fn loss_adds_up_over_paths() {
        let summary = Summary::builder()
            .events(10)
            .sim_end_secs(1.0)
            .routing_drops(0)
            .undelivered(0)
            .paths(vec![record(5_000, 3_000), record(2_000, 2_000)])
            .queues(vec![])
            .build();
        assert_eq!(summary.paths[0].lost(), Bytes::new(2_000));
        assert_eq!(summary.lost(), Bytes::new(2_000));
        assert_eq!(summary.queue_drops(), 0);
    }

    #[test]
    fn summary_round_trips_through_json() -> anyhow::Result<()> {
        let summary = Summary::builder()
            .events(1)
            .sim_end_secs(0.5)
            .routing_drops(2)
            .undelivered(1)
            .paths(vec![record(1_000, 0)])
            .queues(vec![])
            .build();
        let json = serde_json::to_string(&summary)?;
        let back: Summary = serde_json::from_str(&json)?;
        assert_eq!(back.paths[0].bytes_sent, Bytes::new(1_000));
        assert_eq!(back.routing_drops, 2);
        Ok(())
    }
}
