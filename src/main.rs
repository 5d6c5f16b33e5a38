use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ftsim::{driver, Inputs};

/// Runs a flow-granular traffic-engineering simulation and writes per-path and per-queue
/// time series.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Directory holding params.txt, graph.txt, routing.txt and events.txt
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Parameters file (overrides the one in the data directory)
    #[arg(long)]
    params: Option<PathBuf>,

    /// Topology file (overrides the one in the data directory)
    #[arg(long)]
    graph: Option<PathBuf>,

    /// Demand and path file (overrides the one in the data directory)
    #[arg(long)]
    routing: Option<PathBuf>,

    /// Events file (overrides the one in the data directory)
    #[arg(long)]
    events: Option<PathBuf>,

    /// Where sample files are written
    #[arg(long, default_value = "res")]
    out_dir: PathBuf,

    /// Skip writing summary.json
    #[arg(long)]
    no_summary: bool,
}

impl Args {
    fn inputs(&self) -> Inputs {
        let mut inputs = Inputs::from_dir(&self.data_dir);
        if let Some(p) = &self.params {
            inputs.params = p.clone();
        }
        if let Some(p) = &self.graph {
            inputs.topology = p.clone();
        }
        if let Some(p) = &self.routing {
            inputs.demands = p.clone();
        }
        if let Some(p) = &self.events {
            inputs.events = p.clone();
        }
        inputs
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ftsim=info")),
        )
        .init();

    let args = Args::parse();
    let report = driver::execute(&args.inputs())?;
    report.write(&args.out_dir, !args.no_summary)?;
    Ok(())
}
