use std::path::Path;

use crate::{
    driver::Error,
    reader::{self, Tokens},
    time::{Delta, Time},
    units::{BitsPerSec, Bytes, FlowUnit},
};

/// Run-wide scaling and timing parameters.
///
/// Every capacity, demand volume and path rate in the other input files is expressed in
/// `flow_unit`s and multiplied by `scale` at load time. Capacities are additionally multiplied by
/// `edge_bandwidth_margin`, which gives links headroom over the offered load.
#[derive(Debug, Clone, PartialEq, typed_builder::TypedBuilder, serde::Serialize)]
pub struct Params {
    #[builder(default)]
    pub flow_unit: FlowUnit,
    /// Generators and sinks start at this time.
    #[builder(default)]
    pub start_time: Time,
    /// Generators stop sending at this time; sinks keep receiving.
    #[builder(default = Time::from_secs_f64(20.0))]
    pub end_apps_time: Time,
    /// Hard horizon of the simulation clock.
    #[builder(default = Time::from_secs_f64(25.0))]
    pub end_simulation_time: Time,
    #[builder(default = Bytes::new(1_000))]
    pub packet_size: Bytes,
    /// Sampling cadence of the statistics engine.
    #[builder(default = Delta::from_secs_f64(0.01))]
    pub stats_delta: Delta,
    #[builder(default = 10_000.0)]
    pub scale: f64,
    #[builder(default = 1.03)]
    pub edge_bandwidth_margin: f64,
    /// Per-device queue limit, in packets.
    #[builder(default = 1_000)]
    pub queue_size: usize,
    /// Propagation delay of every link.
    #[builder(default = Delta::from_secs_f64(0.002))]
    pub link_delay: Delta,
}

impl Default for Params {
    fn default() -> Self {
        Params::builder().build()
    }
}

impl Params {
    /// Loads parameters from `path`, falling back to the defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "reading parameters");
        match reader::read_optional(path)? {
            Some(text) => Self::parse(&path.display().to_string(), &text),
            None => {
                tracing::info!("no parameters file, using default values");
                Ok(Self::default())
            }
        }
    }

    /// Parses `name value` pairs on top of the default values. An unrecognized name aborts the
    /// whole file.
    pub fn parse(file: &str, text: &str) -> Result<Self, Error> {
        let mut params = Self::default();
        let mut toks = Tokens::new(file, text);
        while let Some(name) = toks.try_next_str() {
            match name {
                "FLOW_UNIT" => params.flow_unit = toks.next_str("flow unit")?.parse()?,
                "START_SIMULATION_TIME" => params.start_time = Time::from_secs_f64(toks.next("seconds")?),
                "END_APPS_TIME" => params.end_apps_time = Time::from_secs_f64(toks.next("seconds")?),
                "END_SIMULATION_TIME" => {
                    params.end_simulation_time = Time::from_secs_f64(toks.next("seconds")?)
                }
                "PACKET_SIZE" => params.packet_size = toks.next("packet size in bytes")?,
                "STATS_DELTA_TIME" => params.stats_delta = Delta::from_secs_f64(toks.next("seconds")?),
                "SCALE" => params.scale = toks.next("scale factor")?,
                "EDGE_BANDWIDTH_MARGIN" => params.edge_bandwidth_margin = toks.next("bandwidth margin")?,
                "QUEUE_SIZE" => params.queue_size = toks.next("queue size in packets")?,
                "LINK_DELAY" => params.link_delay = Delta::from_secs_f64(toks.next("seconds")?),
                other => {
                    return Err(Error::UnknownParameter {
                        file: toks.file().to_owned(),
                        name: other.to_owned(),
                    })
                }
            }
        }
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.stats_delta == Delta::ZERO {
            return Err(Error::InvalidParameter {
                name: "STATS_DELTA_TIME",
                reason: "the sampling cadence must be positive",
            });
        }
        if self.packet_size == Bytes::ZERO {
            return Err(Error::InvalidParameter {
                name: "PACKET_SIZE",
                reason: "packets must carry at least one byte",
            });
        }
        if self.queue_size == 0 {
            return Err(Error::InvalidParameter {
                name: "QUEUE_SIZE",
                reason: "queues must hold at least one packet",
            });
        }
        Ok(())
    }

    /// Scales a raw link capacity from an input file.
    pub fn capacity(&self, raw: f64) -> f64 {
        raw * self.scale * self.edge_bandwidth_margin
    }

    /// Scales a raw demand volume or path rate from an input file.
    pub fn volume(&self, raw: f64) -> f64 {
        raw * self.scale
    }

    /// Converts a scaled figure into a rate usable by devices and generators.
    pub fn rate(&self, scaled: f64) -> BitsPerSec {
        self.flow_unit.to_rate(scaled)
    }
}
