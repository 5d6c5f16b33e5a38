#[macro_use]
mod ident;

pub mod context;
pub mod data;
pub mod demand;
pub mod driver;
pub mod params;
pub mod routing;
pub mod stats;
pub mod time;
pub mod timeline;
pub mod topology;
pub mod units;

pub(crate) mod entities;
pub(crate) mod packet;
pub(crate) mod queue;
pub(crate) mod reader;
pub(crate) mod simulation;

pub use context::SimulationContext;
pub use data::{PathRecord, QueueRecord, Report, Summary};
pub use demand::{DemandId, FlowId, PathId, PathRef};
pub use driver::{Error, Inputs};
pub use params::Params;
pub use topology::{EdgeId, NodeId, Side};
