use crate::{
    demand::PathRef,
    simulation::{event::EventList, Context},
    units::{BitsPerSec, Bytes},
};

/// The generator/sink pair attached to every path.
///
/// Both halves are driven the same way by the kernel (start, stop, counters); only the generator
/// does anything with a rate.
pub(crate) trait TrafficEndpoint {
    #[must_use]
    fn start(&mut self, ctx: Context) -> EventList;

    #[must_use]
    fn stop(&mut self, ctx: Context) -> EventList;

    /// Writes the offered rate without touching the sending cycle.
    fn set_rate(&mut self, rate: BitsPerSec);

    /// Cumulative payload bytes handed to the network.
    fn bytes_sent(&self) -> Bytes;

    /// Cumulative payload bytes delivered.
    fn bytes_received(&self) -> Bytes;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Role {
    Generator,
    Sink,
}

#[derive(Debug, Clone, derive_new::new)]
pub(crate) enum AppCmd {
    Start { path: PathRef, role: Role },
    Stop { path: PathRef, role: Role },
}
