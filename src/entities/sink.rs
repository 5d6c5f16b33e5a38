use crate::{
    demand::PathRef,
    entities::endpoint::TrafficEndpoint,
    packet::Packet,
    simulation::{event::EventList, Context},
    time::Time,
    topology::NodeId,
    units::{BitsPerSec, Bytes},
};

/// The receiving half of a path, bound on the destination node to the path's flow id.
#[derive(Debug, Clone, typed_builder::TypedBuilder)]
pub(crate) struct Sink {
    path: PathRef,
    node: NodeId,
    #[builder(default, setter(skip))]
    listening: bool,

    // Counters
    #[builder(default, setter(skip))]
    bytes_received: Bytes,
    #[builder(default, setter(skip))]
    pub(crate) packets_received: u64,
    #[builder(default, setter(skip))]
    pub(crate) last_arrival: Option<Time>,
}

impl Sink {
    /// Accounts for a delivered packet. Packets that arrive while the sink is not listening are
    /// discarded and reported back as `false`.
    pub(crate) fn receive(&mut self, pkt: &Packet, now: Time) -> bool {
        if !self.listening {
            tracing::debug!(path = %self.path, node = %self.node, "sink not listening, discarding packet");
            return false;
        }
        tracing::trace!(
            path = %self.path,
            delay_secs = now.saturating_sub(pkt.t_sent).into_secs_f64(),
            "packet received"
        );
        self.bytes_received += pkt.size;
        self.packets_received += 1;
        self.last_arrival = Some(now);
        true
    }
}

impl TrafficEndpoint for Sink {
    fn start(&mut self, ctx: Context) -> EventList {
        self.listening = true;
        ctx.into_events()
    }

    fn stop(&mut self, ctx: Context) -> EventList {
        self.listening = false;
        ctx.into_events()
    }

    fn set_rate(&mut self, _rate: BitsPerSec) {}

    fn bytes_sent(&self) -> Bytes {
        Bytes::ZERO
    }

    fn bytes_received(&self) -> Bytes {
        self.bytes_received
    }
}
