use crate::{
    entities::node::NodeCmd,
    packet::Packet,
    queue::DropTailQ,
    simulation::{event::EventList, Context},
    time::Delta,
    topology::{EdgeId, NodeId, Side},
    units::BitsPerSec,
};

/// The point-to-point device on one side of a link. It serializes packets onto the link at its
/// current rate and hands them to the peer node after the propagation delay.
#[derive(Debug, typed_builder::TypedBuilder)]
pub(crate) struct Device {
    edge: EdgeId,
    side: Side,
    /// The node at the other end of the link.
    peer: NodeId,
    #[builder(setter(into))]
    rate: BitsPerSec,
    delay: Delta,
    queue: DropTailQ,
    #[builder(default, setter(skip))]
    status: Status,

    // Counters
    #[builder(default, setter(skip))]
    pub(crate) transmitted: u64,
    #[builder(default, setter(skip))]
    pub(crate) dropped: u64,
}

impl Device {
    /// Packets waiting for the transmitter; the packet on the wire is not counted.
    pub(crate) fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn rate(&self) -> BitsPerSec {
        self.rate
    }

    /// Changes the transmission rate. A packet already being serialized keeps its old timing.
    pub(crate) fn set_rate(&mut self, rate: BitsPerSec) {
        self.rate = rate;
    }

    #[must_use]
    pub(crate) fn send(&mut self, pkt: Packet, ctx: Context) -> EventList {
        if let Err(pkt) = self.queue.enqueue(pkt) {
            self.dropped += 1;
            tracing::trace!(
                edge = %self.edge,
                side = %self.side,
                flow = %pkt.flow,
                "queue full, dropping packet"
            );
            return ctx.into_events();
        }
        match self.status {
            Status::Busy => ctx.into_events(),
            Status::Idle => {
                self.status = Status::Busy;
                self.step(ctx)
            }
        }
    }

    #[must_use]
    pub(crate) fn step(&mut self, mut ctx: Context) -> EventList {
        assert!(self.status == Status::Busy);
        match self.queue.dequeue() {
            Some(pkt) => {
                let tx_delta = self.rate.length(pkt.wire_size());
                ctx.schedule(tx_delta, DeviceCmd::new_tx_complete(self.edge, self.side));
                ctx.schedule(tx_delta + self.delay, NodeCmd::new_receive(self.peer, pkt));
                self.transmitted += 1;
            }
            None => {
                self.status = Status::Idle;
            }
        }
        ctx.into_events()
    }
}

#[derive(Debug, Clone, derive_new::new)]
pub(crate) enum DeviceCmd {
    TxComplete { edge: EdgeId, side: Side },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, derivative::Derivative)]
#[derivative(Default)]
enum Status {
    Busy,
    #[derivative(Default)]
    Idle,
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::{
        demand::FlowId,
        simulation::Command,
        time::Time,
        units::Bytes,
    };

    fn device(limit: usize) -> Device {
        Device::builder()
            .edge(EdgeId::ZERO)
            .side(Side::A)
            .peer(NodeId::ONE)
            .rate(BitsPerSec::new(8_000))
            .delay(Delta::from_secs_f64(0.5))
            .queue(DropTailQ::new(limit))
            .build()
    }

    fn pkt() -> Packet {
        // 70 payload bytes + 30 header bytes = 100 bytes = 0.1s at 8kbps
        Packet::builder()
            .flow(FlowId::ONE)
            .dst(Ipv4Addr::new(10, 1, 1, 2))
            .size(Bytes::new(70))
            .build()
    }

    fn ctx() -> Context {
        Context::new(Time::ZERO)
    }

    #[test]
    fn idle_device_transmits_immediately() {
        let mut dev = device(4);
        let events = dev.send(pkt(), ctx());
        assert_eq!(dev.queue_len(), 0);
        let times: Vec<_> = events.iter().map(|e| e.time()).collect();
        assert_eq!(
            times,
            vec![Time::from_secs_f64(0.1), Time::from_secs_f64(0.6)]
        );
        assert!(matches!(events[1].cmd, Command::Node(NodeCmd::Receive { node, .. }) if node == NodeId::ONE));
    }

    #[test]
    fn busy_device_queues_then_drops() {
        let mut dev = device(1);
        let _ = dev.send(pkt(), ctx());
        let queued = dev.send(pkt(), ctx());
        assert!(queued.is_empty());
        assert_eq!(dev.queue_len(), 1);
        let _ = dev.send(pkt(), ctx());
        assert_eq!(dev.dropped, 1);
        assert_eq!(dev.queue_len(), 1);

        // Finishing the first transmission starts the queued packet
        let events = dev.step(Context::new(Time::from_secs_f64(0.1)));
        assert_eq!(dev.queue_len(), 0);
        assert_eq!(events.len(), 2);
        assert_eq!(dev.transmitted, 2);

        // Nothing left: the device goes idle and the next packet starts right away
        let events = dev.step(Context::new(Time::from_secs_f64(0.2)));
        assert!(events.is_empty());
        let events = dev.send(pkt(), Context::new(Time::from_secs_f64(0.3)));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn rate_change_applies_to_next_packet() {
        let mut dev = device(4);
        dev.set_rate(BitsPerSec::new(16_000));
        assert_eq!(dev.rate(), BitsPerSec::new(16_000));
        let events = dev.send(pkt(), ctx());
        assert_eq!(events[0].time(), Time::from_secs_f64(0.05));
    }
}
