use std::net::Ipv4Addr;

use crate::{
    demand::{FlowId, PathRef},
    entities::{endpoint::TrafficEndpoint, node::NodeCmd},
    packet::Packet,
    simulation::{event::EventList, Context},
    time::{Delta, Time},
    topology::NodeId,
    units::{BitsPerSec, Bytes},
};

/// Requested rates closer to zero than this, in flow units, are treated as zero.
pub(crate) const ZERO_RATE_EPSILON: f64 = 1e-7;

/// Delay between a rate change and the end of the current sending cycle.
pub(crate) const STOP_OFFSET: Delta = Delta::from_nanos(10);

/// Delay between a rate change and the start of the next sending cycle.
pub(crate) const RESTART_OFFSET: Delta = Delta::from_nanos(20);

/// The constant-rate sending half of a path.
///
/// A generator emits one packet of `packet_size` payload bytes every `packet_size * 8 / rate`
/// seconds while its cycle runs. A zero rate disables the generator: its rate reads as
/// [`Generator::PLACEHOLDER`] and its cycles schedule no packets at all.
#[derive(Debug, Clone, typed_builder::TypedBuilder)]
pub(crate) struct Generator {
    path: PathRef,
    flow: FlowId,
    node: NodeId,
    dst: Ipv4Addr,
    packet_size: Bytes,
    #[builder(setter(into))]
    rate: BitsPerSec,
    #[builder(default = true)]
    enabled: bool,
    /// No cycle (re)starts at or after this time.
    end: Time,

    #[builder(default, setter(skip))]
    phase: Phase,
    // Bumped whenever a cycle ends, which turns outstanding `Send`s into no-ops
    #[builder(default, setter(skip))]
    version: u64,

    // Counters
    #[builder(default, setter(skip))]
    bytes_sent: Bytes,
    #[builder(default, setter(skip))]
    pub(crate) packets_sent: u64,
}

impl Generator {
    pub(crate) const PLACEHOLDER: BitsPerSec = BitsPerSec::ONE;

    /// Maps a requested rate onto a generator rate; `None` means the request was zero.
    pub(crate) fn rate_for(
        requested: f64,
        to_rate: impl FnOnce(f64) -> BitsPerSec,
    ) -> Option<BitsPerSec> {
        (requested.abs() >= ZERO_RATE_EPSILON).then(|| to_rate(requested))
    }

    pub(crate) fn offered_rate(&self) -> BitsPerSec {
        self.rate
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn apply(&mut self, offered: Option<BitsPerSec>) {
        match offered {
            Some(rate) => self.set_rate(rate),
            None => {
                self.rate = Self::PLACEHOLDER;
                self.enabled = false;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    fn period(&self) -> Delta {
        self.rate.length(self.packet_size)
    }

    fn begin_cycle(&mut self, mut ctx: Context) -> EventList {
        self.phase = Phase::Running;
        self.version += 1;
        if self.enabled {
            ctx.schedule(self.period(), GeneratorCmd::new_send(self.path, self.version));
        }
        ctx.into_events()
    }

    fn end_cycle(&mut self) {
        self.version += 1;
    }

    #[must_use]
    pub(crate) fn send(&mut self, version: u64, mut ctx: Context) -> EventList {
        if version != self.version || !self.enabled || !self.phase.is_sending() {
            return ctx.into_events();
        }
        let pkt = Packet::builder()
            .flow(self.flow)
            .dst(self.dst)
            .size(self.packet_size)
            .t_sent(ctx.cur_time)
            .build();
        self.bytes_sent += pkt.size;
        self.packets_sent += 1;
        ctx.schedule_now(NodeCmd::new_receive(self.node, pkt));
        ctx.schedule(self.period(), GeneratorCmd::new_send(self.path, self.version));
        ctx.into_events()
    }

    /// First step of a rate change: the current cycle keeps running until the stop offset.
    #[must_use]
    pub(crate) fn change_rate(
        &mut self,
        offered: Option<BitsPerSec>,
        mut ctx: Context,
    ) -> EventList {
        match self.phase {
            Phase::Stopped => {
                // Nothing to restart; the rate takes effect at the next start
                self.apply(offered);
            }
            Phase::Running | Phase::Stopping { .. } | Phase::Restarting => {
                self.phase = Phase::Stopping { offered };
                ctx.schedule(STOP_OFFSET, GeneratorCmd::new_stop_cycle(self.path));
            }
        }
        tracing::debug!(
            path = %self.path,
            flow = %self.flow,
            rate = ?offered,
            enabled = offered.is_some(),
            "rate change requested"
        );
        ctx.into_events()
    }

    /// Second step: stop sending and apply the pending rate.
    #[must_use]
    pub(crate) fn stop_cycle(&mut self, mut ctx: Context) -> EventList {
        if let Phase::Stopping { offered } = self.phase {
            self.end_cycle();
            self.apply(offered);
            self.phase = Phase::Restarting;
            ctx.schedule(
                RESTART_OFFSET - STOP_OFFSET,
                GeneratorCmd::new_restart_cycle(self.path),
            );
        }
        ctx.into_events()
    }

    /// Final step: start a fresh cycle at the new rate.
    #[must_use]
    pub(crate) fn restart_cycle(&mut self, ctx: Context) -> EventList {
        if self.phase != Phase::Restarting {
            return ctx.into_events();
        }
        if ctx.cur_time >= self.end {
            self.phase = Phase::Stopped;
            return ctx.into_events();
        }
        self.begin_cycle(ctx)
    }
}

impl TrafficEndpoint for Generator {
    fn start(&mut self, ctx: Context) -> EventList {
        if self.phase != Phase::Stopped || ctx.cur_time >= self.end {
            return ctx.into_events();
        }
        self.begin_cycle(ctx)
    }

    fn stop(&mut self, ctx: Context) -> EventList {
        self.end_cycle();
        self.phase = Phase::Stopped;
        ctx.into_events()
    }

    fn set_rate(&mut self, rate: BitsPerSec) {
        self.rate = rate;
        self.enabled = true;
    }

    fn bytes_sent(&self) -> Bytes {
        self.bytes_sent
    }

    fn bytes_received(&self) -> Bytes {
        Bytes::ZERO
    }
}

/// Where a generator is in its sending cycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, derivative::Derivative)]
#[derivative(Default)]
pub(crate) enum Phase {
    #[derivative(Default)]
    Stopped,
    Running,
    /// A rate change is pending; the old cycle is still sending. `None` disables.
    Stopping { offered: Option<BitsPerSec> },
    Restarting,
}

impl Phase {
    fn is_sending(self) -> bool {
        matches!(self, Phase::Running | Phase::Stopping { .. })
    }
}

#[derive(Debug, Clone, derive_new::new)]
pub(crate) enum GeneratorCmd {
    Send { path: PathRef, version: u64 },
    StopCycle { path: PathRef },
    RestartCycle { path: PathRef },
}
