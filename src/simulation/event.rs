#![allow(clippy::non_canonical_partial_ord_impl)]

use std::cmp::Reverse;

use smallvec::SmallVec;

use crate::time::Time;

use super::Command;

// Most handlers will not yield very many events
pub(crate) type EventList = SmallVec<[Event; 4]>;

/// A command due at a point in simulated time.
///
/// Events are ordered by time and then by the sequence number the schedule assigns on
/// insertion, so that events due at the same instant are dispatched in registration order.
#[derive(Debug, derivative::Derivative)]
#[derivative(PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Event {
    time: Reverse<Time>,
    seq: Reverse<u64>,
    #[derivative(PartialEq = "ignore", PartialOrd = "ignore", Ord = "ignore")]
    pub(crate) cmd: Command,
}

impl Event {
    pub(crate) fn new(time: Time, cmd: impl Into<Command>) -> Self {
        Self {
            time: Reverse(time),
            seq: Reverse(0),
            cmd: cmd.into(),
        }
    }

    pub(crate) fn time(&self) -> Time {
        self.time.0
    }

    pub(super) fn set_seq(&mut self, seq: u64) {
        self.seq = Reverse(seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_order() {
        let e1 = Event::new(Time::ZERO, Command::Test);
        let e2 = Event::new(Time::ONE, Command::Test);
        assert!(e1 > e2);
    }

    #[test]
    fn ties_break_on_sequence() {
        let mut e1 = Event::new(Time::ONE, Command::Test);
        let mut e2 = Event::new(Time::ONE, Command::Test);
        e1.set_seq(0);
        e2.set_seq(1);
        assert!(e1 > e2);
    }
}
