use std::collections::BinaryHeap;

use delegate::delegate;

use super::event::Event;

/// The pending event set. Ties in time are broken by insertion order.
#[derive(Debug, Default)]
pub(crate) struct Schedule {
    inner: BinaryHeap<Event>,
    next_seq: u64,
}

impl Schedule {
    pub(crate) fn push(&mut self, mut ev: Event) {
        ev.set_seq(self.next_seq);
        self.next_seq += 1;
        self.inner.push(ev);
    }

    delegate! {
        to self.inner {
            pub(crate) fn pop(&mut self) -> Option<Event>;
            pub(crate) fn peek(&self) -> Option<&Event>;
            pub(crate) fn is_empty(&self) -> bool;
            pub(crate) fn len(&self) -> usize;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        demand::{DemandId, PathId, PathRef},
        entities::generator::GeneratorCmd,
        simulation::Command,
        time::Time,
    };

    fn marker(i: usize) -> GeneratorCmd {
        GeneratorCmd::RestartCycle {
            path: PathRef::new(DemandId::new(i), PathId::ZERO),
        }
    }

    #[test]
    fn same_time_events_pop_in_insertion_order() {
        let mut schedule = Schedule::default();
        schedule.push(Event::new(Time::new(5), marker(0)));
        schedule.push(Event::new(Time::new(1), marker(1)));
        schedule.push(Event::new(Time::new(5), marker(2)));
        schedule.push(Event::new(Time::new(5), marker(3)));
        assert_eq!(schedule.len(), 4);
        let order: Vec<_> = std::iter::from_fn(|| schedule.pop())
            .map(|ev| match ev.cmd {
                Command::Generator(GeneratorCmd::RestartCycle { path }) => path.demand.into_usize(),
                other => panic!("unexpected command: {other:?}"),
            })
            .collect();
        assert_eq!(order, vec![1, 0, 2, 3]);
        assert!(schedule.is_empty());
    }
}
