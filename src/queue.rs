use std::collections::VecDeque;

use crate::packet::Packet;

/// A drop-tail FIFO bounded by a number of packets.
#[derive(Debug, Clone, derive_new::new)]
pub(crate) struct DropTailQ {
    limit: usize,
    #[new(default)]
    inner: VecDeque<Packet>,
}

impl DropTailQ {
    /// Appends `pkt`, handing it back if the queue is full.
    pub(crate) fn enqueue(&mut self, pkt: Packet) -> Result<(), Packet> {
        if self.inner.len() >= self.limit {
            return Err(pkt);
        }
        self.inner.push_back(pkt);
        Ok(())
    }

    delegate::delegate! {
        to self.inner {
            #[call(pop_front)]
            pub(crate) fn dequeue(&mut self) -> Option<Packet>;

            pub(crate) fn len(&self) -> usize;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::{demand::FlowId, units::Bytes};

    fn mk_pkt(flow: usize) -> Packet {
        Packet::builder()
            .flow(FlowId::new(flow))
            .dst(Ipv4Addr::LOCALHOST)
            .size(Bytes::new(100))
            .build()
    }

    #[test]
    fn drops_beyond_limit() {
        let mut q = DropTailQ::new(2);
        assert!(q.enqueue(mk_pkt(0)).is_ok());
        assert!(q.enqueue(mk_pkt(1)).is_ok());
        let rejected = q.enqueue(mk_pkt(2)).unwrap_err();
        assert_eq!(rejected.flow, FlowId::new(2));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn fifo_order() {
        let mut q = DropTailQ::new(8);
        for i in 0..3 {
            q.enqueue(mk_pkt(i)).unwrap();
        }
        let order: Vec<_> = std::iter::from_fn(|| q.dequeue()).map(|p| p.flow).collect();
        assert_eq!(order, vec![FlowId::new(0), FlowId::new(1), FlowId::new(2)]);
        assert_eq!(q.len(), 0);
    }
}
