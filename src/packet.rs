use std::net::Ipv4Addr;

use typed_builder::TypedBuilder;

use crate::{demand::FlowId, time::Time, units::Bytes};

/// A UDP datagram of one path.
///
/// The flow id travels with the packet so that every node can pick the route installed for the
/// path rather than the one for the destination alone. The destination port equals the flow id.
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub(crate) struct Packet {
    pub(crate) flow: FlowId,
    pub(crate) dst: Ipv4Addr,
    /// Application payload; this is what the byte counters count.
    pub(crate) size: Bytes,

    // Packet tracing
    #[builder(default)]
    pub(crate) t_sent: Time,
}

impl Packet {
    /// UDP (8), IPv4 (20) and point-to-point (2) header bytes added on the wire.
    pub(crate) const SZ_HDR: Bytes = Bytes::new(30);

    /// The number of bytes a device serializes for this packet.
    pub(crate) fn wire_size(&self) -> Bytes {
        self.size + Self::SZ_HDR
    }
}
