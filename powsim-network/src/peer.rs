//! Per-peer connection state.

use std::collections::VecDeque;

use bitflags::bitflags;

use powsim_chain::block::Block;

use crate::protocol::Envelope;

bitflags! {
    /// Connection state bits for one peer record.
    pub struct PeerFlags: u8 {
        /// We have sent this peer a `getaddr`. Reserved by the retired
        /// proactive-advertisement path.
        const HAS_GET_ADDR = 0b0000_0001;
        /// The version/verack handshake completed.
        const SUCCESSFULLY_CONNECTED = 0b0000_0010;
        /// The peer dialed us. Immutable once the record is created.
        const INBOUND = 0b0000_0100;
        /// We have answered this peer's `getaddr`. Reserved by the retired
        /// proactive-advertisement path.
        const HAS_SENT_ADDR = 0b0000_1000;
        /// Terminal: the record is dropped from the service ring on its next
        /// dequeue.
        const DISCONNECT = 0b0001_0000;
        /// The peer's receive buffer is full; skip servicing it.
        const PAUSE_SEND = 0b0010_0000;
        /// Our receive buffer for this peer is full.
        const PAUSE_RECEIVE = 0b0100_0000;
        /// The peer advertised a taller chain; ask it for headers once the
        /// handshake completes.
        const REQUEST_HEADERS = 0b1000_0000;
    }
}

/// Everything a node tracks about one neighbor.
///
/// Records are created when a connection is established and destroyed when
/// the scheduler drops a disconnected peer from its service ring.
#[derive(Debug)]
pub struct Peer {
    /// Pending incoming messages, drained in FIFO order, one per scheduler
    /// pass.
    pub inbound_queue: VecDeque<Envelope>,

    pub flags: PeerFlags,

    /// Protocol version the peer advertised; `0` until its `nodeversion`
    /// arrives.
    pub version: u32,

    /// Chain height the peer last advertised.
    pub known_height: usize,

    /// Blocks queued in response to `getblocks`, flushed as a single
    /// `blocks` message on the next send pass.
    pub blocks_to_send: Vec<Block>,
}

impl Peer {
    pub fn new(inbound: bool) -> Peer {
        let mut flags = PeerFlags::empty();
        if inbound {
            flags.insert(PeerFlags::INBOUND);
        }
        Peer {
            inbound_queue: VecDeque::new(),
            flags,
            version: 0,
            known_height: 0,
            blocks_to_send: Vec::new(),
        }
    }

    /// True once the handshake has completed and the peer is not being torn
    /// down.
    pub fn is_active(&self) -> bool {
        self.flags.contains(PeerFlags::SUCCESSFULLY_CONNECTED)
            && !self.flags.contains(PeerFlags::DISCONNECT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_peer_starts_unversioned() {
        let peer = Peer::new(true);
        assert!(peer.flags.contains(PeerFlags::INBOUND));
        assert_eq!(peer.version, 0);
        assert!(!peer.is_active());

        let outbound = Peer::new(false);
        assert!(!outbound.flags.contains(PeerFlags::INBOUND));
    }
}
