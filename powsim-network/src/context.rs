use crate::protocol::{Envelope, SelfEvent};
use crate::{NodeId, SimTime};

/// An opaque per-destination send token, handed out by the event kernel when
/// a connection is established.
///
/// A node never inspects a gate; it only maps peer ids to gates and hands
/// them back to the kernel with outgoing messages. Erasing the mapping is a
/// logical disconnect.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Gate(u64);

impl Gate {
    pub fn new(raw: u64) -> Gate {
        Gate(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A node's handle on the surrounding discrete-event kernel.
///
/// Handlers never block: they emit sends and future events through this
/// trait and return. The kernel applies the effects between handler
/// invocations, never during one, so simulation time only advances between
/// events.
pub trait EventContext {
    /// The current simulation time, in seconds.
    fn now(&self) -> SimTime;

    /// Deliver `envelope` to the peer behind `gate`.
    fn send(&mut self, gate: Gate, envelope: Envelope);

    /// Schedule `event` back to this node at `now() + delay` seconds.
    fn schedule_self(&mut self, delay: SimTime, event: SelfEvent);

    /// Ask the kernel to establish a bidirectional connection to `peer`.
    ///
    /// Ignored if the peer is unknown, offline, this node itself, or already
    /// connected.
    fn request_connect(&mut self, peer: NodeId);
}
