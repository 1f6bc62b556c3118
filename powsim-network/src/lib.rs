//! The per-node protocol engine for the proof-of-work network simulator.
//!
//! Each simulated node runs the same machinery a Bitcoin peer would:
//! a version/verack handshake, peer-address gossip, header-first chain
//! synchronization, and transaction relay. The engine is cooperative and
//! single-threaded; the surrounding discrete-event kernel delivers messages
//! and self-scheduled events through the [`EventContext`] trait, and the
//! node drains its per-peer queues on periodic `checkqueues` ticks.

pub mod address_book;
pub mod config;
mod context;
pub mod node;
pub mod peer;
pub mod protocol;

pub use address_book::AddressBook;
pub use config::NodeConfig;
pub use context::{EventContext, Gate};
pub use node::{Node, NodeError};
pub use peer::{Peer, PeerFlags};
pub use protocol::{Command, Envelope, Message, SelfEvent, WorkloadMessage};

/// A node (peer) identifier, globally unique within one simulation.
pub type NodeId = u32;

/// Simulation time, in whole seconds.
pub type SimTime = u64;
