//! The messages simulated peers exchange, and the handshake scope rules
//! that gate them.

/// Command tags and their handshake scope bits.
mod command;
/// The tagged message variants and their envelope.
mod message;

pub use command::Command;
pub use message::{
    Envelope, Message, SelfEvent, WorkloadMessage, WORKLOAD_NEW_BLOCK, WORKLOAD_TX,
};
