use powsim_chain::block::{Block, Hash, Header};
use powsim_chain::transaction::Transaction;

use crate::NodeId;

use super::Command;

/// Workload command recognized by miners: assemble and announce the next
/// block.
pub const WORKLOAD_NEW_BLOCK: &str = "new_block";

/// Workload command: build and broadcast a transfer, `params = [peer, amount]`.
pub const WORKLOAD_TX: &str = "tx";

/// A peer-to-peer message payload, one variant per command.
///
/// Broadcast copies are made by cloning the variant, so every recipient owns
/// its message and nothing is aliased between nodes.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// `nodeversion`, opening the handshake; carries the sender's chain
    /// height so the receiver can decide whether to request headers.
    NodeVersion { chain_height: usize },

    /// `verack`, completing the handshake.
    Verack,

    /// `reject`: the sender refused a message or the connection itself.
    Reject { reason: String, disconnect: bool },

    /// `getaddr`: a poll for known peer addresses.
    GetAddr,

    /// `addrs`: a gossip sample of the sender's address book.
    Addrs(Vec<NodeId>),

    /// `getheaders`: request headers for the chain suffix after `locator`.
    GetHeaders { locator: Hash },

    /// `headers`: an ordered, parent-linked run of block headers.
    Headers(Vec<Header>),

    /// `getblocks`: request full blocks for the chain suffix after `locator`.
    GetBlocks { locator: Hash },

    /// `blocks`: full blocks, oldest first.
    Blocks(Vec<Block>),

    /// `tx`: one relayed transaction.
    Tx(Transaction),
}

impl Message {
    /// The command tag this payload travels under.
    pub fn command(&self) -> Command {
        match self {
            Message::NodeVersion { .. } => Command::NodeVersion,
            Message::Verack => Command::Verack,
            Message::Reject { .. } => Command::Reject,
            Message::GetAddr => Command::GetAddr,
            Message::Addrs(_) => Command::Addrs,
            Message::GetHeaders { .. } => Command::GetHeaders,
            Message::Headers(_) => Command::Headers,
            Message::GetBlocks { .. } => Command::GetBlocks,
            Message::Blocks(_) => Command::Blocks,
            Message::Tx(_) => Command::Tx,
        }
    }
}

/// The envelope every peer message travels in.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// The sending node.
    pub source: NodeId,

    /// The sender's protocol version.
    pub version: u32,

    pub message: Message,
}

/// An event a node schedules to itself at a future simulation time.
///
/// Self-events bypass the scope gate and the per-peer inbound queues; they
/// are dispatched the moment the kernel delivers them.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SelfEvent {
    /// Drain the per-peer queues and flush pending sends.
    CheckQueues,
    /// Proactively advertise addresses. Retired in favor of polling; kept as
    /// a recognized no-op command.
    AdvertiseAddrs,
    /// Rewrite the peers file from the address book.
    DumpAddr,
    /// Broadcast `getaddr` to every connected peer.
    PollAddrs,
    /// Validate queued transactions against the tip (miners only).
    Mine,
}

impl SelfEvent {
    /// The self-command name, for logs.
    pub fn name(self) -> &'static str {
        match self {
            SelfEvent::CheckQueues => "checkqueues",
            SelfEvent::AdvertiseAddrs => "advertiseaddrs",
            SelfEvent::DumpAddr => "dumpaddr",
            SelfEvent::PollAddrs => "polladdrs",
            SelfEvent::Mine => "mine",
        }
    }
}

/// An event injected by the external workload schedule.
///
/// The command vocabulary is open-ended at this layer; nodes log and drop
/// commands they do not recognize.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadMessage {
    pub command: String,
    pub params: Vec<i64>,
}
