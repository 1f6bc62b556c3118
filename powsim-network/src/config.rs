//! Static per-node configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::NodeId;

/// The parameters one simulated node runs under.
///
/// Field names match the configuration names used by topology and schedule
/// files; the simulation layer derives one of these per node from its global
/// configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NodeConfig {
    /// Protocol version this node speaks.
    pub version: u32,

    /// Peers below this version are rejected and disconnected.
    pub min_accepted_version: u32,

    /// Seconds between scheduler ticks; also the address-poll and mine-tick
    /// interval.
    pub thread_schedule_interval: u64,

    /// Peer services per scheduler tick.
    pub max_message_process: usize,

    /// Cap on addresses per advertisement. Reserved by the retired
    /// proactive-advertisement path.
    pub max_addr_ad: usize,

    /// Relay fan-out per learned address. Reserved, as above.
    pub num_addr_relay: usize,

    /// Largest `addrs` payload that still triggers relaying. Reserved, as
    /// above.
    pub addr_relay_vec_size: usize,

    /// Seconds between rewrites of the peers file.
    pub dump_addresses_interval: u64,

    /// Root directory for peers files and block checkpoints.
    pub data_dir: PathBuf,

    /// Nodes that accept connections but never dial out; also the address
    /// bootstrap list for a fresh network.
    pub default_node_list: Vec<NodeId>,

    /// Fraction of the address book included in a gossip response.
    pub random_address_fraction: f64,

    /// Ignore on-disk state and start from an empty network.
    pub new_network: bool,

    /// Blocks per checkpoint segment file.
    pub blocks_per_file: usize,

    /// Whether this node mines. Derived from the simulation's `miners_list`.
    pub is_miner: bool,

    /// A tip older than this many seconds allows another header sync.
    pub block_sync_recency: u64,

    /// Coinbase reward paid to the miner of each block.
    pub coinbase_output: i64,

    /// Whether the node participates in the simulation at all.
    pub online: bool,
}

impl Default for NodeConfig {
    fn default() -> NodeConfig {
        NodeConfig {
            version: 1,
            min_accepted_version: 1,
            thread_schedule_interval: 1,
            max_message_process: 10,
            max_addr_ad: 1000,
            num_addr_relay: 2,
            addr_relay_vec_size: 10,
            dump_addresses_interval: 60,
            data_dir: PathBuf::from("data"),
            default_node_list: vec![0],
            random_address_fraction: 0.5,
            new_network: true,
            blocks_per_file: 100,
            is_miner: false,
            block_sync_recency: 300,
            coinbase_output: 50,
            online: true,
        }
    }
}

impl NodeConfig {
    /// `<data_dir>/peers<id>.txt`: the node's persisted address book.
    pub fn addresses_file(&self, id: NodeId) -> PathBuf {
        self.data_dir.join(format!("peers{}.txt", id))
    }

    /// `<data_dir>/blocks/peer<id>`: the node's segmented block checkpoints.
    pub fn blocks_dir(&self, id: NodeId) -> PathBuf {
        self.data_dir.join("blocks").join(format!("peer{}", id))
    }
}
