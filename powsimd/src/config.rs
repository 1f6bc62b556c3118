//! Simulation-wide configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use powsim_network::{NodeConfig, NodeId, SimTime};

/// An error loading the simulation configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Global configuration, loaded from a TOML file.
///
/// Field names are load-bearing: they match the parameter names used by
/// schedule and topology files, so existing workloads keep working.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// How many nodes the simulation runs.
    pub num_nodes: u32,

    /// Protocol version every node speaks.
    pub version: u32,

    /// Peers below this version are rejected and disconnected.
    pub min_accepted_version: u32,

    /// Seconds between scheduler ticks.
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

    /// Seconds between rewrites of the peers files.
    pub dump_addresses_interval: u64,

    /// Root directory for peers files and block checkpoints.
    pub data_dir: PathBuf,

    /// Nodes that accept connections but never dial out; also the address
    /// bootstrap list for a fresh network.
    pub default_node_list: Vec<NodeId>,

    /// Fraction of an address book included in a gossip response.
    pub random_address_fraction: f64,

    /// Ignore on-disk state and start from an empty network.
    pub new_network: bool,

    /// Blocks per checkpoint segment file.
    pub blocks_per_file: usize,

    /// Which nodes mine.
    pub miners_list: Vec<NodeId>,

    /// A tip older than this many seconds allows another header sync.
    pub block_sync_recency: u64,

    /// Coinbase reward paid to the miner of each block.
    pub coinbase_output: i64,

    /// Per-node online flags; nodes beyond the end of the list are online.
    pub online: Vec<bool>,

    /// Seconds into the run at which the workload schedule is loaded.
    pub time_to_start_schedule: SimTime,

    /// The workload schedule file; empty means no workload.
    pub schedule_file_name: PathBuf,

    /// When to stop delivering events. The periodic self-events reschedule
    /// forever, so the run needs an explicit horizon.
    pub sim_time_limit: SimTime,

    /// Base seed for per-node randomness, so runs are reproducible.
    pub rng_seed: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            num_nodes: 2,
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
            miners_list: Vec::new(),
            block_sync_recency: 300,
            coinbase_output: 50,
            online: Vec::new(),
            time_to_start_schedule: 10,
            schedule_file_name: PathBuf::new(),
            sim_time_limit: 120,
            rng_seed: 42,
        }
    }
}

impl Config {
    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Whether node `id` participates in the simulation.
    pub fn is_online(&self, id: NodeId) -> bool {
        self.online.get(id as usize).copied().unwrap_or(true)
    }

    /// The per-node view of this configuration.
    pub fn node_config(&self, id: NodeId) -> NodeConfig {
        NodeConfig {
            version: self.version,
            min_accepted_version: self.min_accepted_version,
            thread_schedule_interval: self.thread_schedule_interval,
            max_message_process: self.max_message_process,
            max_addr_ad: self.max_addr_ad,
            num_addr_relay: self.num_addr_relay,
            addr_relay_vec_size: self.addr_relay_vec_size,
            dump_addresses_interval: self.dump_addresses_interval,
            data_dir: self.data_dir.clone(),
            default_node_list: self.default_node_list.clone(),
            random_address_fraction: self.random_address_fraction,
            new_network: self.new_network,
            blocks_per_file: self.blocks_per_file,
            is_miner: self.miners_list.contains(&id),
            block_sync_recency: self.block_sync_recency,
            coinbase_output: self.coinbase_output,
            online: self.is_online(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_documented_parameter_names() {
        powsim_test::init();

        let config: Config = toml::from_str(
            r#"
            num_nodes = 4
            version = 2
            min_accepted_version = 1
            thread_schedule_interval = 2
            max_message_process = 5
            dump_addresses_interval = 30
            data_dir = "run/data"
            default_node_list = [0, 1]
            random_address_fraction = 1.0
            new_network = false
            blocks_per_file = 10
            miners_list = [2]
            block_sync_recency = 60
            coinbase_output = 25
            online = [true, true, true, false]
            time_to_start_schedule = 5
            schedule_file_name = "run/schedule.txt"
            sim_time_limit = 300
            "#,
        )
        .expect("config parses");

        assert_eq!(config.num_nodes, 4);
        assert_eq!(config.default_node_list, vec![0, 1]);
        assert!(!config.is_online(3));
        assert!(config.is_online(7));

        let miner = config.node_config(2);
        assert!(miner.is_miner);
        assert!(!config.node_config(0).is_miner);
        assert!(!config.node_config(3).online);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        powsim_test::init();

        let result: Result<Config, _> = toml::from_str("ban_score_threshold = 100");
        assert!(result.is_err());
    }
}
