//! End-to-end simulation scenarios, run through the full kernel.

use std::fs;

use tempdir::TempDir;

use powsim_chain::block::{Block, Hash};
use powsim_network::{Node, NodeId, PeerFlags};
use powsim_state::ChainStore;
use powsimd::{Config, Simulation};

fn base_config(num_nodes: u32, dir: &TempDir) -> Config {
    Config {
        num_nodes,
        data_dir: dir.path().to_path_buf(),
        dump_addresses_interval: 5,
        sim_time_limit: 60,
        ..Config::default()
    }
}

/// Every block after the first must link to its predecessor.
fn assert_chain_is_linked(node: &Node) {
    let blocks = node.chain().blocks_after(Hash::NULL);
    for pair in blocks.windows(2) {
        assert_eq!(pair[1].header.parent_hash, pair[0].hash());
    }
}

#[test]
fn handshake_completes_between_two_nodes() {
    powsim_test::init();

    let dir = TempDir::new("powsim-acceptance").unwrap();
    let config = base_config(2, &dir);
    let mut sim = Simulation::new(config);
    sim.run_until(10).unwrap();

    for (node, peer) in [(0 as NodeId, 1 as NodeId), (1, 0)].iter().copied() {
        let record = sim.node(node).peer(peer).expect("peer record exists");
        assert!(record.flags.contains(PeerFlags::SUCCESSFULLY_CONNECTED));
        assert!(!record.flags.contains(PeerFlags::DISCONNECT));
        assert_ne!(record.version, 0);
        assert!(sim.node(node).address_book().contains(peer));
    }

    // exactly one side of the connection is inbound
    let zero_view = sim.node(0).peer(1).unwrap().flags.contains(PeerFlags::INBOUND);
    let one_view = sim.node(1).peer(0).unwrap().flags.contains(PeerFlags::INBOUND);
    assert_ne!(zero_view, one_view);

    // the periodic dump persisted the address book
    let peers_file = dir.path().join("peers0.txt");
    assert_eq!(fs::read_to_string(peers_file).unwrap(), "0,1");
}

#[test]
fn obsolete_peers_are_rejected_and_disconnected() {
    powsim_test::init();

    let dir = TempDir::new("powsim-acceptance").unwrap();
    let config = base_config(2, &dir);

    // node 0 requires version 2; node 1 only speaks version 1
    let mut zero = config.node_config(0);
    zero.version = 2;
    zero.min_accepted_version = 2;
    let one = config.node_config(1);

    let mut sim = Simulation::with_node_configs(config, vec![zero, one]);
    sim.run_until(10).unwrap();

    assert!(!sim.node(0).is_connected(1));
    assert!(!sim.node(1).is_connected(0));
    // node 0 dropped the record entirely once the scheduler saw the flag
    assert!(sim.node(0).peer(1).is_none());
}

#[test]
fn header_first_sync_transfers_the_chain() {
    powsim_test::init();

    let dir = TempDir::new("powsim-acceptance").unwrap();
    let mut config = base_config(2, &dir);
    config.new_network = false;

    // seed node 0 with a three-block chain on disk
    let mut store = ChainStore::empty(config.blocks_per_file);
    for _ in 0..3 {
        let parent = store.tip().map(Block::hash).unwrap_or(Hash::NULL);
        assert!(store.add_block(Block::create(0, 50, parent, 0, vec![])));
    }
    store
        .write_to_directory(config.node_config(0).blocks_dir(0))
        .unwrap();

    let mut sim = Simulation::new(config);
    assert_eq!(sim.node(0).chain().chain_height(), 3);
    assert_eq!(sim.node(1).chain().chain_height(), 0);

    sim.run_until(15).unwrap();

    assert_eq!(sim.node(1).chain().chain_height(), 3);
    assert_eq!(sim.node(1).chain().tip().map(Block::hash), Some(Hash(3)));
    assert_chain_is_linked(sim.node(1));
    assert!(sim.node(1).sync_started());
}

#[test]
fn address_gossip_converges_to_the_full_set() {
    powsim_test::init();

    let dir = TempDir::new("powsim-acceptance").unwrap();
    let mut config = base_config(3, &dir);
    config.new_network = false;
    config.default_node_list = Vec::new();
    config.random_address_fraction = 1.0;

    // disjoint initial books: {0,1}, {1,2}, {2,0}
    fs::write(dir.path().join("peers0.txt"), "0,1").unwrap();
    fs::write(dir.path().join("peers1.txt"), "1,2").unwrap();
    fs::write(dir.path().join("peers2.txt"), "2,0").unwrap();

    let mut sim = Simulation::new(config);
    sim.run_until(12).unwrap();

    for node in 0..3 {
        let book: Vec<NodeId> = sim.node(node).address_book().all().collect();
        assert_eq!(book, vec![0, 1, 2], "node {} book", node);
    }

    // the dials made the three nodes pairwise connected, with opposite
    // inbound marks on the two ends of every connection
    for (a, b) in [(0 as NodeId, 1 as NodeId), (1, 2), (2, 0)].iter().copied() {
        assert!(sim.node(a).is_connected(b));
        assert!(sim.node(b).is_connected(a));
        let a_view = sim.node(a).peer(b).unwrap().flags.contains(PeerFlags::INBOUND);
        let b_view = sim.node(b).peer(a).unwrap().flags.contains(PeerFlags::INBOUND);
        assert_ne!(a_view, b_view);
    }
}

#[test]
fn mining_and_relay_confirm_a_transfer() {
    powsim_test::init();

    let dir = TempDir::new("powsim-acceptance").unwrap();
    let mut config = base_config(2, &dir);
    config.miners_list = vec![0];
    config.time_to_start_schedule = 10;

    let schedule = dir.path().join("schedule.txt");
    fs::write(&schedule, "# workload\n1 0 new_block\n2 0 tx 1,10\n3 0 new_block\n").unwrap();
    config.schedule_file_name = schedule;

    let mut sim = Simulation::new(config);
    sim.run_until(30).unwrap();

    assert_eq!(sim.node(0).chain().chain_height(), 2);
    assert_eq!(sim.node(1).chain().chain_height(), 2);
    assert_chain_is_linked(sim.node(1));

    let tip = sim.node(1).chain().tip().expect("node 1 synced the chain");
    let transfer = tip
        .transactions
        .iter()
        .find(|tx| !tx.is_coinbase())
        .expect("tip confirms the transfer");
    assert_eq!(transfer.outputs[0].value, 10);
    assert_eq!(transfer.outputs[0].public_key, 2);
}

#[test]
fn finished_runs_checkpoint_every_chain() {
    powsim_test::init();

    let dir = TempDir::new("powsim-acceptance").unwrap();
    let mut config = base_config(2, &dir);
    config.miners_list = vec![0];
    config.time_to_start_schedule = 5;
    config.sim_time_limit = 20;
    config.blocks_per_file = 2;

    let schedule = dir.path().join("schedule.txt");
    fs::write(&schedule, "1 0 new_block\n2 0 new_block\n3 0 new_block\n").unwrap();
    config.schedule_file_name = schedule.clone();

    let blocks_dir = config.node_config(0).blocks_dir(0);
    let blocks_per_file = config.blocks_per_file;
    let mut sim = Simulation::new(config);
    sim.run().unwrap();

    let restored = ChainStore::read_from_directory(blocks_dir, blocks_per_file)
        .expect("checkpoint directory exists");
    assert_eq!(restored.chain_height(), 3);
    assert_eq!(
        restored.tip().map(Block::hash),
        sim.node(0).chain().tip().map(Block::hash)
    );
}

#[test]
fn equal_seeds_reproduce_the_run() {
    powsim_test::init();

    let run = |seed: u64| {
        let dir = TempDir::new("powsim-acceptance").unwrap();
        let mut config = base_config(3, &dir);
        config.rng_seed = seed;
        let mut sim = Simulation::new(config);
        sim.run_until(20).unwrap();
        (0..3)
            .map(|id| {
                let node = sim.node(id);
                (
                    node.chain().tip().map(Block::hash),
                    node.address_book().all().collect::<Vec<_>>(),
                )
            })
            .collect::<Vec<_>>()
    };

    assert_eq!(run(7), run(7));
}
