//! The protocol engine of one simulated node.
//!
//! A node owns all of its state: the chain, the address book, one record per
//! neighbor, and the round-robin ring the cooperative scheduler services.
//! The surrounding kernel only ever calls into the node between events, so
//! no locking is involved anywhere.

mod handlers;


use std::collections::{HashMap, VecDeque};
use std::fs;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use powsim_chain::block::{Hash, Header};
use powsim_chain::transaction::Transaction;
use powsim_state::ChainStore;

use crate::address_book::AddressBook;
use crate::config::NodeConfig;
use crate::context::{EventContext, Gate};
use crate::peer::{Peer, PeerFlags};
use crate::protocol::{Envelope, Message, SelfEvent, WorkloadMessage, WORKLOAD_NEW_BLOCK, WORKLOAD_TX};
use crate::NodeId;

/// A fatal protocol-engine error.
///
/// Everything recoverable (malformed messages, scope violations, failed
/// block appends, unreadable files) is logged and swallowed inside the
/// scheduler loop; only a programming error in the workload schedule aborts
/// the simulation.
#[derive(Error, Debug)]
pub enum NodeError {
    /// The schedule file asked a non-miner to mine.
    #[error("node {0} is not a miner but received a new_block event")]
    RoleViolation(NodeId),
}

/// Node-local protocol state shared by the handlers.
#[derive(Default)]
struct SyncState {
    /// Whether the initial header sync has been kicked off.
    sync_started: bool,
    num_syncs: u32,
    /// High-water mark of chain heights advertised by neighbors.
    best_peer_height: usize,
    /// Relayed transactions awaiting validation on the next mine tick.
    unverified_txs: Vec<Transaction>,
    /// Validated transactions awaiting inclusion in the next mined block.
    verified_txs: Vec<Transaction>,
    /// Headers queued for the next broadcast pass.
    blocks_to_announce: Vec<Header>,
    /// Remaining value at owned outputs, by tx hash and output index.
    /// Entries appear lazily the first time the tx builder touches an
    /// output.
    outputs_spent: HashMap<i64, HashMap<u32, i64>>,
}

/// One simulated node.
pub struct Node {
    id: NodeId,
    config: NodeConfig,
    address_book: AddressBook,
    chain: ChainStore,
    peers: HashMap<NodeId, Peer>,
    /// Outbound transport handles, one per live connection. Erasing an entry
    /// is the logical disconnect.
    gates: IndexMap<NodeId, Gate>,
    /// The round-robin service ring.
    peers_process: VecDeque<NodeId>,
    state: SyncState,
    rng: StdRng,
}

impl Node {
    /// Create a node, loading its address book and chain from `data_dir`
    /// unless the simulation starts a fresh network.
    ///
    /// Unreadable state degrades to the bootstrap defaults; no IO problem
    /// here is fatal.
    pub fn new(id: NodeId, config: NodeConfig, rng: StdRng) -> Node {
        if let Err(error) = fs::create_dir_all(&config.data_dir) {
            warn!(node = id, %error, "could not create data directory");
        }
        let address_book = Node::read_addresses(id, &config);
        let chain = Node::read_chain(id, &config);
        info!(
            node = id,
            height = chain.chain_height(),
            known = address_book.len(),
            miner = config.is_miner,
            "node initialized"
        );
        Node {
            id,
            config,
            address_book,
            chain,
            peers: HashMap::new(),
            gates: IndexMap::new(),
            peers_process: VecDeque::new(),
            state: SyncState::default(),
            rng,
        }
    }

    fn read_addresses(id: NodeId, config: &NodeConfig) -> AddressBook {
        let mut book = AddressBook::new(config.random_address_fraction);
        let path = config.addresses_file(id);
        if config.new_network || !path.exists() {
            debug!(node = id, "seeding address book from the default node list");
            book.add_many(config.default_node_list.iter().copied());
            return book;
        }
        match fs::read_to_string(&path) {
            Ok(contents) => {
                book.add_many(
                    contents
                        .split(',')
                        .filter_map(|token| token.trim().parse().ok()),
                );
            }
            Err(error) => {
                warn!(node = id, ?path, %error, "peers file unreadable, using default nodes");
                book.add_many(config.default_node_list.iter().copied());
            }
        }
        book
    }

    fn read_chain(id: NodeId, config: &NodeConfig) -> ChainStore {
        if config.new_network {
            return ChainStore::empty(config.blocks_per_file);
        }
        ChainStore::read_from_directory(config.blocks_dir(id), config.blocks_per_file)
            .unwrap_or_else(|| ChainStore::empty(config.blocks_per_file))
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn online(&self) -> bool {
        self.config.online
    }

    pub fn is_miner(&self) -> bool {
        self.config.is_miner
    }

    pub fn chain(&self) -> &ChainStore {
        &self.chain
    }

    pub fn address_book(&self) -> &AddressBook {
        &self.address_book
    }

    /// The record for `peer`, if one exists.
    pub fn peer(&self, peer: NodeId) -> Option<&Peer> {
        self.peers.get(&peer)
    }

    /// Whether a gate to `peer` exists.
    pub fn is_connected(&self, peer: NodeId) -> bool {
        self.gates.contains_key(&peer)
    }

    /// Whether the initial header sync has started.
    pub fn sync_started(&self) -> bool {
        self.state.sync_started
    }

    /// Peers this node wants to dial at startup: every known address except
    /// itself. Offline nodes and default nodes never dial out.
    pub fn connection_candidates(&self) -> Vec<NodeId> {
        if !self.config.online || self.config.default_node_list.contains(&self.id) {
            return Vec::new();
        }
        self.address_book
            .all()
            .filter(|&address| address != self.id)
            .collect()
    }

    /// Record a newly established connection.
    ///
    /// The kernel calls this on both endpoints with opposite `inbound`
    /// values; the peer joins the service ring immediately.
    pub fn register_peer(&mut self, peer: NodeId, gate: Gate, inbound: bool) {
        trace!(node = self.id, peer, inbound, "registering peer");
        self.gates.insert(peer, gate);
        self.peers.insert(peer, Peer::new(inbound));
        self.peers_process.push_back(peer);
    }

    /// Schedule the periodic self-events and open the handshake with every
    /// outbound peer.
    pub fn start(&mut self, ctx: &mut impl EventContext) {
        ctx.schedule_self(self.config.thread_schedule_interval, SelfEvent::CheckQueues);
        ctx.schedule_self(self.config.dump_addresses_interval, SelfEvent::DumpAddr);
        // the first poll is delayed so the initial connections settle
        ctx.schedule_self(2 * self.config.thread_schedule_interval, SelfEvent::PollAddrs);
        if self.config.is_miner {
            ctx.schedule_self(self.config.thread_schedule_interval, SelfEvent::Mine);
        }

        debug!(node = self.id, "broadcasting nodeversion to outbound peers");
        let version = self.envelope(Message::NodeVersion {
            chain_height: self.chain.chain_height(),
        });
        self.broadcast(version, |peer| !peer.flags.contains(PeerFlags::INBOUND), ctx);
    }

    /// Queue a delivered peer message for the scheduler.
    pub fn handle_envelope(&mut self, envelope: Envelope) {
        match self.peers.get_mut(&envelope.source) {
            Some(peer) => {
                trace!(
                    node = self.id,
                    source = envelope.source,
                    command = %envelope.message.command(),
                    "queueing message"
                );
                peer.inbound_queue.push_back(envelope);
            }
            None => warn!(
                node = self.id,
                source = envelope.source,
                "message from unknown peer dropped"
            ),
        }
    }

    /// Dispatch a self-scheduled event.
    ///
    /// Self-events bypass the scope gate and the per-peer queues, so this is
    /// a separate dispatch table from [`Node::process_message`].
    pub fn handle_self_event(&mut self, event: SelfEvent, ctx: &mut impl EventContext) {
        trace!(node = self.id, event = event.name(), "self event");
        match event {
            SelfEvent::CheckQueues => self.check_queues(ctx),
            SelfEvent::AdvertiseAddrs => {
                // retired in favor of polling; still a recognized command
                debug!(node = self.id, "ignoring proactive address advertisement");
            }
            SelfEvent::DumpAddr => self.dump_addresses(ctx),
            SelfEvent::PollAddrs => self.poll_addresses(ctx),
            SelfEvent::Mine => self.mine(ctx),
        }
    }

    /// Dispatch an externally scheduled workload event.
    pub fn handle_workload(
        &mut self,
        message: WorkloadMessage,
        ctx: &mut impl EventContext,
    ) -> Result<(), NodeError> {
        debug!(node = self.id, command = %message.command, "workload event");
        match message.command.as_str() {
            WORKLOAD_NEW_BLOCK => self.handle_new_block(ctx),
            WORKLOAD_TX => {
                self.handle_new_tx(&message.params, ctx);
                Ok(())
            }
            other => {
                warn!(node = self.id, command = other, "unknown workload command dropped");
                Ok(())
            }
        }
    }

    /// Checkpoint the chain. The kernel calls this once at the end of the
    /// run; the address book is persisted periodically by `dumpaddr`.
    pub fn persist(&self) {
        let directory = self.config.blocks_dir(self.id);
        if let Err(error) = self.chain.write_to_directory(&directory) {
            warn!(node = self.id, ?directory, %error, "could not checkpoint chain");
        }
    }

    /// One scheduler tick: service up to `max_message_process` peers in
    /// round-robin order, then flush queued announcements.
    ///
    /// Each service consumes at most one inbound message, so no peer can
    /// starve the others. Disconnected peers are dropped from the ring (and
    /// their records destroyed) on dequeue.
    fn check_queues(&mut self, ctx: &mut impl EventContext) {
        for _ in 0..self.config.max_message_process {
            let peer_id = match self.peers_process.pop_front() {
                Some(peer_id) => peer_id,
                None => break,
            };
            let disconnected = self
                .peers
                .get(&peer_id)
                .map_or(true, |peer| peer.flags.contains(PeerFlags::DISCONNECT));
            if disconnected {
                debug!(node = self.id, peer = peer_id, "dropping disconnected peer");
                self.peers.remove(&peer_id);
                continue;
            }
            self.process_incoming(peer_id, ctx);
            self.send_outgoing(peer_id, ctx);
            self.peers_process.push_back(peer_id);
        }
        self.send_broadcasts(ctx);
        ctx.schedule_self(self.config.thread_schedule_interval, SelfEvent::CheckQueues);
    }

    /// Pop and process at most one message from this peer's inbound queue.
    fn process_incoming(&mut self, peer_id: NodeId, ctx: &mut impl EventContext) {
        let peer = match self.peers.get_mut(&peer_id) {
            Some(peer) => peer,
            None => {
                warn!(node = self.id, peer = peer_id, "no record for serviced peer");
                return;
            }
        };
        if peer.flags.contains(PeerFlags::DISCONNECT) {
            return;
        }
        if peer.flags.contains(PeerFlags::PAUSE_SEND) {
            debug!(node = self.id, peer = peer_id, "send buffer full, not processing");
            return;
        }
        let envelope = match peer.inbound_queue.pop_front() {
            Some(envelope) => envelope,
            None => return,
        };
        peer.flags.remove(PeerFlags::PAUSE_RECEIVE);
        self.process_message(envelope, ctx);
    }

    /// Run the scope gate, then dispatch to the matching protocol handler.
    fn process_message(&mut self, envelope: Envelope, ctx: &mut impl EventContext) {
        if !self.message_in_scope(&envelope) {
            // a production node would raise the peer's misbehavior score here
            debug!(
                node = self.id,
                source = envelope.source,
                command = %envelope.message.command(),
                "message out of scope, dropped"
            );
            return;
        }
        let Envelope {
            source,
            version,
            message,
        } = envelope;
        match message {
            Message::NodeVersion { chain_height } => {
                self.handle_node_version(source, version, chain_height, ctx)
            }
            Message::Verack => self.handle_verack(source, ctx),
            Message::Reject { reason, disconnect } => self.handle_reject(source, &reason, disconnect),
            Message::GetAddr => self.handle_get_addr(source, ctx),
            Message::Addrs(addresses) => self.handle_addrs(source, &addresses, ctx),
            Message::GetHeaders { locator } => self.handle_get_headers(source, locator, ctx),
            Message::Headers(headers) => self.handle_headers(source, &headers, ctx),
            Message::GetBlocks { locator } => self.handle_get_blocks(source, locator),
            Message::Blocks(blocks) => self.handle_blocks(source, blocks),
            Message::Tx(tx) => self.handle_tx(source, tx),
        }
    }

    /// The handshake scope gate: version-agnostic commands always pass,
    /// everything else requires a recorded version, and fully scoped
    /// commands additionally require a completed handshake.
    fn message_in_scope(&self, envelope: &Envelope) -> bool {
        let command = envelope.message.command();
        if command.allowed_pre_version() {
            return true;
        }
        let peer = match self.peers.get(&envelope.source) {
            Some(peer) => peer,
            None => return false,
        };
        if peer.version == 0 {
            return false;
        }
        if !command.allowed_pre_verack() && !peer.flags.contains(PeerFlags::SUCCESSFULLY_CONNECTED)
        {
            return false;
        }
        true
    }

    /// The send half of one peer service: keep the header sync moving and
    /// flush any blocks queued by `getblocks`.
    fn send_outgoing(&mut self, peer_id: NodeId, ctx: &mut impl EventContext) {
        match self.peers.get(&peer_id) {
            Some(peer) if peer.is_active() => {}
            Some(_) => return,
            None => {
                warn!(node = self.id, peer = peer_id, "no record for serviced peer");
                return;
            }
        }
        self.start_block_sync(peer_id, ctx);
        let blocks = match self.peers.get_mut(&peer_id) {
            Some(peer) if !peer.blocks_to_send.is_empty() => std::mem::take(&mut peer.blocks_to_send),
            _ => return,
        };
        self.send_to(peer_id, Message::Blocks(blocks), ctx);
    }

    /// Kick off the initial header sync against `peer_id`.
    ///
    /// Runs at most once per node, unless the tip has gone stale: a second
    /// sync is allowed when the tip is older than `block_sync_recency`
    /// seconds (an empty chain counts as stale).
    fn start_block_sync(&mut self, peer_id: NodeId, ctx: &mut impl EventContext) {
        if self.state.sync_started {
            return;
        }
        let stale = match self.chain.tip() {
            None => true,
            Some(tip) => {
                tip.header.creation_time < ctx.now().saturating_sub(self.config.block_sync_recency)
            }
        };
        if self.state.num_syncs == 0 || stale {
            info!(node = self.id, peer = peer_id, "starting block sync");
            self.state.sync_started = true;
            self.state.num_syncs += 1;
            // the tip's parent, so the reply overlaps our tip by one block
            let locator = self
                .chain
                .tip()
                .map(|tip| tip.header.parent_hash)
                .unwrap_or(Hash::NULL);
            self.send_to(peer_id, Message::GetHeaders { locator }, ctx);
        }
    }

    /// Flush queued block announcements to every connected peer.
    fn send_broadcasts(&mut self, ctx: &mut impl EventContext) {
        if self.state.blocks_to_announce.is_empty() {
            return;
        }
        let headers = std::mem::take(&mut self.state.blocks_to_announce);
        debug!(node = self.id, count = headers.len(), "announcing new blocks");
        let envelope = self.envelope(Message::Headers(headers));
        self.broadcast(envelope, Peer::is_active, ctx);
    }

    /// Broadcast `getaddr` to every successfully connected peer.
    fn poll_addresses(&mut self, ctx: &mut impl EventContext) {
        debug!(node = self.id, "polling connected peers for addresses");
        let envelope = self.envelope(Message::GetAddr);
        self.broadcast(
            envelope,
            |peer| peer.flags.contains(PeerFlags::SUCCESSFULLY_CONNECTED),
            ctx,
        );
        ctx.schedule_self(self.config.thread_schedule_interval, SelfEvent::PollAddrs);
    }

    /// Rewrite the peers file from the current address book.
    fn dump_addresses(&mut self, ctx: &mut impl EventContext) {
        let path = self.config.addresses_file(self.id);
        let contents = self
            .address_book
            .all()
            .map(|address| address.to_string())
            .collect::<Vec<_>>()
            .join(",");
        trace!(node = self.id, count = self.address_book.len(), "dumping addresses");
        if let Err(error) = fs::write(&path, contents) {
            warn!(node = self.id, ?path, %error, "could not write peers file");
        }
        ctx.schedule_self(self.config.dump_addresses_interval, SelfEvent::DumpAddr);
    }

    /// One mine tick: validate queued transactions against the tip's
    /// outputs. Proof of work itself is driven by the workload schedule, so
    /// all that happens here is moving passing transactions to
    /// `verified_txs`.
    fn mine(&mut self, ctx: &mut impl EventContext) {
        if !self.config.is_miner {
            return;
        }
        let pending = std::mem::take(&mut self.state.unverified_txs);
        if self.chain.chain_height() > 0 {
            let tip = self.chain.tip().expect("non-empty chain has a tip");
            for tx in pending {
                let valid = tx.inputs.iter().all(|input| {
                    tip.transaction(input.prev_tx_hash)
                        .and_then(|prev| prev.outputs.get(input.prev_tx_n as usize))
                        .map_or(false, |output| output.public_key == input.signature - 1)
                });
                if valid {
                    debug!(node = self.id, hash = tx.hash, "transaction valid");
                    self.state.verified_txs.push(tx);
                } else {
                    debug!(node = self.id, hash = tx.hash, "transaction invalid");
                }
            }
        }
        ctx.schedule_self(self.config.thread_schedule_interval, SelfEvent::Mine);
    }

    /// Wrap `message` in this node's envelope.
    fn envelope(&self, message: Message) -> Envelope {
        Envelope {
            source: self.id,
            version: self.config.version,
            message,
        }
    }

    /// Send one message to `peer`, or log and drop it if no gate exists.
    fn send_to(&self, peer: NodeId, message: Message, ctx: &mut impl EventContext) {
        match self.gates.get(&peer) {
            Some(&gate) => ctx.send(gate, self.envelope(message)),
            None => debug!(node = self.id, peer, "no gate for peer, message not sent"),
        }
    }

    /// Send a copy of `envelope` to every peer whose record matches
    /// `predicate`.
    fn broadcast(
        &self,
        envelope: Envelope,
        predicate: impl Fn(&Peer) -> bool,
        ctx: &mut impl EventContext,
    ) {
        let mut delivered = 0;
        for (peer_id, &gate) in &self.gates {
            let matched = self.peers.get(peer_id).map_or(false, |peer| predicate(peer));
            if matched {
                ctx.send(gate, envelope.clone());
                delivered += 1;
            }
        }
        trace!(
            node = self.id,
            command = %envelope.message.command(),
            delivered,
            total = self.gates.len(),
            "broadcast"
        );
    }

    /// Tear down the connection to `peer`: erase the gate so sends become
    /// no-ops, and mark the record so the scheduler drops it.
    fn disconnect_peer(&mut self, peer: NodeId) {
        info!(node = self.id, peer, "disconnecting peer");
        self.gates.shift_remove(&peer);
        if let Some(record) = self.peers.get_mut(&peer) {
            record.flags.insert(PeerFlags::DISCONNECT);
        }
    }
}
