//! Protocol handlers: one per peer command, plus the two workload events.
//!
//! Handlers run after the scope gate, mutate node state, and emit replies
//! through the [`EventContext`]. None of them can fail the scheduler loop;
//! the only fatal path is the role violation in `handle_new_block`.

use tracing::{debug, info, trace, warn};

use powsim_chain::block::{Block, Hash, Header};
use powsim_chain::transaction::{Input, Output, Transaction};

use crate::context::EventContext;
use crate::peer::{Peer, PeerFlags};
use crate::protocol::Message;
use crate::NodeId;

use super::{Node, NodeError};

impl Node {
    /// `nodeversion`: open (or answer) the handshake.
    ///
    /// Obsolete peers get a `reject` and are disconnected. Otherwise the
    /// advertised version is recorded, inbound peers receive our own
    /// `nodeversion`, and a taller advertised chain marks the peer for a
    /// header request once the handshake completes.
    pub(super) fn handle_node_version(
        &mut self,
        source: NodeId,
        version: u32,
        chain_height: usize,
        ctx: &mut impl EventContext,
    ) {
        if version < self.config.min_accepted_version {
            info!(
                node = self.id,
                source,
                version,
                min = self.config.min_accepted_version,
                "peer uses an obsolete protocol version"
            );
            let reject = Message::Reject {
                reason: "obsolete".to_string(),
                disconnect: true,
            };
            self.send_to(source, reject, ctx);
            self.disconnect_peer(source);
            return;
        }

        let inbound = match self.peers.get_mut(&source) {
            Some(peer) => {
                peer.version = version;
                peer.flags.contains(PeerFlags::INBOUND)
            }
            None => {
                warn!(node = self.id, source, "version from unknown peer");
                return;
            }
        };
        if inbound {
            // an inbound peer has not seen our version yet
            debug!(node = self.id, source, "answering inbound nodeversion");
            let reply = Message::NodeVersion {
                chain_height: self.chain.chain_height(),
            };
            self.send_to(source, reply, ctx);
        }

        if chain_height > self.state.best_peer_height {
            self.state.best_peer_height = chain_height;
            if let Some(peer) = self.peers.get_mut(&source) {
                peer.known_height = chain_height;
                if chain_height > self.chain.chain_height() {
                    peer.flags.insert(PeerFlags::REQUEST_HEADERS);
                }
            }
        }

        self.send_to(source, Message::Verack, ctx);
    }

    /// `verack`: the peer accepted our version, so the connection is up.
    ///
    /// An inbound connection may be our first sighting of the peer, so it is
    /// added to the address book. If the peer was marked for a header
    /// request and still holds the best advertised height, ask it for
    /// headers from our tip.
    pub(super) fn handle_verack(&mut self, source: NodeId, ctx: &mut impl EventContext) {
        let (inbound, request_headers, known_height) = match self.peers.get_mut(&source) {
            Some(peer) => {
                peer.flags.insert(PeerFlags::SUCCESSFULLY_CONNECTED);
                (
                    peer.flags.contains(PeerFlags::INBOUND),
                    peer.flags.contains(PeerFlags::REQUEST_HEADERS),
                    peer.known_height,
                )
            }
            None => {
                warn!(node = self.id, source, "verack from unknown peer");
                return;
            }
        };
        info!(node = self.id, source, inbound, "peer successfully connected");
        if inbound {
            self.address_book.add(source);
        }
        if request_headers && known_height == self.state.best_peer_height {
            let locator = self.chain.tip().map(Block::hash).unwrap_or(Hash::NULL);
            self.send_to(source, Message::GetHeaders { locator }, ctx);
        }
    }

    /// `reject`: log the reason, and tear the connection down if asked.
    pub(super) fn handle_reject(&mut self, source: NodeId, reason: &str, disconnect: bool) {
        if reason.is_empty() {
            warn!(node = self.id, source, "malformed reject without a reason");
            return;
        }
        info!(node = self.id, source, reason, disconnect, "peer rejected us");
        if disconnect {
            self.disconnect_peer(source);
        }
    }

    /// `getaddr`: answer immediately with a random sample of the book.
    pub(super) fn handle_get_addr(&mut self, source: NodeId, ctx: &mut impl EventContext) {
        let addresses = self.address_book.sample(&mut self.rng);
        trace!(
            node = self.id,
            source,
            count = addresses.len(),
            "answering address poll"
        );
        self.send_to(source, Message::Addrs(addresses), ctx);
    }

    /// `addrs`: dial half of the newly learned peers, then merge the whole
    /// sample into the book.
    pub(super) fn handle_addrs(
        &mut self,
        source: NodeId,
        addresses: &[NodeId],
        ctx: &mut impl EventContext,
    ) {
        debug!(
            node = self.id,
            source,
            count = addresses.len(),
            "handling gossiped addresses"
        );
        let unconnected: Vec<NodeId> = addresses
            .iter()
            .copied()
            .filter(|&address| address != self.id && !self.is_connected(address))
            .collect();
        // dialing only half keeps inbound and outbound counts balanced
        for &peer in &unconnected[..unconnected.len() / 2] {
            ctx.request_connect(peer);
        }
        self.address_book.add_many(addresses.iter().copied());
    }

    /// `getheaders`: reply with the headers after the locator.
    pub(super) fn handle_get_headers(
        &mut self,
        source: NodeId,
        locator: Hash,
        ctx: &mut impl EventContext,
    ) {
        let headers: Vec<Header> = self
            .chain
            .blocks_after(locator)
            .iter()
            .map(|block| block.header)
            .collect();
        trace!(
            node = self.id,
            source,
            count = headers.len(),
            "answering header request"
        );
        self.send_to(source, Message::Headers(headers), ctx);
    }

    /// `headers`: validate the run and request the blocks we are missing.
    ///
    /// A non-continuous sequence is dropped without any state change. On a
    /// valid run, request blocks from the first header that extends our tip
    /// (the first header overall when our chain is empty).
    pub(super) fn handle_headers(
        &mut self,
        source: NodeId,
        headers: &[Header],
        ctx: &mut impl EventContext,
    ) {
        debug!(node = self.id, source, count = headers.len(), "handling headers");
        for pair in headers.windows(2) {
            if pair[1].parent_hash != pair[0].hash {
                warn!(
                    node = self.id,
                    source, "non-continuous headers sequence dropped"
                );
                return;
            }
        }
        let wanted = if self.chain.chain_height() == 0 {
            headers.first().map(|header| header.hash)
        } else {
            let tip_hash = self.chain.tip().map(Block::hash).unwrap_or(Hash::NULL);
            headers
                .iter()
                .find(|header| header.parent_hash == tip_hash)
                .map(|header| header.hash)
        };
        if let Some(locator) = wanted {
            self.send_to(source, Message::GetBlocks { locator }, ctx);
        }
    }

    /// `getblocks`: queue the requested blocks; the scheduler flushes them
    /// as a single `blocks` message on the requester's next send pass.
    pub(super) fn handle_get_blocks(&mut self, source: NodeId, locator: Hash) {
        let blocks = self.chain.blocks_after(locator).to_vec();
        debug!(
            node = self.id,
            source,
            count = blocks.len(),
            "queueing blocks to send"
        );
        match self.peers.get_mut(&source) {
            Some(peer) => peer.blocks_to_send.extend(blocks),
            None => warn!(node = self.id, source, "getblocks from unknown peer"),
        }
    }

    /// `blocks`: append in order; anything that does not extend the tip is
    /// silently dropped by the store.
    pub(super) fn handle_blocks(&mut self, source: NodeId, blocks: Vec<Block>) {
        debug!(node = self.id, source, count = blocks.len(), "handling blocks");
        for block in blocks {
            self.chain.add_block(block);
        }
        trace!(
            node = self.id,
            height = self.chain.chain_height(),
            "chain height after block import"
        );
    }

    /// `tx`: miners queue the transaction for the next mine tick; everyone
    /// else ignores it.
    pub(super) fn handle_tx(&mut self, source: NodeId, tx: Transaction) {
        if !self.config.is_miner {
            return;
        }
        trace!(
            node = self.id,
            source,
            hash = tx.hash,
            "queueing relayed transaction"
        );
        self.state.unverified_txs.push(tx);
    }

    /// Workload `new_block`: assemble a block from the verified mempool and
    /// queue its header for announcement.
    ///
    /// Only miners may receive this; anything else is a programming error in
    /// the schedule file and aborts the simulation.
    pub(super) fn handle_new_block(&mut self, ctx: &mut impl EventContext) -> Result<(), NodeError> {
        if !self.config.is_miner {
            return Err(NodeError::RoleViolation(self.id));
        }
        let parent = self.chain.tip().map(Block::hash).unwrap_or(Hash::NULL);
        let transactions = std::mem::take(&mut self.state.verified_txs);
        let block = Block::create(
            self.id,
            self.config.coinbase_output,
            parent,
            ctx.now(),
            transactions,
        );
        info!(
            node = self.id,
            hash = %block.hash(),
            transactions = block.header.num_tx,
            "mined block"
        );
        let header = block.header;
        self.chain.add_block(block);
        self.state.blocks_to_announce.push(header);
        Ok(())
    }

    /// Workload `tx`: build a transfer of `params = [peer, amount]` funded
    /// from our owned outputs in the tip, and broadcast it.
    ///
    /// Underfunded requests are dropped without touching `outputs_spent`.
    /// A mining node also queues its own transfer for verification, since
    /// broadcasts never loop back to the sender.
    pub(super) fn handle_new_tx(&mut self, params: &[i64], ctx: &mut impl EventContext) {
        if self.chain.chain_height() == 0 {
            debug!(node = self.id, "no chain yet, dropping tx event");
            return;
        }
        let (peer, amount) = match params {
            [peer, amount, ..] => (*peer, *amount),
            _ => {
                warn!(node = self.id, "malformed tx event dropped");
                return;
            }
        };
        if amount <= 0 {
            warn!(node = self.id, amount, "non-positive tx amount dropped");
            return;
        }

        let own_key = i64::from(self.id) * 2;
        let mut needed = amount;
        let mut inputs = Vec::new();
        let mut drains: Vec<(i64, u32, i64)> = Vec::new();
        let tip = self.chain.tip().expect("non-empty chain has a tip");
        'funding: for tx in &tip.transactions {
            for (index, output) in tx.outputs.iter().enumerate() {
                if output.public_key != own_key {
                    continue;
                }
                let index = index as u32;
                let remaining = self
                    .state
                    .outputs_spent
                    .get(&tx.hash)
                    .and_then(|outputs| outputs.get(&index))
                    .copied()
                    .unwrap_or(output.value);
                if remaining <= 0 {
                    continue;
                }
                let drained = remaining.min(needed);
                needed -= drained;
                drains.push((tx.hash, index, remaining - drained));
                inputs.push(Input {
                    prev_tx_hash: tx.hash,
                    prev_tx_n: index,
                    signature: own_key + 1,
                });
                if needed == 0 {
                    break 'funding;
                }
            }
        }
        if needed > 0 {
            debug!(node = self.id, amount, "cannot fund transaction, dropping event");
            return;
        }
        for (hash, index, remaining) in drains {
            self.state
                .outputs_spent
                .entry(hash)
                .or_default()
                .insert(index, remaining);
        }

        let tx = Transaction {
            hash: self.chain.max_tx_hash() + 1,
            inputs,
            outputs: vec![Output {
                value: amount,
                public_key: peer * 2,
            }],
        };
        info!(
            node = self.id,
            hash = tx.hash,
            to = peer,
            amount,
            "broadcasting transaction"
        );
        let envelope = self.envelope(Message::Tx(tx.clone()));
        self.broadcast(envelope, Peer::is_active, ctx);
        if self.config.is_miner {
            self.state.unverified_txs.push(tx);
        }
    }
}
