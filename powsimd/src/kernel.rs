//! The discrete-event kernel.
//!
//! The kernel owns every node, the gate table, and one time-ordered event
//! queue. Nodes emit effects (sends, self-schedules, connection requests)
//! through a context the kernel hands them per event; the kernel applies
//! those effects after the handler returns, so no node ever observes
//! another mid-handler. Same-time events deliver in insertion order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, trace, warn};

use powsim_chain::block::Block;
use powsim_network::{
    Envelope, EventContext, Gate, Node, NodeConfig, NodeError, NodeId, SelfEvent, SimTime,
    WorkloadMessage,
};

use crate::config::Config;
use crate::schedule;

/// What the kernel can deliver.
#[derive(Clone, Debug)]
enum EventKind {
    /// A message from another peer, bound for the per-peer inbound queues.
    Peer(Envelope),
    /// A node's own scheduled event.
    SelfEvent(SelfEvent),
    /// An event injected by the workload schedule.
    Workload(WorkloadMessage),
    /// Load the workload schedule and queue its events.
    StartSchedule,
}

#[derive(Clone, Debug)]
struct Event {
    at: SimTime,
    /// Tie-breaker: same-time events deliver in insertion order.
    seq: u64,
    to: NodeId,
    kind: EventKind,
}

// Ordered by (at, seq) only; seq is unique, so distinct events never
// compare equal. BinaryHeap is a max-heap, so the ordering is reversed to
// pop the earliest event first.
impl PartialEq for Event {
    fn eq(&self, other: &Event) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Event) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Event) -> Ordering {
        (other.at, other.seq).cmp(&(self.at, self.seq))
    }
}

/// One deferred node effect.
enum Action {
    Send { gate: Gate, envelope: Envelope },
    ScheduleSelf { delay: SimTime, event: SelfEvent },
    Connect { peer: NodeId },
}

/// The context handed to a node for one handler invocation; it collects the
/// node's effects for the kernel to apply afterwards.
struct KernelContext {
    now: SimTime,
    actions: Vec<Action>,
}

impl EventContext for KernelContext {
    fn now(&self) -> SimTime {
        self.now
    }

    fn send(&mut self, gate: Gate, envelope: Envelope) {
        self.actions.push(Action::Send { gate, envelope });
    }

    fn schedule_self(&mut self, delay: SimTime, event: SelfEvent) {
        self.actions.push(Action::ScheduleSelf { delay, event });
    }

    fn request_connect(&mut self, peer: NodeId) {
        self.actions.push(Action::Connect { peer });
    }
}

/// A complete simulation: the node vector, the gate table, and the clock.
pub struct Simulation {
    config: Config,
    nodes: Vec<Node>,
    /// Destination node of each gate, indexed by the gate's raw id.
    gate_targets: Vec<NodeId>,
    queue: BinaryHeap<Event>,
    now: SimTime,
    seq: u64,
}

impl Simulation {
    /// Build a simulation where every node runs the same configuration.
    pub fn new(config: Config) -> Simulation {
        let node_configs = (0..config.num_nodes)
            .map(|id| config.node_config(id))
            .collect();
        Simulation::with_node_configs(config, node_configs)
    }

    /// Build a simulation with explicit per-node configurations, for
    /// topologies where nodes differ (mixed protocol versions, seeded
    /// chains).
    pub fn with_node_configs(mut config: Config, node_configs: Vec<NodeConfig>) -> Simulation {
        config.num_nodes = node_configs.len() as u32;
        let nodes = node_configs
            .into_iter()
            .enumerate()
            .map(|(id, node_config)| {
                let rng = StdRng::seed_from_u64(config.rng_seed ^ id as u64);
                Node::new(id as NodeId, node_config, rng)
            })
            .collect();
        let mut simulation = Simulation {
            config,
            nodes,
            gate_targets: Vec::new(),
            queue: BinaryHeap::new(),
            now: 0,
            seq: 0,
        };
        simulation.init();
        simulation
    }

    /// Wire the initial topology and start every node.
    fn init(&mut self) {
        // each node dials its known addresses, in node order
        for id in 0..self.nodes.len() as NodeId {
            for candidate in self.nodes[id as usize].connection_candidates() {
                self.connect(id, candidate);
            }
        }
        // periodic self-events and the opening version broadcasts
        for id in 0..self.nodes.len() as NodeId {
            let mut ctx = self.context();
            self.nodes[id as usize].start(&mut ctx);
            self.apply(id, ctx.actions);
        }
        if !self.config.schedule_file_name.as_os_str().is_empty() {
            let at = self.config.time_to_start_schedule;
            self.push(at, 0, EventKind::StartSchedule);
        }
    }

    /// Establish the bidirectional gate pair between `from` and `to`.
    ///
    /// The initiator records the peer as outbound, the target records the
    /// initiator as inbound. Requests to unknown, offline, already
    /// connected, or self peers are ignored.
    fn connect(&mut self, from: NodeId, to: NodeId) {
        if from == to || (to as usize) >= self.nodes.len() {
            return;
        }
        if !self.nodes[from as usize].online() || !self.nodes[to as usize].online() {
            debug!(from, to, "peer offline, not connecting");
            return;
        }
        if self.nodes[from as usize].is_connected(to) {
            return;
        }
        debug!(from, to, "establishing connection");
        let forward = self.new_gate(to);
        let backward = self.new_gate(from);
        self.nodes[from as usize].register_peer(to, forward, false);
        self.nodes[to as usize].register_peer(from, backward, true);
    }

    fn new_gate(&mut self, target: NodeId) -> Gate {
        let gate = Gate::new(self.gate_targets.len() as u64);
        self.gate_targets.push(target);
        gate
    }

    fn context(&self) -> KernelContext {
        KernelContext {
            now: self.now,
            actions: Vec::new(),
        }
    }

    fn push(&mut self, at: SimTime, to: NodeId, kind: EventKind) {
        let event = Event {
            at,
            seq: self.seq,
            to,
            kind,
        };
        self.seq += 1;
        self.queue.push(event);
    }

    /// Apply the effects `source` emitted during one handler invocation.
    fn apply(&mut self, source: NodeId, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send { gate, envelope } => {
                    match self.gate_targets.get(gate.raw() as usize).copied() {
                        Some(target) => {
                            let now = self.now;
                            self.push(now, target, EventKind::Peer(envelope));
                        }
                        None => warn!(source, gate = gate.raw(), "send through unknown gate"),
                    }
                }
                Action::ScheduleSelf { delay, event } => {
                    let at = self.now + delay;
                    self.push(at, source, EventKind::SelfEvent(event));
                }
                Action::Connect { peer } => self.connect(source, peer),
            }
        }
    }

    /// Deliver events in time order until the queue runs dry or the next
    /// event lies beyond `limit`.
    pub fn run_until(&mut self, limit: SimTime) -> Result<(), NodeError> {
        while let Some(event) = self.queue.pop() {
            if event.at > limit {
                self.queue.push(event);
                break;
            }
            self.now = event.at;
            self.dispatch(event)?;
        }
        Ok(())
    }

    /// Run to the configured time limit, then checkpoint every node.
    pub fn run(&mut self) -> Result<(), NodeError> {
        let limit = self.config.sim_time_limit;
        self.run_until(limit)?;
        self.finish();
        Ok(())
    }

    fn dispatch(&mut self, event: Event) -> Result<(), NodeError> {
        let Event { to, kind, .. } = event;
        if (to as usize) >= self.nodes.len() {
            warn!(node = to, "event for unknown node dropped");
            return Ok(());
        }
        match kind {
            EventKind::Peer(envelope) => self.nodes[to as usize].handle_envelope(envelope),
            EventKind::SelfEvent(event) => {
                let mut ctx = self.context();
                self.nodes[to as usize].handle_self_event(event, &mut ctx);
                self.apply(to, ctx.actions);
            }
            EventKind::Workload(message) => {
                let mut ctx = self.context();
                self.nodes[to as usize].handle_workload(message, &mut ctx)?;
                self.apply(to, ctx.actions);
            }
            EventKind::StartSchedule => self.start_schedule(),
        }
        Ok(())
    }

    /// Load the schedule file and queue its events relative to now.
    fn start_schedule(&mut self) {
        let path = self.config.schedule_file_name.clone();
        info!(?path, "starting workload schedule");
        let entries = match schedule::read_schedule(&path) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(?path, %error, "schedule unreadable, continuing without workload");
                return;
            }
        };
        for entry in entries {
            let at = self.now + entry.time;
            trace!(node = entry.node, at, command = %entry.command, "queueing workload event");
            self.push(
                at,
                entry.node,
                EventKind::Workload(WorkloadMessage {
                    command: entry.command,
                    params: entry.params,
                }),
            );
        }
    }

    /// End-of-run checkpoint and summary.
    pub fn finish(&self) {
        for node in &self.nodes {
            node.persist();
            info!(
                node = node.id(),
                height = node.chain().chain_height(),
                tip = ?node.chain().tip().map(Block::hash),
                known = node.address_book().len(),
                "final node state"
            );
        }
    }

    /// The current simulation time, in seconds.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// The node with index `id`.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }
}
