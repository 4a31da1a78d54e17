//! # Overlay Network and Propagation Loop
//!
//! The [`Network`] owns every node, the queue of pending re-broadcasts, the
//! active policies and the random source. It is the only place routing tables
//! and message slots are mutated.
//!
//! ## Joining
//!
//! The first node added becomes the seed. Every later node runs the configured
//! [`DiscoveryPolicy`] against the nodes already present before the next
//! `add_node` call can see it.
//!
//! ## Propagation Round
//!
//! ```text
//! propagate_message(m, start)
//!   reset every node, zero send_count
//!   deliver m to start                      -> queue: [start's broadcast]
//!   while let Some(b) = queue.pop_front()
//!       for peer in broadcast_policy.targets(b.origin, b.received_from)
//!           send_message(peer, b.message)   -> may push peer's broadcast
//! ```
//!
//! The injected delivery is not counted as a send. A relay never goes back to
//! the peer the message was received from; the policy drops that peer before
//! choosing targets.
//!
//! A node queues a broadcast only on its first receipt in a round, so at most
//! one record per node is ever drained and the loop always terminates. The
//! queue is strictly FIFO, which gives a breadth-first dissemination order.

use std::collections::VecDeque;

use rand::SeedableRng;
use rand::Rng;
use rand::rngs::StdRng;
use tracing::{debug, trace};

use crate::address::Address;
use crate::broadcast::BroadcastPolicy;
use crate::discovery::DiscoveryPolicy;
use crate::messages::Message;
use crate::node::{Broadcast, Node, NodeIndex, NodeMap};
use crate::routing::{RoutingError, DEFAULT_BUCKET_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// A node with this address is already part of the network.
    DuplicateAddress(Address),
    /// No node with this address is part of the network.
    UnknownAddress(Address),
    /// The message to propagate has no content.
    InvalidMessage,
    /// A routing table invariant was violated.
    Routing(RoutingError),
}

impl std::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateAddress(address) => write!(f, "node {} already in network", address.to_hex()),
            Self::UnknownAddress(address) => write!(f, "no node with address {}", address.to_hex()),
            Self::InvalidMessage => write!(f, "invalid message: content is empty"),
            Self::Routing(e) => write!(f, "routing table error: {e}"),
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Routing(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RoutingError> for NetworkError {
    fn from(e: RoutingError) -> Self {
        Self::Routing(e)
    }
}

pub struct Network<R = StdRng> {
    nodes: NodeMap,
    seed: Option<NodeIndex>,
    queue: VecDeque<Broadcast>,
    discovery_policy: DiscoveryPolicy,
    broadcast_policy: BroadcastPolicy,
    bucket_size: usize,
    send_count: usize,
    broadcasts_executed: usize,
    rng: R,
}

impl Network<StdRng> {
    /// Empty network drawing randomness from an entropy-seeded generator.
    pub fn new(discovery_policy: DiscoveryPolicy, broadcast_policy: BroadcastPolicy) -> Self {
        Self::with_rng(discovery_policy, broadcast_policy, StdRng::from_entropy())
    }

    /// Empty network with a reproducible generator.
    pub fn seeded(
        discovery_policy: DiscoveryPolicy,
        broadcast_policy: BroadcastPolicy,
        seed: u64,
    ) -> Self {
        Self::with_rng(discovery_policy, broadcast_policy, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Network<R> {
    pub fn with_rng(
        discovery_policy: DiscoveryPolicy,
        broadcast_policy: BroadcastPolicy,
        rng: R,
    ) -> Self {
        Self {
            nodes: NodeMap::new(),
            seed: None,
            queue: VecDeque::new(),
            discovery_policy,
            broadcast_policy,
            bucket_size: DEFAULT_BUCKET_SIZE,
            send_count: 0,
            broadcasts_executed: 0,
            rng,
        }
    }

    /// Bucket capacity used by [`Network::add_random_node`].
    pub fn with_bucket_size(mut self, k: usize) -> Self {
        self.bucket_size = k;
        self
    }

    pub fn add_node(&mut self, node: Node) -> Result<(), NetworkError> {
        let address = *node.address();
        let joiner = self
            .nodes
            .insert(node)
            .map_err(|_| NetworkError::DuplicateAddress(address))?;

        let Some(seed) = self.seed else {
            self.seed = Some(joiner);
            debug!(node = %address.short(), "seed node added");
            return Ok(());
        };

        let contacts = self.discovery_policy.discover(&mut self.nodes, seed, joiner)?;
        debug!(
            node = %address.short(),
            policy = %self.discovery_policy,
            contacts = contacts,
            peers = self.nodes.node(joiner).routing_table().peer_count(),
            size = self.nodes.len(),
            "node joined"
        );
        Ok(())
    }

    /// Add a node at a fresh random address, using the network's generator and
    /// bucket size.
    pub fn add_random_node(&mut self) -> Result<Address, NetworkError> {
        let mut address = Address::random(&mut self.rng);
        while self.nodes.contains(&address) {
            address = Address::random(&mut self.rng);
        }
        self.add_node(Node::with_bucket_size(address, self.bucket_size))?;
        Ok(address)
    }

    /// Clear every node's message slot and the round counters.
    pub fn reset(&mut self) {
        for node in self.nodes.values_mut() {
            node.reset();
        }
        self.queue.clear();
        self.send_count = 0;
        self.broadcasts_executed = 0;
    }

    /// Run one full propagation round of `message` starting at `start`.
    pub fn propagate_message(&mut self, message: Message, start: &Address) -> Result<(), NetworkError> {
        if message.is_empty() {
            return Err(NetworkError::InvalidMessage);
        }
        let start_idx = self
            .nodes
            .index_of(start)
            .ok_or(NetworkError::UnknownAddress(*start))?;

        self.reset();
        self.deliver(start_idx, message, None);

        while let Some(broadcast) = self.queue.pop_front() {
            self.broadcasts_executed += 1;
            self.execute_broadcast(broadcast)?;
        }

        debug!(
            start = %start.short(),
            policy = %self.broadcast_policy,
            propagation = self.propagation(),
            size = self.nodes.len(),
            send_count = self.send_count,
            max_hops = self.max_hops(),
            "propagation round complete"
        );
        Ok(())
    }

    /// Count one send and deliver `message` to `address`.
    ///
    /// The receiver's re-broadcast is only executed by [`Network::propagate_message`].
    /// Called on its own, the re-broadcast stays queued and is discarded by the
    /// next [`Network::reset`].
    pub fn send_message(&mut self, address: &Address, message: Message) -> Result<(), NetworkError> {
        self.send(None, address, message)
    }

    fn send(
        &mut self,
        from: Option<Address>,
        address: &Address,
        message: Message,
    ) -> Result<(), NetworkError> {
        let idx = self
            .nodes
            .index_of(address)
            .ok_or(NetworkError::UnknownAddress(*address))?;
        self.send_count += 1;
        self.deliver(idx, message, from);
        Ok(())
    }

    fn deliver(&mut self, idx: NodeIndex, message: Message, from: Option<Address>) {
        if let Some(broadcast) = self.nodes.node_mut(idx).receive(message, from) {
            self.queue.push_back(broadcast);
        }
    }

    fn execute_broadcast(&mut self, broadcast: Broadcast) -> Result<(), NetworkError> {
        let origin = self
            .nodes
            .get(&broadcast.origin)
            .ok_or(NetworkError::UnknownAddress(broadcast.origin))?;
        let targets = self.broadcast_policy.targets(
            origin.routing_table(),
            broadcast.received_from.as_ref(),
            &mut self.rng,
        )?;

        trace!(
            origin = %broadcast.origin.short(),
            hops = broadcast.message.hops(),
            fanout = targets.len(),
            "relaying message"
        );

        for target in &targets {
            self.send(Some(broadcast.origin), target, broadcast.message.clone())?;
        }
        Ok(())
    }

    /// Uniformly random node, or `None` for an empty network.
    pub fn random_node(&mut self) -> Option<&Node> {
        self.nodes.random(&mut self.rng)
    }

    pub fn set_broadcast_policy(&mut self, broadcast_policy: BroadcastPolicy) {
        self.broadcast_policy = broadcast_policy;
    }

    pub fn seed(&self) -> Option<&Node> {
        self.seed.map(|idx| self.nodes.node(idx))
    }

    pub fn nodes(&self) -> &NodeMap {
        &self.nodes
    }

    pub fn node(&self, address: &Address) -> Option<&Node> {
        self.nodes.get(address)
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    pub fn send_count(&self) -> usize {
        self.send_count
    }

    /// Broadcast records drained during the last round.
    pub fn broadcasts_executed(&self) -> usize {
        self.broadcasts_executed
    }

    /// Number of nodes holding a message.
    pub fn propagation(&self) -> usize {
        self.nodes.values().filter(|node| node.has_message()).count()
    }

    /// Largest hop count among delivered messages, `0` if none were delivered.
    pub fn max_hops(&self) -> u32 {
        self.nodes
            .values()
            .filter_map(|node| node.message().map(Message::hops))
            .max()
            .unwrap_or(0)
    }

    pub fn peer_counts(&self) -> Vec<usize> {
        self.nodes
            .values()
            .map(|node| node.routing_table().peer_count())
            .collect()
    }

    pub fn non_empty_bucket_counts(&self) -> Vec<usize> {
        self.nodes
            .values()
            .map(|node| node.routing_table().non_empty_buckets().count())
            .collect()
    }

    pub fn discovery_policy(&self) -> DiscoveryPolicy {
        self.discovery_policy
    }

    pub fn broadcast_policy(&self) -> BroadcastPolicy {
        self.broadcast_policy
    }
}

impl<R> std::fmt::Debug for Network<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("size", &self.nodes.len())
            .field("discovery_policy", &self.discovery_policy)
            .field("broadcast_policy", &self.broadcast_policy)
            .field("bucket_size", &self.bucket_size)
            .field("send_count", &self.send_count)
            .field("pending", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::ADDRESS_BYTES;

    fn make_address(byte: u8) -> Address {
        let mut bytes = [0u8; ADDRESS_BYTES];
        bytes[0] = byte;
        Address::from_bytes(bytes)
    }

    fn network(discovery: DiscoveryPolicy, broadcast: BroadcastPolicy) -> Network {
        Network::seeded(discovery, broadcast, 42)
    }

    #[test]
    fn first_node_becomes_seed() {
        let mut net = network(DiscoveryPolicy::Complete, BroadcastPolicy::Flood);
        assert!(net.seed().is_none());

        net.add_node(Node::new(make_address(1))).expect("add seed");
        net.add_node(Node::new(make_address(2))).expect("add second");

        assert_eq!(net.seed().map(|n| *n.address()), Some(make_address(1)));
        assert_eq!(net.size(), 2);
    }

    #[test]
    fn duplicate_address_is_rejected() {
        let mut net = network(DiscoveryPolicy::None, BroadcastPolicy::Flood);
        net.add_node(Node::new(make_address(1))).expect("add seed");
        assert_eq!(
            net.add_node(Node::new(make_address(1))),
            Err(NetworkError::DuplicateAddress(make_address(1)))
        );
        assert_eq!(net.size(), 1);
    }

    #[test]
    fn empty_message_is_rejected() {
        let mut net = network(DiscoveryPolicy::None, BroadcastPolicy::Flood);
        net.add_node(Node::new(make_address(1))).expect("add seed");
        assert_eq!(
            net.propagate_message(Message::new(""), &make_address(1)),
            Err(NetworkError::InvalidMessage)
        );
    }

    #[test]
    fn unknown_start_is_rejected() {
        let mut net = network(DiscoveryPolicy::None, BroadcastPolicy::Flood);
        net.add_node(Node::new(make_address(1))).expect("add seed");
        assert_eq!(
            net.propagate_message(Message::new("test"), &make_address(9)),
            Err(NetworkError::UnknownAddress(make_address(9)))
        );
    }

    #[test]
    fn single_node_round() {
        let mut net = network(DiscoveryPolicy::None, BroadcastPolicy::Flood);
        net.add_node(Node::new(make_address(1))).expect("add seed");
        net.propagate_message(Message::new("test"), &make_address(1)).expect("propagate");

        assert_eq!(net.propagation(), 1);
        assert_eq!(net.send_count(), 0);
        assert_eq!(net.max_hops(), 0);
        assert_eq!(net.broadcasts_executed(), 1);
    }

    #[test]
    fn chain_propagation_counts_hops() {
        // seed 1 <- 2 <- 3 under NONE: 2 and 3 both only know the seed
        let mut net = network(DiscoveryPolicy::None, BroadcastPolicy::Flood);
        for byte in [1, 2, 3] {
            net.add_node(Node::new(make_address(byte))).expect("add");
        }
        net.propagate_message(Message::new("test"), &make_address(2)).expect("propagate");

        assert_eq!(net.propagation(), 3);
        // 2 -> 1, then 1 -> 3; nobody relays back to its sender
        assert_eq!(net.send_count(), 2);
        assert_eq!(net.broadcasts_executed(), 3);
        assert_eq!(net.max_hops(), 2);
        assert_eq!(net.node(&make_address(3)).and_then(Node::message).map(Message::hops), Some(2));
    }

    #[test]
    fn reset_clears_round_state_but_keeps_topology() {
        let mut net = network(DiscoveryPolicy::Complete, BroadcastPolicy::Flood);
        for byte in [1, 2, 3] {
            net.add_node(Node::new(make_address(byte))).expect("add");
        }
        net.propagate_message(Message::new("test"), &make_address(1)).expect("propagate");
        assert_eq!(net.propagation(), 3);

        let peers_before = net.peer_counts();
        net.reset();
        assert_eq!(net.propagation(), 0);
        assert_eq!(net.send_count(), 0);
        assert_eq!(net.max_hops(), 0);
        assert_eq!(net.peer_counts(), peers_before);
    }

    #[test]
    fn repeated_rounds_give_identical_flood_results() {
        let mut net = network(DiscoveryPolicy::Partial { depth: 2 }, BroadcastPolicy::Flood);
        for _ in 0..30 {
            net.add_random_node().expect("add");
        }
        let start = *net.seed().expect("seed").address();

        net.propagate_message(Message::new("test"), &start).expect("first round");
        let first = (net.propagation(), net.send_count(), net.max_hops());
        net.propagate_message(Message::new("test"), &start).expect("second round");
        assert_eq!(first, (net.propagation(), net.send_count(), net.max_hops()));
    }

    #[test]
    fn network_error_wraps_routing_error() {
        use std::error::Error;
        let err = NetworkError::from(RoutingError::EmptyBucket { distance: 3 });
        assert!(err.source().is_some());
        assert!(err.to_string().contains("bucket 3"));
    }
}
