//! # Simulated Node
//!
//! A [`Node`] pairs an address with its routing table and a single message slot
//! used for flood suppression:
//!
//! ```text
//!          receive(m)                       receive(_)
//!   Idle ─────────────▶ Delivered(m) ─────────────────▶ Delivered(m)   (no-op)
//!    ▲                        │
//!    └──────── reset ─────────┘
//! ```
//!
//! Only the `Idle -> Delivered` transition produces a [`Broadcast`] record. The
//! node never sends anything itself; the network queues the record and runs the
//! fan-out later, so a node relays at most once per propagation round. The record
//! remembers who delivered the message so the relay skips that peer.
//!
//! [`NodeMap`] is the arena the network keeps its nodes in. Nodes are addressed
//! by [`NodeIndex`] handles in insertion order, with an address index on the
//! side for lookups.

use std::collections::HashMap;

use rand::Rng;

use crate::address::Address;
use crate::messages::Message;
use crate::routing::{BucketUpdate, RoutingError, RoutingTable, DEFAULT_BUCKET_SIZE};

/// Handle to a node inside a [`NodeMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(usize);

impl NodeIndex {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Pending re-broadcast queued by a node on first receipt of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    /// Node whose routing table drives the fan-out.
    pub origin: Address,
    /// Peer the message was received from; `None` for the injected message.
    pub received_from: Option<Address>,
    /// Message to relay, already one hop further than the one received.
    pub message: Message,
}

#[derive(Debug, Clone)]
pub struct Node {
    address: Address,
    routing_table: RoutingTable,
    message: Option<Message>,
}

impl Node {
    pub fn new(address: Address) -> Self {
        Self::with_bucket_size(address, DEFAULT_BUCKET_SIZE)
    }

    pub fn with_bucket_size(address: Address, k: usize) -> Self {
        Self {
            address,
            routing_table: RoutingTable::new(address, k),
            message: None,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    pub fn add_address(&mut self, address: Address) -> Result<BucketUpdate, RoutingError> {
        self.routing_table.add_address(address)
    }

    pub fn nearest(&self, target: &Address, n: usize) -> Vec<Address> {
        self.routing_table.nearest(target, n)
    }

    pub fn select_random_peers<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Vec<Address>, RoutingError> {
        self.routing_table.select_random_peers(rng)
    }

    pub fn random_addresses<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Address> {
        self.routing_table.random_addresses_per_bucket(rng)
    }

    pub fn peers(&self) -> Vec<Address> {
        self.routing_table.peers()
    }

    /// Message received in the current round, if any.
    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    pub fn has_message(&self) -> bool {
        self.message.is_some()
    }

    /// Accept `message` if the slot is empty and return the re-broadcast to
    /// schedule. Returns `None` if a message was already delivered this round.
    pub fn receive(&mut self, message: Message, from: Option<Address>) -> Option<Broadcast> {
        if self.message.is_some() {
            return None;
        }
        let relay = message.relayed();
        self.message = Some(message);
        Some(Broadcast {
            origin: self.address,
            received_from: from,
            message: relay,
        })
    }

    pub fn reset(&mut self) {
        self.message = None;
    }
}

/// Address-indexed arena of nodes, iterated in insertion order.
#[derive(Debug, Default)]
pub struct NodeMap {
    nodes: Vec<Node>,
    index: HashMap<Address, NodeIndex>,
}

impl NodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.index.contains_key(address)
    }

    /// Insert `node`, or hand it back if its address is already taken.
    pub(crate) fn insert(&mut self, node: Node) -> Result<NodeIndex, Node> {
        if self.index.contains_key(node.address()) {
            return Err(node);
        }
        let idx = NodeIndex(self.nodes.len());
        self.index.insert(*node.address(), idx);
        self.nodes.push(node);
        Ok(idx)
    }

    pub fn index_of(&self, address: &Address) -> Option<NodeIndex> {
        self.index.get(address).copied()
    }

    pub fn get(&self, address: &Address) -> Option<&Node> {
        self.index_of(address).map(|idx| &self.nodes[idx.0])
    }

    pub(crate) fn node(&self, idx: NodeIndex) -> &Node {
        &self.nodes[idx.0]
    }

    pub(crate) fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        &mut self.nodes[idx.0]
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&Address, &Node)> + '_ {
        self.nodes.iter().map(|node| (&node.address, node))
    }

    pub fn values(&self) -> impl ExactSizeIterator<Item = &Node> + '_ {
        self.nodes.iter()
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut Node> + '_ {
        self.nodes.iter_mut()
    }

    pub(crate) fn indices(&self) -> Vec<NodeIndex> {
        (0..self.nodes.len()).map(NodeIndex).collect()
    }

    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Node> {
        if self.nodes.is_empty() {
            return None;
        }
        Some(&self.nodes[rng.gen_range(0..self.nodes.len())])
    }

    /// Make `a` and `b` learn about each other.
    pub(crate) fn exchange(&mut self, a: NodeIndex, b: NodeIndex) -> Result<(), RoutingError> {
        if a == b {
            return Ok(());
        }
        let a_address = *self.nodes[a.0].address();
        let b_address = *self.nodes[b.0].address();
        self.nodes[a.0].add_address(b_address)?;
        self.nodes[b.0].add_address(a_address)?;
        Ok(())
    }
}
