//! # Join-Time Peer Discovery
//!
//! When a node joins, a [`DiscoveryPolicy`] decides which existing nodes it
//! exchanges addresses with. Every exchange is mutual: the joiner learns the
//! contact and the contact learns the joiner.
//!
//! | Policy | Contacts |
//! |--------|----------|
//! | `none` | the seed only |
//! | `partial(depth)` | breadth-first from the seed, `depth` rounds |
//! | `complete` | every existing node |
//!
//! ## Partial Discovery
//!
//! ```text
//! round 1: frontier = {seed}                     exchange(joiner, seed)
//! round 2: frontier = nearest(seed, joiner)      exchange(joiner, each)
//! round 3: frontier = nearest(those, joiner)     ...
//! ```
//!
//! Each round the frontier advances to the nodes that the current frontier
//! considers nearest to the joiner (up to `k` each), skipping nodes already
//! visited. A depth of `0` or `1` is the seed-only exchange.
//!
//! ## Link Symmetry
//!
//! An exchange stores both addresses at the moment it runs, and with `k >= 1` a
//! freshly inserted peer is never the one a full bucket evicts. Later inserts
//! can evict either side though, even later exchanges of the same join, so once
//! buckets fill up a link may survive in only one of the two tables.

use std::collections::HashSet;
use std::str::FromStr;

use crate::node::{NodeIndex, NodeMap};
use crate::routing::RoutingError;

pub const DEFAULT_DISCOVERY_DEPTH: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The policy name is not one of `none`, `partial`, `complete`.
    InvalidType(String),
}

impl std::fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidType(kind) => write!(
                f,
                "invalid discovery type: {kind} (expected one of {})",
                DiscoveryPolicy::TYPES.join(", ")
            ),
        }
    }
}

impl std::error::Error for DiscoveryError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryPolicy {
    /// Mutual exchange with the seed only.
    #[default]
    None,
    /// Breadth-first expansion from the seed for `depth` rounds.
    Partial { depth: usize },
    /// Exchange with every existing node.
    Complete,
}

impl DiscoveryPolicy {
    pub const NONE: &'static str = "none";
    pub const PARTIAL: &'static str = "partial";
    pub const COMPLETE: &'static str = "complete";
    pub const TYPES: [&'static str; 3] = [Self::NONE, Self::PARTIAL, Self::COMPLETE];

    /// Build a policy from its name. `depth` only applies to `partial`.
    pub fn from_type(kind: &str, depth: usize) -> Result<Self, DiscoveryError> {
        match kind.trim().to_ascii_lowercase().as_str() {
            Self::NONE => Ok(Self::None),
            Self::PARTIAL => Ok(Self::Partial { depth }),
            Self::COMPLETE => Ok(Self::Complete),
            _ => Err(DiscoveryError::InvalidType(kind.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => Self::NONE,
            Self::Partial { .. } => Self::PARTIAL,
            Self::Complete => Self::COMPLETE,
        }
    }

    pub fn depth(&self) -> Option<usize> {
        match self {
            Self::Partial { depth } => Some(*depth),
            _ => None,
        }
    }

    /// Populate `joiner`'s routing table from the overlay reachable from `seed`.
    /// Returns the number of nodes the joiner exchanged addresses with.
    pub(crate) fn discover(
        &self,
        nodes: &mut NodeMap,
        seed: NodeIndex,
        joiner: NodeIndex,
    ) -> Result<usize, RoutingError> {
        match self {
            Self::None => discover_partial(nodes, seed, joiner, 0),
            Self::Partial { depth } => discover_partial(nodes, seed, joiner, *depth),
            Self::Complete => discover_complete(nodes, joiner),
        }
    }
}

impl std::fmt::Display for DiscoveryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Partial { depth } => write!(f, "{}(depth={depth})", self.kind()),
            _ => f.write_str(self.kind()),
        }
    }
}

/// Parses a bare policy name; `partial` uses [`DEFAULT_DISCOVERY_DEPTH`].
impl FromStr for DiscoveryPolicy {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_type(s, DEFAULT_DISCOVERY_DEPTH)
    }
}

fn discover_partial(
    nodes: &mut NodeMap,
    seed: NodeIndex,
    joiner: NodeIndex,
    depth: usize,
) -> Result<usize, RoutingError> {
    let target = *nodes.node(joiner).address();
    let mut visited: HashSet<NodeIndex> = HashSet::from([seed, joiner]);
    let mut frontier = vec![seed];
    let mut exchanged = 0;

    for _ in 0..depth.max(1) {
        if frontier.is_empty() {
            break;
        }

        for &contact in &frontier {
            nodes.exchange(joiner, contact)?;
            exchanged += 1;
        }

        let mut next = Vec::new();
        for &contact in &frontier {
            let node = nodes.node(contact);
            for address in node.nearest(&target, node.routing_table().k()) {
                if let Some(idx) = nodes.index_of(&address)
                    && visited.insert(idx)
                {
                    next.push(idx);
                }
            }
        }
        frontier = next;
    }

    Ok(exchanged)
}

fn discover_complete(nodes: &mut NodeMap, joiner: NodeIndex) -> Result<usize, RoutingError> {
    let mut exchanged = 0;
    for contact in nodes.indices() {
        if contact == joiner {
            continue;
        }
        nodes.exchange(joiner, contact)?;
        exchanged += 1;
    }
    Ok(exchanged)
}
