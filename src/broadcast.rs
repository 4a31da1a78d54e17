//! # Gossip Fan-Out Policies
//!
//! A [`BroadcastPolicy`] picks which peers a node relays a freshly received
//! message to.
//!
//! | Policy | Targets | Fan-out |
//! |--------|---------|---------|
//! | `flood` | every known peer | O(peers) |
//! | `select` | one random peer per non-empty bucket | O(L) |
//! | `random(size)` | `min(size, peers)` distinct random peers | O(size) |
//! | `hybrid(size)` | `select` ∪ `random(size)` | O(L + size) |
//!
//! The peer a message was received from is never a candidate. It is removed
//! before any sampling, so `random(size)` still relays to `min(size, peers)`
//! peers other than the sender, and `select` skips a bucket whose only peer is
//! the sender.
//!
//! Sampling never fails on small peer sets: asking for more peers than exist
//! yields all of them, and an empty table yields no targets.

use std::str::FromStr;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::address::Address;
use crate::routing::{RoutingError, RoutingTable};

pub const DEFAULT_BROADCAST_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    /// The policy name is not one of `flood`, `select`, `random`, `hybrid`.
    InvalidType(String),
}

impl std::fmt::Display for BroadcastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidType(kind) => write!(
                f,
                "invalid broadcast type: {kind} (expected one of {})",
                BroadcastPolicy::TYPES.join(", ")
            ),
        }
    }
}

impl std::error::Error for BroadcastError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadcastPolicy {
    #[default]
    Flood,
    Select,
    Random { size: usize },
    Hybrid { size: usize },
}

impl BroadcastPolicy {
    pub const FLOOD: &'static str = "flood";
    pub const SELECT: &'static str = "select";
    pub const RANDOM: &'static str = "random";
    pub const HYBRID: &'static str = "hybrid";
    pub const TYPES: [&'static str; 4] = [Self::FLOOD, Self::SELECT, Self::RANDOM, Self::HYBRID];

    /// Build a policy from its name. `size` only applies to `random` and `hybrid`.
    pub fn from_type(kind: &str, size: usize) -> Result<Self, BroadcastError> {
        match kind.trim().to_ascii_lowercase().as_str() {
            Self::FLOOD => Ok(Self::Flood),
            Self::SELECT => Ok(Self::Select),
            Self::RANDOM => Ok(Self::Random { size }),
            Self::HYBRID => Ok(Self::Hybrid { size }),
            _ => Err(BroadcastError::InvalidType(kind.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Flood => Self::FLOOD,
            Self::Select => Self::SELECT,
            Self::Random { .. } => Self::RANDOM,
            Self::Hybrid { .. } => Self::HYBRID,
        }
    }

    pub fn size(&self) -> Option<usize> {
        match self {
            Self::Random { size } | Self::Hybrid { size } => Some(*size),
            _ => None,
        }
    }

    /// Peers to relay to from a node with routing table `table`, never
    /// including `sender`.
    pub fn targets<R: Rng + ?Sized>(
        &self,
        table: &RoutingTable,
        sender: Option<&Address>,
        rng: &mut R,
    ) -> Result<Vec<Address>, RoutingError> {
        match self {
            Self::Flood => Ok(candidates(table, sender)),
            Self::Select => select(table, sender, rng),
            Self::Random { size } => Ok(sample(&candidates(table, sender), *size, rng)),
            Self::Hybrid { size } => {
                let mut targets = select(table, sender, rng)?;
                for peer in sample(&candidates(table, sender), *size, rng) {
                    if !targets.contains(&peer) {
                        targets.push(peer);
                    }
                }
                Ok(targets)
            }
        }
    }
}

impl std::fmt::Display for BroadcastPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.size() {
            Some(size) => write!(f, "{}(size={size})", self.kind()),
            None => f.write_str(self.kind()),
        }
    }
}

/// Parses a bare policy name; sized policies use [`DEFAULT_BROADCAST_SIZE`].
impl FromStr for BroadcastPolicy {
    type Err = BroadcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_type(s, DEFAULT_BROADCAST_SIZE)
    }
}

fn candidates(table: &RoutingTable, sender: Option<&Address>) -> Vec<Address> {
    table
        .peers()
        .into_iter()
        .filter(|peer| Some(peer) != sender)
        .collect()
}

/// One random peer per non-empty bucket, drawn from the peers other than
/// `sender`.
fn select<R: Rng + ?Sized>(
    table: &RoutingTable,
    sender: Option<&Address>,
    rng: &mut R,
) -> Result<Vec<Address>, RoutingError> {
    let Some(sender) = sender else {
        return table.select_random_peers(rng);
    };
    Ok(table
        .non_empty_buckets()
        .filter_map(|bucket| {
            let peers: Vec<Address> = bucket.peers().filter(|peer| *peer != sender).copied().collect();
            peers.choose(&mut *rng).copied()
        })
        .collect())
}

/// `min(size, peers.len())` distinct peers chosen uniformly.
fn sample<R: Rng + ?Sized>(peers: &[Address], size: usize, rng: &mut R) -> Vec<Address> {
    peers
        .choose_multiple(rng, size.min(peers.len()))
        .copied()
        .collect()
}
