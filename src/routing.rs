//! # k-Bucket Routing Table
//!
//! Each node owns a [`RoutingTable`] of `L + 1` buckets, one per possible
//! [prefix distance](crate::address::Address::distance) from the owner.
//!
//! ```text
//! Bucket L:   peers differing in the first bit      (half of the address space)
//! Bucket L-1: peers sharing 1 leading bit           (a quarter)
//! ...
//! Bucket 1:   peers differing only in the last bit
//! Bucket 0:   the owner itself (never populated)
//! ```
//!
//! ## Eviction
//!
//! A bucket holds at most `k` peers. When a new peer arrives at a full bucket the
//! oldest *inserted* peer is dropped. Re-inserting a known peer does not refresh
//! its position, so this is insertion-order eviction rather than the
//! least-recently-seen policy of canonical Kademlia.
//!
//! ## Lookups
//!
//! [`RoutingTable::nearest`] scans every known peer rather than only the buckets
//! around the target.

use std::collections::VecDeque;

use rand::Rng;
use tracing::trace;

use crate::address::{Address, ADDRESS_LENGTH};

/// Default bucket capacity (k).
pub const DEFAULT_BUCKET_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingError {
    /// Tried to store a peer in a bucket serving a different distance.
    DistanceMismatch { expected: usize, actual: usize },
    /// Tried to sample from a bucket with no peers.
    EmptyBucket { distance: usize },
    /// Bucket distance outside `0..=ADDRESS_LENGTH`.
    DistanceOutOfRange { distance: usize },
}

impl std::fmt::Display for RoutingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DistanceMismatch { expected, actual } => {
                write!(f, "peer at distance {actual} does not belong in bucket {expected}")
            }
            Self::EmptyBucket { distance } => write!(f, "bucket {distance} is empty"),
            Self::DistanceOutOfRange { distance } => {
                write!(f, "bucket distance {distance} exceeds address length {ADDRESS_LENGTH}")
            }
        }
    }
}

impl std::error::Error for RoutingError {}

/// Result of inserting a peer into a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketUpdate {
    Inserted,
    AlreadyPresent,
    /// The peer was inserted and the contained address was evicted to make room.
    Evicted(Address),
}

/// Capacity-bounded set of peers at one fixed distance from the owner.
#[derive(Debug, Clone)]
pub struct Bucket {
    owner: Address,
    distance: usize,
    capacity: usize,
    peers: VecDeque<Address>,
}

impl Bucket {
    pub fn new(owner: Address, distance: usize, capacity: usize) -> Result<Self, RoutingError> {
        if distance > ADDRESS_LENGTH {
            return Err(RoutingError::DistanceOutOfRange { distance });
        }
        Ok(Self::empty(owner, distance, capacity))
    }

    fn empty(owner: Address, distance: usize, capacity: usize) -> Self {
        Self {
            owner,
            distance,
            capacity,
            peers: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn distance(&self) -> usize {
        self.distance
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Peers in insertion order, oldest first.
    pub fn peers(&self) -> impl ExactSizeIterator<Item = &Address> + '_ {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.peers.contains(address)
    }

    pub fn add(&mut self, address: Address) -> Result<BucketUpdate, RoutingError> {
        let actual = self.owner.distance(&address);
        if actual != self.distance {
            return Err(RoutingError::DistanceMismatch {
                expected: self.distance,
                actual,
            });
        }

        if self.peers.contains(&address) {
            return Ok(BucketUpdate::AlreadyPresent);
        }

        self.peers.push_back(address);
        if self.peers.len() > self.capacity {
            if let Some(evicted) = self.peers.pop_front() {
                trace!(
                    owner = %self.owner.short(),
                    distance = self.distance,
                    evicted = %evicted.short(),
                    "bucket full, evicted oldest peer"
                );
                return Ok(BucketUpdate::Evicted(evicted));
            }
        }
        Ok(BucketUpdate::Inserted)
    }

    pub fn select_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Address, RoutingError> {
        if self.peers.is_empty() {
            return Err(RoutingError::EmptyBucket {
                distance: self.distance,
            });
        }
        let idx = rng.gen_range(0..self.peers.len());
        Ok(self.peers[idx])
    }

    /// Random address that would fall into this bucket, i.e. one sharing the
    /// owner's first `L - distance` bits and differing at the next one.
    pub fn random_sibling_address<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Address> {
        self.owner.random_at_distance(self.distance, rng)
    }
}

#[derive(Debug, Clone)]
pub struct RoutingTable {
    owner: Address,
    k: usize,
    buckets: Vec<Bucket>,
}

impl RoutingTable {
    pub fn new(owner: Address, k: usize) -> Self {
        let buckets = (0..=ADDRESS_LENGTH)
            .map(|distance| Bucket::empty(owner, distance, k))
            .collect();
        Self { owner, k, buckets }
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn distance(&self, address: &Address) -> usize {
        self.owner.distance(address)
    }

    /// Store `address` in the bucket matching its distance. The owner itself is
    /// never stored.
    pub fn add_address(&mut self, address: Address) -> Result<BucketUpdate, RoutingError> {
        if address == self.owner {
            return Ok(BucketUpdate::AlreadyPresent);
        }
        let idx = self.distance(&address);
        self.buckets[idx].add(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.buckets[self.distance(address)].contains(address)
    }

    /// Up to `n` known peers ordered by ascending distance to `target`. Peers at
    /// equal distance keep their table order.
    pub fn nearest(&self, target: &Address, n: usize) -> Vec<Address> {
        if n == 0 {
            return Vec::new();
        }
        let mut peers = self.peers();
        peers.sort_by_key(|peer| peer.distance(target));
        peers.truncate(n);
        peers
    }

    /// One random peer from every non-empty bucket.
    pub fn select_random_peers<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Vec<Address>, RoutingError> {
        self.non_empty_buckets()
            .map(|bucket| bucket.select_random(rng))
            .collect()
    }

    /// One synthetic address per bucket `1..=L`, for refresh-style lookups.
    pub fn random_addresses_per_bucket<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Address> {
        self.buckets[1..]
            .iter()
            .filter_map(|bucket| bucket.random_sibling_address(rng))
            .collect()
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn bucket(&self, distance: usize) -> Option<&Bucket> {
        self.buckets.get(distance)
    }

    pub fn non_empty_buckets(&self) -> impl Iterator<Item = &Bucket> + '_ {
        self.buckets[1..].iter().filter(|bucket| !bucket.is_empty())
    }

    /// All stored peers, bucket by bucket.
    pub fn peers(&self) -> Vec<Address> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.peers.iter().copied())
            .collect()
    }

    pub fn peer_count(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }
}
