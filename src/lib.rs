//! # kadsim - Kademlia Overlay Simulator
//!
//! kadsim models how a Kademlia-style overlay organizes itself and how a
//! gossiped message spreads through it:
//!
//! - **Addresses**: fixed-length bit strings with a common-prefix distance
//! - **Routing**: per-node k-buckets indexed by distance, insertion-order eviction
//! - **Discovery**: how a joining node learns its first peers
//! - **Broadcast**: which peers a node relays a message to
//! - **Network**: in-process event loop that drains queued relays to completion
//!
//! ## Architecture
//!
//! The [`Network`] owns every [`Node`] and the only random source. Nodes never
//! call back into the network: receiving a message yields a [`Broadcast`]
//! record which the network queues and later executes in FIFO order. That keeps
//! a propagation round single-threaded, deterministic for a seeded generator,
//! and bounded by one relay per node.
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|--------|
//! | `address` | Addresses and the distance metric |
//! | `routing` | Buckets and routing tables |
//! | `messages` | Gossiped payload with hop counter |
//! | `node` | Per-node delivery state machine and the node arena |
//! | `discovery` | Join-time bootstrap policies |
//! | `broadcast` | Relay fan-out policies |
//! | `network` | Orchestration, propagation loop and statistics |
//! | `trial` | Repeated-trial driver used by the `kadsim` binary |

pub mod address;
pub mod broadcast;
pub mod discovery;
pub mod messages;
pub mod network;
pub mod node;
pub mod routing;
pub mod trial;

pub use address::{Address, AddressError, ADDRESS_LENGTH};
pub use broadcast::{BroadcastError, BroadcastPolicy, DEFAULT_BROADCAST_SIZE};
pub use discovery::{DiscoveryError, DiscoveryPolicy, DEFAULT_DISCOVERY_DEPTH};
pub use messages::Message;
pub use network::{Network, NetworkError};
pub use node::{Broadcast, Node, NodeIndex, NodeMap};
pub use routing::{Bucket, BucketUpdate, RoutingError, RoutingTable, DEFAULT_BUCKET_SIZE};
pub use trial::{
    run_on_network, run_single_trial, run_trials, StartNode, TrialConfig, TrialError, TrialOutcome,
    TrialSummary,
};
