//! # Trial Driver
//!
//! Builds random overlays, injects a message and reports how far it got. A
//! single trial returns one [`TrialOutcome`]; [`run_trials`] repeats that either
//! on one fixed topology or on a fresh topology per trial and aggregates the
//! results into a [`TrialSummary`].
//!
//! A trial is a success when every node received the message. Send counts and
//! hop depths are only averaged over successful trials, since a partial
//! propagation stops early and would skew both downwards.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::debug;

use crate::broadcast::BroadcastPolicy;
use crate::discovery::DiscoveryPolicy;
use crate::messages::Message;
use crate::network::{Network, NetworkError};
use crate::routing::DEFAULT_BUCKET_SIZE;

/// Content injected by every trial.
pub const TRIAL_MESSAGE: &str = "test";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrialError {
    /// The configured network has no nodes to start from.
    EmptyNetwork,
    /// `run_trials` was asked for zero trials.
    NoTrials,
    Network(NetworkError),
}

impl std::fmt::Display for TrialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyNetwork => write!(f, "network size must be at least 1"),
            Self::NoTrials => write!(f, "number of trials must be at least 1"),
            Self::Network(e) => write!(f, "network error: {e}"),
        }
    }
}

impl std::error::Error for TrialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Network(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NetworkError> for TrialError {
    fn from(e: NetworkError) -> Self {
        Self::Network(e)
    }
}

/// Node the message is injected at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartNode {
    #[default]
    Seed,
    Random,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialConfig {
    pub network_size: usize,
    pub discovery: DiscoveryPolicy,
    pub broadcast: BroadcastPolicy,
    pub start: StartNode,
    /// Seed for reproducible runs; `None` draws from entropy.
    pub seed: Option<u64>,
    pub bucket_size: usize,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            network_size: 100,
            discovery: DiscoveryPolicy::default(),
            broadcast: BroadcastPolicy::default(),
            start: StartNode::default(),
            seed: None,
            bucket_size: DEFAULT_BUCKET_SIZE,
        }
    }
}

impl TrialConfig {
    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialOutcome {
    pub size: usize,
    pub propagation: usize,
    pub send_count: usize,
    pub max_hops: u32,
    pub total_peers: usize,
    pub total_non_empty_buckets: usize,
}

impl TrialOutcome {
    pub fn success(&self) -> bool {
        self.propagation == self.size
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialSummary {
    pub trials: usize,
    pub successes: usize,
    pub average_propagation: f64,
    /// Mean send count over successful trials; `None` if none succeeded.
    pub average_send_count: Option<f64>,
    /// Mean max hop count over successful trials; `None` if none succeeded.
    pub average_max_hops: Option<f64>,
    pub outcomes: Vec<TrialOutcome>,
}

impl TrialSummary {
    fn from_outcomes(outcomes: Vec<TrialOutcome>) -> Self {
        let trials = outcomes.len();
        let successful: Vec<&TrialOutcome> = outcomes.iter().filter(|o| o.success()).collect();
        let average_propagation =
            mean(outcomes.iter().map(|o| o.propagation as f64)).unwrap_or(0.0);

        Self {
            trials,
            successes: successful.len(),
            average_propagation,
            average_send_count: mean(successful.iter().map(|o| o.send_count as f64)),
            average_max_hops: mean(successful.iter().map(|o| f64::from(o.max_hops))),
            outcomes,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Build a network of `config.network_size` nodes at random addresses.
pub fn build_network(config: &TrialConfig, rng: StdRng) -> Result<Network, TrialError> {
    if config.network_size == 0 {
        return Err(TrialError::EmptyNetwork);
    }
    let mut network =
        Network::with_rng(config.discovery, config.broadcast, rng).with_bucket_size(config.bucket_size);
    for _ in 0..config.network_size {
        network.add_random_node()?;
    }
    debug!(
        size = network.size(),
        discovery = %config.discovery,
        total_peers = network.peer_counts().iter().sum::<usize>(),
        "network built"
    );
    Ok(network)
}

/// Propagate one message through an existing network and collect the outcome.
pub fn run_on_network(network: &mut Network, start: StartNode) -> Result<TrialOutcome, TrialError> {
    let start_address = match start {
        StartNode::Seed => network.seed().map(|node| *node.address()),
        StartNode::Random => network.random_node().map(|node| *node.address()),
    }
    .ok_or(TrialError::EmptyNetwork)?;

    network.propagate_message(Message::new(TRIAL_MESSAGE), &start_address)?;

    Ok(TrialOutcome {
        size: network.size(),
        propagation: network.propagation(),
        send_count: network.send_count(),
        max_hops: network.max_hops(),
        total_peers: network.peer_counts().iter().sum(),
        total_non_empty_buckets: network.non_empty_bucket_counts().iter().sum(),
    })
}

pub fn run_single_trial(config: &TrialConfig) -> Result<TrialOutcome, TrialError> {
    let mut network = build_network(config, config.rng())?;
    run_on_network(&mut network, config.start)
}

/// Run `num_trials` trials. With `fixed_network` the topology is built once and
/// reused; otherwise every trial gets a freshly built network.
pub fn run_trials(
    config: &TrialConfig,
    num_trials: usize,
    fixed_network: bool,
) -> Result<TrialSummary, TrialError> {
    if num_trials == 0 {
        return Err(TrialError::NoTrials);
    }

    let mut rng = config.rng();
    let mut outcomes = Vec::with_capacity(num_trials);

    if fixed_network {
        let mut network = build_network(config, rng)?;
        for _ in 0..num_trials {
            outcomes.push(run_on_network(&mut network, config.start)?);
        }
    } else {
        for _ in 0..num_trials {
            let trial_rng = StdRng::seed_from_u64(rng.next_u64());
            let mut network = build_network(config, trial_rng)?;
            outcomes.push(run_on_network(&mut network, config.start)?);
        }
    }

    let summary = TrialSummary::from_outcomes(outcomes);
    debug!(
        trials = summary.trials,
        successes = summary.successes,
        fixed_network,
        "trials complete"
    );
    Ok(summary)
}
