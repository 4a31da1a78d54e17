//! Integration tests for the Network public API.
//!
//! These tests drive whole propagation rounds through the public interface and
//! check the coverage, send and hop statistics a trial driver would read.

use kadsim::address::ADDRESS_BYTES;
use kadsim::{
    Address, BroadcastPolicy, DiscoveryPolicy, Message, Network, NetworkError, Node,
    DEFAULT_BUCKET_SIZE,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Bucket capacity large enough that no test topology ever evicts.
const WIDE_BUCKETS: usize = 64;

fn make_address(first: u8) -> Address {
    let mut bytes = [0u8; ADDRESS_BYTES];
    bytes[0] = first;
    Address::from_bytes(bytes)
}

fn all_discovery_policies() -> Vec<DiscoveryPolicy> {
    vec![
        DiscoveryPolicy::None,
        DiscoveryPolicy::Partial { depth: 1 },
        DiscoveryPolicy::Partial { depth: 3 },
        DiscoveryPolicy::Complete,
    ]
}

fn all_broadcast_policies() -> Vec<BroadcastPolicy> {
    vec![
        BroadcastPolicy::Flood,
        BroadcastPolicy::Select,
        BroadcastPolicy::Random { size: 2 },
        BroadcastPolicy::Hybrid { size: 2 },
    ]
}

/// Network of `size` random nodes with wide buckets.
fn random_network(
    discovery: DiscoveryPolicy,
    broadcast: BroadcastPolicy,
    size: usize,
    seed: u64,
) -> Network {
    let mut net = Network::seeded(discovery, broadcast, seed).with_bucket_size(WIDE_BUCKETS);
    for _ in 0..size {
        net.add_random_node().expect("random addresses are unique");
    }
    net
}

fn seed_address(net: &Network) -> Address {
    *net.seed().expect("network has a seed").address()
}

#[test]
fn one_node_network() {
    let mut net = Network::seeded(DiscoveryPolicy::None, BroadcastPolicy::Flood, 1);
    net.add_node(Node::new(make_address(0x42))).expect("add seed");

    net.propagate_message(Message::new("test"), &make_address(0x42))
        .expect("propagate");

    assert_eq!(net.propagation(), 1);
    assert_eq!(net.send_count(), 0);
    assert_eq!(net.max_hops(), 0);
}

#[test]
fn two_node_complete_flood_from_either_node() {
    let mut net = Network::seeded(DiscoveryPolicy::Complete, BroadcastPolicy::Flood, 2);
    net.add_node(Node::new(make_address(0x10))).expect("add seed");
    net.add_node(Node::new(make_address(0x90))).expect("add second");

    for start in [make_address(0x10), make_address(0x90)] {
        net.propagate_message(Message::new("test"), &start).expect("propagate");
        assert_eq!(net.propagation(), 2, "start {start:?}");
        assert_eq!(net.send_count(), 1, "start {start:?}");
        assert_eq!(net.max_hops(), 1, "start {start:?}");
    }
}

#[test]
fn sampled_relays_never_waste_a_slot_on_the_sender() {
    for seed in 0..200 {
        let mut net = Network::seeded(
            DiscoveryPolicy::Complete,
            BroadcastPolicy::Random { size: 1 },
            seed,
        );
        for first in [0x01, 0x40, 0x80] {
            net.add_node(Node::new(make_address(first))).expect("add");
        }

        net.propagate_message(Message::new("test"), &make_address(0x80))
            .expect("propagate");

        // start -> x, x -> the remaining node, that node -> the start
        assert_eq!(net.send_count(), 3, "seed {seed}");
        assert_eq!(net.propagation(), 3, "seed {seed}");
        assert_eq!(net.max_hops(), 2, "seed {seed}");
    }
}

#[test]
fn five_node_full_mesh_reaches_everyone_in_one_hop() {
    let mut net = Network::seeded(DiscoveryPolicy::Complete, BroadcastPolicy::Flood, 3);
    for first in [0x11, 0x22, 0x44, 0x88, 0xf0] {
        net.add_node(Node::new(make_address(first))).expect("add");
    }
    assert!(net.peer_counts().iter().all(|&peers| peers == 4));

    net.propagate_message(Message::new("test"), &make_address(0x11))
        .expect("propagate");

    assert_eq!(net.propagation(), 5);
    assert_eq!(net.max_hops(), 1);
    // seed -> 4 peers, then each of them -> the 3 peers other than its sender
    assert_eq!(net.send_count(), 4 + 4 * 3);
}

#[test]
fn random_broadcast_with_single_peer_falls_back_to_all() {
    let mut net = Network::seeded(
        DiscoveryPolicy::None,
        BroadcastPolicy::Random { size: 2 },
        4,
    );
    net.add_node(Node::new(make_address(0x01))).expect("add seed");
    net.add_node(Node::new(make_address(0x80))).expect("add second");
    assert_eq!(net.peer_counts(), vec![1, 1]);

    net.propagate_message(Message::new("test"), &make_address(0x80))
        .expect("small sample never fails");

    assert_eq!(net.propagation(), 2);
    assert_eq!(net.send_count(), 1);
}

#[test]
fn star_topology_under_none_discovery() {
    let mut net = Network::seeded(DiscoveryPolicy::None, BroadcastPolicy::Flood, 5);
    for first in [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80] {
        net.add_node(Node::with_bucket_size(make_address(first), WIDE_BUCKETS))
            .expect("add");
    }

    let seed = seed_address(&net);
    assert_eq!(net.node(&seed).map(|n| n.peers().len()), Some(7));
    assert!(net.peer_counts()[1..].iter().all(|&peers| peers == 1));

    net.propagate_message(Message::new("test"), &seed).expect("propagate");
    assert_eq!(net.propagation(), 8);
    assert_eq!(net.send_count(), 7);
    assert_eq!(net.max_hops(), 1);

    // from a leaf the message has to pass through the seed
    net.propagate_message(Message::new("test"), &make_address(0x80))
        .expect("propagate");
    assert_eq!(net.propagation(), 8);
    assert_eq!(net.max_hops(), 2);
}

#[test]
fn discovery_is_mutual_for_every_policy() {
    for (i, discovery) in all_discovery_policies().into_iter().enumerate() {
        let net = random_network(discovery, BroadcastPolicy::Flood, 60, 100 + i as u64);

        for (address, node) in net.nodes().iter() {
            for peer in node.peers() {
                let other = net.node(&peer).expect("peers are network members");
                assert!(
                    other.routing_table().contains(address),
                    "{discovery}: {peer:?} does not know {address:?}"
                );
            }
        }
    }
}

#[test]
fn joins_are_mutual_at_default_bucket_size() {
    for (i, discovery) in all_discovery_policies().into_iter().enumerate() {
        let mut net = Network::seeded(discovery, BroadcastPolicy::Flood, 300 + i as u64);
        assert_eq!(net.bucket_size(), DEFAULT_BUCKET_SIZE);

        for _ in 0..150 {
            let before: Vec<Address> = net.nodes().iter().map(|(address, _)| *address).collect();
            let joiner = net.add_random_node().expect("random addresses are unique");
            let joined = net.node(&joiner).expect("joiner is a member");

            // whatever the joiner kept, the other side kept the joiner
            for peer in joined.peers() {
                let contact = net.node(&peer).expect("peers are network members");
                assert!(
                    contact.routing_table().contains(&joiner),
                    "{discovery}: {peer:?} lost {joiner:?} during the join"
                );
            }

            if discovery == DiscoveryPolicy::Complete {
                for address in &before {
                    let existing = net.node(address).expect("member");
                    assert!(existing.routing_table().contains(&joiner), "{address:?} missed the joiner");
                }
            }
        }
    }
}

#[test]
fn full_buckets_can_leave_links_one_sided() {
    let mut net = Network::seeded(DiscoveryPolicy::Complete, BroadcastPolicy::Flood, 17);
    for _ in 0..200 {
        net.add_random_node().expect("random addresses are unique");
    }

    let mut one_sided = 0;
    for (address, node) in net.nodes().iter() {
        assert!(node.routing_table().buckets().iter().all(|b| b.len() <= DEFAULT_BUCKET_SIZE));
        for peer in node.peers() {
            let other = net.node(&peer).expect("peers are network members");
            if !other.routing_table().contains(address) {
                one_sided += 1;
            }
        }
    }
    assert!(one_sided > 0, "200 nodes overflow k=10 buckets and evict older links");
}

#[test]
fn every_joiner_knows_the_seed() {
    for (i, discovery) in all_discovery_policies().into_iter().enumerate() {
        let net = random_network(discovery, BroadcastPolicy::Flood, 30, 200 + i as u64);
        let seed = seed_address(&net);
        for (address, node) in net.nodes().iter() {
            if *address != seed {
                assert!(node.routing_table().contains(&seed), "{discovery}");
            }
        }
    }
}

#[test]
fn rounds_terminate_and_stay_within_network_size() {
    for (i, discovery) in all_discovery_policies().into_iter().enumerate() {
        for (j, broadcast) in all_broadcast_policies().into_iter().enumerate() {
            let mut net = random_network(discovery, broadcast, 50, (i * 10 + j) as u64);
            let start = seed_address(&net);

            net.propagate_message(Message::new("test"), &start)
                .expect("propagate");

            assert!(net.propagation() >= 1, "{discovery}/{broadcast}");
            assert!(net.propagation() <= net.size(), "{discovery}/{broadcast}");
            assert!(net.broadcasts_executed() <= net.size(), "{discovery}/{broadcast}");
            assert_eq!(
                net.broadcasts_executed(),
                net.propagation(),
                "every delivered node relays exactly once"
            );
            let total_peers: usize = net.peer_counts().iter().sum();
            assert!(net.send_count() <= total_peers, "{discovery}/{broadcast}");
        }
    }
}

#[test]
fn complete_discovery_flood_always_succeeds() {
    let mut net = random_network(DiscoveryPolicy::Complete, BroadcastPolicy::Flood, 40, 9);
    for _ in 0..5 {
        let start = *net.random_node().expect("non-empty").address();
        net.propagate_message(Message::new("test"), &start).expect("propagate");
        assert_eq!(net.propagation(), net.size());
        assert_eq!(net.max_hops(), 1);
    }
}

#[test]
fn set_broadcast_policy_keeps_topology() {
    let mut net = random_network(DiscoveryPolicy::Partial { depth: 2 }, BroadcastPolicy::Flood, 40, 11);
    let peers_before = net.peer_counts();
    let buckets_before = net.non_empty_bucket_counts();

    net.set_broadcast_policy(BroadcastPolicy::Select);
    assert_eq!(net.broadcast_policy(), BroadcastPolicy::Select);

    let start = seed_address(&net);
    net.propagate_message(Message::new("test"), &start).expect("propagate");
    assert_eq!(net.peer_counts(), peers_before);
    assert_eq!(net.non_empty_bucket_counts(), buckets_before);
}

#[test]
fn seeded_networks_are_reproducible() {
    let build = || {
        let mut net = random_network(
            DiscoveryPolicy::Partial { depth: 2 },
            BroadcastPolicy::Random { size: 2 },
            40,
            1234,
        );
        let start = seed_address(&net);
        net.propagate_message(Message::new("test"), &start).expect("propagate");
        (net.peer_counts(), net.propagation(), net.send_count(), net.max_hops())
    };
    assert_eq!(build(), build());
}

#[test]
fn injected_generator_is_used() {
    let mut net = Network::with_rng(
        DiscoveryPolicy::None,
        BroadcastPolicy::Flood,
        StdRng::seed_from_u64(77),
    );
    let first = net.add_random_node().expect("add");
    let second = net.add_random_node().expect("add");
    assert_ne!(first, second);
    assert_eq!(net.size(), 2);
}

#[test]
fn reset_without_propagation_clears_state() {
    let mut net = random_network(DiscoveryPolicy::Complete, BroadcastPolicy::Flood, 10, 21);
    let start = seed_address(&net);
    net.propagate_message(Message::new("test"), &start).expect("propagate");
    assert!(net.send_count() > 0);

    net.reset();
    assert_eq!(net.send_count(), 0);
    assert_eq!(net.propagation(), 0);
    assert!(net.nodes().values().all(|node| !node.has_message()));
}

#[test]
fn errors_surface_through_public_api() {
    let mut net = Network::seeded(DiscoveryPolicy::None, BroadcastPolicy::Flood, 8);
    net.add_node(Node::new(make_address(0x01))).expect("add seed");

    assert_eq!(
        net.add_node(Node::new(make_address(0x01))),
        Err(NetworkError::DuplicateAddress(make_address(0x01)))
    );
    assert_eq!(
        net.propagate_message(Message::new(""), &make_address(0x01)),
        Err(NetworkError::InvalidMessage)
    );
    assert_eq!(
        net.send_message(&make_address(0x02), Message::new("test")),
        Err(NetworkError::UnknownAddress(make_address(0x02)))
    );
    assert_eq!(net.send_count(), 0, "failed sends are not counted");
}

#[test]
fn send_message_counts_and_delivers() {
    let mut net = Network::seeded(DiscoveryPolicy::None, BroadcastPolicy::Flood, 8);
    net.add_node(Node::new(make_address(0x01))).expect("add seed");

    net.add_node(Node::new(make_address(0x80))).expect("add second");

    net.send_message(&make_address(0x01), Message::with_hops("direct", 3))
        .expect("send");
    assert_eq!(net.send_count(), 1);
    assert_eq!(net.max_hops(), 3);
    // the receiver's relay waits for a propagation round
    assert_eq!(net.propagation(), 1);

    net.reset();
    assert_eq!(net.propagation(), 0);
    net.propagate_message(Message::new("test"), &make_address(0x80))
        .expect("propagate");
    assert_eq!(net.send_count(), 1, "the stale relay was dropped by reset");
    assert_eq!(net.propagation(), 2);
}
