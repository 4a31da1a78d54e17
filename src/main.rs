use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use kadsim::{
    run_single_trial, run_trials, BroadcastPolicy, DiscoveryPolicy, StartNode, TrialConfig,
    DEFAULT_BROADCAST_SIZE, DEFAULT_BUCKET_SIZE, DEFAULT_DISCOVERY_DEPTH,
};

#[derive(Parser, Debug)]
#[command(name = "kadsim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of nodes in the overlay.
    #[arg(short = 'n', long, default_value = "100")]
    size: usize,

    /// Discovery policy: none, partial or complete.
    #[arg(short, long, default_value = "none")]
    discovery: String,

    /// Rounds of partial discovery.
    #[arg(long, default_value_t = DEFAULT_DISCOVERY_DEPTH)]
    depth: usize,

    /// Broadcast policy: flood, select, random or hybrid.
    #[arg(short, long, default_value = "flood")]
    broadcast: String,

    /// Peers sampled by the random and hybrid policies.
    #[arg(long, default_value_t = DEFAULT_BROADCAST_SIZE)]
    broadcast_size: usize,

    /// Bucket capacity (k).
    #[arg(short = 'k', long, default_value_t = DEFAULT_BUCKET_SIZE)]
    bucket_size: usize,

    /// Number of trials; more than one prints aggregated statistics. Zero is rejected.
    #[arg(short, long, default_value = "1")]
    trials: usize,

    /// Reuse one topology for every trial instead of rebuilding it.
    #[arg(long)]
    fixed_network: bool,

    /// Inject the message at a random node instead of the seed.
    #[arg(long)]
    random_start: bool,

    /// Seed for a reproducible run.
    #[arg(short, long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();

    let discovery = DiscoveryPolicy::from_type(&args.discovery, args.depth)
        .context("invalid --discovery")?;
    let broadcast = BroadcastPolicy::from_type(&args.broadcast, args.broadcast_size)
        .context("invalid --broadcast")?;

    let config = TrialConfig {
        network_size: args.size,
        discovery,
        broadcast,
        start: if args.random_start { StartNode::Random } else { StartNode::Seed },
        seed: args.seed,
        bucket_size: args.bucket_size,
    };

    info!(
        size = config.network_size,
        discovery = %config.discovery,
        broadcast = %config.broadcast,
        k = config.bucket_size,
        trials = args.trials,
        fixed_network = args.fixed_network,
        "starting simulation"
    );

    if args.trials == 1 {
        let outcome = run_single_trial(&config).context("trial failed")?;
        println!("total number of peers: {}", outcome.total_peers);
        println!("total non-empty buckets: {}", outcome.total_non_empty_buckets);
        println!("success: {}", outcome.success());
        println!("send count: {}", outcome.send_count);
        println!("propagation: {}", outcome.propagation);
        println!("max hops: {}", outcome.max_hops);
        return Ok(());
    }

    let summary = run_trials(&config, args.trials, args.fixed_network).context("trials failed")?;
    println!("number of trials: {}", summary.trials);
    println!("number of successes: {}", summary.successes);
    println!("average propagation: {:.2}", summary.average_propagation);
    match summary.average_send_count {
        Some(avg) => println!("average send count for successes: {avg:.2}"),
        None => println!("average send count for successes: n/a"),
    }
    match summary.average_max_hops {
        Some(avg) => println!("average max hops for successes: {avg:.2}"),
        None => println!("average max hops for successes: n/a"),
    }

    Ok(())
}
