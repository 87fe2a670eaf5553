//! Tidewater experiment driver

mod experiment;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tidewater_core::CcMode;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::experiment::{Experiment, ExperimentConfig};

/// Tidewater - windowed stream queries over concurrently updated relations
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Concurrency control: none, optimistic, 2pl or snapshot
    #[arg(short, long, default_value = "none")]
    method: CcMode,

    /// Commits joined into one pessimistic transaction
    #[arg(long, default_value_t = 1)]
    txn_joint_count: usize,

    /// Evaluations per scheduler wake-up
    #[arg(long, default_value_t = 1)]
    batch_count: usize,

    /// Pause between relation updates, in microseconds
    #[arg(long, default_value_t = 1000)]
    update_interval: u64,

    /// Time an update holds the relation, in microseconds
    #[arg(long, default_value_t = 10)]
    update_time: u64,

    /// Pause between purchases, in microseconds
    #[arg(long, default_value_t = 1000)]
    purchase_interval: u64,

    /// Number of purchases to send
    #[arg(short = 'n', long, default_value_t = 1000)]
    purchase_count: usize,

    /// Number of goods rows
    #[arg(long, default_value_t = 1000)]
    goods_count: i64,

    /// Highest goods price (exclusive)
    #[arg(long, default_value_t = 100_000)]
    max_price: i64,

    /// Lowest goods price
    #[arg(long, default_value_t = 1000)]
    min_price: i64,

    /// Window width in tuples
    #[arg(long, default_value_t = 5)]
    window_width: u64,

    /// Window stride in tuples
    #[arg(long, default_value_t = 5)]
    window_stride: u64,

    /// Print the query plan as Graphviz DOT and exit
    #[arg(long)]
    dot: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl From<&Args> for ExperimentConfig {
    fn from(args: &Args) -> Self {
        Self {
            mode: args.method,
            txn_joint_count: args.txn_joint_count,
            batch_count: args.batch_count,
            update_interval: Duration::from_micros(args.update_interval),
            update_time: Duration::from_micros(args.update_time),
            purchase_interval: Duration::from_micros(args.purchase_interval),
            purchase_count: args.purchase_count,
            goods_count: args.goods_count,
            min_price: args.min_price,
            max_price: args.max_price,
            window_width: args.window_width,
            window_stride: args.window_stride,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("tidewater={0},tidewater_core={0}", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let experiment = Experiment::new(ExperimentConfig::from(&args))?;
    if args.dot {
        println!("{}", experiment.to_dot()?);
        return Ok(());
    }

    let report = experiment.run()?;
    println!("{report}");
    Ok(())
}
