//! This is the CLI driver for the partitioning of whole programs for link-time
//! optimization. For more detail, please see the documentation for the
//! [`ltp_partition`] crate.

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming
#![allow(clippy::multiple_crate_versions)] // Enforced by our dependencies

use clap::{ArgAction, Parser};
use ltp_partition::{
    config::{PartitionConfig, PartitionConfigBuilder, PartitionPolicy},
    constant::{DEFAULT_MIN_PARTITION_SIZE, DEFAULT_PARTITION_COUNT},
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// The environment variable from which the logging filter is read.
const LOG_ENV_VAR: &str = "LTP_LOG";

/// Splits a whole-program symbol graph into partitions for parallel link-time
/// optimization.
#[derive(Debug, Parser)]
#[command(name = "ltp", version, about)]
struct Args {
    /// The symbol graph file to partition.
    graph: String,

    /// The policy by which symbols are assigned to partitions.
    #[arg(long, value_enum, default_value_t = PartitionPolicy::Balanced)]
    policy: PartitionPolicy,

    /// The number of partitions to aim for under the balanced policy.
    #[arg(long, default_value_t = DEFAULT_PARTITION_COUNT)]
    partitions: usize,

    /// The smallest target size of a balanced partition, in instructions.
    #[arg(long, default_value_t = DEFAULT_MIN_PARTITION_SIZE)]
    min_partition_size: u64,

    /// Keep symbols in their declaration order.
    #[arg(long)]
    no_toplevel_reorder: bool,

    /// Write the report to this file as an S-expression instead of printing a
    /// table.
    #[arg(short, long)]
    output: Option<String>,

    /// Log more detail; may be repeated.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    /// Builds the partitioner configuration that the arguments describe.
    fn config(&self) -> anyhow::Result<PartitionConfig> {
        let config = PartitionConfigBuilder::new()
            .with_policy(self.policy)
            .with_partitions(self.partitions)
            .with_min_partition_size(self.min_partition_size)
            .with_toplevel_reorder(!self.no_toplevel_reorder)
            .build()?;
        Ok(config)
    }
}

/// Installs the global logger, filtering by the contents of [`LOG_ENV_VAR`]
/// unless a `verbosity` is requested.
fn init_logging(verbosity: u8) -> anyhow::Result<()> {
    let filter = EnvFilter::from_env(LOG_ENV_VAR);
    let filter = match verbosity {
        0 => filter,
        1 => filter.add_directive("info".parse()?),
        2 => filter.add_directive("debug".parse()?),
        _ => filter.add_directive("trace".parse()?),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let config = args.config()?;
    debug!(?config, "Partitioning {}", args.graph);
    let report = ltp_driver::run(&args.graph, config)?;

    match &args.output {
        Some(path) => report.write_to_file(path)?,
        None => println!("{}", report.to_table()),
    }

    Ok(())
}
