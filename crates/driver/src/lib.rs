//! The driver plumbs together the stages of a partitioning run: loading the
//! whole-program symbol graph, running the [`ltp_partition::Partitioner`] over
//! it, and summarising the result as a [`PartitionReport`].

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming
#![allow(clippy::multiple_crate_versions)] // Enforced by our dependencies

pub mod report;

use ltp_errors::driver::Result;
use ltp_partition::{config::PartitionConfig, PartitionOutput, PartitionerBuilder};
use ltp_symtab::SymbolGraph;
use tracing::info;

pub use crate::report::PartitionReport;

/// Partitions the program described by the graph file at `path` according to
/// `config`.
///
/// # Errors
///
/// - [`ltp_errors::driver::Error::Graph`] if the graph cannot be loaded.
/// - [`ltp_errors::driver::Error::Partition`] if partitioning fails.
pub fn run(path: &str, config: PartitionConfig) -> Result<PartitionReport> {
    let graph = SymbolGraph::read_from_file(path)?;
    info!(
        path,
        symbols = graph.len(),
        edges = graph.edges().len(),
        "Loaded symbol graph"
    );

    let output = partition(graph, config)?;
    let report = PartitionReport::new(&output);
    info!(
        partitions = report.partitions.len(),
        promoted = report.promoted.len(),
        "Partitioned program"
    );

    Ok(report)
}

/// Partitions `graph` according to `config`.
///
/// # Errors
///
/// - [`ltp_errors::driver::Error::Partition`] if partitioning fails.
pub fn partition(graph: SymbolGraph, config: PartitionConfig) -> Result<PartitionOutput> {
    let output = PartitionerBuilder::new(graph).with_config(config).build()?.run()?;
    Ok(output)
}

#[cfg(test)]
mod test {
    use std::env;

    use ltp_errors::driver::Error;
    use ltp_partition::config::{PartitionConfig, PartitionConfigBuilder, PartitionPolicy};
    use ltp_symtab::SymbolGraphBuilder;

    #[test]
    fn runs_on_a_graph_file() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let main = builder.function("main", 10);
        let helper = builder.function("helper", 10);
        builder.file(main, "main.c").file(helper, "helper.c").call(main, helper);
        let graph = builder.build()?;

        let path = env::temp_dir().join("ltp-driver-runs-on-a-graph-file.sym");
        let path = path.to_str().expect("Temporary path is not valid UTF-8");
        graph.write_to_file(path)?;

        let config = PartitionConfigBuilder::new()
            .with_policy(PartitionPolicy::OneToOne)
            .build()?;
        let report = super::run(path, config)?;

        assert_eq!(report.partitions.len(), 2);
        assert_eq!(report.partitions[0].name, "main.c");
        assert_eq!(report.promoted, vec!["helper".to_string()]);

        Ok(())
    }

    #[test]
    fn missing_graph_files_are_reported() {
        let result = super::run("/nonexistent/program.sym", PartitionConfig::default());
        assert!(matches!(result, Err(Error::Graph(_))));
    }
}
