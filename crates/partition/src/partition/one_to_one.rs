//! The one-to-one partitioning policy, which keeps each input translation unit
//! in a partition of its own.

use std::collections::HashMap;

use ltp_symtab::SymbolGraph;
use tracing::debug;

use crate::{
    constant::EMPTY_PARTITION_NAME,
    partition::{group::SymbolGrouper, PartitionSet, PlacementTable},
    pass::analysis::classify::SymbolClassification,
};

/// Places every partitionable symbol into the partition for the file that it
/// came from, creating partitions in the order their files are first seen.
///
/// Symbols that did not come from any file share a single partition with an
/// empty name. If nothing is placed at all, the result is a single empty
/// partition.
#[must_use]
pub fn map_one_to_one(
    graph: &SymbolGraph,
    classes: &SymbolClassification,
    placements: &mut PlacementTable,
) -> PartitionSet {
    let grouper = SymbolGrouper::new(graph, classes);
    let mut partitions = PartitionSet::new();
    let mut by_file: HashMap<Option<&str>, usize> = HashMap::new();

    for symbol in graph.symbols() {
        if !classes.is_partitioned(symbol.id) || placements.is_placed(symbol.id) {
            continue;
        }

        let file = symbol.file.as_deref();
        let index = *by_file.entry(file).or_insert_with(|| {
            debug!(file = file.unwrap_or_default(), "Creating partition for file");
            partitions.create(file.unwrap_or_default())
        });
        let partition = partitions.get_mut(index).expect("Partition was just created");
        grouper.add(partition, placements, symbol.id);
    }

    if partitions.is_empty() {
        partitions.create(EMPTY_PARTITION_NAME);
    }
    partitions.freeze_all();

    partitions
}
