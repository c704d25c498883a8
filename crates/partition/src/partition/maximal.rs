//! The maximal partitioning policy, which gives every partitionable symbol a
//! partition of its own.

use ltp_symtab::SymbolGraph;
use tracing::trace;

use crate::{
    constant::EMPTY_PARTITION_NAME,
    partition::{group::SymbolGrouper, Partition, PartitionSet, PlacementTable},
    pass::analysis::classify::SymbolClassification,
};

/// Places every partitionable symbol that has not already been placed into a
/// new partition named after it.
///
/// Symbols that are pulled into an earlier partition (for example the aliases
/// of a function) do not get a partition of their own, and no partition is
/// kept for a symbol that could not be placed. If nothing is placed at all,
/// the result is a single empty partition.
#[must_use]
pub fn map_maximal(
    graph: &SymbolGraph,
    classes: &SymbolClassification,
    placements: &mut PlacementTable,
) -> PartitionSet {
    let grouper = SymbolGrouper::new(graph, classes);
    let mut partitions = PartitionSet::new();

    for symbol in graph.symbols() {
        if !classes.is_partitioned(symbol.id) || placements.is_placed(symbol.id) {
            continue;
        }

        let mut partition = Partition::new(&symbol.name);
        if !grouper.add(&mut partition, placements, symbol.id) {
            trace!(symbol = %symbol.name, "Nothing to place for symbol");
            continue;
        }
        trace!(
            partition = %symbol.name,
            symbols = partition.len(),
            "Created partition"
        );
        partitions.push(partition);
    }

    if partitions.is_empty() {
        partitions.create(EMPTY_PARTITION_NAME);
    }
    partitions.freeze_all();

    partitions
}

#[cfg(test)]
mod test {
    use ltp_symtab::{SymbolGraphBuilder, SymbolKind};

    use crate::{
        partition::{maximal::map_maximal, PlacementTable},
        pass::analysis::classify::ClassifySymbols,
    };

    #[test]
    fn every_symbol_gets_a_partition() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let f = builder.function("f", 10);
        let g = builder.function("g", 10);
        let v = builder.variable("v", 4);
        builder.call(f, g);
        let graph = builder.build()?;
        let classes = ClassifySymbols::classify_graph(&graph);

        let partitions = map_maximal(&graph, &classes, &mut PlacementTable::new(graph.len()));
        let names: Vec<&str> = partitions.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["f", "g", "v"]);
        assert_eq!(partitions.get(1).map(|p| p.symbols().as_slice()), Some(&[g][..]));
        assert!(partitions.get(2).is_some_and(|p| p.contains(v)));
        assert!(partitions.iter().all(|p| p.is_frozen()));
        assert!(partitions.get(0).is_some_and(|p| p.contains(f)));

        Ok(())
    }

    #[test]
    fn aliases_share_their_targets_partition() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let target = builder.function("target", 10);
        let alias = builder.function("alias", 0);
        builder.alias(alias, target);
        let graph = builder.build()?;
        let classes = ClassifySymbols::classify_graph(&graph);

        let partitions = map_maximal(&graph, &classes, &mut PlacementTable::new(graph.len()));
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions.current().symbols().as_slice(), &[target, alias]);

        Ok(())
    }

    #[test]
    fn no_partition_is_left_empty() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let decl = builder.declaration("puts", SymbolKind::Function);
        let alias = builder.function("my_puts", 0);
        let thunk = builder.function("my_puts.thunk", 1);
        builder.alias(alias, decl);
        builder.symbol_mut(thunk).thunk_of = Some(alias);
        let graph = builder.build()?;
        let classes = ClassifySymbols::classify_graph(&graph);

        let partitions = map_maximal(&graph, &classes, &mut PlacementTable::new(graph.len()));
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions.current().name(), "my_puts");
        assert_eq!(partitions.current().symbols().as_slice(), &[alias, thunk]);
        assert!(partitions.iter().all(|p| !p.is_empty()));

        Ok(())
    }

    #[test]
    fn nothing_to_place_gives_an_empty_partition() -> anyhow::Result<()> {
        let graph = SymbolGraphBuilder::new().build()?;
        let classes = ClassifySymbols::classify_graph(&graph);

        let partitions = map_maximal(&graph, &classes, &mut PlacementTable::new(graph.len()));
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions.current().name(), "empty");

        Ok(())
    }
}
