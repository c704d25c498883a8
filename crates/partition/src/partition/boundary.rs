//! The boundary closure of a partition: the symbols a partition needs to know
//! about when it is emitted, whether or not it defines them.

use ltp_symtab::{SymbolGraph, SymbolId};

use crate::partition::{Encoder, Partition};

/// The members of a partition followed by every symbol that they use directly
/// without containing it.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundaryClosure {
    encoder: Encoder,
    members: usize,
}

impl BoundaryClosure {
    /// Gets every symbol in the closure, members first.
    #[must_use]
    pub fn symbols(&self) -> &[SymbolId] {
        self.encoder.as_slice()
    }

    /// Gets the symbols that the partition uses but does not contain.
    #[must_use]
    pub fn boundary(&self) -> &[SymbolId] {
        &self.encoder.as_slice()[self.members..]
    }

    /// Returns `true` if `id` is a member of the partition itself.
    #[must_use]
    pub fn is_member(&self, id: SymbolId) -> bool {
        self.encoder.position(id).is_some_and(|p| p < self.members)
    }

    /// Returns `true` if `id` is anywhere in the closure.
    #[must_use]
    pub fn contains(&self, id: SymbolId) -> bool {
        self.encoder.contains(id)
    }
}

/// Computes the boundary closure of `partition`.
///
/// A symbol is in the closure if it is a member, or if some member calls it,
/// refers to it, is an alias of it, or is a thunk for it. Each symbol appears
/// once.
#[must_use]
pub fn compute_boundary(graph: &SymbolGraph, partition: &Partition) -> BoundaryClosure {
    let mut encoder = partition.symbols().clone();
    let members = encoder.len();

    for &member in partition.symbols().as_slice() {
        let symbol = graph.symbol(member);
        let targets = graph
            .callees(member)
            .chain(graph.references(member))
            .map(|edge| edge.to)
            .chain(symbol.alias_of)
            .chain(symbol.thunk_of);

        for target in targets {
            encoder.insert(target);
        }
    }

    BoundaryClosure { encoder, members }
}

#[cfg(test)]
mod test {
    use ltp_symtab::{RefUse, SymbolGraphBuilder, SymbolKind};

    use crate::partition::{boundary::compute_boundary, Partition, PlacementTable};

    #[test]
    fn closure_lists_members_then_used_symbols() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let main = builder.function("main", 10);
        let helper = builder.function("helper", 5);
        let table = builder.variable("table", 8);
        let puts = builder.declaration("puts", SymbolKind::Function);
        let unrelated = builder.function("unrelated", 3);
        builder.call(main, helper).call(main, puts).call(helper, puts);
        builder.reference(main, table, RefUse::Load);
        let graph = builder.build()?;

        let mut placements = PlacementTable::new(graph.len());
        let mut partition = Partition::new("");
        partition.insert(main, 10, &mut placements);

        let closure = compute_boundary(&graph, &partition);
        assert_eq!(closure.symbols(), &[main, helper, puts, table]);
        assert_eq!(closure.boundary(), &[helper, puts, table]);
        assert!(closure.is_member(main));
        assert!(!closure.is_member(helper));
        assert!(!closure.contains(unrelated));

        Ok(())
    }

    #[test]
    fn aliases_and_thunks_bring_their_targets() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let target = builder.function("target", 10);
        let alias = builder.function("alias", 0);
        let wrapped = builder.function("wrapped", 10);
        let thunk = builder.function("thunk", 1);
        builder.alias(alias, target).thunk(thunk, wrapped);
        let graph = builder.build()?;

        let mut placements = PlacementTable::new(graph.len());
        let mut partition = Partition::new("");
        partition.insert(alias, 0, &mut placements);
        partition.insert(thunk, 1, &mut placements);

        let closure = compute_boundary(&graph, &partition);
        assert_eq!(closure.boundary(), &[target, wrapped]);

        Ok(())
    }
}
