//! Orderings over the symbols of a [`SymbolGraph`].
//!
//! The partitioner walks symbols in a fixed order, so that placement decisions
//! are deterministic for a given graph. Two orders are provided:
//!
//! - **Reverse postorder** of the call graph, which puts callers before their
//!   callees and so approximates the layout of the final code. Cycles are
//!   tolerated; a cycle is entered at whichever member is reached first.
//! - **Declaration order**, which follows the order of the symbols in the
//!   original source.

use itertools::Itertools;
use petgraph::{
    graph::{DiGraph, NodeIndex},
    visit::{DfsPostOrder, VisitMap},
};

use crate::{
    graph::SymbolGraph,
    symbol::{SymbolId, SymbolKind},
};

impl SymbolGraph {
    /// Computes the reverse postorder of the functions in the call graph.
    ///
    /// Aliases are treated as though they call the function that they alias,
    /// so that they are ordered before it. The traversal is rooted first at
    /// functions with no callers and then at any function left unvisited (those
    /// only reachable through a cycle). Within each of those groups, roots that
    /// are declared earlier come out earlier. A cycle that nothing calls into is
    /// entered at its last-declared member.
    ///
    /// Every function in the graph appears exactly once in the result.
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<SymbolId> {
        // Node indices coincide with symbol indices, variables simply being left
        // disconnected.
        let mut graph: DiGraph<SymbolId, ()> = DiGraph::with_capacity(self.len(), self.edges().len());
        for id in self.ids() {
            graph.add_node(id);
        }
        for edge in self.edges() {
            let connects_functions =
                self.symbol(edge.from).is_function() && self.symbol(edge.to).is_function();
            if connects_functions && (edge.is_call() || edge.is_alias()) && !edge.is_self_edge() {
                graph.add_edge(NodeIndex::new(edge.from.0), NodeIndex::new(edge.to.0), ());
            }
        }

        let functions = self.sort_by_declaration_order(
            self.functions().map(|s| s.id).collect::<Vec<_>>().as_slice(),
        );
        let (entries, rest): (Vec<_>, Vec<_>) = functions
            .into_iter()
            .partition(|id| self.callers(*id).all(|e| e.is_self_edge()) && !self.is_aliasing(*id));

        let mut dfs = DfsPostOrder::empty(&graph);
        let mut order = Vec::with_capacity(self.len());

        // Each group of roots is walked from last-declared to first-declared, so
        // that reversing the postorder places earlier declarations first.
        for roots in [entries, rest] {
            let mut postorder = Vec::new();
            for root in roots.iter().rev() {
                let root = NodeIndex::new(root.0);
                if dfs.discovered.is_visited(&root) {
                    continue;
                }
                dfs.move_to(root);
                while let Some(node) = dfs.next(&graph) {
                    postorder.push(graph[node]);
                }
            }
            order.extend(postorder.into_iter().rev());
        }

        order
    }

    /// Returns a copy of `ids`, stably sorted by the declaration order of the
    /// symbols.
    #[must_use]
    pub fn sort_by_declaration_order(&self, ids: &[SymbolId]) -> Vec<SymbolId> {
        ids.iter()
            .copied()
            .sorted_by_key(|id| self.symbol(*id).order)
            .collect()
    }

    /// Gets every symbol of the provided `kind`, in declaration order.
    #[must_use]
    pub fn in_declaration_order(&self, kind: SymbolKind) -> Vec<SymbolId> {
        self.symbols()
            .iter()
            .filter(|s| s.kind == kind)
            .sorted_by_key(|s| s.order)
            .map(|s| s.id)
            .collect()
    }

    /// Returns `true` if some other function is an alias of `id`.
    fn is_aliasing(&self, id: SymbolId) -> bool {
        self.referring(id).any(|e| e.is_alias() && self.symbol(e.from).is_function())
    }
}

#[cfg(test)]
mod test {
    use crate::{builder::SymbolGraphBuilder, symbol::SymbolKind};

    #[test]
    fn callers_precede_callees() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let c = builder.function("c", 1);
        let b = builder.function("b", 1);
        let a = builder.function("a", 1);
        builder.call(a, b).call(b, c);
        let graph = builder.build()?;

        assert_eq!(graph.reverse_postorder(), vec![a, b, c]);

        Ok(())
    }

    #[test]
    fn shared_callees_come_after_all_callers() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let first = builder.function("first", 1);
        let second = builder.function("second", 1);
        let shared = builder.function("shared", 1);
        builder.call(first, shared).call(second, shared);
        let graph = builder.build()?;

        assert_eq!(graph.reverse_postorder(), vec![first, second, shared]);

        Ok(())
    }

    #[test]
    fn cycles_and_variables_are_handled() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let main = builder.function("main", 1);
        let _data = builder.variable("data", 8);
        let ping = builder.function("ping", 1);
        let pong = builder.function("pong", 1);
        let lonely_a = builder.function("lonely_a", 1);
        let lonely_b = builder.function("lonely_b", 1);
        builder.call(main, ping).call(ping, pong).call(pong, ping);
        builder.call(lonely_a, lonely_b).call(lonely_b, lonely_a);
        let graph = builder.build()?;

        let order = graph.reverse_postorder();
        assert_eq!(order, vec![main, ping, pong, lonely_b, lonely_a]);

        Ok(())
    }

    #[test]
    fn aliases_precede_their_targets() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let target = builder.function("target", 1);
        let alias = builder.function("alias", 0);
        builder.alias(alias, target);
        let graph = builder.build()?;

        assert_eq!(graph.reverse_postorder(), vec![alias, target]);

        Ok(())
    }

    #[test]
    fn declaration_order_is_stable() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let x = builder.variable("x", 1);
        let f = builder.function("f", 1);
        let y = builder.variable("y", 1);
        builder.symbol_mut(x).order = 10;
        let graph = builder.build()?;

        assert_eq!(graph.in_declaration_order(SymbolKind::Variable), vec![y, x]);
        assert_eq!(graph.sort_by_declaration_order(&[x, f, y]), vec![f, y, x]);

        Ok(())
    }
}
