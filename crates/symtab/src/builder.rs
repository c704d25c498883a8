//! A fluent means of constructing a [`SymbolGraph`] in code.
//!
//! Symbols are given declaration orders in the order that they are added to the
//! builder, and are created as file-local definitions. Anything else about a
//! symbol can be adjusted through [`SymbolGraphBuilder::symbol_mut`] before the
//! graph is built.

use ltp_errors::graph::Result;

use crate::{
    edge::{Edge, EdgeKind, RefUse},
    graph::{ComdatGroup, ComdatGroupId, SymbolGraph},
    symbol::{Symbol, SymbolId, SymbolKind},
};

/// Allows for building a [`SymbolGraph`] one symbol and edge at a time.
#[derive(Clone, Debug, Default)]
pub struct SymbolGraphBuilder {
    symbols:       Vec<Symbol>,
    edges:         Vec<Edge>,
    comdat_groups: Vec<ComdatGroup>,
}

impl SymbolGraphBuilder {
    /// Creates a new, empty, graph builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a symbol of the provided `kind` and returns its identifier.
    fn add(&mut self, name: &str, kind: SymbolKind, size: u64) -> SymbolId {
        let id = SymbolId(self.symbols.len());
        let order = u32::try_from(self.symbols.len()).expect("Too many symbols in graph");
        self.symbols.push(Symbol::new(id, name, kind, order, size));
        id
    }

    /// Adds a defined function with the provided `name` and `size`.
    pub fn function(&mut self, name: &str, size: u64) -> SymbolId {
        self.add(name, SymbolKind::Function, size)
    }

    /// Adds a defined variable with the provided `name` and `size`.
    pub fn variable(&mut self, name: &str, size: u64) -> SymbolId {
        self.add(name, SymbolKind::Variable, size)
    }

    /// Adds a public symbol that is declared, but not defined, in the program.
    pub fn declaration(&mut self, name: &str, kind: SymbolKind) -> SymbolId {
        let id = self.add(name, kind, 0);
        let symbol = &mut self.symbols[id.0];
        symbol.definition = false;
        symbol.analyzed = false;
        symbol.public = true;
        symbol.externally_visible = true;
        id
    }

    /// Gets a mutable reference to a symbol that has already been added.
    ///
    /// # Panics
    ///
    /// If `id` was not returned by this builder.
    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0]
    }

    /// Records that the symbol `id` was read from the translation unit `file`.
    pub fn file(&mut self, id: SymbolId, file: &str) -> &mut Self {
        self.symbols[id.0].file = Some(file.to_string());
        self
    }

    /// Adds a call from `caller` to `callee` with unknown frequency.
    pub fn call(&mut self, caller: SymbolId, callee: SymbolId) -> &mut Self {
        self.call_with_frequency(caller, callee, 0)
    }

    /// Adds a call from `caller` to `callee` with the provided `frequency`.
    pub fn call_with_frequency(
        &mut self,
        caller: SymbolId,
        callee: SymbolId,
        frequency: u32,
    ) -> &mut Self {
        let kind = EdgeKind::Call { inlined: false };
        self.edges.push(Edge::new(caller, callee, kind, frequency));
        self
    }

    /// Records that `clone` is an inline clone whose body was merged into
    /// `caller`, adding the inlined call edge between them.
    ///
    /// If `caller` is itself an inline clone, `clone` is recorded as inlined
    /// into the function that `caller` was ultimately inlined into.
    pub fn inline_call(&mut self, caller: SymbolId, clone: SymbolId) -> &mut Self {
        let root = self.symbols[caller.0].inlined_to.unwrap_or(caller);
        self.symbols[clone.0].inlined_to = Some(root);

        let kind = EdgeKind::Call { inlined: true };
        self.edges.push(Edge::new(caller, clone, kind, 0));
        self
    }

    /// Adds a reference of the provided `use_kind` from `from` to `to`.
    pub fn reference(&mut self, from: SymbolId, to: SymbolId, use_kind: RefUse) -> &mut Self {
        self.reference_with_frequency(from, to, use_kind, 0)
    }

    /// Adds a reference from `from` to `to` with the provided `frequency`.
    pub fn reference_with_frequency(
        &mut self,
        from: SymbolId,
        to: SymbolId,
        use_kind: RefUse,
        frequency: u32,
    ) -> &mut Self {
        let kind = EdgeKind::Reference(use_kind);
        self.edges.push(Edge::new(from, to, kind, frequency));
        self
    }

    /// Makes `alias` an alias of `target`.
    pub fn alias(&mut self, alias: SymbolId, target: SymbolId) -> &mut Self {
        self.symbols[alias.0].alias_of = Some(target);
        self.reference(alias, target, RefUse::Alias)
    }

    /// Makes `thunk` a thunk that forwards to `target`.
    pub fn thunk(&mut self, thunk: SymbolId, target: SymbolId) -> &mut Self {
        self.symbols[thunk.0].thunk_of = Some(target);
        self.call(thunk, target)
    }

    /// Places `members` into a new COMDAT group named `name`, marking each of
    /// them as COMDAT.
    pub fn comdat_group(&mut self, name: &str, members: &[SymbolId]) -> ComdatGroupId {
        for member in members {
            self.symbols[member.0].comdat = true;
        }

        let id = self.comdat_groups.len();
        self.comdat_groups.push(ComdatGroup {
            name:    name.to_string(),
            members: members.to_vec(),
        });
        id
    }

    /// Builds the graph.
    ///
    /// # Errors
    ///
    /// - [`ltp_errors::graph::Error`] if the symbols and edges added to the
    ///   builder do not form a consistent graph.
    pub fn build(self) -> Result<SymbolGraph> {
        SymbolGraph::new(self.symbols, self.edges, self.comdat_groups)
    }
}

#[cfg(test)]
mod test {
    use ltp_errors::graph::Error;

    use crate::{builder::SymbolGraphBuilder, symbol::SymbolKind};

    #[test]
    fn declaration_orders_follow_insertion() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let a = builder.function("a", 1);
        let b = builder.variable("b", 1);
        let c = builder.declaration("c", SymbolKind::Function);
        let graph = builder.build()?;

        assert_eq!(graph.symbol(a).order, 0);
        assert_eq!(graph.symbol(b).order, 1);
        assert_eq!(graph.symbol(c).order, 2);
        assert!(!graph.symbol(c).definition);
        assert_eq!(graph.lookup("c"), Some(c));

        Ok(())
    }

    #[test]
    fn nested_inline_clones_point_at_the_outermost_function() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let outer = builder.function("outer", 10);
        let middle = builder.function("middle.inline", 5);
        let inner = builder.function("inner.inline", 2);
        builder.inline_call(outer, middle);
        builder.inline_call(middle, inner);
        let graph = builder.build()?;

        assert_eq!(graph.symbol(middle).inlined_to, Some(outer));
        assert_eq!(graph.symbol(inner).inlined_to, Some(outer));
        assert!(graph.callees(middle).all(|e| e.is_inlined_call()));

        Ok(())
    }

    #[test]
    fn thunks_are_indexed_by_target() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let target = builder.function("method", 10);
        let thunk = builder.function("method.thunk", 1);
        builder.thunk(thunk, target);
        let graph = builder.build()?;

        assert_eq!(graph.thunks_of(target), &[thunk]);
        assert_eq!(graph.callers(target).map(|e| e.from).collect::<Vec<_>>(), vec![thunk]);

        Ok(())
    }

    #[test]
    fn rejects_self_aliases() {
        let mut builder = SymbolGraphBuilder::new();
        let a = builder.function("a", 1);
        builder.alias(a, a);

        assert!(matches!(builder.build(), Err(Error::SelfLink(..))));
    }

    #[test]
    fn rejects_aliases_across_kinds() {
        let mut builder = SymbolGraphBuilder::new();
        let f = builder.function("f", 1);
        let v = builder.variable("v", 1);
        builder.alias(v, f);

        assert!(matches!(builder.build(), Err(Error::InvalidLink(..))));
    }
}
