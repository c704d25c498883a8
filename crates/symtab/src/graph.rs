//! The in-memory representation of the whole-program symbol graph, along with
//! the means to read and write it as a `.sym` file.
//!
//! The graph stores its symbols, edges, and COMDAT groups in flat vectors that
//! are indexed by [`SymbolId`], [`EdgeId`], and [`ComdatGroupId`]
//! respectively. Everything else (the per-symbol adjacency lists, the COMDAT
//! membership index, and the global name table) is derived from those vectors
//! and rebuilt whenever the graph is constructed or loaded.

use std::{
    fs::File,
    io::{Read, Write},
    str::FromStr,
};

use ltp_errors::graph::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::{
    edge::{Edge, EdgeId},
    intern::NameTable,
    symbol::{Symbol, SymbolId, SymbolKind},
};

/// A dense, positional identifier for a COMDAT group in a [`SymbolGraph`].
pub type ComdatGroupId = usize;

/// A set of symbols that the linker must keep or discard together, and that
/// must hence always be emitted into the same partition.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ComdatGroup {
    /// The name of the group's signature symbol.
    pub name: String,

    /// The members of the group, in declaration order.
    pub members: Vec<SymbolId>,
}

/// The per-symbol indices that are derived from the graph's edges and groups.
#[derive(Clone, Debug, Default, PartialEq)]
struct Adjacency {
    /// Outgoing call edges for each symbol.
    callees: Vec<Vec<EdgeId>>,

    /// Incoming call edges for each symbol.
    callers: Vec<Vec<EdgeId>>,

    /// Outgoing reference edges for each symbol.
    references: Vec<Vec<EdgeId>>,

    /// Incoming reference edges for each symbol.
    referring: Vec<Vec<EdgeId>>,

    /// The thunks that forward to each symbol.
    thunks: Vec<Vec<SymbolId>>,

    /// The COMDAT group that each symbol belongs to, if any.
    groups: Vec<Option<ComdatGroupId>>,
}

/// The whole-program graph of symbols.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SymbolGraph {
    /// Every symbol in the program, indexed by [`SymbolId`].
    symbols: Vec<Symbol>,

    /// Every call and reference edge in the program, indexed by [`EdgeId`].
    edges: Vec<Edge>,

    /// The COMDAT groups in the program.
    #[serde(default)]
    comdat_groups: Vec<ComdatGroup>,

    // Derived data.
    /// The adjacency lists and group membership for each symbol.
    #[serde(skip)]
    adjacency: Adjacency,

    /// The names of the public symbols in the program.
    #[serde(skip)]
    globals: NameTable,
}

/// Construction and validation.
impl SymbolGraph {
    /// Creates a new graph from its constituent parts, building all derived data
    /// and validating the result.
    ///
    /// # Errors
    ///
    /// - [`Error`] if the parts do not describe a consistent graph.
    pub fn new(
        symbols: Vec<Symbol>,
        edges: Vec<Edge>,
        comdat_groups: Vec<ComdatGroup>,
    ) -> Result<Self> {
        let mut graph = Self {
            symbols,
            edges,
            comdat_groups,
            adjacency: Adjacency::default(),
            globals: NameTable::new(),
        };
        graph.rebuild()?;

        Ok(graph)
    }

    /// Renumbers the symbols, checks the graph for consistency, and then
    /// rebuilds all the derived data.
    fn rebuild(&mut self) -> Result<()> {
        for (index, symbol) in self.symbols.iter_mut().enumerate() {
            symbol.id = SymbolId(index);
        }

        self.validate_symbols()?;
        self.validate_edges()?;

        let count = self.symbols.len();
        let mut adjacency = Adjacency {
            callees:    vec![Vec::new(); count],
            callers:    vec![Vec::new(); count],
            references: vec![Vec::new(); count],
            referring:  vec![Vec::new(); count],
            thunks:     vec![Vec::new(); count],
            groups:     vec![None; count],
        };

        for (edge_id, edge) in self.edges.iter().enumerate() {
            if edge.is_call() {
                adjacency.callees[edge.from.0].push(edge_id);
                adjacency.callers[edge.to.0].push(edge_id);
            } else {
                adjacency.references[edge.from.0].push(edge_id);
                adjacency.referring[edge.to.0].push(edge_id);
            }
        }

        for symbol in &self.symbols {
            if let Some(target) = symbol.thunk_of {
                adjacency.thunks[target.0].push(symbol.id);
            }
        }

        for (group_id, group) in self.comdat_groups.iter().enumerate() {
            for member in &group.members {
                let slot = adjacency
                    .groups
                    .get_mut(member.0)
                    .ok_or(Error::UnknownSymbol(member.0))?;
                if let Some(existing) = *slot {
                    if existing != group_id {
                        Err(Error::ConflictingComdatGroup(
                            self.symbols[member.0].name.clone(),
                            self.comdat_groups[existing].name.clone(),
                            group.name.clone(),
                        ))?;
                    }
                }
                let member_symbol = &self.symbols[member.0];
                if !member_symbol.definition {
                    Err(Error::UndefinedComdatMember(
                        member_symbol.name.clone(),
                        group.name.clone(),
                    ))?;
                }
                if member_symbol.is_function() && !member_symbol.analyzed {
                    Err(Error::UnanalyzedComdatMember(
                        member_symbol.name.clone(),
                        group.name.clone(),
                    ))?;
                }
                *slot = Some(group_id);
            }
        }

        let mut globals = NameTable::new();
        for symbol in self.symbols.iter().filter(|s| s.public) {
            if !globals.insert(&symbol.name, symbol.id) {
                Err(Error::DuplicateName(symbol.name.clone()))?;
            }
        }

        self.adjacency = adjacency;
        self.globals = globals;

        Ok(())
    }

    /// Checks that the relationship links on every symbol are well-formed, and
    /// that declaration orders are unique.
    fn validate_symbols(&self) -> Result<()> {
        let mut orders = std::collections::HashMap::new();

        for symbol in &self.symbols {
            if let Some(previous) = orders.insert(symbol.order, symbol.id) {
                Err(Error::DuplicateOrder(
                    self.symbols[previous.0].name.clone(),
                    symbol.name.clone(),
                    symbol.order,
                ))?;
            }

            // Each link is paired with whether both of its ends must be functions.
            let links = [
                (symbol.inlined_to, "inlined into", true),
                (symbol.alias_of, "an alias of", false),
                (symbol.thunk_of, "a thunk of", true),
            ];
            for (link, description, functions_only) in links {
                let Some(target) = link else { continue };
                let target_symbol = self
                    .symbols
                    .get(target.0)
                    .ok_or(Error::UnknownSymbol(target.0))?;

                if target == symbol.id {
                    Err(Error::SelfLink(symbol.name.clone(), description))?;
                }

                let kinds_ok = if functions_only {
                    symbol.is_function() && target_symbol.is_function()
                } else {
                    target_symbol.kind == symbol.kind
                };
                if !kinds_ok {
                    Err(Error::InvalidLink(
                        symbol.name.clone(),
                        description,
                        target_symbol.name.clone(),
                    ))?;
                }
            }
        }

        self.validate_link_chains()
    }

    /// Checks that following the links out of any symbol eventually arrives at
    /// a symbol with no links of its own.
    fn validate_link_chains(&self) -> Result<()> {
        for symbol in &self.symbols {
            let mut current = symbol;
            let mut steps = 0;
            while let Some(next) = current.alias_of.or(current.thunk_of).or(current.inlined_to) {
                steps += 1;
                if steps > self.symbols.len() {
                    Err(Error::CyclicLink(symbol.name.clone()))?;
                }
                current = &self.symbols[next.0];
            }
        }

        Ok(())
    }

    /// Checks that every edge refers to symbols in the graph, and that call
    /// edges only ever connect functions.
    fn validate_edges(&self) -> Result<()> {
        for edge in &self.edges {
            let from = self.symbols.get(edge.from.0).ok_or(Error::UnknownSymbol(edge.from.0))?;
            let to = self.symbols.get(edge.to.0).ok_or(Error::UnknownSymbol(edge.to.0))?;

            if edge.is_call() && !(from.is_function() && to.is_function()) {
                Err(Error::CallFromVariable(from.name.clone(), to.name.clone()))?;
            }
        }

        Ok(())
    }
}

/// Queries over the symbols in the graph.
impl SymbolGraph {
    /// Gets the number of symbols in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns `true` if the graph contains no symbols.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Gets the symbol with the provided `id`.
    ///
    /// # Panics
    ///
    /// If `id` does not refer to a symbol in this graph. This is a programmer
    /// error.
    #[must_use]
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    /// Gets a mutable reference to the symbol with the provided `id`.
    ///
    /// Note that renaming a symbol through this reference bypasses the global
    /// name table; use [`Self::rename`] for that.
    ///
    /// # Panics
    ///
    /// If `id` does not refer to a symbol in this graph. This is a programmer
    /// error.
    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0]
    }

    /// Gets all the symbols in the graph, in [`SymbolId`] order.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Gets the identifiers of all the symbols in the graph.
    pub fn ids(&self) -> impl Iterator<Item = SymbolId> + '_ {
        (0..self.symbols.len()).map(SymbolId)
    }

    /// Gets the functions in the graph.
    pub fn functions(&self) -> impl Iterator<Item = &Symbol> + '_ {
        self.symbols.iter().filter(|s| s.kind == SymbolKind::Function)
    }

    /// Gets the variables in the graph.
    pub fn variables(&self) -> impl Iterator<Item = &Symbol> + '_ {
        self.symbols.iter().filter(|s| s.kind == SymbolKind::Variable)
    }

    /// Gets the public symbol with the provided `name`, if one exists.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.globals.id_of(name)
    }

    /// Gets the first symbol, public or not, with the provided `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<SymbolId> {
        self.lookup(name)
            .or_else(|| self.symbols.iter().find(|s| s.name == name).map(|s| s.id))
    }

    /// Gets the table of names in the program-wide namespace.
    #[must_use]
    pub fn global_names(&self) -> &NameTable {
        &self.globals
    }
}

/// Queries over the edges in the graph.
impl SymbolGraph {
    /// Gets the edge with the provided `id`.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id]
    }

    /// Gets all the edges in the graph, in [`EdgeId`] order.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Gets the outgoing call edges of `id`.
    pub fn callees(&self, id: SymbolId) -> impl Iterator<Item = &Edge> + '_ {
        self.adjacency.callees[id.0].iter().map(|e| &self.edges[*e])
    }

    /// Gets the incoming call edges of `id`.
    pub fn callers(&self, id: SymbolId) -> impl Iterator<Item = &Edge> + '_ {
        self.adjacency.callers[id.0].iter().map(|e| &self.edges[*e])
    }

    /// Gets the outgoing reference edges of `id`.
    pub fn references(&self, id: SymbolId) -> impl Iterator<Item = &Edge> + '_ {
        self.adjacency.references[id.0].iter().map(|e| &self.edges[*e])
    }

    /// Gets the incoming reference edges of `id`.
    pub fn referring(&self, id: SymbolId) -> impl Iterator<Item = &Edge> + '_ {
        self.adjacency.referring[id.0].iter().map(|e| &self.edges[*e])
    }

    /// Gets the aliases that directly alias `id`.
    ///
    /// An alias may be declared either through an alias reference edge or
    /// through [`Symbol::alias_of`]; both are reported, each alias once.
    #[must_use]
    pub fn aliases_of(&self, id: SymbolId) -> Vec<SymbolId> {
        let mut aliases: Vec<SymbolId> = self
            .referring(id)
            .filter(|e| e.is_alias())
            .map(|e| e.from)
            .collect();
        for symbol in &self.symbols {
            if symbol.alias_of == Some(id) && !aliases.contains(&symbol.id) {
                aliases.push(symbol.id);
            }
        }

        aliases
    }

    /// Gets the thunks that forward to `id`.
    #[must_use]
    pub fn thunks_of(&self, id: SymbolId) -> &[SymbolId] {
        &self.adjacency.thunks[id.0]
    }
}

/// Queries over COMDAT groups.
impl SymbolGraph {
    /// Gets the COMDAT group that `id` belongs to, if any.
    #[must_use]
    pub fn group_of(&self, id: SymbolId) -> Option<ComdatGroupId> {
        self.adjacency.groups[id.0]
    }

    /// Gets the members of the COMDAT group `group`.
    #[must_use]
    pub fn members_of(&self, group: ComdatGroupId) -> &[SymbolId] {
        &self.comdat_groups[group].members
    }

    /// Gets the COMDAT group with the provided identifier.
    #[must_use]
    pub fn comdat_group(&self, group: ComdatGroupId) -> &ComdatGroup {
        &self.comdat_groups[group]
    }

    /// Gets all the COMDAT groups in the graph.
    #[must_use]
    pub fn comdat_groups(&self) -> &[ComdatGroup] {
        &self.comdat_groups
    }
}

/// Mutations of symbol names and linkage.
impl SymbolGraph {
    /// Renames the symbol `id` to `new_name`, keeping the global name table in
    /// sync if the symbol is public.
    ///
    /// # Panics
    ///
    /// If the symbol is public and `new_name` is already owned by another
    /// public symbol.
    pub fn rename(&mut self, id: SymbolId, new_name: &str) {
        let symbol = &mut self.symbols[id.0];
        if symbol.public {
            self.globals.remove_id(id);
            assert!(
                self.globals.insert(new_name, id),
                "Global name `{new_name}` is already in use"
            );
        }
        symbol.name = new_name.to_string();
    }

    /// Registers the (now public) symbol `id` in the program-wide namespace.
    ///
    /// # Panics
    ///
    /// If the symbol is not public, or if its name is already owned by another
    /// public symbol.
    pub fn publish(&mut self, id: SymbolId) {
        let symbol = &self.symbols[id.0];
        assert!(symbol.public, "Symbol `{}` is not public", symbol.name);
        assert!(
            self.globals.insert(&symbol.name, id),
            "Global name `{}` is already in use",
            symbol.name
        );
    }
}

/// Reading and writing `.sym` files.
impl SymbolGraph {
    /// Reads a graph from the provided reader.
    ///
    /// # Errors
    ///
    /// - [`Error::Deserialization`] if the input is not a valid encoding of a
    ///   graph.
    /// - [`Error`] if the decoded graph is not consistent.
    pub fn read(reader: impl Read) -> Result<Self> {
        let mut graph: Self =
            serde_sexpr::from_reader(reader).map_err(|e| Error::Deserialization(e.to_string()))?;
        graph.rebuild()?;

        Ok(graph)
    }

    /// Reads a graph from the file at the provided `filename`.
    ///
    /// # Errors
    ///
    /// - [`Error::IOError`] if the file cannot be opened.
    /// - [`Error`] if the file does not contain a consistent graph.
    pub fn read_from_file(filename: &str) -> Result<Self> {
        let reader = File::open(filename)?;
        Self::read(reader)
    }

    /// Produces a string that contains the serialized form of the graph.
    ///
    /// # Errors
    ///
    /// - [`Error::Serialization`] if it is not possible to serialize `self`.
    pub fn to_str(&self) -> Result<String> {
        serde_sexpr::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Writes the graph to the provided `writer`.
    ///
    /// # Errors
    ///
    /// - [`Error::Serialization`] if it is not possible to write `self` to the
    ///   provided `writer`.
    pub fn write(&self, writer: impl Write) -> Result<()> {
        serde_sexpr::to_writer(writer, self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Writes the graph to the file at the provided `filename`.
    ///
    /// # Errors
    ///
    /// - [`Error::IOError`] if the file cannot be created.
    /// - [`Error::Serialization`] if it is not possible to write `self`.
    pub fn write_to_file(&self, filename: &str) -> Result<()> {
        let writer = File::create(filename)?;
        self.write(writer)
    }
}

impl FromStr for SymbolGraph {
    type Err = Error;

    /// Creates a graph from its string representation; for example, from a
    /// string read from a `.sym` file.
    fn from_str(encoded: &str) -> Result<Self> {
        let mut graph: Self =
            serde_sexpr::from_str(encoded).map_err(|e| Error::Deserialization(e.to_string()))?;
        graph.rebuild()?;

        Ok(graph)
    }
}

#[cfg(test)]
mod test {
    use ltp_errors::graph::Error;

    use crate::{
        edge::{Edge, EdgeKind, RefUse},
        graph::{ComdatGroup, SymbolGraph},
        symbol::{Symbol, SymbolId, SymbolKind},
        SymbolGraphBuilder,
    };

    #[test]
    fn adjacency_is_built_for_both_directions() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let main = builder.function("main", 10);
        let helper = builder.function("helper", 5);
        let table = builder.variable("table", 64);
        builder.call(main, helper);
        builder.reference(helper, table, RefUse::Load);
        let graph = builder.build()?;

        assert_eq!(graph.callees(main).map(|e| e.to).collect::<Vec<_>>(), vec![helper]);
        assert_eq!(graph.callers(helper).map(|e| e.from).collect::<Vec<_>>(), vec![main]);
        assert_eq!(graph.references(helper).map(|e| e.to).collect::<Vec<_>>(), vec![table]);
        assert_eq!(graph.referring(table).map(|e| e.from).collect::<Vec<_>>(), vec![helper]);
        assert_eq!(graph.functions().count(), 2);
        assert_eq!(graph.variables().count(), 1);

        Ok(())
    }

    #[test]
    fn comdat_membership_is_indexed() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let a = builder.function("a", 1);
        let b = builder.function("b", 1);
        let c = builder.function("c", 1);
        let group = builder.comdat_group("a", &[a, b]);
        let graph = builder.build()?;

        assert_eq!(graph.group_of(a), Some(group));
        assert_eq!(graph.group_of(b), Some(group));
        assert_eq!(graph.group_of(c), None);
        assert_eq!(graph.members_of(group), &[a, b]);

        Ok(())
    }

    #[test]
    fn rejects_conflicting_groups() {
        let symbols = vec![Symbol::new(SymbolId(0), "a", SymbolKind::Function, 0, 1)];
        let groups = vec![
            ComdatGroup {
                name:    "g1".to_string(),
                members: vec![SymbolId(0)],
            },
            ComdatGroup {
                name:    "g2".to_string(),
                members: vec![SymbolId(0)],
            },
        ];

        let result = SymbolGraph::new(symbols, vec![], groups);
        assert!(matches!(result, Err(Error::ConflictingComdatGroup(..))));
    }

    #[test]
    fn rejects_link_cycles() {
        let mut a = Symbol::new(SymbolId(0), "a", SymbolKind::Function, 0, 1);
        let mut b = Symbol::new(SymbolId(1), "b", SymbolKind::Function, 1, 1);
        a.alias_of = Some(SymbolId(1));
        b.thunk_of = Some(SymbolId(0));

        let result = SymbolGraph::new(vec![a, b], vec![], vec![]);
        assert!(matches!(result, Err(Error::CyclicLink(_))));
    }

    #[test]
    fn rejects_undefined_comdat_members() {
        let mut builder = SymbolGraphBuilder::new();
        let decl = builder.declaration("decl", SymbolKind::Function);
        builder.comdat_group("decl", &[decl]);

        assert!(matches!(builder.build(), Err(Error::UndefinedComdatMember(..))));
    }

    #[test]
    fn rejects_unanalyzed_comdat_functions() {
        let mut builder = SymbolGraphBuilder::new();
        let key = builder.function("key", 5);
        let other = builder.function("other", 5);
        builder.symbol_mut(key).force_output = true;
        builder.symbol_mut(other).analyzed = false;
        builder.comdat_group("key", &[key, other]);

        assert!(matches!(
            builder.build(),
            Err(Error::UnanalyzedComdatMember(name, group)) if name == "other" && group == "key"
        ));
    }

    #[test]
    fn rejects_dangling_edges() {
        let symbols = vec![Symbol::new(SymbolId(0), "a", SymbolKind::Function, 0, 1)];
        let edges = vec![Edge::new(
            SymbolId(0),
            SymbolId(3),
            EdgeKind::Call { inlined: false },
            1,
        )];

        let result = SymbolGraph::new(symbols, edges, vec![]);
        assert!(matches!(result, Err(Error::UnknownSymbol(3))));
    }

    #[test]
    fn rejects_calls_from_variables() {
        let symbols = vec![
            Symbol::new(SymbolId(0), "v", SymbolKind::Variable, 0, 1),
            Symbol::new(SymbolId(1), "f", SymbolKind::Function, 1, 1),
        ];
        let edges = vec![Edge::new(
            SymbolId(0),
            SymbolId(1),
            EdgeKind::Call { inlined: false },
            1,
        )];

        let result = SymbolGraph::new(symbols, edges, vec![]);
        assert!(matches!(result, Err(Error::CallFromVariable(..))));
    }

    #[test]
    fn local_symbols_may_share_names() -> anyhow::Result<()> {
        let mut first = Symbol::new(SymbolId(0), "counter", SymbolKind::Variable, 0, 4);
        first.file = Some("a.c".to_string());
        let mut second = Symbol::new(SymbolId(1), "counter", SymbolKind::Variable, 1, 4);
        second.file = Some("b.c".to_string());
        let graph = SymbolGraph::new(vec![first.clone(), second.clone()], vec![], vec![])?;
        assert_eq!(graph.lookup("counter"), None);
        assert_eq!(graph.find("counter"), Some(SymbolId(0)));

        first.public = true;
        second.public = true;
        let result = SymbolGraph::new(vec![first, second], vec![], vec![]);
        assert!(matches!(result, Err(Error::DuplicateName(_))));

        Ok(())
    }

    #[test]
    fn renaming_public_symbols_updates_the_namespace() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let f = builder.function("f", 1);
        builder.symbol_mut(f).public = true;
        let mut graph = builder.build()?;

        graph.rename(f, "f.renamed");
        assert_eq!(graph.lookup("f"), None);
        assert_eq!(graph.lookup("f.renamed"), Some(f));
        assert_eq!(graph.symbol(f).name, "f.renamed");

        Ok(())
    }

    #[test]
    fn aliases_are_reported_once() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let target = builder.function("target", 4);
        let alias = builder.function("alias", 0);
        builder.alias(alias, target);
        let graph = builder.build()?;

        assert_eq!(graph.aliases_of(target), vec![alias]);
        assert!(graph.aliases_of(alias).is_empty());

        Ok(())
    }
}
