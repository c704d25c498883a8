//! Contains the program context, which owns the symbol graph as it moves
//! through the partitioner's passes.

use ltp_errors::partition::Result;
use ltp_symtab::SymbolGraph;

/// The program context tracks the whole-program symbol graph across the
/// partitioner's operations.
///
/// Passes take the context by value and hand it back when they complete, so at
/// any one time exactly one pass has access to the graph. Analysis passes only
/// ever look at the graph through [`Self::analyze`], while transformation
/// passes may change it through [`Self::modify`].
#[derive(Clone, Debug, PartialEq)]
pub struct ProgramContext {
    /// The graph of the program being partitioned.
    graph: SymbolGraph,
}

impl ProgramContext {
    /// Creates a new program context wrapping the provided `graph`.
    #[must_use]
    pub fn new(graph: SymbolGraph) -> Self {
        Self { graph }
    }

    /// Runs analysis on the graph using the provided function, and returns the
    /// analysis results.
    ///
    /// It does not have the ability to modify the underlying graph at all.
    ///
    /// # Errors
    ///
    /// - [`ltp_errors::partition::Error`] if the analysis fails.
    pub fn analyze<T>(&self, op: impl FnOnce(&SymbolGraph) -> Result<T>) -> Result<T> {
        op(&self.graph)
    }

    /// Runs a transformation on the graph using the provided function,
    /// returning any results from the modification.
    ///
    /// # Errors
    ///
    /// - [`ltp_errors::partition::Error`] if the transformation fails.
    pub fn modify<T>(&mut self, op: impl FnOnce(&mut SymbolGraph) -> Result<T>) -> Result<T> {
        op(&mut self.graph)
    }

    /// Gets a reference to the underlying graph.
    #[must_use]
    pub fn graph(&self) -> &SymbolGraph {
        &self.graph
    }
}

impl From<SymbolGraph> for ProgramContext {
    fn from(value: SymbolGraph) -> Self {
        Self::new(value)
    }
}

impl From<ProgramContext> for SymbolGraph {
    fn from(value: ProgramContext) -> Self {
        value.graph
    }
}
