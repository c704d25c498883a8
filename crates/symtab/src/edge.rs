//! The directed edges between symbols in the whole-program graph.

use serde::{Deserialize, Serialize};

use crate::symbol::SymbolId;

/// A dense, positional identifier for an edge in a [`crate::SymbolGraph`].
pub type EdgeId = usize;

/// The way in which one symbol refers to another through a reference edge.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum RefUse {
    /// The referring symbol reads the referred-to variable.
    Load,

    /// The referring symbol writes the referred-to variable.
    Store,

    /// The referring symbol takes the address of the referred-to symbol.
    Address,

    /// The referring symbol is an alias of the referred-to symbol.
    Alias,
}

/// The kind of relationship that an edge describes.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum EdgeKind {
    /// A call from one function to another.
    ///
    /// If `inlined` is set, the callee is an inline clone whose body has been
    /// merged into the caller.
    Call { inlined: bool },

    /// A non-call reference from one symbol to another.
    Reference(RefUse),
}

/// A directed edge from `from` to `to`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Edge {
    /// The symbol at the tail of the edge (the caller, or the referrer).
    pub from: SymbolId,

    /// The symbol at the head of the edge (the callee, or the referred-to
    /// symbol).
    pub to: SymbolId,

    /// What the edge represents.
    pub kind: EdgeKind,

    /// The estimated execution frequency of the edge, where known.
    ///
    /// A frequency of zero means "unknown", and is never used directly as a
    /// weight. See [`Self::weight`].
    #[serde(default)]
    pub frequency: u32,
}

impl Edge {
    /// Creates a new edge between `from` and `to`.
    #[must_use]
    pub fn new(from: SymbolId, to: SymbolId, kind: EdgeKind, frequency: u32) -> Self {
        Self {
            from,
            to,
            kind,
            frequency,
        }
    }

    /// Gets the weight of this edge for the purposes of cost accounting.
    ///
    /// Every edge weighs at least 1, so an edge with no recorded frequency still
    /// contributes to the cost of cutting it.
    #[must_use]
    pub fn weight(&self) -> u64 {
        u64::from(self.frequency.max(1))
    }

    /// Returns `true` if this edge is a call edge.
    #[must_use]
    pub fn is_call(&self) -> bool {
        matches!(self.kind, EdgeKind::Call { .. })
    }

    /// Returns `true` if this is a call edge to an inline clone.
    #[must_use]
    pub fn is_inlined_call(&self) -> bool {
        matches!(self.kind, EdgeKind::Call { inlined: true })
    }

    /// Returns `true` if this is a reference edge.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self.kind, EdgeKind::Reference(_))
    }

    /// Returns `true` if this edge links an alias to its target.
    #[must_use]
    pub fn is_alias(&self) -> bool {
        matches!(self.kind, EdgeKind::Reference(RefUse::Alias))
    }

    /// Returns `true` if the edge starts and ends at the same symbol.
    #[must_use]
    pub fn is_self_edge(&self) -> bool {
        self.from == self.to
    }

    /// Gets the endpoint of the edge that is not `id`.
    ///
    /// For a self edge this returns `id`.
    #[must_use]
    pub fn other(&self, id: SymbolId) -> SymbolId {
        if self.from == id {
            self.to
        } else {
            self.from
        }
    }
}
