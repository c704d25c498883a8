//! The symbols that make up the nodes of the whole-program graph.
//!
//! A symbol is either a function or a global variable. Beyond its identity,
//! size, and origin, it carries the flags that describe how it _may_ be placed
//! into partitions: whether it has a body at all, whether the linker may merge
//! copies of it, whether it is only a part of some other symbol, and so on.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// A dense, positional identifier for a symbol in a
/// [`crate::SymbolGraph`].
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct SymbolId(pub usize);

impl SymbolId {
    /// Gets the index of the symbol within its graph.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for SymbolId {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl From<SymbolId> for usize {
    fn from(value: SymbolId) -> Self {
        value.0
    }
}

impl Display for SymbolId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of entity that a symbol names.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum SymbolKind {
    /// A function, which may have call edges in both directions.
    Function,

    /// A global variable, which may only be referred to or refer to other
    /// symbols through its initializer.
    Variable,
}

/// The ELF-style visibility of a symbol.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Visibility {
    /// Visible to, and preemptible by, other components.
    #[default]
    Default,

    /// Visible to other components, but not preemptible.
    Protected,

    /// Not visible outside the component (the linked object) that defines it.
    Hidden,

    /// Hidden, and additionally never called from outside the component.
    Internal,
}

/// A single function or global variable in the whole program.
///
/// The boolean flags default to `false` when decoding, with the exception of
/// those that the [`crate::SymbolGraphBuilder`] sets explicitly.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Symbol {
    /// The position of this symbol in its graph.
    ///
    /// This is rewritten when a graph is loaded, and so does not need to be
    /// correct in an input file.
    #[serde(default)]
    pub id: SymbolId,

    /// The assembler name of the symbol.
    pub name: String,

    /// Whether this is a function or a variable.
    pub kind: SymbolKind,

    /// The position of the symbol's declaration in the original program.
    ///
    /// This is unique across the graph, and is used to provide a stable
    /// tie-break wherever symbols need to be put into a total order.
    pub order: u32,

    /// The translation unit that the symbol was read from, if any.
    #[serde(default)]
    pub file: Option<String>,

    /// The estimated size of the symbol itself, in abstract cost units.
    ///
    /// For functions this is the size of the body excluding anything inlined
    /// into it.
    #[serde(default)]
    pub size: u64,

    /// Set if the program contains a definition (a body or an initializer) for
    /// this symbol.
    #[serde(default)]
    pub definition: bool,

    /// Set if the symbol has been through reachability analysis.
    ///
    /// Functions that were never analyzed are left to the linker.
    #[serde(default)]
    pub analyzed: bool,

    /// Set if copies of this symbol in multiple objects may be merged by the
    /// linker.
    #[serde(default)]
    pub comdat: bool,

    /// Set if the symbol must be emitted even if nothing appears to use it.
    #[serde(default)]
    pub force_output: bool,

    /// Set if objects outside the link-time-optimized program refer to this
    /// symbol.
    #[serde(default)]
    pub used_from_object_file: bool,

    /// Set if the symbol is a weak reference to some other symbol.
    #[serde(default)]
    pub weakref: bool,

    /// Set for compiler-synthesized constants that live in the constant pool.
    #[serde(default)]
    pub in_constant_pool: bool,

    /// Set for read-only variables whose initializer can be folded into the
    /// code that reads them.
    #[serde(default)]
    pub foldable_initializer: bool,

    /// The function that this inline clone has been inlined into, if it is an
    /// inline clone.
    #[serde(default)]
    pub inlined_to: Option<SymbolId>,

    /// The symbol that this symbol is an alias of, if any.
    #[serde(default)]
    pub alias_of: Option<SymbolId>,

    /// The function that this thunk forwards to, if it is a thunk.
    #[serde(default)]
    pub thunk_of: Option<SymbolId>,

    /// Set if the symbol is visible outside its own translation unit.
    #[serde(default)]
    pub public: bool,

    /// Set if the symbol is exported from the program as a whole.
    #[serde(default)]
    pub externally_visible: bool,

    /// The visibility of the symbol.
    #[serde(default)]
    pub visibility: Visibility,

    /// Set if the visibility was given explicitly rather than defaulted.
    #[serde(default)]
    pub visibility_specified: bool,
}

impl Symbol {
    /// Creates a new, defined, file-local symbol of the provided `kind`.
    #[must_use]
    pub fn new(id: SymbolId, name: &str, kind: SymbolKind, order: u32, size: u64) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            order,
            file: None,
            size,
            definition: true,
            analyzed: true,
            comdat: false,
            force_output: false,
            used_from_object_file: false,
            weakref: false,
            in_constant_pool: false,
            foldable_initializer: false,
            inlined_to: None,
            alias_of: None,
            thunk_of: None,
            public: false,
            externally_visible: false,
            visibility: Visibility::Default,
            visibility_specified: false,
        }
    }

    /// Returns `true` if the symbol is a function.
    #[must_use]
    pub fn is_function(&self) -> bool {
        self.kind == SymbolKind::Function
    }

    /// Returns `true` if the symbol is a variable.
    #[must_use]
    pub fn is_variable(&self) -> bool {
        self.kind == SymbolKind::Variable
    }

    /// Returns `true` if the symbol is an inline clone.
    #[must_use]
    pub fn is_inline_clone(&self) -> bool {
        self.inlined_to.is_some()
    }

    /// Returns `true` if the symbol is an alias of some other symbol.
    #[must_use]
    pub fn is_alias(&self) -> bool {
        self.alias_of.is_some()
    }

    /// Returns `true` if the symbol is a compiler-generated thunk.
    #[must_use]
    pub fn is_thunk(&self) -> bool {
        self.thunk_of.is_some()
    }

    /// Returns `true` if the symbol has already been promoted to a hidden
    /// global so that other partitions of the same program can see it.
    #[must_use]
    pub fn is_promoted(&self) -> bool {
        self.public && self.visibility == Visibility::Hidden && self.visibility_specified
    }
}

#[cfg(test)]
mod test {
    use crate::symbol::{Symbol, SymbolId, SymbolKind, Visibility};

    #[test]
    fn new_symbols_are_local_definitions() {
        let sym = Symbol::new(SymbolId(3), "helper", SymbolKind::Function, 7, 12);

        assert!(sym.definition);
        assert!(sym.analyzed);
        assert!(!sym.public);
        assert!(!sym.is_promoted());
        assert_eq!(sym.visibility, Visibility::Default);
        assert_eq!(sym.id.index(), 3);
    }

    #[test]
    fn promotion_requires_all_three_attributes() {
        let mut sym = Symbol::new(SymbolId(0), "counter", SymbolKind::Variable, 0, 4);
        sym.public = true;
        sym.visibility = Visibility::Hidden;
        assert!(!sym.is_promoted());

        sym.visibility_specified = true;
        assert!(sym.is_promoted());
    }
}
