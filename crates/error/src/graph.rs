//! Error types and utilities to do with building, loading, and validating the
//! whole-program symbol graph.

use thiserror::Error;

/// The result type for use when working with the symbol graph.
pub type Result<T> = std::result::Result<T, Error>;

/// This error type is for use when constructing or loading a symbol graph.
///
/// All of these describe problems with the _input_ program description, rather
/// than problems with the partitioner itself.
#[derive(Debug, Error)]
pub enum Error {
    /// An edge in the graph starts at a variable, but was declared as a call.
    #[error("Call edge from `{_0}` to `{_1}` does not originate from a function")]
    CallFromVariable(String, String),

    /// A symbol was listed as a member of more than one COMDAT group.
    #[error("Symbol `{_0}` is a member of both COMDAT group `{_1}` and `{_2}`")]
    ConflictingComdatGroup(String, String, String),

    /// Following the alias, thunk, and inline-clone links from a symbol never
    /// arrives at a symbol that stands on its own.
    #[error("The links from symbol `{_0}` form a cycle")]
    CyclicLink(String),

    /// The input could not be decoded as a symbol graph.
    #[error("Could not decode symbol graph: {_0}")]
    Deserialization(String),

    /// Two symbols were declared with the same assembler name.
    #[error("Symbol name `{_0}` is declared more than once")]
    DuplicateName(String),

    /// Two symbols were declared with the same declaration order.
    #[error("Symbols `{_0}` and `{_1}` share declaration order {_2}")]
    DuplicateOrder(String, String, u32),

    /// An error when doing IO while reading or writing a graph.
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// A relationship link (alias, thunk, or inline clone) was declared with
    /// the wrong kind of symbol at one of its ends.
    #[error("Symbol `{_0}` cannot be {_1} `{_2}`")]
    InvalidLink(String, &'static str, String),

    /// A relationship link points back at the symbol that declares it.
    #[error("Symbol `{_0}` cannot be {_1} itself")]
    SelfLink(String, &'static str),

    /// The graph could not be encoded for output.
    #[error("Could not encode symbol graph: {_0}")]
    Serialization(String),

    /// A COMDAT group contains a function whose body was never analyzed, and
    /// so cannot be emitted alongside the rest of its group.
    #[error("Function `{_0}` in COMDAT group `{_1}` was never analyzed")]
    UnanalyzedComdatMember(String, String),

    /// A COMDAT group contains a symbol that is only declared in the program.
    #[error("Symbol `{_0}` in COMDAT group `{_1}` has no definition")]
    UndefinedComdatMember(String, String),

    /// A reference was made to a symbol that the graph does not contain.
    #[error("Reference to unknown symbol #{_0}")]
    UnknownSymbol(usize),
}
