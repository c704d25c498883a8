//! The whole-program symbol graph is the in-memory picture of a program that
//! the partitioner works over: every function and variable that survived
//! whole-program analysis, the call and reference edges between them, and the
//! COMDAT groups that bind some of them together.
//!
//! The graph is built once (either through the [`SymbolGraphBuilder`] or by
//! loading a `.sym` file) and is then _read-mostly_. The only mutations that
//! downstream consumers perform are to the linkage attributes of symbols, when
//! symbols are promoted to be visible across partitions.

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming
#![allow(clippy::multiple_crate_versions)] // Enforced by our dependencies

pub mod builder;
pub mod edge;
pub mod graph;
pub mod intern;
pub mod order;
pub mod symbol;

pub use builder::SymbolGraphBuilder;
pub use edge::{Edge, EdgeId, EdgeKind, RefUse};
pub use graph::{ComdatGroup, ComdatGroupId, SymbolGraph};
pub use symbol::{Symbol, SymbolId, SymbolKind, Visibility};
