//! Error handling types and utilities.
//!
//! # Error Conventions
//!
//! As we are providing a library that others may want to interact with from
//! _code_ as well as from the CLI driver, we keep our errors strongly typed at
//! all times. While libraries like
//! [anyhow](https://docs.rs/anyhow/latest/anyhow/) are well-suited for
//! application code, they make it more difficult than is necessary to handle
//! specific errors in library code. To that end, we make sure that our errors
//! are kept strongly typed within the library as much as is possible.
//!
//! # Errors and Invariants
//!
//! Only _bad input_ is reported through these types: a malformed symbol graph,
//! a nonsensical configuration, or a broken pass pipeline. Violations of the
//! partitioner's own internal invariants (e.g. placing a symbol that may only
//! live in one partition into a second one) are bugs, and are reported by
//! panicking at the point of detection instead.

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming
#![allow(clippy::multiple_crate_versions)] // Enforced by our dependencies

pub mod driver;
pub mod graph;
pub mod partition;
