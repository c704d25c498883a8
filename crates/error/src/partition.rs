//! Error types and utilities to do with running the partitioner over a symbol
//! graph.

use thiserror::Error;

use crate::graph;

/// The result type for use in the partitioner.
pub type Result<T> = std::result::Result<T, Error>;

/// This error type is for use during the process of partitioning a whole
/// program into compilation units.
#[derive(Debug, Error)]
pub enum Error {
    /// An error in the symbol graph that was handed to the partitioner.
    #[error(transparent)]
    Graph(#[from] graph::Error),

    /// Emitted when the requested partition count cannot produce any
    /// partition at all.
    #[error("The desired partition count must be at least 1, but {_0} was requested")]
    InvalidPartitionCount(usize),

    /// Emitted when code tries to construct an invalid ordering of partitioner
    /// passes.
    #[error("Invalid Pass Ordering: {_0}")]
    InvalidPassOrdering(String),

    /// Emitted when a pass requires the results of another pass that has not
    /// been run.
    #[error("The {_0} pass requires data from the {_1} pass, which has not been run")]
    MissingPassData(&'static str, &'static str),
}
