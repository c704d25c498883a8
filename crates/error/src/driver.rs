//! Error types and utilities to do with driving a whole partitioning run, from
//! loading the graph to writing out the report.

use thiserror::Error;

use crate::{graph, partition};

/// The result type for use in the driver.
pub type Result<T> = std::result::Result<T, Error>;

/// This error type is for use when plumbing the stages of a partitioning run
/// together.
#[derive(Debug, Error)]
pub enum Error {
    /// The symbol graph could not be loaded.
    #[error(transparent)]
    Graph(#[from] graph::Error),

    /// The partitioner failed.
    #[error(transparent)]
    Partition(#[from] partition::Error),

    /// An error when doing IO while writing the report.
    #[error("IO Error: {_0}")]
    IOError(#[from] std::io::Error),

    /// The report could not be encoded.
    #[error("Could not encode partition report: {_0}")]
    Serialization(String),
}
