//! Transformation passes are those that build larger structures over the
//! symbol graph, or that change the graph itself, on the basis of the data
//! produced by analysis passes.

pub mod partition;
pub mod promote;
