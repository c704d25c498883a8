//! Analysis passes are those that do not change the symbol graph, but instead
//! generate some kind of data that can be read by downstream passes to make
//! decisions on the basis of.

pub mod classify;
