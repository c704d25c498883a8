//! This library implements the partitioning of a whole program into separate
//! compilation units for link-time optimization.
//!
//! When a program is optimized at link time, the optimizer sees every function
//! and variable at once. To keep code generation parallel, the program is then
//! split back into a number of partitions that are each compiled on their own.
//! Doing this well means balancing two competing goals:
//!
//! 1. Every partition should be of a similar size, so that no single one holds
//!    up the build.
//! 2. As few calls and references as possible should cross between
//!    partitions, as each one that does costs optimization opportunities and
//!    forces symbols to be made visible outside the unit that defines them.
//!
//! # Process Overview
//!
//! Partitioning happens in a series of passes over the whole-program symbol
//! graph from [`ltp_symtab`]:
//!
//! 1. Every symbol is classified by whether it is placed in exactly one
//!    partition, copied into every partition that needs it, or resolved
//!    outside the program entirely (see [`pass::analysis::classify`]).
//! 2. The symbols are assigned to partitions according to the configured
//!    [`config::PartitionPolicy`] (see [`partition`]). The balanced policy is
//!    the default, and the most involved.
//! 3. Any file-local symbol that is used from a partition other than the one
//!    defining it is promoted to a hidden global so that the partitions can be
//!    linked back together (see [`pass::transform::promote`]).
//!
//! The passes are run by a [`pass::PassManager`], which works out the order in
//! which to run them from the dependencies that they declare.

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming
#![allow(clippy::multiple_crate_versions)] // Enforced by our dependencies

pub mod config;
pub mod constant;
pub mod context;
pub mod partition;
pub mod pass;

use ltp_errors::partition::{Error, Result};
use ltp_symtab::SymbolGraph;

use crate::{
    config::PartitionConfig,
    context::ProgramContext,
    pass::{
        analysis::classify::{ClassifySymbols, SymbolClassification},
        transform::{
            partition::{PartitionSymbols, Partitioning},
            promote::{PromoteCrossPartition, PromotionReport},
        },
        PassManager,
        PassManagerReturnData,
    },
};

/// Handles the partitioning of a whole program.
#[derive(Debug)]
pub struct Partitioner {
    /// The program context, containing the symbol graph to be partitioned.
    pub context: ProgramContext,

    /// The passes that this partitioner is configured to run.
    pub passes: PassManager,
}

/// The basic operations required of the partitioner.
impl Partitioner {
    /// Constructs a new partitioner instance, wrapping the provided `context`
    /// describing the program to partition and the `passes` to run over it.
    #[must_use]
    pub fn new(context: ProgramContext, passes: PassManager) -> Self {
        Self { context, passes }
    }

    /// Executes the partitioner on the configured program.
    ///
    /// Note that this consumes the partitioner, as the program's graph is
    /// handed back as part of the output.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingPassData`] if the configured passes do not include
    ///   classification and partitioning.
    /// - [`Error`] if any pass fails.
    pub fn run(mut self) -> Result<PartitionOutput> {
        let PassManagerReturnData { context, data } = self.passes.run(self.context)?;

        let classification = data
            .get::<ClassifySymbols>()
            .cloned()
            .ok_or(Error::MissingPassData("Partitioner", "ClassifySymbols"))?;
        let partitioning = data
            .get::<PartitionSymbols>()
            .cloned()
            .ok_or(Error::MissingPassData("Partitioner", "PartitionSymbols"))?;
        let promotions = data.get::<PromoteCrossPartition>().cloned();

        Ok(PartitionOutput {
            graph: context.into(),
            classification,
            partitioning,
            promotions,
        })
    }
}

/// Everything produced by a run of the [`Partitioner`].
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionOutput {
    /// The symbol graph, with the linkage of any promoted symbols updated.
    pub graph: SymbolGraph,

    /// The class of every symbol.
    pub classification: SymbolClassification,

    /// The partitions, and the placement of every symbol into them.
    pub partitioning: Partitioning,

    /// The symbols that were promoted, if the promotion pass was run.
    pub promotions: Option<PromotionReport>,
}

/// Allows for building a [`Partitioner`] instance while retaining the defaults
/// for fields that do not need to be customized.
#[derive(Debug)]
pub struct PartitionerBuilder {
    /// The program context, containing the symbol graph to be partitioned.
    context: ProgramContext,

    /// The configuration used to build the default passes.
    config: Option<PartitionConfig>,

    /// The passes that this partitioner is configured to run.
    passes: Option<PassManager>,
}

impl PartitionerBuilder {
    /// Creates a new partitioner builder wrapping the provided `graph`.
    ///
    /// The partitioner will use the default configuration and passes unless
    /// specified otherwise by calling [`Self::with_config`] or
    /// [`Self::with_passes`].
    ///
    /// # API Style
    ///
    /// Please note that the API for the builder consumes `self` and is hence
    /// designed to have calls chained in the "fluent" API style.
    #[must_use]
    pub fn new(graph: SymbolGraph) -> Self {
        let context = ProgramContext::new(graph);
        let config = None;
        let passes = None;
        Self {
            context,
            config,
            passes,
        }
    }

    /// Specifies the configuration used to build the default passes.
    ///
    /// This has no effect if [`Self::with_passes`] is also called.
    ///
    /// # API Style
    ///
    /// Please note that the API for the builder consumes `self` and is hence
    /// designed to have calls chained in the "fluent" API style.
    #[must_use]
    pub fn with_config(mut self, config: PartitionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Specifies the pass configuration for the partitioner.
    ///
    /// # API Style
    ///
    /// Please note that the API for the builder consumes `self` and is hence
    /// designed to have calls chained in the "fluent" API style.
    #[must_use]
    pub fn with_passes(mut self, pass_manager: PassManager) -> Self {
        self.passes = Some(pass_manager);
        self
    }

    /// Builds a partitioner from the specified configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPartitionCount`] if the configuration is invalid.
    pub fn build(self) -> Result<Partitioner> {
        let passes = match self.passes {
            Some(passes) => passes,
            None => PassManager::for_config(self.config.unwrap_or_default())?,
        };

        Ok(Partitioner::new(self.context, passes))
    }
}
