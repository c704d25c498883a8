//! This pass assigns the symbols of the program to partitions according to
//! the configured [`PartitionPolicy`].
//!
//! The graph itself is left unchanged. The resulting [`Partitioning`] records
//! both the partitions and how many of them each symbol was placed into.

use ltp_errors::partition::{Error, Result};
use ltp_symtab::{SymbolGraph, SymbolId};
use tracing::{debug, warn};

use crate::{
    config::{PartitionConfig, PartitionPolicy},
    context::ProgramContext,
    partition::{
        balanced::BalancedPartitioner,
        maximal::map_maximal,
        one_to_one::map_one_to_one,
        PartitionSet,
        PlacementTable,
    },
    pass::{
        analysis::classify::{ClassifySymbols, SymbolClassification},
        data::{ConcretePassData, DynPassDataMap, PassDataOps},
        ConcretePass,
        DynPassReturnData,
        Pass,
        PassKey,
        PassOps,
    },
};

/// Splits the program into partitions.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionSymbols {
    /// The passes that this pass depends upon the results of for its execution.
    depends: Vec<PassKey>,

    /// The passes that this pass invalidates the results of by executing.
    invalidates: Vec<PassKey>,

    /// The configuration that decides how the program is split.
    config: PartitionConfig,
}

impl Default for PartitionSymbols {
    fn default() -> Self {
        Self::new(PartitionConfig::default())
    }
}

impl PartitionSymbols {
    /// Creates a new instance of the partitioning pass using the provided
    /// `config`.
    #[must_use]
    pub fn new(config: PartitionConfig) -> Self {
        // Placement decisions are driven by the class of each symbol.
        let depends = vec![ClassifySymbols::key()];

        // Only bookkeeping is produced, so nothing is invalidated.
        let invalidates = vec![];

        Self {
            depends,
            invalidates,
            config,
        }
    }

    /// Creates a new trait object of the partitioning pass.
    #[must_use]
    pub fn new_dyn(config: PartitionConfig) -> Pass {
        Box::new(Self::new(config))
    }

    /// Gets the configuration used by the pass.
    #[must_use]
    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Partitions `graph`, whose symbols have the provided `classes`.
    ///
    /// # Panics
    ///
    /// If the grouping of symbols breaks one of its invariants, which means
    /// that `classes` does not belong to `graph`.
    #[must_use]
    pub fn partition_graph(
        &self,
        graph: &SymbolGraph,
        classes: &SymbolClassification,
    ) -> Partitioning {
        let mut placements = PlacementTable::new(graph.len());
        let partitions = match self.config.policy {
            PartitionPolicy::OneToOne => map_one_to_one(graph, classes, &mut placements),
            PartitionPolicy::Maximal => map_maximal(graph, classes, &mut placements),
            PartitionPolicy::Balanced => {
                BalancedPartitioner::new(graph, classes, &self.config).run(&mut placements)
            }
        };
        let partitioning = Partitioning::new(partitions, placements);

        debug!(
            policy = ?self.config.policy,
            partitions = partitioning.partitions().len(),
            "Partitioned program"
        );
        for id in partitioning.multiply_placed() {
            warn!(symbol = %graph.symbol(id).name, "Symbol is used in multiple partitions");
        }

        partitioning
    }
}

impl PassOps for PartitionSymbols {
    fn run(
        &mut self,
        context: ProgramContext,
        pass_data: &DynPassDataMap,
    ) -> Result<DynPassReturnData> {
        let classes = pass_data
            .get::<ClassifySymbols>()
            .ok_or(Error::MissingPassData(self.name(), "ClassifySymbols"))?;
        let partitioning = context.analyze(|graph| Ok(self.partition_graph(graph, classes)))?;

        Ok(DynPassReturnData::new(context, Box::new(partitioning)))
    }

    fn depends(&self) -> &[PassKey] {
        self.depends.as_slice()
    }

    fn invalidates(&self) -> &[PassKey] {
        self.invalidates.as_slice()
    }

    fn dupe(&self) -> Pass {
        Box::new(self.clone())
    }

    fn name(&self) -> &'static str {
        "PartitionSymbols"
    }
}

impl ConcretePass for PartitionSymbols {
    type Data = Partitioning;
}

/// The partitions of a program, along with the placement of every symbol.
#[derive(Clone, Debug, PartialEq)]
pub struct Partitioning {
    partitions: PartitionSet,
    placements: PlacementTable,
}

impl Partitioning {
    /// Wraps the `partitions` produced by a policy and the `placements` it
    /// recorded.
    #[must_use]
    pub fn new(partitions: PartitionSet, placements: PlacementTable) -> Self {
        Self {
            partitions,
            placements,
        }
    }

    /// Gets the partitions, in the order they were created.
    #[must_use]
    pub fn partitions(&self) -> &PartitionSet {
        &self.partitions
    }

    /// Gets the placement of every symbol.
    #[must_use]
    pub fn placements(&self) -> &PlacementTable {
        &self.placements
    }

    /// Gets every symbol that was placed into more than one partition.
    #[must_use]
    pub fn multiply_placed(&self) -> Vec<SymbolId> {
        self.placements.multiply_placed()
    }
}

impl PassDataOps for Partitioning {}

impl ConcretePassData for Partitioning {
    type Pass = PartitionSymbols;
}
