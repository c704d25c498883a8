//! This pass makes the symbols that are used across partitions visible to the
//! other partitions of the program, without exporting them from it.
//!
//! Once the program has been partitioned, each partition is compiled on its
//! own. A file-local symbol that is defined in one partition but used from
//! another would then be unresolvable at link time, and so it is promoted to a
//! public symbol with hidden visibility. If its name is already taken in the
//! program-wide namespace, it is first given a new, private, name.

use ltp_errors::partition::{Error, Result};
use ltp_symtab::{SymbolGraph, SymbolId, Visibility};
use tracing::{debug, trace};

use crate::{
    constant::PRIVATE_NAME_SUFFIX,
    context::ProgramContext,
    partition::{boundary::compute_boundary, PartitionSet},
    pass::{
        analysis::classify::{ClassifySymbols, SymbolClassification},
        data::{ConcretePassData, DynPassDataMap, PassDataOps},
        transform::partition::PartitionSymbols,
        ConcretePass,
        DynPassReturnData,
        Pass,
        PassKey,
        PassOps,
    },
};

/// Promotes every symbol that is used outside the partition defining it.
#[derive(Clone, Debug, PartialEq)]
pub struct PromoteCrossPartition {
    /// The passes that this pass depends upon the results of for its execution.
    depends: Vec<PassKey>,

    /// The passes that this pass invalidates the results of by executing.
    invalidates: Vec<PassKey>,

    /// The number to use in the next private name handed out.
    next_private_id: usize,
}

impl Default for PromoteCrossPartition {
    fn default() -> Self {
        Self::new()
    }
}

impl PromoteCrossPartition {
    /// Creates a new instance of the promotion pass.
    #[must_use]
    pub fn new() -> Self {
        // We need to know which symbols may only live in one partition, and
        // where each of them ended up.
        let depends = vec![ClassifySymbols::key(), PartitionSymbols::key()];

        // Linkage changes affect neither the classes nor the placements.
        let invalidates = vec![];

        Self {
            depends,
            invalidates,
            next_private_id: 0,
        }
    }

    /// Creates a new trait object of the promotion pass.
    #[must_use]
    pub fn new_dyn() -> Pass {
        Box::new(Self::new())
    }

    /// Promotes the symbols of `graph` that any of the `partitions` use
    /// without containing them.
    ///
    /// Symbols that are already visible outside the program, and those that
    /// are copied into every partition that needs them, are left alone.
    /// Running the promotion again on the same partitions changes nothing.
    ///
    /// # Panics
    ///
    /// If `classes` and `partitions` do not belong to `graph`.
    pub fn promote_graph(
        &mut self,
        graph: &mut SymbolGraph,
        classes: &SymbolClassification,
        partitions: &PartitionSet,
    ) -> PromotionReport {
        let mut report = PromotionReport::new();

        for partition in partitions {
            let closure = compute_boundary(graph, partition);
            for &id in closure.boundary() {
                let symbol = graph.symbol(id);
                if symbol.externally_visible || !classes.is_partitioned(id) {
                    trace!(symbol = %symbol.name, "Symbol needs no promotion");
                    continue;
                }

                self.promote_symbol(graph, id, &mut report);
            }
        }

        debug!(
            promoted = report.promoted.len(),
            renamed = report.renamed.len(),
            "Promoted cross-partition symbols"
        );

        report
    }

    /// Makes `id` a hidden global, renaming it first if its name is taken.
    ///
    /// Symbols that are already public are left as they are.
    fn promote_symbol(
        &mut self,
        graph: &mut SymbolGraph,
        id: SymbolId,
        report: &mut PromotionReport,
    ) {
        if graph.symbol(id).public {
            return;
        }

        let original = graph.symbol(id).name.clone();
        if graph.global_names().contains_name(&original) {
            let private = self.private_name(graph, &original);
            debug!(symbol = %original, renamed = %private, "Renaming promoted symbol");
            graph.rename(id, &private);
            report.renamed.push(Rename {
                symbol: id,
                from:   original,
                to:     private,
            });
        }

        let symbol = graph.symbol_mut(id);
        symbol.public = true;
        symbol.visibility = Visibility::Hidden;
        symbol.visibility_specified = true;
        trace!(symbol = %symbol.name, "Promoted symbol to hidden global");

        graph.publish(id);
        report.promoted.push(id);
    }

    /// Generates a name for `name` that no public symbol in `graph` owns.
    fn private_name(&mut self, graph: &SymbolGraph, name: &str) -> String {
        loop {
            let candidate = format!("{name}.{PRIVATE_NAME_SUFFIX}.{}", self.next_private_id);
            self.next_private_id += 1;
            if !graph.global_names().contains_name(&candidate) {
                return candidate;
            }
        }
    }
}

impl PassOps for PromoteCrossPartition {
    fn run(
        &mut self,
        mut context: ProgramContext,
        pass_data: &DynPassDataMap,
    ) -> Result<DynPassReturnData> {
        let classes = pass_data
            .get::<ClassifySymbols>()
            .ok_or(Error::MissingPassData(self.name(), "ClassifySymbols"))?;
        let partitioning = pass_data
            .get::<PartitionSymbols>()
            .ok_or(Error::MissingPassData(self.name(), "PartitionSymbols"))?;

        let report = context.modify(|graph| {
            Ok(self.promote_graph(graph, classes, partitioning.partitions()))
        })?;

        Ok(DynPassReturnData::new(context, Box::new(report)))
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
        "PromoteCrossPartition"
    }
}

impl ConcretePass for PromoteCrossPartition {
    type Data = PromotionReport;
}

/// A symbol that was given a private name so that it could be promoted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rename {
    /// The symbol that was renamed.
    pub symbol: SymbolId,

    /// The name the symbol had before.
    pub from: String,

    /// The name the symbol has now.
    pub to: String,
}

/// The changes made by a run of the promotion pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PromotionReport {
    /// The symbols that were promoted, in the order they were promoted.
    pub promoted: Vec<SymbolId>,

    /// The symbols that had to be renamed before being promoted.
    pub renamed: Vec<Rename>,
}

impl PromotionReport {
    /// Creates a report of no changes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the promotion changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.promoted.is_empty() && self.renamed.is_empty()
    }
}

impl PassDataOps for PromotionReport {}

impl ConcretePassData for PromotionReport {
    type Pass = PromoteCrossPartition;
}
