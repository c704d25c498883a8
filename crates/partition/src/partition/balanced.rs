//! The balanced partitioning policy.
//!
//! This policy splits the program into a requested number of partitions of
//! roughly equal size, while trying to keep symbols that refer to one another
//! in the same partition.
//!
//! # The Algorithm
//!
//! Functions are visited in a fixed order (the reverse postorder of the call
//! graph, or declaration order if reordering is disabled), and each one that
//! has not yet been placed is added to the current partition along with
//! everything that must travel with it. After each addition, the edges of the
//! newly-added members are accounted as either crossing the partition boundary
//! or internal to it.
//!
//! Once the partition has reached most of its target size, the point with the
//! best ratio of internal to boundary cost is remembered as a checkpoint. If
//! the partition then grows far beyond its target, it is rolled back to that
//! checkpoint and a new partition is started from the symbol that followed it.
//!
//! Variables are placed next to the functions that refer to them where
//! possible. Any left over at the end go into the final partition.

use ltp_symtab::{SymbolGraph, SymbolId, SymbolKind};
use tracing::{debug, trace};

use crate::{
    config::PartitionConfig,
    constant::{CHECKPOINT_CEILING, CHECKPOINT_FLOOR, OVERSHOOT_FACTOR},
    partition::{group::SymbolGrouper, PartitionCost, PartitionSet, PlacementTable},
    pass::analysis::classify::SymbolClassification,
};

/// The state of the current partition at the best point seen so far.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Checkpoint {
    /// The position in the visitation order of the symbol that was last added.
    step: usize,

    /// The number of members the partition had.
    members: usize,

    /// The partition's edge costs.
    cost: PartitionCost,

    /// The total size of the functions that had not yet been visited.
    remaining: u64,

    /// The position in the list of pending variables, when variables are
    /// placed in declaration order.
    pending_variable: usize,
}

/// Splits a program into balanced partitions.
#[derive(Clone, Debug)]
pub struct BalancedPartitioner<'a> {
    graph:   &'a SymbolGraph,
    classes: &'a SymbolClassification,
    config:  &'a PartitionConfig,
}

impl<'a> BalancedPartitioner<'a> {
    /// Creates a partitioner for `graph`, whose symbols have been classified as
    /// given by `classes`.
    #[must_use]
    pub fn new(
        graph: &'a SymbolGraph,
        classes: &'a SymbolClassification,
        config: &'a PartitionConfig,
    ) -> Self {
        Self {
            graph,
            classes,
            config,
        }
    }

    /// Partitions the program, recording every placement in `placements`.
    ///
    /// There is always at least one partition in the result, even if the
    /// program has nothing to partition.
    #[must_use]
    pub fn run(&self, placements: &mut PlacementTable) -> PartitionSet {
        let order = self.function_order();
        let variables = self.variable_order();
        let total = order.iter().map(|id| self.graph.symbol(*id).size).sum();
        let target = self.config.min_partition_size.max(total / self.partition_count());

        debug!(
            functions = order.len(),
            total_size = total,
            target_size = target,
            "Starting balanced partitioning"
        );

        let mut state = BalancedRun {
            graph: self.graph,
            grouper: SymbolGrouper::new(self.graph, self.classes),
            classes: self.classes,
            reorder: self.config.toplevel_reorder,
            partitions: PartitionSet::new(),
            placements,
            cursor: 0,
            cost: PartitionCost::default(),
            best: None,
            remaining: total,
            target,
            min_size: self.config.min_partition_size,
            pending_variable: 0,
        };
        state.partitions.create("");
        state.place_functions(&order, &variables, self.partition_count());
        state.place_leftover_variables(&variables);

        let cost = state.cost;
        let mut partitions = state.partitions;
        partitions.current_mut().freeze(Some(cost));

        partitions
    }

    /// Gets the number of partitions that the policy aims for.
    fn partition_count(&self) -> u64 {
        u64::try_from(self.config.partitions.max(1)).unwrap_or(u64::MAX)
    }

    /// Gets the functions to visit, in the order in which to visit them.
    fn function_order(&self) -> Vec<SymbolId> {
        let order: Vec<SymbolId> = self
            .graph
            .reverse_postorder()
            .into_iter()
            .filter(|id| self.classes.is_partitioned(*id))
            .collect();

        if self.config.toplevel_reorder {
            order
        } else {
            self.graph.sort_by_declaration_order(&order)
        }
    }

    /// Gets the variables that can be placed, in declaration order.
    fn variable_order(&self) -> Vec<SymbolId> {
        self.graph
            .in_declaration_order(SymbolKind::Variable)
            .into_iter()
            .filter(|id| self.classes.is_partitioned(*id))
            .collect()
    }
}

/// The working state of a single run of the balanced policy.
struct BalancedRun<'a, 'p> {
    graph:            &'a SymbolGraph,
    grouper:          SymbolGrouper<'a>,
    classes:          &'a SymbolClassification,
    reorder:          bool,
    partitions:       PartitionSet,
    placements:       &'p mut PlacementTable,
    cursor:           usize,
    cost:             PartitionCost,
    best:             Option<Checkpoint>,
    remaining:        u64,
    target:           u64,
    min_size:         u64,
    pending_variable: usize,
}

impl BalancedRun<'_, '_> {
    /// Visits each function in `order`, filling partitions and starting a new
    /// one whenever the current one overshoots its target.
    fn place_functions(&mut self, order: &[SymbolId], variables: &[SymbolId], desired: u64) {
        let mut created: u64 = 1;
        let mut step = 0;

        while step < order.len() {
            let id = order[step];
            if self.placements.is_placed(id) {
                step += 1;
                continue;
            }

            if !self.reorder {
                self.place_variables_before(variables, self.graph.symbol(id).order);
            }

            self.grouper.add(self.partitions.current_mut(), self.placements, id);
            self.remaining = self.remaining.saturating_sub(self.graph.symbol(id).size);
            self.account_new_members();
            self.update_checkpoint(step);

            let insns = self.partitions.current().insns();
            trace!(
                symbol = %self.graph.symbol(id).name,
                insns,
                target = self.target,
                boundary = self.cost.boundary,
                internal = self.cost.internal,
                "Visited symbol"
            );

            if insns >= self.target.saturating_mul(OVERSHOOT_FACTOR) {
                let best = self.best.expect("Checkpoint is always set after a placement");
                if best.step != step {
                    self.rollback_to(best);
                }

                step = best.step;
                while step + 1 < order.len() && self.placements.is_placed(order[step + 1]) {
                    step += 1;
                }
                if step + 1 == order.len() {
                    break;
                }

                self.start_partition(best, created, desired);
                created += 1;
            }

            step += 1;
        }
    }

    /// Accounts the edges of every member added to the current partition since
    /// the last call, pulling in unplaced variables that those members refer to
    /// when reordering is allowed.
    fn account_new_members(&mut self) {
        let graph = self.graph;

        while let Some(member) = self.partitions.current().symbols().get(self.cursor) {
            let position = self.cursor;
            self.cursor += 1;

            if graph.symbol(member).is_function() {
                for edge in graph.callees(member) {
                    self.account_edge(member, edge.to, position, edge.weight());
                }
                for edge in graph.callers(member) {
                    self.account_edge(member, edge.from, position, edge.weight());
                }
            }

            for edge in graph.references(member) {
                self.pull_variable(edge.to);
                self.account_edge(member, edge.to, position, edge.weight());
            }
            for edge in graph.referring(member) {
                self.pull_variable(edge.from);
                self.account_edge(member, edge.from, position, edge.weight());
            }
        }
    }

    /// Adds the variable `id` to the current partition if reordering is allowed
    /// and it has not been placed anywhere yet.
    fn pull_variable(&mut self, id: SymbolId) {
        let symbol = self.graph.symbol(id);
        if self.reorder
            && symbol.is_variable()
            && symbol.definition
            && self.classes.is_partitioned(id)
            && !self.placements.is_placed(id)
        {
            self.grouper.add(self.partitions.current_mut(), self.placements, id);
        }
    }

    /// Accounts one edge between `member`, at `position` in the current
    /// partition, and `other`.
    ///
    /// An edge is counted as a boundary edge when the first of its ends joins
    /// the partition, and moved to the internal tally when the second does.
    fn account_edge(&mut self, member: SymbolId, other: SymbolId, position: usize, weight: u64) {
        if member == other || !self.is_accountable(member) || !self.is_accountable(other) {
            return;
        }

        match self.partitions.current().symbols().position(other) {
            Some(other_position) if other_position < position => {
                self.cost.boundary -= weight;
                self.cost.internal += weight;
            }
            _ => self.cost.boundary += weight,
        }
    }

    /// Returns `true` if edges touching `id` count towards partition costs.
    fn is_accountable(&self, id: SymbolId) -> bool {
        let symbol = self.graph.symbol(id);
        symbol.definition && (symbol.is_variable() || symbol.analyzed)
    }

    /// Moves the checkpoint to the current state of the partition if that state
    /// is better than the checkpoint.
    fn update_checkpoint(&mut self, step: usize) {
        let insns = self.partitions.current().insns();
        let below_floor = insns < fraction(self.target, CHECKPOINT_FLOOR);
        let below_ceiling = insns < fraction(self.target, CHECKPOINT_CEILING);

        let better = match self.best {
            None => true,
            Some(best) => {
                below_floor
                    || (below_ceiling
                        && (self.cost.boundary == 0
                            || u128::from(self.cost.internal) * u128::from(best.cost.boundary)
                                > u128::from(best.cost.internal) * u128::from(self.cost.boundary)))
            }
        };

        if better {
            let checkpoint = Checkpoint {
                step,
                members: self.partitions.current().len(),
                cost: self.cost,
                remaining: self.remaining,
                pending_variable: self.pending_variable,
            };
            trace!(?checkpoint, "Moved checkpoint");
            self.best = Some(checkpoint);
        }
    }

    /// Restores the current partition to the state recorded in `best`.
    fn rollback_to(&mut self, best: Checkpoint) {
        let partition = self.partitions.current_mut();
        debug!(
            partition = partition.name(),
            from = partition.len(),
            to = best.members,
            "Rolling back partition"
        );

        partition.rollback(best.members, self.placements);
        self.cursor = best.members;
        self.cost = best.cost;
        self.pending_variable = best.pending_variable;
    }

    /// Closes the current partition and opens the next one, sizing it to share
    /// out what remains between the partitions still to be made.
    fn start_partition(&mut self, best: Checkpoint, created: u64, desired: u64) {
        let closed = self.partitions.current_mut();
        closed.freeze(Some(self.cost));
        debug!(
            partition = closed.name(),
            symbols = closed.len(),
            insns = closed.insns(),
            boundary = self.cost.boundary,
            internal = self.cost.internal,
            "Closed partition"
        );

        self.partitions.create("");
        self.cursor = 0;
        self.cost = PartitionCost::default();
        self.best = None;
        self.remaining = best.remaining;

        let target = if created < desired {
            self.remaining / (desired - created)
        } else {
            u64::MAX
        };
        self.target = target.max(self.min_size);
    }

    /// Places every pending variable declared before `order`.
    fn place_variables_before(&mut self, variables: &[SymbolId], order: u32) {
        while let Some(id) = variables.get(self.pending_variable) {
            if self.graph.symbol(*id).order >= order {
                break;
            }
            if !self.placements.is_placed(*id) {
                self.grouper.add(self.partitions.current_mut(), self.placements, *id);
            }
            self.pending_variable += 1;
        }
    }

    /// Places every variable that is still unplaced into the final partition.
    fn place_leftover_variables(&mut self, variables: &[SymbolId]) {
        let start = if self.reorder { 0 } else { self.pending_variable };
        for id in &variables[start.min(variables.len())..] {
            if !self.placements.is_placed(*id) {
                self.grouper.add(self.partitions.current_mut(), self.placements, *id);
            }
        }
        self.account_new_members();
    }
}

/// Computes `fraction` of `value`, rounding down.
fn fraction(value: u64, (numerator, denominator): (u64, u64)) -> u64 {
    value.saturating_mul(numerator) / denominator
}

#[cfg(test)]
mod test {
    use ltp_symtab::{RefUse, SymbolGraph, SymbolGraphBuilder, SymbolId};

    use crate::{
        config::{PartitionConfig, PartitionConfigBuilder},
        partition::{balanced::BalancedPartitioner, Partition, PartitionSet, PlacementTable},
        pass::analysis::classify::{ClassifySymbols, SymbolClassification},
    };

    fn partition(
        graph: &SymbolGraph,
        config: &PartitionConfig,
    ) -> (SymbolClassification, PartitionSet, PlacementTable) {
        let classes = ClassifySymbols::classify_graph(graph);
        let mut placements = PlacementTable::new(graph.len());
        let partitions = BalancedPartitioner::new(graph, &classes, config).run(&mut placements);
        (classes, partitions, placements)
    }

    fn config(partitions: usize, min_partition_size: u64) -> anyhow::Result<PartitionConfig> {
        Ok(PartitionConfigBuilder::new()
            .with_partitions(partitions)
            .with_min_partition_size(min_partition_size)
            .build()?)
    }

    /// Builds a program with a long call chain, variables hanging off it, and a
    /// shared COMDAT group.
    fn chain_program() -> anyhow::Result<SymbolGraph> {
        let mut builder = SymbolGraphBuilder::new();
        let functions: Vec<SymbolId> =
            (0..12).map(|i| builder.function(&format!("f{i}"), 5 + i)).collect();
        for pair in functions.windows(2) {
            builder.call_with_frequency(pair[0], pair[1], 3);
        }
        for (i, f) in functions.iter().step_by(3).enumerate() {
            let variable = builder.variable(&format!("v{i}"), 16);
            builder.reference(*f, variable, RefUse::Load);
        }
        let key = builder.function("inline_helper", 2);
        let table = builder.variable("inline_helper.table", 4);
        builder.comdat_group("inline_helper", &[key, table]);
        builder.call(functions[4], key).call(functions[10], key);
        builder.reference(key, table, RefUse::Address);
        let _orphan = builder.variable("orphan", 8);

        Ok(builder.build()?)
    }

    #[test]
    fn call_chain_splits_into_single_symbol_partitions() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let a = builder.function("A", 10);
        let b = builder.function("B", 10);
        let c = builder.function("C", 10);
        builder.call(a, b).call(b, c);
        let graph = builder.build()?;

        let (_, partitions, _) = partition(&graph, &config(3, 1)?);

        let members: Vec<&[SymbolId]> =
            partitions.iter().map(|p| p.symbols().as_slice()).collect();
        assert_eq!(members, vec![&[a][..], &[b][..], &[c][..]]);
        assert!(partitions.iter().all(Partition::is_frozen));
        assert!(partitions.iter().all(|p| p.cost().is_some_and(|c| c.internal == 0)));

        let boundaries: Vec<u64> =
            partitions.iter().filter_map(|p| p.cost().map(|c| c.boundary)).collect();
        assert_eq!(boundaries, vec![1, 2, 1]);

        Ok(())
    }

    /// Builds a program of unconnected functions with the provided sizes.
    fn unconnected(sizes: &[u64]) -> anyhow::Result<(SymbolGraph, Vec<SymbolId>)> {
        let mut builder = SymbolGraphBuilder::new();
        let functions = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| builder.function(&format!("f{i}"), *size))
            .collect();
        Ok((builder.build()?, functions))
    }

    fn members(partitions: &PartitionSet) -> Vec<&[SymbolId]> {
        partitions.iter().map(|p| p.symbols().as_slice()).collect()
    }

    #[test]
    fn thunks_without_call_edges_stay_with_their_target() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let a = builder.function("A", 10);
        let b = builder.function("B", 10);
        let c = builder.function("C", 10);
        let thunk = builder.function("B.thunk", 1);
        builder.call(a, b).call(b, c);
        builder.symbol_mut(thunk).thunk_of = Some(b);
        let graph = builder.build()?;

        let (_, partitions, placements) = partition(&graph, &config(3, 1)?);

        assert_eq!(members(&partitions), vec![&[a][..], &[b, thunk][..], &[c][..]]);
        assert_eq!(placements.count(thunk), 1);
        let boundaries: Vec<u64> =
            partitions.iter().filter_map(|p| p.cost().map(|c| c.boundary)).collect();
        assert_eq!(boundaries, vec![1, 2, 1]);

        Ok(())
    }

    #[test]
    fn checkpoint_moves_on_zero_boundary_until_the_ceiling() -> anyhow::Result<()> {
        // The target is 10, so the checkpoint may move while under 12.5.
        let (graph, f) = unconnected(&[4, 4, 4, 8])?;

        let (_, partitions, placements) = partition(&graph, &config(2, 1)?);

        // Reaching exactly 12 is not under the ceiling, so the rollback lands at 8.
        assert_eq!(members(&partitions), vec![&f[..2], &f[2..]]);
        let insns: Vec<u64> = partitions.iter().map(Partition::insns).collect();
        assert_eq!(insns, vec![8, 12]);
        assert!(f.iter().all(|id| placements.count(*id) == 1));

        Ok(())
    }

    #[test]
    fn checkpoint_moves_only_on_a_better_ratio() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let a = builder.function("A", 4);
        let b = builder.function("B", 4);
        let c = builder.function("C", 1);
        let d = builder.function("D", 11);
        builder.call(a, b).call(b, d).call(c, d);
        let graph = builder.build()?;
        let config = PartitionConfigBuilder::new()
            .with_partitions(2)
            .with_min_partition_size(1)
            .with_toplevel_reorder(false)
            .build()?;

        let (_, partitions, placements) = partition(&graph, &config);

        // Adding C raises the boundary without adding internal edges, so the
        // checkpoint stays after B.
        assert_eq!(members(&partitions), vec![&[a, b][..], &[c, d][..]]);
        let insns: Vec<u64> = partitions.iter().map(Partition::insns).collect();
        assert_eq!(insns, vec![8, 12]);
        let costs: Vec<(u64, u64)> = partitions
            .iter()
            .filter_map(|p| p.cost().map(|c| (c.boundary, c.internal)))
            .collect();
        assert_eq!(costs, vec![(1, 1), (1, 1)]);
        assert_eq!(placements.count(c), 1);
        assert_eq!(placements.count(d), 1);

        Ok(())
    }

    #[test]
    fn target_is_shared_out_between_the_remaining_partitions() -> anyhow::Result<()> {
        // The target starts at 20 / 3 = 6, and becomes 16 / 2 = 8 after the first
        // partition closes. At 6, the second partition would stop after f2.
        let (graph, f) = unconnected(&[2, 2, 8, 1, 7])?;

        let (_, partitions, _) = partition(&graph, &config(3, 1)?);

        assert_eq!(members(&partitions), vec![&f[..2], &f[2..4], &f[4..]]);

        Ok(())
    }

    #[test]
    fn target_never_drops_below_the_minimum_size() -> anyhow::Result<()> {
        // Sharing out what remains would give targets of 10, but the floor is 15.
        let (graph, f) = unconnected(&[10, 10, 10, 10])?;

        let (_, partitions, _) = partition(&graph, &config(4, 15)?);

        assert_eq!(members(&partitions), vec![&f[..1], &f[1..2], &f[2..]]);

        Ok(())
    }

    #[test]
    fn target_is_unbounded_once_enough_partitions_exist() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let a = builder.function("A", 1);
        let b = builder.function("B", 1);
        let c = builder.function("C", 1);
        let shared = builder.function("shared", 100);
        builder.comdat_group("shared", &[shared]);
        builder.call(a, shared).call(b, shared).call(c, shared);
        let graph = builder.build()?;

        let (_, partitions, placements) = partition(&graph, &config(1, 1)?);

        // The copy of the shared function overshoots the first partition at once,
        // after which no further partition is started.
        assert_eq!(members(&partitions), vec![&[a, shared][..], &[b, shared, c][..]]);
        let insns: Vec<u64> = partitions.iter().map(Partition::insns).collect();
        assert_eq!(insns, vec![101, 102]);
        assert_eq!(placements.count(shared), 2);

        Ok(())
    }

    #[test]
    fn everything_fits_in_one_partition_when_small() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let a = builder.function("a", 10);
        let b = builder.function("b", 10);
        builder.call(a, b);
        let graph = builder.build()?;

        let (_, partitions, _) = partition(&graph, &PartitionConfig::default());

        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions.current().symbols().as_slice(), &[a, b]);
        assert_eq!(partitions.current().insns(), 20);

        Ok(())
    }

    #[test]
    fn partitioned_symbols_are_placed_exactly_once() -> anyhow::Result<()> {
        let graph = chain_program()?;
        let (classes, partitions, placements) = partition(&graph, &config(4, 1)?);
        assert!(partitions.len() > 1);

        for id in graph.ids().filter(|id| classes.is_partitioned(*id)) {
            let holders = partitions.iter().filter(|p| p.contains(id)).count();
            assert_eq!(holders, 1, "{} is in {holders} partitions", graph.symbol(id).name);
            assert_eq!(placements.count(id), 1);
        }

        Ok(())
    }

    #[test]
    fn comdat_groups_and_duplicates_are_never_split() -> anyhow::Result<()> {
        let graph = chain_program()?;
        let (classes, partitions, _) = partition(&graph, &config(4, 1)?);
        let key = graph.find("inline_helper").expect("Helper exists");
        let group = graph.group_of(key).expect("Helper is grouped");

        let holders: Vec<&Partition> = partitions.iter().filter(|p| p.contains(key)).collect();
        assert!(!holders.is_empty());
        for partition in holders {
            assert!(graph.members_of(group).iter().all(|m| partition.contains(*m)));
        }

        // Every partition that calls a duplicated symbol has its own copy.
        for partition in &partitions {
            for member in partition.symbols().as_slice() {
                for edge in graph.callees(*member) {
                    if classes.is_duplicate(edge.to) {
                        assert!(partition.contains(edge.to));
                    }
                }
            }
        }

        Ok(())
    }

    #[test]
    fn every_edge_is_counted_once_per_partition() -> anyhow::Result<()> {
        let graph = chain_program()?;
        let (_, partitions, _) = partition(&graph, &config(4, 1)?);

        for partition in &partitions {
            let (mut touching, mut inside) = (0, 0);
            for edge in graph.edges().iter().filter(|e| !e.is_self_edge()) {
                let (from, to) = (partition.contains(edge.from), partition.contains(edge.to));
                if from || to {
                    touching += edge.weight();
                }
                if from && to {
                    inside += edge.weight();
                }
            }

            let cost = partition.cost().expect("Balanced partitions record their cost");
            assert_eq!(cost.boundary + cost.internal, touching);
            assert_eq!(cost.internal, inside);
        }

        Ok(())
    }

    #[test]
    fn empty_programs_get_one_empty_partition() -> anyhow::Result<()> {
        let graph = SymbolGraphBuilder::new().build()?;
        let (_, partitions, _) = partition(&graph, &PartitionConfig::default());

        assert_eq!(partitions.len(), 1);
        assert!(partitions.current().is_empty());
        assert_eq!(partitions.current().name(), "");

        Ok(())
    }

    #[test]
    fn referenced_variables_are_pulled_next_to_their_users() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let unused = builder.variable("unused", 4);
        let f = builder.function("f", 10);
        let data = builder.variable("data", 4);
        let g = builder.function("g", 10);
        builder.reference(f, data, RefUse::Store);
        let graph = builder.build()?;

        let (_, partitions, _) = partition(&graph, &PartitionConfig::default());
        assert_eq!(partitions.current().symbols().as_slice(), &[f, data, g, unused]);

        Ok(())
    }

    #[test]
    fn declaration_order_is_kept_without_reordering() -> anyhow::Result<()> {
        let mut builder = SymbolGraphBuilder::new();
        let first = builder.variable("first", 4);
        let g = builder.function("g", 10);
        let second = builder.variable("second", 4);
        let f = builder.function("f", 10);
        let last = builder.variable("last", 4);
        builder.call(f, g);
        let graph = builder.build()?;

        let config = PartitionConfigBuilder::new().with_toplevel_reorder(false).build()?;
        let (_, partitions, _) = partition(&graph, &config);
        assert_eq!(partitions.current().symbols().as_slice(), &[
            first, g, second, f, last
        ]);

        Ok(())
    }
}
