//! The partitions that a program is split into, along with the bookkeeping
//! that tracks where every symbol has been placed.
//!
//! # Placement
//!
//! Whether a symbol has been placed (and how many times) is not stored on the
//! symbol itself, but in a [`PlacementTable`] that sits beside the graph. Each
//! insertion into a [`Partition`] updates that table and records an
//! [`Insertion`] in the partition's journal, so that a partition can be rolled
//! back to any earlier length by replaying its journal in reverse.
//!
//! # Modules
//!
//! - [`group`] adds a symbol to a partition together with everything that must
//!   travel with it.
//! - [`one_to_one`], [`maximal`], and [`balanced`] implement the three
//!   partitioning policies.
//! - [`boundary`] works out which symbols outside a partition it refers to.

pub mod balanced;
pub mod boundary;
pub mod group;
pub mod maximal;
pub mod one_to_one;

use std::collections::{HashMap, HashSet};

use ltp_symtab::SymbolId;

/// Where a single symbol has been placed so far.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Placement {
    /// The number of partitions that contain the symbol.
    pub count: u32,

    /// Set once the symbol has been inserted into a partition while it was
    /// already present in another.
    pub in_other_partition: bool,
}

/// The placement of every symbol in a graph, indexed by [`SymbolId`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlacementTable {
    placements: Vec<Placement>,
}

impl PlacementTable {
    /// Creates a table for a graph of `len` symbols, none of which are placed.
    #[must_use]
    pub fn new(len: usize) -> Self {
        let placements = vec![Placement::default(); len];
        Self { placements }
    }

    /// Gets the placement of `id`.
    #[must_use]
    pub fn get(&self, id: SymbolId) -> Placement {
        self.placements[id.0]
    }

    /// Gets the number of partitions that contain `id`.
    #[must_use]
    pub fn count(&self, id: SymbolId) -> u32 {
        self.placements[id.0].count
    }

    /// Returns `true` if `id` is in at least one partition.
    #[must_use]
    pub fn is_placed(&self, id: SymbolId) -> bool {
        self.count(id) > 0
    }

    /// Gets every symbol that lives in more than one partition, in
    /// [`SymbolId`] order.
    #[must_use]
    pub fn multiply_placed(&self) -> Vec<SymbolId> {
        self.placements
            .iter()
            .enumerate()
            .filter(|(_, p)| p.in_other_partition)
            .map(|(i, _)| SymbolId(i))
            .collect()
    }

    /// Records that `id` has been inserted into one more partition, returning
    /// the placement that it had beforehand.
    fn record(&mut self, id: SymbolId) -> Placement {
        let slot = &mut self.placements[id.0];
        let previous = *slot;
        if slot.count > 0 {
            slot.in_other_partition = true;
        }
        slot.count += 1;
        previous
    }

    /// Puts the placement of `id` back to `previous`.
    fn restore(&mut self, id: SymbolId, previous: Placement) {
        self.placements[id.0] = previous;
    }
}

/// The record of a single insertion into a partition, holding everything
/// needed to undo it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Insertion {
    /// The symbol that was inserted.
    pub symbol: SymbolId,

    /// The placement of the symbol before it was inserted.
    pub previous: Placement,

    /// The amount that the insertion added to the partition's size.
    pub size: u64,
}

/// An insertion-ordered set of symbols that can also report the position at
/// which each symbol was inserted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Encoder {
    symbols:   Vec<SymbolId>,
    positions: HashMap<SymbolId, usize>,
}

impl Encoder {
    /// Creates a new, empty, encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `id` if it is not already present, returning its position.
    pub fn insert(&mut self, id: SymbolId) -> usize {
        if let Some(position) = self.positions.get(&id) {
            return *position;
        }
        let position = self.symbols.len();
        self.symbols.push(id);
        self.positions.insert(id, position);
        position
    }

    /// Removes every symbol at or after position `len`.
    pub fn truncate(&mut self, len: usize) {
        for id in self.symbols.drain(len.min(self.symbols.len())..) {
            self.positions.remove(&id);
        }
    }

    /// Gets the position at which `id` was inserted, if it is present.
    #[must_use]
    pub fn position(&self, id: SymbolId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Returns `true` if `id` is present.
    #[must_use]
    pub fn contains(&self, id: SymbolId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Gets the symbol at `position`.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<SymbolId> {
        self.symbols.get(position).copied()
    }

    /// Gets the symbols in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[SymbolId] {
        &self.symbols
    }

    /// Gets the number of symbols present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns `true` if no symbols are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// The cost of the edges that a partition cuts and keeps.
///
/// Every edge between two defined symbols is counted once for each partition
/// that contains one of its ends. If only one end is in the partition, the
/// edge's weight counts towards `boundary`; if both are, it counts towards
/// `internal`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PartitionCost {
    /// The total weight of the edges that leave the partition.
    pub boundary: u64,

    /// The total weight of the edges with both ends inside the partition.
    pub internal: u64,
}

/// A single partition: a named, insertion-ordered set of symbols that will be
/// compiled together.
#[derive(Clone, Debug, PartialEq)]
pub struct Partition {
    /// The name of the partition.
    name: String,

    /// The symbols in the partition.
    encoder: Encoder,

    /// The total size of the functions in the partition.
    insns: u64,

    /// The insertions made so far, in the order they were made.
    ///
    /// Dropped once the partition is frozen.
    journal: Vec<Insertion>,

    /// The read-only variables whose initializers have already been walked
    /// while filling this partition.
    ///
    /// Only allocated on first use, and dropped when the partition is rolled
    /// back or frozen.
    initializers_visited: Option<HashSet<SymbolId>>,

    /// The edge costs of the partition, recorded when it is frozen.
    cost: Option<PartitionCost>,

    /// Whether the partition has been closed to further changes.
    frozen: bool,
}

impl Partition {
    /// Creates a new, empty partition with the provided `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name:                 name.to_string(),
            encoder:              Encoder::new(),
            insns:                0,
            journal:              Vec::new(),
            initializers_visited: None,
            cost:                 None,
            frozen:               false,
        }
    }

    /// Gets the name of the partition.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the symbols in the partition, in insertion order.
    #[must_use]
    pub fn symbols(&self) -> &Encoder {
        &self.encoder
    }

    /// Returns `true` if the partition contains `id`.
    #[must_use]
    pub fn contains(&self, id: SymbolId) -> bool {
        self.encoder.contains(id)
    }

    /// Gets the number of symbols in the partition.
    #[must_use]
    pub fn len(&self) -> usize {
        self.encoder.len()
    }

    /// Returns `true` if the partition contains no symbols.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.encoder.is_empty()
    }

    /// Gets the total size, in instructions, of the functions in the partition.
    #[must_use]
    pub fn insns(&self) -> u64 {
        self.insns
    }

    /// Gets the edge costs recorded for the partition when it was frozen.
    #[must_use]
    pub fn cost(&self) -> Option<PartitionCost> {
        self.cost
    }

    /// Returns `true` if the partition is closed to further changes.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Inserts `id` into the partition, accounting `size` towards its total and
    /// recording the insertion in both `placements` and the journal.
    ///
    /// # Panics
    ///
    /// If the partition is frozen, or already contains `id`.
    pub fn insert(&mut self, id: SymbolId, size: u64, placements: &mut PlacementTable) {
        assert!(!self.frozen, "Partition `{}` is frozen", self.name);
        assert!(!self.contains(id), "Symbol {id} is already in `{}`", self.name);

        let previous = placements.record(id);
        self.encoder.insert(id);
        self.insns += size;
        self.journal.push(Insertion {
            symbol: id,
            previous,
            size,
        });
    }

    /// Marks the initializer of `id` as visited, returning `true` if it had not
    /// been visited before.
    pub fn visit_initializer(&mut self, id: SymbolId) -> bool {
        self.initializers_visited.get_or_insert_with(HashSet::new).insert(id)
    }

    /// Undoes every insertion after the first `len`, restoring both the
    /// partition and `placements` to the state they were in at that point.
    ///
    /// The set of visited initializers is discarded, as it can no longer be
    /// trusted.
    ///
    /// # Panics
    ///
    /// If the partition is frozen.
    pub fn rollback(&mut self, len: usize, placements: &mut PlacementTable) {
        assert!(!self.frozen, "Partition `{}` is frozen", self.name);

        while self.journal.len() > len {
            let Some(insertion) = self.journal.pop() else { break };
            placements.restore(insertion.symbol, insertion.previous);
            self.insns -= insertion.size;
        }
        self.encoder.truncate(len);
        self.initializers_visited = None;
    }

    /// Closes the partition to further changes, recording its final `cost`.
    pub fn freeze(&mut self, cost: Option<PartitionCost>) {
        self.frozen = true;
        self.cost = cost;
        self.journal = Vec::new();
        self.initializers_visited = None;
    }
}

/// The ordered collection of partitions produced by a partitioning policy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartitionSet {
    partitions: Vec<Partition>,
}

impl PartitionSet {
    /// Creates a new, empty set of partitions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new partition named `name` at the end of the set, returning
    /// its index.
    pub fn create(&mut self, name: &str) -> usize {
        self.partitions.push(Partition::new(name));
        self.partitions.len() - 1
    }

    /// Appends an already-filled `partition` to the set, returning its index.
    pub fn push(&mut self, partition: Partition) -> usize {
        self.partitions.push(partition);
        self.partitions.len() - 1
    }

    /// Gets the partition at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Partition> {
        self.partitions.get(index)
    }

    /// Gets a mutable reference to the partition at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Partition> {
        self.partitions.get_mut(index)
    }

    /// Gets the most recently created partition.
    ///
    /// # Panics
    ///
    /// If the set is empty.
    #[must_use]
    pub fn current(&self) -> &Partition {
        self.partitions.last().expect("No partition has been created")
    }

    /// Gets a mutable reference to the most recently created partition.
    ///
    /// # Panics
    ///
    /// If the set is empty.
    pub fn current_mut(&mut self) -> &mut Partition {
        self.partitions.last_mut().expect("No partition has been created")
    }

    /// Gets the partitions in the order they were created.
    pub fn iter(&self) -> impl Iterator<Item = &Partition> + '_ {
        self.partitions.iter()
    }

    /// Freezes every partition that is not yet frozen, recording no cost for
    /// them.
    pub fn freeze_all(&mut self) {
        for partition in self.partitions.iter_mut().filter(|p| !p.is_frozen()) {
            partition.freeze(None);
        }
    }

    /// Gets the number of partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// Returns `true` if there are no partitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

impl<'a> IntoIterator for &'a PartitionSet {
    type IntoIter = std::slice::Iter<'a, Partition>;
    type Item = &'a Partition;

    fn into_iter(self) -> Self::IntoIter {
        self.partitions.iter()
    }
}

#[cfg(test)]
mod test {
    use ltp_symtab::SymbolId;

    use crate::partition::{Encoder, Partition, PartitionSet, Placement, PlacementTable};

    #[test]
    fn second_insertions_are_flagged() {
        let mut placements = PlacementTable::new(2);
        let mut first = Partition::new("first");
        let mut second = Partition::new("second");

        first.insert(SymbolId(0), 4, &mut placements);
        assert_eq!(placements.count(SymbolId(0)), 1);
        assert!(placements.multiply_placed().is_empty());

        second.insert(SymbolId(0), 4, &mut placements);
        assert_eq!(placements.count(SymbolId(0)), 2);
        assert_eq!(placements.multiply_placed(), vec![SymbolId(0)]);
    }

    #[test]
    fn rollback_restores_the_exact_prior_state() {
        let mut placements = PlacementTable::new(4);
        let mut other = Partition::new("other");
        other.insert(SymbolId(2), 1, &mut placements);

        let mut partition = Partition::new("p");
        partition.insert(SymbolId(0), 10, &mut placements);
        let placements_at_checkpoint = placements.clone();
        let checkpoint = partition.clone();

        partition.insert(SymbolId(1), 5, &mut placements);
        partition.insert(SymbolId(2), 3, &mut placements);
        partition.visit_initializer(SymbolId(3));
        assert_eq!(partition.insns(), 18);
        assert!(placements.get(SymbolId(2)).in_other_partition);

        partition.rollback(1, &mut placements);
        assert_eq!(placements, placements_at_checkpoint);
        assert_eq!(partition.insns(), checkpoint.insns());
        assert_eq!(partition.symbols(), checkpoint.symbols());
        assert_eq!(placements.get(SymbolId(2)), Placement {
            count:              1,
            in_other_partition: false,
        });
        assert!(partition.visit_initializer(SymbolId(3)));
    }

    #[test]
    fn encoder_tracks_positions() {
        let mut encoder = Encoder::new();
        assert_eq!(encoder.insert(SymbolId(7)), 0);
        assert_eq!(encoder.insert(SymbolId(3)), 1);
        assert_eq!(encoder.insert(SymbolId(7)), 0);
        assert_eq!(encoder.position(SymbolId(3)), Some(1));

        encoder.truncate(1);
        assert!(!encoder.contains(SymbolId(3)));
        assert_eq!(encoder.as_slice(), &[SymbolId(7)]);
    }

    #[test]
    #[should_panic(expected = "is frozen")]
    fn frozen_partitions_reject_insertions() {
        let mut placements = PlacementTable::new(1);
        let mut set = PartitionSet::new();
        set.create("only");
        set.freeze_all();
        set.current_mut().insert(SymbolId(0), 1, &mut placements);
    }
}
