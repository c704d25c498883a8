//! Adds symbols to partitions together with everything that must travel with
//! them.
//!
//! A symbol never lives in a partition on its own. Inline clones and thunks
//! must be emitted with the function they belong to, aliases with their
//! target, COMDAT groups as a whole, and any [`SymbolClass::Duplicate`] symbol
//! that a member uses needs a copy in the same partition. The
//! [`SymbolGrouper`] follows all of these relationships from a starting symbol
//! using an explicit worklist, so that arbitrarily deep chains of
//! relationships cannot exhaust the stack.

use ltp_symtab::{SymbolGraph, SymbolId};
use tracing::trace;

use crate::{
    partition::{Partition, PlacementTable},
    pass::analysis::classify::{SymbolClass, SymbolClassification},
};

/// A unit of pending work for the grouper.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Task {
    /// Add the symbol that contains `symbol` (or `symbol` itself, if it stands
    /// alone).
    Contained { symbol: SymbolId },

    /// Add `symbol` itself. If `required` is set, the addition must not be
    /// refused.
    Direct { symbol: SymbolId, required: bool },

    /// Walk the references made by the initializer of the read-only variable
    /// `symbol`, unless it has been walked already.
    Initializer { symbol: SymbolId },
}

/// Places symbols into partitions, pulling in everything that each symbol
/// needs alongside it.
#[derive(Clone, Copy, Debug)]
pub struct SymbolGrouper<'a> {
    graph:   &'a SymbolGraph,
    classes: &'a SymbolClassification,
}

impl<'a> SymbolGrouper<'a> {
    /// Creates a grouper over `graph`, whose symbols have been classified as
    /// given by `classes`.
    #[must_use]
    pub fn new(graph: &'a SymbolGraph, classes: &'a SymbolClassification) -> Self {
        Self { graph, classes }
    }

    /// Gets the symbol that `id` is ultimately a part of.
    ///
    /// Aliases and thunks belong to the function they forward to, inline clones
    /// to the function they were inlined into, and variable aliases to the
    /// variable they alias. Weak references always stand alone.
    #[must_use]
    pub fn container_of(&self, id: SymbolId) -> SymbolId {
        let mut current = id;
        loop {
            let next = self.contained_in(current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    /// Gets the outermost container of `id` that can actually be placed.
    ///
    /// This is [`Self::container_of`], except that the walk stops short of an
    /// [`SymbolClass::External`] container. An alias of a declaration is
    /// therefore placed on its own.
    fn placeable_container_of(&self, id: SymbolId) -> SymbolId {
        let mut current = id;
        loop {
            let next = self.contained_in(current);
            if next == current || self.classes.class_of(next) == SymbolClass::External {
                return current;
            }
            current = next;
        }
    }

    /// Gets the symbol that directly contains `id`, or `id` itself.
    fn contained_in(&self, id: SymbolId) -> SymbolId {
        let symbol = self.graph.symbol(id);
        if symbol.weakref {
            return id;
        }

        let mut target = id;
        loop {
            let current = self.graph.symbol(target);
            let next = if symbol.is_function() {
                current.alias_of.or(current.thunk_of)
            } else {
                current.alias_of
            };
            match next {
                Some(next) => target = next,
                None => break,
            }
        }

        if symbol.is_function() {
            self.graph.symbol(target).inlined_to.unwrap_or(target)
        } else {
            target
        }
    }

    /// Adds the symbol containing `id` to `partition`, along with everything
    /// that must accompany it, and returns `true` if the container ends up in
    /// the partition.
    ///
    /// Once the container is in, `id` itself is added too, even when nothing
    /// but its container link ties it there. When the container is
    /// [`SymbolClass::External`], `id` is placed without it.
    ///
    /// # Panics
    ///
    /// - If the container is a [`SymbolClass::Partitioned`] symbol that has
    ///   already been placed in some other partition.
    /// - If some member of a COMDAT group that is being added cannot be added.
    pub fn add(
        &self,
        partition: &mut Partition,
        placements: &mut PlacementTable,
        id: SymbolId,
    ) -> bool {
        self.run(partition, placements, Task::Contained { symbol: id })
    }

    /// Processes `root` and everything that it gives rise to, returning whether
    /// the symbol named by `root` ended up in the partition.
    fn run(&self, partition: &mut Partition, placements: &mut PlacementTable, root: Task) -> bool {
        let mut worklist = vec![root];
        let mut root_added = None;

        while let Some(task) = worklist.pop() {
            let added = match task {
                Task::Contained { symbol } => {
                    let container = self.placeable_container_of(symbol);
                    assert!(
                        self.classes.class_of(container) != SymbolClass::Partitioned
                            || self.graph.symbol(container).comdat
                            || !placements.is_placed(container)
                            || partition.contains(container),
                        "Symbol `{}` is already placed in another partition",
                        self.graph.symbol(container).name
                    );
                    let mark = worklist.len();
                    let added = self.add_one(partition, placements, container, &mut worklist);

                    // The requested symbol runs after everything its container brought in.
                    if added && symbol != container && !partition.contains(symbol) {
                        worklist.insert(mark, Task::Direct {
                            symbol,
                            required: false,
                        });
                    }
                    added
                }
                Task::Direct { symbol, required } => {
                    let added = self.add_one(partition, placements, symbol, &mut worklist);
                    assert!(
                        added || !required,
                        "COMDAT group member `{}` could not be added to partition `{}`",
                        self.graph.symbol(symbol).name,
                        partition.name()
                    );
                    added
                }
                Task::Initializer { symbol } => {
                    if !partition.contains(symbol) && partition.visit_initializer(symbol) {
                        let mut follow = Vec::new();
                        self.reference_tasks(partition, symbol, &mut follow);
                        worklist.extend(follow.into_iter().rev());
                    }
                    true
                }
            };
            root_added.get_or_insert(added);
        }

        root_added.unwrap_or(false)
    }

    /// Inserts `id` into `partition` if it may be placed there, and pushes the
    /// symbols that must follow it onto `worklist`.
    ///
    /// Returns `true` if `id` is in the partition afterwards.
    fn add_one(
        &self,
        partition: &mut Partition,
        placements: &mut PlacementTable,
        id: SymbolId,
        worklist: &mut Vec<Task>,
    ) -> bool {
        if partition.contains(id) {
            return true;
        }

        let symbol = self.graph.symbol(id);
        match self.classes.class_of(id) {
            SymbolClass::External => {
                trace!(symbol = %symbol.name, "Not placing external symbol");
                return false;
            }
            SymbolClass::Partitioned if !symbol.comdat && placements.is_placed(id) => {
                trace!(symbol = %symbol.name, "Symbol is already placed elsewhere");
                return false;
            }
            _ => (),
        }

        let size = if symbol.is_function() { symbol.size } else { 0 };
        partition.insert(id, size, placements);
        trace!(
            symbol = %symbol.name,
            partition = partition.name(),
            insns = partition.insns(),
            "Added symbol"
        );

        // Everything that follows is pushed in reverse so that it is processed in the
        // order in which it is discovered.
        let mut follow = Vec::new();

        if symbol.is_function() {
            for edge in self.graph.callees(id) {
                if edge.is_inlined_call() {
                    follow.push(Task::Direct {
                        symbol:   edge.to,
                        required: false,
                    });
                } else if self.classes.is_duplicate(edge.to) {
                    follow.push(Task::Contained { symbol: edge.to });
                }
            }

            for thunk in self.graph.thunks_of(id) {
                follow.push(Task::Direct {
                    symbol:   *thunk,
                    required: false,
                });
            }
        }

        self.reference_tasks(partition, id, &mut follow);

        for alias in self.graph.aliases_of(id) {
            if !self.graph.symbol(alias).weakref {
                follow.push(Task::Direct {
                    symbol:   alias,
                    required: false,
                });
            }
        }

        if let Some(group) = self.graph.group_of(id) {
            for member in self.graph.members_of(group) {
                if *member != id {
                    follow.push(Task::Direct {
                        symbol:   *member,
                        required: true,
                    });
                }
            }
        }

        worklist.extend(follow.into_iter().rev());
        true
    }

    /// Pushes the work arising from the references made by `id` onto `follow`.
    ///
    /// Duplicated symbols that `id` refers to must be copied into the
    /// partition. The initializers of read-only variables are walked in turn,
    /// so that anything they refer to is available for constant folding.
    fn reference_tasks(&self, partition: &Partition, id: SymbolId, follow: &mut Vec<Task>) {
        for edge in self.graph.references(id) {
            let referred = self.graph.symbol(edge.to);
            if self.classes.is_duplicate(edge.to) {
                follow.push(Task::Contained { symbol: edge.to });
            } else if referred.is_variable()
                && referred.foldable_initializer
                && !partition.contains(edge.to)
            {
                follow.push(Task::Initializer { symbol: edge.to });
            }
        }
    }
}
