//! This pass decides, for every symbol in the program, how the partitioner is
//! allowed to place it.
//!
//! The [`SymbolClassification`] that results from this pass is the basis for
//! every placement decision made by the partitioning policies, and is used
//! again when deciding which symbols need promoting.

use ltp_errors::partition::Result;
use ltp_symtab::{Symbol, SymbolGraph, SymbolId};
use tracing::{debug, trace};

use crate::{
    context::ProgramContext,
    pass::{
        data::{ConcretePassData, DynPassDataMap, PassDataOps},
        ConcretePass,
        DynPassReturnData,
        Pass,
        PassKey,
        PassOps,
    },
};

/// How a symbol may be placed into partitions.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SymbolClass {
    /// The symbol is resolved outside the program, and is never placed.
    External,

    /// The symbol is copied into every partition that needs it.
    Duplicate,

    /// The symbol lives in exactly one partition.
    Partitioned,
}

/// Classifies a single `symbol`.
///
/// The rules are checked in order, and the first one that matches decides the
/// class:
///
/// 1. Inline clones are [`SymbolClass::Duplicate`], as they travel with the
///    function they were inlined into.
/// 2. Symbols with no definition are [`SymbolClass::External`].
/// 3. Variables in the constant pool are [`SymbolClass::Duplicate`].
/// 4. Functions whose bodies were never analyzed are
///    [`SymbolClass::External`].
/// 5. Weak references are [`SymbolClass::Duplicate`].
/// 6. COMDAT symbols are [`SymbolClass::Duplicate`] unless they must be output
///    or are used from a non-LTO object file.
/// 7. Anything else is [`SymbolClass::Partitioned`].
#[must_use]
pub fn classify(symbol: &Symbol) -> SymbolClass {
    if symbol.is_inline_clone() {
        return SymbolClass::Duplicate;
    }
    if !symbol.definition {
        return SymbolClass::External;
    }
    if symbol.is_variable() && symbol.in_constant_pool {
        return SymbolClass::Duplicate;
    }
    if symbol.is_function() && !symbol.analyzed {
        return SymbolClass::External;
    }
    if symbol.weakref {
        return SymbolClass::Duplicate;
    }
    if symbol.comdat && !symbol.force_output && !symbol.used_from_object_file {
        return SymbolClass::Duplicate;
    }

    SymbolClass::Partitioned
}

/// Classifies every symbol in the program.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassifySymbols {
    /// The passes that this pass depends upon the results of for its execution.
    depends: Vec<PassKey>,

    /// The passes that this pass invalidates the results of by executing.
    invalidates: Vec<PassKey>,
}

impl Default for ClassifySymbols {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassifySymbols {
    /// Creates a new instance of the classification pass.
    #[must_use]
    pub fn new() -> Self {
        // Classification only looks at the symbols themselves.
        let depends = vec![];

        // This pass's operation is purely analytical and hence it does not invalidate
        // any other passes.
        let invalidates = vec![];

        Self {
            depends,
            invalidates,
        }
    }

    /// Creates a new trait object of the classification pass.
    #[must_use]
    pub fn new_dyn() -> Pass {
        Box::new(Self::new())
    }

    /// Classifies every symbol in `graph`.
    #[must_use]
    pub fn classify_graph(graph: &SymbolGraph) -> SymbolClassification {
        let classes = graph
            .symbols()
            .iter()
            .map(|symbol| {
                let class = classify(symbol);
                trace!(symbol = %symbol.name, ?class, "Classified symbol");
                class
            })
            .collect();
        let classification = SymbolClassification::new(classes);

        debug!(
            partitioned = classification.count(SymbolClass::Partitioned),
            duplicate = classification.count(SymbolClass::Duplicate),
            external = classification.count(SymbolClass::External),
            "Classified symbols"
        );

        classification
    }
}

impl PassOps for ClassifySymbols {
    fn run(
        &mut self,
        context: ProgramContext,
        _pass_data: &DynPassDataMap,
    ) -> Result<DynPassReturnData> {
        let classification = context.analyze(|graph| Ok(Self::classify_graph(graph)))?;
        Ok(DynPassReturnData::new(context, Box::new(classification)))
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
        "ClassifySymbols"
    }
}

impl ConcretePass for ClassifySymbols {
    type Data = SymbolClassification;
}

/// The class of every symbol in a program, indexed by [`SymbolId`].
#[derive(Clone, Debug, PartialEq)]
pub struct SymbolClassification {
    classes: Vec<SymbolClass>,
}

impl SymbolClassification {
    /// Creates a new classification from the class of each symbol in
    /// [`SymbolId`] order.
    #[must_use]
    pub fn new(classes: Vec<SymbolClass>) -> Self {
        Self { classes }
    }

    /// Gets the class of `id`.
    ///
    /// # Panics
    ///
    /// If `id` is not a symbol of the classified graph.
    #[must_use]
    pub fn class_of(&self, id: SymbolId) -> SymbolClass {
        self.classes[id.0]
    }

    /// Returns `true` if `id` is [`SymbolClass::Partitioned`].
    #[must_use]
    pub fn is_partitioned(&self, id: SymbolId) -> bool {
        self.class_of(id) == SymbolClass::Partitioned
    }

    /// Returns `true` if `id` is [`SymbolClass::Duplicate`].
    #[must_use]
    pub fn is_duplicate(&self, id: SymbolId) -> bool {
        self.class_of(id) == SymbolClass::Duplicate
    }

    /// Gets the number of symbols with the provided `class`.
    #[must_use]
    pub fn count(&self, class: SymbolClass) -> usize {
        self.classes.iter().filter(|c| **c == class).count()
    }

    /// Gets the number of classified symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if no symbols were classified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl PassDataOps for SymbolClassification {}

impl ConcretePassData for SymbolClassification {
    type Pass = ClassifySymbols;
}
