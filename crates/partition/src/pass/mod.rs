//! This module contains both the definition of the [`Pass`] type and the
//! [`PassManager`] object.
//!
//! Every Pass should implement [`ConcretePass`], as this provides the full set
//! of features required of a pass. It is also expected that each pass provide a
//! type-specific constructor function called `new`.
//!
//! # Passes
//!
//! A pass is a self-contained unit of functionality that performs some
//! operation over the symbol graph. They fall into the following categories:
//!
//! - **Analysis:** These examine the structure of the graph to infer
//!   information about it without changing it. Symbol classification is an
//!   analysis.
//! - **Transformation:** Transformation passes may use the information from
//!   analysis passes to change the graph, or to produce some larger structure
//!   over it. Both partitioning and cross-partition promotion are
//!   transformations.
//!
//! # Ordering
//!
//! Passes declare the passes whose data they depend on, and the pass manager
//! finds an order in which every pass runs after its dependencies. Among the
//! passes that are ready to run at any point, the one that was provided first
//! is run first, so the resulting order is stable.

pub mod analysis;
pub mod data;
pub mod transform;

use std::{
    any::{Any, TypeId},
    fmt::Debug,
};

use derivative::Derivative;
use downcast_rs::Downcast;
use ltp_errors::partition::{Error, Result};
use tracing::{debug, info_span};

use crate::{
    config::PartitionConfig,
    context::ProgramContext,
    pass::data::{ConcretePassData, DynPassDataMap, PassData},
};

/// A pass is a self-contained unit of functionality that performs some
/// operation over the symbol graph.
pub type Pass = Box<dyn PassOps>;

/// A handle that uniquely identifies the pass.
pub type PassKey = TypeId;

/// Pass return data that returns a dynamic [`PassData`].
pub type DynPassReturnData = PassReturnData<PassData>;

/// The data returned when executing a pass.
#[derive(Derivative)]
#[derivative(Debug(bound = "T: Debug"))]
pub struct PassReturnData<T> {
    /// The potentially-modified program context.
    pub context: ProgramContext,

    /// The data returned by the pass.
    pub data: T,
}

impl<T> PassReturnData<T> {
    /// Creates a new instance of the pass return data.
    pub fn new(context: ProgramContext, data: T) -> Self {
        Self { context, data }
    }
}

impl PassReturnData<PassData> {
    /// Allows you to get the returned pass data as the concrete data type `T`,
    /// returning `&T` if possible and `None` otherwise.
    #[must_use]
    pub fn data_as<T: ConcretePassData>(&self) -> Option<&T> {
        self.data.as_any().downcast_ref::<T>()
    }
}

/// The operations that we expect one of our passes to have.
///
/// The implementation is designed te be used via dynamic dispatch, and hence
/// can provide the requisite operations however it is able.
///
/// # Self Bounds
///
/// - [`Any`] allows downcasting to concrete implementations of the pass.
/// - [`Debug`] to provide representations to aid in debugging. It is
///   recommended to use the derive feature for this.
/// - [`Downcast`] for easy conversions _to_ [`Any`] for downcasting.
///
/// In addition, it is required but not enforced that implementors of this
/// trait also implement [`ConcretePass`].
pub trait PassOps
where
    Self: Any + Debug + Downcast,
{
    /// Executes the pass on the provided `context`, returning both the
    /// potentially-modified context and any data returned by the pass.
    ///
    /// It takes a map of `pass_data` that contains the data of every pass that
    /// has already run, which includes at least the passes named by
    /// [`Self::depends`].
    ///
    /// # Errors
    ///
    /// - [`Error`] if pass execution fails for any reason.
    fn run(
        &mut self,
        context: ProgramContext,
        pass_data: &DynPassDataMap,
    ) -> Result<DynPassReturnData>;

    /// Gets a slice containing the keys of the passes whose output this pass
    /// depends on.
    fn depends(&self) -> &[PassKey];

    /// Gets a slice containing the keys of the passes whose output is no
    /// longer valid once this pass has run.
    fn invalidates(&self) -> &[PassKey];

    /// Returns a duplicate of this pass.
    fn dupe(&self) -> Pass;

    /// Gets a human-readable name for the pass.
    fn name(&self) -> &'static str;

    /// Gets a key that uniquely represents the pass.
    ///
    /// This **must** return the same value as [`ConcretePass::key`].
    fn key_dyn(&self) -> PassKey {
        self.type_id()
    }
}

/// Operations implemented on `dyn PassOps` are **only** available on the
/// concrete trait object and hence not equivalent to a blanket implementation
/// of a method for `trait PassOps`.
impl dyn PassOps {
    /// Checks if the pass is an instance of the concrete pass `T`, returning
    /// `true` if it is and `false` otherwise.
    pub fn is<T: ConcretePass>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Allows you to view the dynamic pass `self` as the concrete pass type
    /// `T`, returning a `&T` if possible and `None` otherwise.
    pub fn view_as<T: ConcretePass>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Allows you to view the dynamic pass `self` as the concrete pass type
    /// `T`, returning a `&T` if possible.
    ///
    /// # Panics
    ///
    /// If `self` is not an instance of `T`.
    pub fn unwrap_as<T: ConcretePass>(&self) -> &T {
        self.view_as::<T>()
            .unwrap_or_else(|| panic!("self was not a {:?}", TypeId::of::<T>()))
    }
}

/// Provides extra operations that can be called when operating on a concrete
/// instance of a specific pass, rather than on any instance of a pass.
pub trait ConcretePass
where
    Self: Clone + Debug + PassOps,
{
    /// The type of data returned by the pass.
    type Data: ConcretePassData;

    /// Gets a key that uniquely represents the pass.
    ///
    /// This **must** return the same value as [`PassOps::key_dyn`].
    #[must_use]
    fn key() -> PassKey {
        TypeId::of::<Self>()
    }
}

/// The data returned when executing all passes via the pass manager.
#[derive(Debug)]
pub struct PassManagerReturnData {
    /// The potentially-modified program context.
    pub context: ProgramContext,

    /// A mapping from pass key to the data returned by the pass.
    pub data: DynPassDataMap,
}

impl PassManagerReturnData {
    /// Creates a new pass manager return data element wrapping the transformed
    /// program `context` and the result `data` from all the passes.
    #[must_use]
    pub fn new(context: ProgramContext, data: DynPassDataMap) -> Self {
        Self { context, data }
    }
}

/// A manager for passes within the partitioner.
///
/// The primary task of this pass manager is to automatically resolve a pass
/// ordering based on dependencies between passes. This ensures that pass
/// orderings are correct, without the need for costly manual validation.
#[derive(Debug)]
pub struct PassManager {
    pass_ordering: Vec<Pass>,
}

impl PassManager {
    /// Creates a new pass manager wrapping the provided passes.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPassOrdering`] if no valid pass ordering can be
    ///   generated from the provided `passes`.
    pub fn new(passes: Vec<Pass>) -> Result<Self> {
        let pass_ordering = Self::generate_pass_ordering(passes)?;
        Ok(Self { pass_ordering })
    }

    /// Creates a pass manager that classifies, partitions, and then promotes
    /// the symbols of a program according to the provided `config`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPartitionCount`] if `config` is not valid.
    pub fn for_config(config: PartitionConfig) -> Result<Self> {
        config.validate()?;
        Self::new(vec![
            analysis::classify::ClassifySymbols::new_dyn(),
            transform::partition::PartitionSymbols::new_dyn(config),
            transform::promote::PromoteCrossPartition::new_dyn(),
        ])
    }

    /// Executes the pass ordering on the provided `context`.
    ///
    /// After each pass runs, the data of any pass that it invalidates is
    /// discarded.
    ///
    /// # Errors
    ///
    /// - [`Error`] if any pass fails.
    pub fn run(&mut self, mut context: ProgramContext) -> Result<PassManagerReturnData> {
        let mut pass_data_map = DynPassDataMap::new();

        for pass in &mut self.pass_ordering {
            let _span = info_span!("pass", name = pass.name()).entered();
            debug!("Running pass");
            let PassReturnData {
                context: new_context,
                data,
            } = pass.run(context, &pass_data_map)?;

            for key in pass.invalidates() {
                pass_data_map.clear_key(*key);
            }
            pass_data_map.put_dyn(pass, data);

            context = new_context;
        }

        let result = PassManagerReturnData::new(context, pass_data_map);
        Ok(result)
    }

    /// Gets the current pass ordering.
    ///
    /// This method is always guaranteed to return a valid pass ordering that
    /// respects the requirements of the passes.
    #[must_use]
    pub fn passes(&self) -> &[Pass] {
        &self.pass_ordering
    }

    /// Generates a valid pass ordering from `passes` wherever possible.
    ///
    /// Every pass is placed after all the passes it depends on. Where more than
    /// one pass could come next, the one that appears earliest in `passes` is
    /// chosen.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPassOrdering`] if no valid pass ordering can be
    ///   generated from the provided `passes`. This occurs if a pass depends on
    ///   a pass that was not provided, or if there are circular dependencies
    ///   between passes.
    pub fn generate_pass_ordering(passes: Vec<Pass>) -> Result<Vec<Pass>> {
        let keys: Vec<PassKey> = passes.iter().map(|p| p.key_dyn()).collect();
        for pass in &passes {
            if pass.depends().iter().any(|d| !keys.contains(d)) {
                Err(Error::InvalidPassOrdering(format!(
                    "The {} pass depends on a pass that was not provided",
                    pass.name()
                )))?;
            }
        }

        let mut pending: Vec<Option<Pass>> = passes.into_iter().map(Some).collect();
        let mut placed: Vec<PassKey> = Vec::with_capacity(pending.len());
        let mut ordering = Vec::with_capacity(pending.len());

        while ordering.len() < pending.len() {
            let ready = pending.iter().position(|slot| {
                slot.as_ref()
                    .is_some_and(|p| p.depends().iter().all(|d| placed.contains(d)))
            });
            let Some(index) = ready else {
                let stuck = pending.iter().flatten().map(|p| p.name()).collect::<Vec<_>>();
                return Err(Error::InvalidPassOrdering(format!(
                    "Circular dependency between the passes {stuck:?}"
                )));
            };

            let pass = pending[index].take().expect("Ready pass was already placed");
            placed.push(pass.key_dyn());
            ordering.push(pass);
        }

        Ok(ordering)
    }
}

impl Default for PassManager {
    /// Returns a pass manager with the default set of passes associated with
    /// it.
    ///
    /// # Default Passes
    ///
    /// The list of default passes is as follows. Please note that they will be
    /// assembled into a correct ordering, and will not necessarily be executed
    /// in the order in which they are presented here.
    ///
    /// - [`analysis::classify::ClassifySymbols`]
    /// - [`transform::partition::PartitionSymbols`], with the default
    ///   [`PartitionConfig`].
    /// - [`transform::promote::PromoteCrossPartition`]
    fn default() -> Self {
        Self::for_config(PartitionConfig::default()).expect("Default pass ordering was invalid")
    }
}
