//! Pass data is the result of running a pass that does not show up in the
//! symbol graph itself, such as the class of each symbol or the partitions that
//! were formed.
//!
//! Each concrete pass names the type of its data through
//! [`super::ConcretePass::Data`], and the pass manager collects the data from
//! every pass that it runs into a [`DynPassDataMap`]. Later passes read the
//! data of the passes that they depend on from that map.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt::Debug,
};

use derivative::Derivative;
use downcast_rs::Downcast;

use crate::pass::{ConcretePass, Pass, PassKey};

/// Pass data is output by any given pass
pub type PassData = Box<dyn PassDataOps>;

/// The operations that we expect one of our pass data objects to have.
///
/// The implementation is designed to be used via dynamic dispatch, and hence
/// can provide the requisite operations however it is able.
///
/// # Recommended Functions
///
/// On the concrete type that implements this trait, it is recommended to
/// implement:
///
/// - A `new(...) -> Self` associated function.
/// - A `new_dyn(...) -> PassData` associated function. This one can usually
///   simply call `Box::new(Self::new(...))`.
///
/// # Self Bounds
///
/// - [`Any`] allows downcasting to the concrete data type.
/// - [`Debug`] to provide representations to aid in debugging.
/// - [`Downcast`] for easy conversions _to_ [`Any`] for downcasting.
///
/// In addition, it is required but not enforced that implementors of this
/// trait also implement [`ConcretePassData`].
pub trait PassDataOps
where
    Self: Any + Debug + Downcast,
{
}

/// Operations implemented on `dyn PassDataOps` are **only** available on the
/// concrete trait object and hence not equivalent to a blanket implementation
/// of a method for `trait PassDataOps`.
impl dyn PassDataOps {
    /// Allows you to view the dynamic data `self` as the concrete data type
    /// `T`, returning a `&T` if possible and `None` otherwise.
    pub fn view_as<T: ConcretePassData>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Allows you to view the dynamic data `self` as the concrete data type
    /// `T`, returning a `&mut T` if possible and `None` otherwise.
    pub fn view_as_mut<T: ConcretePassData>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// Allows you to view the dynamic data `self` as the concrete data type
    /// `T`, returning a `&T` if possible.
    ///
    /// # Panics
    ///
    /// If `self` is not `T`.
    pub fn unwrap_as<T: ConcretePassData>(&self) -> &T {
        self.view_as()
            .unwrap_or_else(|| panic!("self was not a {:?}", TypeId::of::<T>()))
    }
}

/// Provides additional operations that can be called when operating on a
/// concrete instance of a specific pass's data, rather than any pass data.
pub trait ConcretePassData
where
    Self: Clone + Debug + PassDataOps,
{
    /// The pass with which the data is associated.
    type Pass: ConcretePass;
}

/// A mapping from pass keys to the associated pass data.
///
/// It will always contain the latest pass data, as there is no need to re-run a
/// pass unless it was invalidated by a subsequent pass.
pub type DynPassDataMap = PassDataMap<PassData>;

/// A mapping from pass keys to the associated pass data.
#[derive(Derivative)]
#[derivative(Clone(bound = "T: Clone"), Debug(bound = "T: Debug"))]
pub struct PassDataMap<T> {
    /// The mapping from pass keys to pass data.
    mapping: HashMap<PassKey, T>,
}

impl<T> PassDataMap<T> {
    /// Constructs a new, empty, mapping from pass keys to pass data.
    #[must_use]
    pub fn new() -> Self {
        let mapping = HashMap::new();
        Self { mapping }
    }

    /// Clears all pass data.
    pub fn clear_all(&mut self) {
        self.mapping.clear();
    }

    /// Gets a reference to the last-written data for the pass given by the
    /// provided `key` if it exists, and returns `None` otherwise.
    #[must_use]
    pub fn get_key(&self, key: PassKey) -> Option<&T> {
        self.mapping.get(&key)
    }

    /// Writes the provided `data` into the container associating it with the
    /// pass described by `key`, overwriting any existing data for that pass.
    pub fn put_key(&mut self, key: PassKey, data: T) {
        self.mapping.insert(key, data);
    }

    /// Clears the data for the pass given by the provided `key`, if it exists.
    pub fn clear_key(&mut self, key: PassKey) {
        self.mapping.remove(&key);
    }

    /// Returns `true` if the map holds data for the pass given by `key`.
    #[must_use]
    pub fn contains_key(&self, key: PassKey) -> bool {
        self.mapping.contains_key(&key)
    }

    /// Gets the number of passes for which the map holds data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// Returns `true` if the map holds no pass data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

impl PassDataMap<PassData> {
    /// Gets a reference to the last-written data for the pass `P` if it exists,
    /// and returns `None` otherwise.
    ///
    /// The data returned is returned as the concrete type.
    #[must_use]
    pub fn get<P: ConcretePass>(&self) -> Option<&P::Data> {
        self.mapping.get(&P::key())?.view_as::<P::Data>()
    }

    /// Writes the provided `data` into the container associating it with the
    /// pass `P`, overwriting any existing data for that pass.
    pub fn put<P: ConcretePass>(&mut self, data: P::Data) {
        let data = Box::new(data);
        self.mapping.insert(P::key(), data);
    }

    /// Writes the provided dynamic `data` into the container, associating it
    /// with the provided `pass`.
    pub fn put_dyn(&mut self, pass: &Pass, data: PassData) {
        self.mapping.insert(pass.key_dyn(), data);
    }

    /// Clears the data for the pass `P` if it exists.
    pub fn clear<P: ConcretePass>(&mut self) {
        self.mapping.remove(&P::key());
    }
}

impl<T> Default for PassDataMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
