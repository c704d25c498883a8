//! The knobs that control how the partitioner splits a program.

use clap::ValueEnum;
use ltp_errors::partition::{Error, Result};

use crate::constant::{DEFAULT_MIN_PARTITION_SIZE, DEFAULT_PARTITION_COUNT};

/// The strategy used to assign symbols to partitions.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, ValueEnum)]
pub enum PartitionPolicy {
    /// One partition per input translation unit.
    OneToOne,

    /// One partition per symbol, for the most parallelism possible.
    Maximal,

    /// A fixed number of partitions of roughly equal size, placed so as to cut
    /// as few call and reference edges as possible.
    #[default]
    Balanced,
}

/// The configuration for a run of the partitioner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionConfig {
    /// The policy by which symbols are assigned to partitions.
    pub policy: PartitionPolicy,

    /// The number of partitions that the balanced policy aims for.
    pub partitions: usize,

    /// The smallest size, in instructions, that the balanced policy targets for
    /// any one partition.
    pub min_partition_size: u64,

    /// Whether symbols may be emitted in an order other than the one in which
    /// they were declared.
    ///
    /// When this is `false`, the balanced policy walks functions in declaration
    /// order and emits each variable before the first function declared after
    /// it.
    pub toplevel_reorder: bool,
}

impl PartitionConfig {
    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPartitionCount`] if the balanced policy is asked for
    ///   zero partitions.
    pub fn validate(&self) -> Result<()> {
        if self.policy == PartitionPolicy::Balanced && self.partitions == 0 {
            Err(Error::InvalidPartitionCount(self.partitions))?;
        }

        Ok(())
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            policy:             PartitionPolicy::default(),
            partitions:         DEFAULT_PARTITION_COUNT,
            min_partition_size: DEFAULT_MIN_PARTITION_SIZE,
            toplevel_reorder:   true,
        }
    }
}

/// Allows for building a [`PartitionConfig`] while retaining the defaults for
/// fields that do not need to be customized.
#[derive(Clone, Debug, Default)]
pub struct PartitionConfigBuilder {
    config: PartitionConfig,
}

impl PartitionConfigBuilder {
    /// Creates a new builder starting from the default configuration.
    ///
    /// # API Style
    ///
    /// Please note that the API for the builder consumes `self` and is hence
    /// designed to have calls chained in the "fluent" API style.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Specifies the partitioning policy.
    #[must_use]
    pub fn with_policy(mut self, policy: PartitionPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    /// Specifies the number of partitions for the balanced policy.
    #[must_use]
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.config.partitions = partitions;
        self
    }

    /// Specifies the minimum target partition size for the balanced policy.
    #[must_use]
    pub fn with_min_partition_size(mut self, size: u64) -> Self {
        self.config.min_partition_size = size;
        self
    }

    /// Specifies whether symbols may be reordered relative to their declaration
    /// order.
    #[must_use]
    pub fn with_toplevel_reorder(mut self, reorder: bool) -> Self {
        self.config.toplevel_reorder = reorder;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPartitionCount`] if the configuration asks for zero
    ///   balanced partitions.
    pub fn build(self) -> Result<PartitionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
