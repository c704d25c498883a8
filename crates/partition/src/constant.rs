//! Useful constants for use within the partitioner.

/// The number of partitions that the balanced policy aims for when no count is
/// requested.
pub const DEFAULT_PARTITION_COUNT: usize = 32;

/// The size, in instructions, below which the balanced policy will not shrink
/// its per-partition target when no minimum is requested.
pub const DEFAULT_MIN_PARTITION_SIZE: u64 = 1000;

/// The fraction of the target size below which the balanced policy always
/// moves its checkpoint forward.
///
/// The numbers are, in order: the numerator and the denominator.
pub const CHECKPOINT_FLOOR: (u64, u64) = (3, 4);

/// The fraction of the target size at and above which the balanced policy stops
/// moving its checkpoint forward.
///
/// The numbers are, in order: the numerator and the denominator.
pub const CHECKPOINT_CEILING: (u64, u64) = (5, 4);

/// The multiple of the target size at which a partition is considered to have
/// overshot, and is rolled back to its checkpoint.
pub const OVERSHOOT_FACTOR: u64 = 2;

/// The suffix given to file-local symbols that must be renamed when they are
/// promoted into the program-wide namespace.
pub const PRIVATE_NAME_SUFFIX: &str = "lto_priv";

/// The name given to the single partition created when there is nothing to
/// partition under the one-to-one and maximal policies.
pub const EMPTY_PARTITION_NAME: &str = "empty";
