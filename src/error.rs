//! Error types for graphcomp
//!
//! Two families:
//! - [`Error`]: everything a caller can get back from a fallible operation
//! - [`InvariantViolation`]: a desynchronized partition, register index or
//!   cost cache, found by the checker. These are defects in incremental
//!   maintenance and are reported, never repaired.
//!
//! A degenerate proposal (empty or trivial candidate box) is not an error:
//! the `find_*` operations return `false` for it.

use thiserror::Error;

use crate::id::{Index, RectId};

/// Tolerance for floating point comparisons between incremental and
/// from-scratch computations, and below which a fragment counts as empty.
pub const EPSILON: f64 = 1e-9;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Dimensionality or domain sizes do not fit the operation
    #[error("dimension error: {0}")]
    Dimension(String),

    /// An argument is outside its valid range
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Weights must be finite and nonnegative
    #[error("invalid weight {weight} at {tuple:?}")]
    InvalidWeight { tuple: Vec<Index>, weight: f64 },

    /// The operation needs a weight store with positive total weight
    #[error("no weighted data attached")]
    NoData,

    /// Commit or scoring requested without a candidate edit in flight
    #[error("no candidate edit in flight")]
    NoCandidate,

    /// `do_operation` called before `delta_cost`
    #[error("candidate edit has not been scored")]
    Unscored,

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// A broken consistency invariant between the partition, its register
/// index and the cached objective fields.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("partition holds {partition} rectangles but registers rebuild {rebuilt}")]
    PartitionMismatch { partition: usize, rebuilt: usize },

    #[error("rectangle {rect} is malformed: {reason}")]
    MalformedRectangle { rect: RectId, reason: String },

    #[error("cell {cell} is covered more than once")]
    DuplicateCell { cell: usize },

    #[error("active cell {cell} is not covered")]
    MissingCell { cell: usize },

    #[error("register line ({dim}, {index}) is not sorted")]
    UnsortedRegister { dim: usize, index: Index },

    #[error("{count} rectangles meet at cell {cell:?}")]
    OverlappingRegisters { cell: Vec<Index>, count: usize },

    #[error("register line ({dim}, {index}) differs from a fresh rebuild")]
    StaleRegister { dim: usize, index: Index },

    #[error("Rsize is {cached} but the partition holds {actual} rectangles")]
    SizeMismatch { cached: usize, actual: usize },

    #[error("{field} of {rect:?} drifted: cached {cached}, recomputed {recomputed}")]
    CostDrift {
        field: &'static str,
        rect: Option<RectId>,
        cached: f64,
        recomputed: f64,
    },

    #[error("rectangle {rect} carries no weight")]
    NullWeight { rect: RectId },
}
