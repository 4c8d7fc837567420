//! graphcomp: greedy graph compression.
//!
//! A weighted (hyper)graph is a sparse D-dimensional weight tensor. The
//! crate looks for a partition of its index grid into axis-aligned boxes
//! minimizing
//!
//! ```text
//! cost = (lambda / Ew) Σ dkl(r) + Rsize
//! ```
//!
//! where `dkl(r)` is the information lost by replacing the weights inside
//! box `r` by their average and `Rsize` is the number of boxes.
//!
//! Layers, leaf first:
//! - [`store`]: the brick tree holding the weights, with box range queries
//! - [`rect`] and [`partition`]: boxes, partitions and the register index
//! - [`operator`]: candidate boxes and the exact re-decomposition of a partition
//! - [`objective`]: the cost model and incremental re-scoring
//! - [`session`]: all of the above over one store, the interface driven by
//!   [`optimizer`], whose dichotomic search traces the cost curve over lambda
//!
//! [`checker`] re-derives every invariant from scratch and [`serialize`]
//! persists stores and snapshots.

pub mod checker;
pub mod config;
pub mod error;
pub mod id;
pub mod objective;
pub mod operator;
pub mod optimizer;
pub mod partition;
pub mod rect;
pub mod serialize;
pub mod session;
pub mod sorted;
pub mod store;

pub use config::{ObjectiveConfig, OperatorConfig, OptimizerConfig};
pub use error::{Error, InvariantViolation, Result, EPSILON};
pub use id::{Index, NodeId, RectId};
pub use objective::{CostSummary, Delta, Objective};
pub use operator::{Candidate, Operator};
pub use optimizer::{Optimizer, OptimizerReport, Proposal};
pub use partition::{Partition, PartitionSnapshot};
pub use rect::{RectCost, Rectangle};
pub use session::{Session, Snapshot};
pub use store::{Measure, WeightStore};
