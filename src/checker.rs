//! Independent re-derivation of the partition invariants.
//!
//! Nothing here repairs state: the first violation found is logged and
//! returned. Checks enumerate cells, so they are meant for tests and
//! verification runs on moderate grids.

use log::warn;

use crate::error::{InvariantViolation, EPSILON};
use crate::id::{Index, RectId};
use crate::objective::Objective;
use crate::partition::Partition;
use crate::rect::RectCost;
use crate::sorted;
use crate::store::WeightStore;

/// Cell counts above which a check run is reported as expensive
const LARGE_CHECK: usize = 10_000_000;

type Check = std::result::Result<(), InvariantViolation>;

fn report(violation: InvariantViolation) -> Check {
    warn!("invariant violated: {violation}");
    Err(violation)
}

/// Tolerant float comparison, relative for large magnitudes
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPSILON * a.abs().max(b.abs()).max(1.0)
}

fn cell_id(dims: &[usize], tuple: &[Index]) -> usize {
    let mut id = 0;
    let mut stride = 1;
    for (&i, &n) in tuple.iter().zip(dims) {
        id += i * stride;
        stride *= n;
    }
    id
}

/// Run every structural check, in order:
///
/// 1. the member list equals the set rebuilt from the registers
/// 2. every rectangle is well formed
/// 3. no cell is covered twice
/// 4. every active cell is covered (nonzero cells of `store`, or the whole
///    grid without a store)
/// 5. every register line is strictly sorted
/// 6. at most one rectangle meets at any covered cell, through the registers
/// 7. the registers equal a fresh rebuild
/// 8. `rsize` equals the member count
pub fn check_all(partition: &Partition, store: Option<&WeightStore>) -> Check {
    check_content(partition)?;
    check_rectangles(partition)?;
    let covered = check_packing(partition)?;
    check_covering(partition, store, &covered)?;
    check_register_order(partition)?;
    check_register_overlap(partition)?;
    check_register_freshness(partition)?;
    check_size(partition)
}

pub fn check_content(partition: &Partition) -> Check {
    let rebuilt = partition.rebuilt_members();
    if rebuilt != partition.ids() {
        return report(InvariantViolation::PartitionMismatch {
            partition: partition.len(),
            rebuilt: rebuilt.len(),
        });
    }
    Ok(())
}

pub fn check_rectangles(partition: &Partition) -> Check {
    let dims = partition.dims();
    for (id, rect) in partition.iter() {
        let malformed = |reason: String| {
            report(InvariantViolation::MalformedRectangle { rect: id, reason })
        };
        if rect.arity() != dims.len() {
            return malformed(format!("arity {} in a grid of arity {}", rect.arity(), dims.len()));
        }
        for (d, component) in rect.components().iter().enumerate() {
            if component.is_empty() {
                return malformed(format!("component {d} is empty"));
            }
            if !sorted::is_strictly_sorted(component) {
                return malformed(format!("component {d} is not sorted"));
            }
            if component.last().is_some_and(|&i| i >= dims[d]) {
                return malformed(format!("component {d} leaves the grid"));
            }
            if rect.sizes()[d] != component.len() {
                return malformed(format!("cached size {} on dimension {d}", rect.sizes()[d]));
            }
        }
        if rect.size() != rect.sizes().iter().product::<usize>() {
            return malformed(format!("cached cell count {}", rect.size()));
        }
    }
    Ok(())
}

/// Returns the sorted ids of all covered cells
pub fn check_packing(partition: &Partition) -> std::result::Result<Vec<usize>, InvariantViolation> {
    let total: usize = partition.iter().map(|(_, r)| r.size()).sum();
    if total > LARGE_CHECK {
        warn!("packing check over {total} cells");
    }
    let dims = partition.dims();
    let mut covered = Vec::with_capacity(total);
    for (_, rect) in partition.iter() {
        covered.extend(rect.cells().map(|cell| cell_id(dims, &cell)));
    }
    covered.sort_unstable();
    if let Some(pair) = covered.windows(2).find(|w| w[0] == w[1]) {
        report(InvariantViolation::DuplicateCell { cell: pair[0] })?;
    }
    Ok(covered)
}

pub fn check_covering(partition: &Partition, store: Option<&WeightStore>, covered: &[usize]) -> Check {
    match store {
        Some(store) => {
            let active = store.nnz_cells();
            let missing = sorted::difference(&active, covered);
            if let Some(&cell) = missing.first() {
                return report(InvariantViolation::MissingCell { cell });
            }
        }
        None => {
            let grid: usize = partition.dims().iter().product();
            if grid > LARGE_CHECK {
                warn!("covering check over {grid} cells");
            }
            // covered is sorted and duplicate-free: the first gap is the first missing cell
            let gap = covered.iter().enumerate().find(|&(pos, &cell)| pos != cell);
            if let Some((pos, _)) = gap {
                return report(InvariantViolation::MissingCell { cell: pos });
            }
            if covered.len() < grid {
                return report(InvariantViolation::MissingCell { cell: covered.len() });
            }
        }
    }
    Ok(())
}

pub fn check_register_order(partition: &Partition) -> Check {
    for (dim, lines) in partition.registers().iter().enumerate() {
        for (index, line) in lines.iter().enumerate() {
            if !sorted::is_strictly_sorted(line) {
                return report(InvariantViolation::UnsortedRegister { dim, index });
            }
        }
    }
    Ok(())
}

/// Intersect the register lines of every covered cell; more than one
/// survivor means two rectangles meet there.
pub fn check_register_overlap(partition: &Partition) -> Check {
    for (_, rect) in partition.iter() {
        for cell in rect.cells() {
            let mut meeting: Vec<RectId> = partition.register(0, cell[0]).to_vec();
            for (d, &i) in cell.iter().enumerate().skip(1) {
                meeting = sorted::intersection(&meeting, partition.register(d, i));
            }
            if meeting.len() > 1 {
                return report(InvariantViolation::OverlappingRegisters {
                    count: meeting.len(),
                    cell,
                });
            }
        }
    }
    Ok(())
}

pub fn check_register_freshness(partition: &Partition) -> Check {
    let mut fresh = partition.clone();
    fresh.reg_of_r();
    for (dim, (lines, fresh_lines)) in partition.registers().iter().zip(fresh.registers()).enumerate() {
        for (index, (line, fresh_line)) in lines.iter().zip(fresh_lines).enumerate() {
            if line != fresh_line {
                return report(InvariantViolation::StaleRegister { dim, index });
            }
        }
    }
    Ok(())
}

pub fn check_size(partition: &Partition) -> Check {
    if partition.rsize() != partition.len() {
        return report(InvariantViolation::SizeMismatch {
            cached: partition.rsize(),
            actual: partition.len(),
        });
    }
    Ok(())
}

/// Recompute every rectangle's cost fields into its `check` slot and the
/// aggregates from scratch, and compare with the cached values.
pub fn check_objective(partition: &mut Partition, objective: &Objective, store: &WeightStore) -> Check {
    let (mut weight, mut info, mut loss, mut dkl) = (0.0, 0.0, 0.0, 0.0);
    for (id, rect) in partition.iter_mut() {
        rect.check = RectCost::from_measure(&store.measure_in(rect.components()), rect.size());
        let fields = [
            ("weight", rect.cost.weight, rect.check.weight),
            ("info", rect.cost.info, rect.check.info),
            ("loss", rect.cost.loss, rect.check.loss),
            ("dkl", rect.cost.dkl, rect.check.dkl),
        ];
        for (field, cached, recomputed) in fields {
            if !approx_eq(cached, recomputed) {
                return report(InvariantViolation::CostDrift {
                    field,
                    rect: Some(id),
                    cached,
                    recomputed,
                });
            }
        }
        if rect.check.weight < EPSILON {
            return report(InvariantViolation::NullWeight { rect: id });
        }
        weight += rect.check.weight;
        info += rect.check.info;
        loss += rect.check.loss;
        dkl += rect.check.dkl;
    }

    let summary = objective.summary();
    let cost = objective.dkl_factor() * dkl + objective.config().penalty_factor * partition.len() as f64;
    let aggregates = [
        ("total weight", summary.weight, weight),
        ("total weight vs Ew", store.total_weight(), weight),
        ("total info", summary.info, info),
        ("total loss", summary.loss, loss),
        ("total dkl", summary.dkl, dkl),
        ("cost", summary.cost, cost),
    ];
    for (field, cached, recomputed) in aggregates {
        if !approx_eq(cached, recomputed) {
            return report(InvariantViolation::CostDrift {
                field,
                rect: None,
                cached,
                recomputed,
            });
        }
    }
    if summary.rsize != partition.len() {
        return report(InvariantViolation::SizeMismatch {
            cached: summary.rsize,
            actual: partition.len(),
        });
    }
    Ok(())
}
