//! Rectangles: axis-aligned boxes over the D dimensions.
//!
//! A rectangle is the product `C[0] × … × C[D-1]` of sorted, non-empty sets
//! of index values. It caches its per-dimension sizes, its cell count and
//! the cost fields computed from the weight store.

use std::fmt;

use crate::error::{Error, Result};
use crate::id::Index;
use crate::store::Measure;

/// Cached cost fields of one rectangle
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RectCost {
    /// Σ w over the cells
    pub weight: f64,
    /// Σ w log2 w over the cells
    pub info: f64,
    /// `-weight * log2(weight / size)`, or 0 for a weightless box
    pub loss: f64,
    /// `info + loss`: KL divergence to the uniform approximation
    pub dkl: f64,
}

impl RectCost {
    /// Derive loss and dkl from weight, info and the cell count
    pub fn from_parts(weight: f64, info: f64, size: usize) -> Self {
        let loss = if weight > 0.0 {
            -weight * (weight / size as f64).log2()
        } else {
            0.0
        };
        Self {
            weight,
            info,
            loss,
            dkl: info + loss,
        }
    }

    pub fn from_measure(measure: &Measure, size: usize) -> Self {
        Self::from_parts(measure.weight, measure.info, size)
    }
}

/// Number of cells of a box with side lengths `sizes`, or `None` when the
/// product overflows `usize`.
pub fn cell_count(sizes: &[usize]) -> Option<usize> {
    sizes.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n))
}

/// An axis-aligned box with cached geometry and cost.
///
/// Equality is structural: two rectangles are equal iff their components
/// are equal. Cached cost fields do not take part.
#[derive(Clone)]
pub struct Rectangle {
    components: Vec<Vec<Index>>,
    sizes: Vec<usize>,
    size: usize,
    /// Cost maintained by the objective
    pub cost: RectCost,
    /// Cost recomputed from scratch by the checker
    pub check: RectCost,
}

impl Rectangle {
    /// Build a rectangle from arbitrary index lists; each list is sorted and
    /// deduplicated. Every component must be non-empty.
    pub fn new(mut components: Vec<Vec<Index>>) -> Result<Self> {
        if components.is_empty() {
            return Err(Error::Dimension("a rectangle needs at least one dimension".into()));
        }
        for (d, component) in components.iter_mut().enumerate() {
            if component.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "component {d} of the rectangle is empty"
                )));
            }
            component.sort_unstable();
            component.dedup();
        }
        let sizes: Vec<usize> = components.iter().map(Vec::len).collect();
        if cell_count(&sizes).is_none() {
            return Err(Error::Dimension(format!(
                "a rectangle with sides {sizes:?} has more cells than fit in usize"
            )));
        }
        Ok(Self::from_sorted(components))
    }

    /// Build from components already sorted, unique and non-empty, whose
    /// cell count fits in `usize`
    pub(crate) fn from_sorted(components: Vec<Vec<Index>>) -> Self {
        debug_assert!(components.iter().all(|c| !c.is_empty()));
        let sizes: Vec<usize> = components.iter().map(Vec::len).collect();
        let size = sizes.iter().product();
        Self {
            components,
            sizes,
            size,
            cost: RectCost::default(),
            check: RectCost::default(),
        }
    }

    /// The full grid `[0, N[0]) × … × [0, N[D-1])`
    pub fn full(dims: &[usize]) -> Self {
        Self::from_sorted(dims.iter().map(|&n| (0..n).collect()).collect())
    }

    /// The single cell `tuple`
    pub fn singleton(tuple: &[Index]) -> Self {
        Self::from_sorted(tuple.iter().map(|&i| vec![i]).collect())
    }

    pub fn arity(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> &[Vec<Index>] {
        &self.components
    }

    pub fn component(&self, dim: usize) -> &[Index] {
        &self.components[dim]
    }

    /// Cached per-dimension sizes
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Cached cell count
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn contains(&self, tuple: &[Index]) -> bool {
        tuple.len() == self.components.len()
            && tuple
                .iter()
                .zip(&self.components)
                .all(|(i, c)| c.binary_search(i).is_ok())
    }

    /// True iff every cell of `self` is a cell of `other`
    pub fn is_subset_of(&self, other: &Rectangle) -> bool {
        self.arity() == other.arity()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a.iter().all(|i| b.binary_search(i).is_ok()))
    }

    /// Iterate over every cell tuple, lexicographically
    pub fn cells(&self) -> CellIter<'_> {
        CellIter::new(&self.components)
    }

    /// Set the cost fields from a measurement
    pub fn set_measure(&mut self, measure: &Measure) {
        self.cost = RectCost::from_measure(measure, self.size);
    }

    /// Reset the checker scratch fields
    pub fn clear_check(&mut self) {
        self.check = RectCost::default();
    }
}

impl PartialEq for Rectangle {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for Rectangle {}

impl fmt::Debug for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rectangle")
            .field("components", &self.components)
            .field("size", &self.size)
            .field("weight", &self.cost.weight)
            .field("dkl", &self.cost.dkl)
            .finish()
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (d, component) in self.components.iter().enumerate() {
            if d > 0 {
                write!(f, " × ")?;
            }
            write!(f, "{component:?}")?;
        }
        Ok(())
    }
}

// ============================================================================
// CELL ITERATION
// ============================================================================

/// Odometer over the cells of a box. The last dimension moves fastest.
pub struct CellIter<'a> {
    components: &'a [Vec<Index>],
    positions: Vec<usize>,
    done: bool,
}

impl<'a> CellIter<'a> {
    fn new(components: &'a [Vec<Index>]) -> Self {
        Self {
            components,
            positions: vec![0; components.len()],
            done: components.is_empty() || components.iter().any(Vec::is_empty),
        }
    }
}

impl Iterator for CellIter<'_> {
    type Item = Vec<Index>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let cell = self
            .positions
            .iter()
            .zip(self.components)
            .map(|(&p, c)| c[p])
            .collect();

        for d in (0..self.positions.len()).rev() {
            self.positions[d] += 1;
            if self.positions[d] < self.components[d].len() {
                break;
            }
            self.positions[d] = 0;
            if d == 0 {
                self.done = true;
            }
        }
        Some(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sorts_and_dedups() {
        let r = Rectangle::new(vec![vec![3, 1, 3], vec![2]]).unwrap();
        assert_eq!(r.components(), &[vec![1, 3], vec![2]]);
        assert_eq!(r.sizes(), &[2, 1]);
        assert_eq!(r.size(), 2);
        assert!(Rectangle::new(vec![vec![1], vec![]]).is_err());
        assert!(Rectangle::new(vec![]).is_err());
    }

    #[test]
    fn test_structural_equality_ignores_cost() {
        let mut a = Rectangle::new(vec![vec![0, 1], vec![2]]).unwrap();
        let b = Rectangle::new(vec![vec![1, 0], vec![2]]).unwrap();
        a.cost.weight = 5.0;
        assert_eq!(a, b);
        assert_ne!(a, Rectangle::full(&[2, 3]));
    }

    #[test]
    fn test_cells_odometer() {
        let r = Rectangle::new(vec![vec![0, 2], vec![1, 3, 4]]).unwrap();
        let cells: Vec<_> = r.cells().collect();
        assert_eq!(cells.len(), r.size());
        assert_eq!(cells[0], vec![0, 1]);
        assert_eq!(cells[2], vec![0, 4]);
        assert_eq!(cells[3], vec![2, 1]);
        assert!(cells.iter().all(|c| r.contains(c)));
    }

    #[test]
    fn test_cost_from_parts() {
        let cost = RectCost::from_parts(16.0, 0.0, 16);
        assert_eq!(cost.loss, 0.0);
        assert_eq!(cost.dkl, 0.0);

        // two cells, all weight in one: dkl = 1 bit per unit weight
        let skewed = RectCost::from_parts(4.0, 8.0, 2);
        assert_eq!(skewed.loss, -4.0);
        assert_eq!(skewed.dkl, 4.0);

        assert_eq!(RectCost::from_parts(0.0, 0.0, 9), RectCost::default());
    }

    #[test]
    fn test_subset() {
        let inner = Rectangle::new(vec![vec![1], vec![2, 3]]).unwrap();
        let outer = Rectangle::full(&[4, 4]);
        assert!(inner.is_subset_of(&outer));
        assert!(!outer.is_subset_of(&inner));
    }
}
