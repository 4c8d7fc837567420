//! Sparse weighted tensor store (the brick tree).
//!
//! A `WeightStore` maps index tuples of a fixed arity D to nonnegative
//! weights. It is a tree of depth D: every brick at depth `d < D-1` maps a
//! sorted set of index values on dimension `d` to child bricks, and every
//! brick at depth `D-1` maps a sorted set of index values to weights.
//!
//! Bricks live in a flat arena addressed by [`NodeId`]; the root brick is
//! always slot 0. Nothing is ever removed from the arena: the store is built
//! once, read during optimization, and reduced stores are produced as fresh
//! values by [`WeightStore::restricted`].
//!
//! All range queries take the per-dimension components of a box and descend
//! only into children whose index value is in the component on that level,
//! matching the two sorted lists with a galloping merge.

pub mod builder;

use log::debug;

use crate::error::{Error, Result};
use crate::id::{Index, NodeId};
use crate::rect::{self, Rectangle};
use crate::sorted;

const ROOT: NodeId = 0;

/// `w * log2(w)`, with the `0 log 0 = 0` convention
#[inline]
pub fn xlog2x(w: f64) -> f64 {
    if w > 0.0 {
        w * w.log2()
    } else {
        0.0
    }
}

// ============================================================================
// BRICKS
// ============================================================================

/// One level of the brick tree.
#[derive(Clone, Debug)]
pub enum Brick {
    /// Index values on this level, each with the child brick one level down
    Internal { keys: Vec<Index>, children: Vec<NodeId> },
    /// Index values on the last level, each with its accumulated weight
    Leaf { keys: Vec<Index>, weights: Vec<f64> },
}

impl Brick {
    fn empty(leaf: bool) -> Self {
        if leaf {
            Brick::Leaf {
                keys: Vec::new(),
                weights: Vec::new(),
            }
        } else {
            Brick::Internal {
                keys: Vec::new(),
                children: Vec::new(),
            }
        }
    }

    /// Sorted index values held by this brick
    pub fn keys(&self) -> &[Index] {
        match self {
            Brick::Internal { keys, .. } | Brick::Leaf { keys, .. } => keys,
        }
    }
}

/// Sums collected over the nonzero cells of a box
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Measure {
    /// Σ w
    pub weight: f64,
    /// Σ w log2 w
    pub info: f64,
    /// Number of nonzero cells
    pub nonzero: usize,
}

impl Measure {
    #[inline]
    fn add_cell(&mut self, w: f64) {
        self.weight += w;
        self.info += xlog2x(w);
        self.nonzero += 1;
    }
}

// ============================================================================
// WEIGHT STORE
// ============================================================================

/// Sparse D-dimensional tensor of nonnegative weights.
#[derive(Clone, Debug)]
pub struct WeightStore {
    /// Domain size N[d] of each dimension
    dims: Vec<usize>,
    /// Brick arena; slot 0 is the root (dimension 0)
    bricks: Vec<Brick>,
    /// Number of distinct nonzero cells (E)
    edges: usize,
    /// Sum of all weights (Ew)
    total_weight: f64,
}

impl WeightStore {
    /// Create an empty store over the grid `dims[0] × … × dims[D-1]`.
    ///
    /// Requires `D >= 2`, every domain size positive and a total cell count
    /// that fits in `usize`. Cell ids and box sizes are computed unchecked
    /// afterwards.
    pub fn new(dims: Vec<usize>) -> Result<Self> {
        if dims.len() < 2 {
            return Err(Error::Dimension(format!(
                "a weight store needs at least 2 dimensions, got {}",
                dims.len()
            )));
        }
        if let Some(d) = dims.iter().position(|&n| n == 0) {
            return Err(Error::Dimension(format!("dimension {d} has an empty domain")));
        }
        if rect::cell_count(&dims).is_none() {
            return Err(Error::Dimension(format!("grid {dims:?} has too many cells")));
        }
        Ok(Self {
            dims,
            bricks: vec![Brick::empty(false)],
            edges: 0,
            total_weight: 0.0,
        })
    }

    /// Domain sizes N[d]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of dimensions D
    pub fn arity(&self) -> usize {
        self.dims.len()
    }

    /// Number of distinct nonzero cells (E)
    pub fn edges(&self) -> usize {
        self.edges
    }

    /// Total weight Ew
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn is_empty(&self) -> bool {
        self.edges == 0
    }

    /// Number of cells of the full grid
    pub fn grid_size(&self) -> usize {
        self.dims.iter().product()
    }

    /// Strides used to flatten a tuple to a linear cell id:
    /// `stride[d] = N[0] * … * N[d-1]`.
    pub fn cell_strides(&self) -> Vec<usize> {
        let mut strides = Vec::with_capacity(self.dims.len());
        let mut acc = 1;
        for &n in &self.dims {
            strides.push(acc);
            acc *= n;
        }
        strides
    }

    /// Linear cell id of a tuple
    pub fn cell_id(&self, tuple: &[Index]) -> usize {
        let mut id = 0;
        let mut stride = 1;
        for (&i, &n) in tuple.iter().zip(&self.dims) {
            id += i * stride;
            stride *= n;
        }
        id
    }

    /// Read-only access to a brick, for diagnostics
    pub fn brick(&self, node: NodeId) -> Option<&Brick> {
        self.bricks.get(node)
    }

    /// Number of bricks in the arena
    pub fn brick_count(&self) -> usize {
        self.bricks.len()
    }

    // ========================================================================
    // INSERTION
    // ========================================================================

    /// Add `weight` at `tuple`, accumulating if the tuple is already present.
    ///
    /// Zero weights are accepted and ignored: the store only holds nonzero
    /// cells.
    pub fn insert(&mut self, tuple: &[Index], weight: f64) -> Result<()> {
        if tuple.len() != self.dims.len() {
            return Err(Error::Dimension(format!(
                "tuple {tuple:?} has arity {}, store has {}",
                tuple.len(),
                self.dims.len()
            )));
        }
        if let Some(d) = (0..tuple.len()).find(|&d| tuple[d] >= self.dims[d]) {
            return Err(Error::Dimension(format!(
                "index {} out of range on dimension {d} (N = {})",
                tuple[d], self.dims[d]
            )));
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(Error::InvalidWeight {
                tuple: tuple.to_vec(),
                weight,
            });
        }
        if weight > 0.0 {
            self.accumulate(tuple, weight);
        }
        Ok(())
    }

    /// Insertion without validation; `tuple` must be in range and `weight > 0`.
    fn accumulate(&mut self, tuple: &[Index], weight: f64) {
        let last = self.dims.len() - 1;
        let mut node = ROOT;
        for (depth, &key) in tuple[..last].iter().enumerate() {
            node = self.child_or_insert(node, key, depth + 1 == last);
        }
        let key = tuple[last];
        let Brick::Leaf { keys, weights } = &mut self.bricks[node] else {
            unreachable!("internal brick on the last dimension");
        };
        match keys.binary_search(&key) {
            Ok(pos) => weights[pos] += weight,
            Err(pos) => {
                keys.insert(pos, key);
                weights.insert(pos, weight);
                self.edges += 1;
            }
        }
        self.total_weight += weight;
    }

    fn child_or_insert(&mut self, node: NodeId, key: Index, child_is_leaf: bool) -> NodeId {
        let next = self.bricks.len();
        let Brick::Internal { keys, children } = &mut self.bricks[node] else {
            unreachable!("leaf brick above the last dimension");
        };
        match keys.binary_search(&key) {
            Ok(pos) => children[pos],
            Err(pos) => {
                keys.insert(pos, key);
                children.insert(pos, next);
                self.bricks.push(Brick::empty(child_is_leaf));
                next
            }
        }
    }

    /// Weight stored at `tuple` (0 when absent)
    pub fn get(&self, tuple: &[Index]) -> f64 {
        if tuple.len() != self.dims.len() {
            return 0.0;
        }
        let mut node = ROOT;
        for &key in tuple {
            match &self.bricks[node] {
                Brick::Internal { keys, children } => match keys.binary_search(&key) {
                    Ok(pos) => node = children[pos],
                    Err(_) => return 0.0,
                },
                Brick::Leaf { keys, weights } => {
                    return match keys.binary_search(&key) {
                        Ok(pos) => weights[pos],
                        Err(_) => 0.0,
                    };
                }
            }
        }
        0.0
    }

    // ========================================================================
    // TRAVERSAL
    // ========================================================================

    /// Visit every nonzero cell whose tuple lies in `filter` (or every cell
    /// when `filter` is `None`), in lexicographic tuple order.
    fn walk(
        &self,
        node: NodeId,
        filter: Option<&[Vec<Index>]>,
        tuple: &mut Vec<Index>,
        visit: &mut dyn FnMut(&[Index], f64),
    ) {
        let depth = tuple.len();
        match &self.bricks[node] {
            Brick::Internal { keys, children } => match filter {
                Some(components) => {
                    sorted::for_each_common(keys, &components[depth], |pos| {
                        tuple.push(keys[pos]);
                        self.walk(children[pos], filter, tuple, visit);
                        tuple.pop();
                    });
                }
                None => {
                    for (&key, &child) in keys.iter().zip(children) {
                        tuple.push(key);
                        self.walk(child, filter, tuple, visit);
                        tuple.pop();
                    }
                }
            },
            Brick::Leaf { keys, weights } => match filter {
                Some(components) => {
                    sorted::for_each_common(keys, &components[depth], |pos| {
                        tuple.push(keys[pos]);
                        visit(tuple.as_slice(), weights[pos]);
                        tuple.pop();
                    });
                }
                None => {
                    for (&key, &w) in keys.iter().zip(weights) {
                        tuple.push(key);
                        visit(tuple.as_slice(), w);
                        tuple.pop();
                    }
                }
            },
        }
    }

    /// Visit every nonzero cell with its tuple
    pub fn for_each_cell(&self, mut visit: impl FnMut(&[Index], f64)) {
        let mut tuple = Vec::with_capacity(self.dims.len());
        self.walk(ROOT, None, &mut tuple, &mut visit);
    }

    /// Visit every nonzero cell inside the box `components`
    pub fn for_each_cell_in(&self, components: &[Vec<Index>], mut visit: impl FnMut(&[Index], f64)) {
        debug_assert_eq!(components.len(), self.dims.len());
        let mut tuple = Vec::with_capacity(self.dims.len());
        self.walk(ROOT, Some(components), &mut tuple, &mut visit);
    }

    // ========================================================================
    // RANGE QUERIES
    // ========================================================================

    /// Weight, info and nonzero count inside a box, in one traversal
    pub fn measure_in(&self, components: &[Vec<Index>]) -> Measure {
        let mut measure = Measure::default();
        self.for_each_cell_in(components, |_, w| measure.add_cell(w));
        measure
    }

    /// Σ w over the cells of a box
    pub fn weight_in(&self, components: &[Vec<Index>]) -> f64 {
        let mut weight = 0.0;
        self.for_each_cell_in(components, |_, w| weight += w);
        weight
    }

    /// Σ w log2 w over the cells of a box
    pub fn info_in(&self, components: &[Vec<Index>]) -> f64 {
        let mut info = 0.0;
        self.for_each_cell_in(components, |_, w| info += xlog2x(w));
        info
    }

    /// Number of nonzero cells in a box
    pub fn nonzero_count_in(&self, components: &[Vec<Index>]) -> usize {
        let mut count = 0;
        self.for_each_cell_in(components, |_, _| count += 1);
        count
    }

    /// Linear ids of all nonzero cells, sorted
    pub fn nnz_cells(&self) -> Vec<usize> {
        let strides = self.cell_strides();
        let mut cells = Vec::with_capacity(self.edges);
        self.for_each_cell(|tuple, _| {
            cells.push(tuple.iter().zip(&strides).map(|(i, s)| i * s).sum());
        });
        cells.sort_unstable();
        cells
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Shrink `rect` to the index values that carry data inside it.
    ///
    /// Each component keeps only the values used by at least one nonzero
    /// cell of the box. Returns false, leaving `rect` untouched, when the box
    /// holds no data at all.
    ///
    /// A value counts only when some leaf below it inside the box carries
    /// weight. A brick key that lies in the box but leads to no such leaf is
    /// dropped, so the result is the tightest box around the data rather
    /// than the set of keys the brick levels share with the box.
    pub fn shrink(&self, rect: &mut Rectangle) -> bool {
        let mut used: Vec<Vec<Index>> = vec![Vec::new(); self.dims.len()];
        self.for_each_cell_in(rect.components(), |tuple, _| {
            for (d, &i) in tuple.iter().enumerate() {
                used[d].push(i);
            }
        });
        if used[0].is_empty() {
            return false;
        }
        for component in &mut used {
            component.sort_unstable();
            component.dedup();
        }
        *rect = Rectangle::from_sorted(used);
        true
    }

    /// A new store over the same grid holding only the cells inside a box.
    pub fn restricted(&self, components: &[Vec<Index>]) -> WeightStore {
        let mut reduced = WeightStore {
            dims: self.dims.clone(),
            bricks: vec![Brick::empty(false)],
            edges: 0,
            total_weight: 0.0,
        };
        self.for_each_cell_in(components, |tuple, w| reduced.accumulate(tuple, w));
        debug!(
            "restricted store: {} of {} cells, weight {}",
            reduced.edges, self.edges, reduced.total_weight
        );
        reduced
    }

    /// Divide every weight by `total`.
    pub fn normalize(&mut self, total: f64) -> Result<()> {
        if !total.is_finite() || total <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "cannot normalize by {total}"
            )));
        }
        for brick in &mut self.bricks {
            if let Brick::Leaf { weights, .. } = brick {
                for w in weights.iter_mut() {
                    *w /= total;
                }
            }
        }
        self.total_weight /= total;
        debug!("normalized store by {total}, Ew = {}", self.total_weight);
        Ok(())
    }
}
