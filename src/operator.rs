//! Candidate edits: proposal, overlap search and exact re-decomposition.
//!
//! An edit replaces every partition rectangle overlapping a candidate box by
//! the pieces of it lying outside the box, plus the box itself. The
//! [`Operator`] owns the in-flight [`Candidate`] and never mutates the
//! partition except through [`Operator::do_cluster`]; scoring and the
//! data-bound commit live in [`crate::objective`].
//!
//! # Overlap search
//!
//! For each dimension `d`, the register lines of every value in the box's
//! component `C[d]` are merged ([`Operator::reg_union`]). A rectangle is in
//! that union iff it shares a value with the box on `d`. Intersecting the D
//! unions ([`Operator::reg_intersection`]) leaves exactly the rectangles
//! sharing a cell with the box.
//!
//! # Splitting
//!
//! A rectangle `r` overlapping box `B` is cut into at most `2^D` pieces. For
//! each dimension take `I[d] = r[d] ∩ B[d]` and `X[d] = r[d] \ B[d]`; piece
//! `n` uses `X[d]` where bit `d` of `n` is set and `I[d]` elsewhere. Piece 0
//! is the part of `r` inside `B`, every other non-empty piece lies outside.

use std::borrow::Cow;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::OperatorConfig;
use crate::error::{Error, Result};
use crate::id::{Index, RectId};
use crate::objective::Delta;
use crate::partition::Partition;
use crate::rect::{RectCost, Rectangle};
use crate::sorted;

// ============================================================================
// CANDIDATE STATE
// ============================================================================

/// One piece of a split rectangle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Piece {
    /// Emptied when scoring moves it into a replacement rectangle
    pub components: Vec<Vec<Index>>,
    /// Cell count
    pub size: usize,
    /// True for the part inside the candidate box
    pub inside: bool,
}

/// The pieces of one overlapped rectangle, in increasing selector order
#[derive(Clone, Debug)]
pub struct Split {
    pub source: RectId,
    pub pieces: Vec<Piece>,
}

/// A proposed edit, owned by the operator until commit or cancel
#[derive(Clone, Debug)]
pub struct Candidate {
    /// The candidate box
    pub rect: Rectangle,
    /// Sorted handles of the rectangles it overlaps
    pub to_del: Vec<RectId>,
    /// Re-decomposition of each rectangle in `to_del`, same order
    pub splits: Vec<Split>,
    /// Replacement pieces outside the box, filled by scoring
    pub new_rects: Vec<Rectangle>,
    /// Cost of the box itself once scored; `None` when it holds no data
    pub box_cost: Option<RectCost>,
    /// Cost change, filled by scoring
    pub delta: Option<Delta>,
}

impl Candidate {
    /// Total cell count of the pieces inside the box
    pub fn inside_size(&self) -> usize {
        self.splits
            .iter()
            .flat_map(|s| s.pieces.iter())
            .filter(|p| p.inside)
            .map(|p| p.size)
            .sum()
    }
}

// ============================================================================
// OPERATOR
// ============================================================================

pub struct Operator {
    dims: Vec<usize>,
    config: OperatorConfig,
    rng: StdRng,
    candidate: Option<Candidate>,
}

impl Operator {
    pub fn new(dims: Vec<usize>, config: OperatorConfig) -> Result<Self> {
        if dims.is_empty() || dims.contains(&0) {
            return Err(Error::Dimension(format!("invalid grid {dims:?}")));
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            dims,
            config,
            rng,
            candidate: None,
        })
    }

    pub fn for_partition(partition: &Partition, config: OperatorConfig) -> Result<Self> {
        Self::new(partition.dims().to_vec(), config)
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        self.candidate.as_ref()
    }

    pub(crate) fn candidate_mut(&mut self) -> Option<&mut Candidate> {
        self.candidate.as_mut()
    }

    pub(crate) fn take_candidate(&mut self) -> Option<Candidate> {
        self.candidate.take()
    }

    pub fn has_candidate(&self) -> bool {
        self.candidate.is_some()
    }

    /// Discard the in-flight candidate, if any
    pub fn clean_operator(&mut self) {
        self.candidate = None;
    }

    // ========================================================================
    // PROPOSALS
    // ========================================================================

    /// Random box: each value of each dimension `d` is kept with
    /// probability `cluster_p(d)`.
    pub fn find_cluster(&mut self, partition: &Partition) -> bool {
        self.clean_operator();
        let mut components = Vec::with_capacity(self.dims.len());
        for d in 0..self.dims.len() {
            let p = self.config.cluster_p(d);
            let mut component = Vec::new();
            for i in 0..self.dims[d] {
                if self.rng.random_bool(p) {
                    component.push(i);
                }
            }
            if component.is_empty() {
                trace!("find_cluster: empty component on dimension {d}");
                return false;
            }
            components.push(component);
        }
        self.propose(partition, Rectangle::from_sorted(components))
    }

    /// Box spanning two distinct rectangles that share a register line.
    pub fn find_union_constrained(&mut self, partition: &Partition) -> bool {
        self.clean_operator();
        if partition.len() < 2 {
            return false;
        }
        let dim = self.rng.random_range(0..self.dims.len());
        let index = self.rng.random_range(0..self.dims[dim]);
        let line = partition.register(dim, index);
        if line.len() < 2 {
            return false;
        }
        let first = line[self.rng.random_range(0..line.len())];
        let second = line[self.rng.random_range(0..line.len())];
        if first == second {
            return false;
        }
        let (a, b) = (&partition[first], &partition[second]);
        let components = a
            .components()
            .iter()
            .zip(b.components())
            .map(|(x, y)| sorted::union(x, y))
            .collect();
        trace!("find_union_constrained: {first} ∪ {second} via register ({dim}, {index})");
        self.propose(partition, Rectangle::from_sorted(components))
    }

    /// Random sub-box of a random rectangle, strictly smaller on at least
    /// one dimension.
    pub fn find_division(&mut self, partition: &Partition) -> bool {
        self.clean_operator();
        let ids = partition.ids();
        if ids.is_empty() {
            return false;
        }
        let target = ids[self.rng.random_range(0..ids.len())];
        let rect = &partition[target];
        if rect.size() == 1 {
            return false;
        }
        let p = self.config.division_p.clamp(0.0, 1.0);
        let mut smaller = false;
        let mut components = Vec::with_capacity(rect.arity());
        for component in rect.components() {
            let kept: Vec<Index> = component
                .iter()
                .copied()
                .filter(|_| self.rng.random_bool(p))
                .collect();
            if kept.is_empty() {
                return false;
            }
            smaller |= kept.len() < component.len();
            components.push(kept);
        }
        if !smaller {
            return false;
        }
        let rect_box = Rectangle::from_sorted(components);
        trace!("find_division: {rect_box} inside {target}");
        self.set_candidate(partition, rect_box, vec![target]);
        true
    }

    /// Use `rect_box` verbatim as the candidate box. False if it does not
    /// fit the grid or overlaps no rectangle.
    pub fn apply_cluster(&mut self, partition: &Partition, rect_box: &Rectangle) -> bool {
        self.clean_operator();
        if rect_box.arity() != self.dims.len() {
            return false;
        }
        let fits = rect_box
            .components()
            .iter()
            .zip(&self.dims)
            .all(|(c, &n)| c.last().is_some_and(|&i| i < n));
        if !fits {
            return false;
        }
        self.propose(partition, rect_box.clone())
    }

    fn propose(&mut self, partition: &Partition, rect_box: Rectangle) -> bool {
        let unions = rect_box
            .components()
            .iter()
            .enumerate()
            .map(|(d, component)| Self::reg_union(partition, d, component))
            .collect();
        let to_del = Self::reg_intersection(unions);
        if to_del.is_empty() {
            trace!("candidate {rect_box} overlaps no rectangle");
            return false;
        }
        trace!("candidate {rect_box} overlaps {} rectangles", to_del.len());
        self.set_candidate(partition, rect_box, to_del);
        true
    }

    fn set_candidate(&mut self, partition: &Partition, rect: Rectangle, to_del: Vec<RectId>) {
        let splits = to_del
            .iter()
            .map(|&source| Split {
                source,
                pieces: Self::split(partition[source].components(), rect.components()),
            })
            .collect();
        self.candidate = Some(Candidate {
            rect,
            to_del,
            splits,
            new_rects: Vec::new(),
            box_cost: None,
            delta: None,
        });
    }

    // ========================================================================
    // SET ALGEBRA
    // ========================================================================

    /// Sorted union of the register lines of `component` on `dim`.
    ///
    /// The two shortest lists are merged first, repeatedly, through a
    /// min-heap keyed on list length.
    pub fn reg_union(partition: &Partition, dim: usize, component: &[Index]) -> Vec<RectId> {
        let mut lists: Vec<Cow<'_, [RectId]>> = component
            .iter()
            .map(|&i| Cow::Borrowed(partition.register(dim, i)))
            .filter(|line| !line.is_empty())
            .collect();
        let mut heap: BinaryHeap<Reverse<(usize, usize)>> = lists
            .iter()
            .enumerate()
            .map(|(slot, line)| Reverse((line.len(), slot)))
            .collect();

        while let Some(Reverse((_, a))) = heap.pop() {
            let Some(Reverse((_, b))) = heap.pop() else {
                return lists.swap_remove(a).into_owned();
            };
            let merged = sorted::union(&lists[a][..], &lists[b][..]);
            lists[b] = Cow::Borrowed(&[]);
            heap.push(Reverse((merged.len(), a)));
            lists[a] = Cow::Owned(merged);
        }
        Vec::new()
    }

    /// Sorted intersection of per-dimension unions, shortest first
    pub fn reg_intersection(mut unions: Vec<Vec<RectId>>) -> Vec<RectId> {
        unions.sort_by_key(Vec::len);
        let mut lists = unions.into_iter();
        let Some(mut acc) = lists.next() else {
            return Vec::new();
        };
        for list in lists {
            if acc.is_empty() {
                break;
            }
            acc = sorted::intersection(&acc, &list);
        }
        acc
    }

    /// Cut `target` by `rect_box` into its non-empty pieces, in increasing
    /// selector order.
    ///
    /// Each intersection/difference list is moved into the last piece that
    /// uses it and cloned for the earlier ones.
    pub fn split(target: &[Vec<Index>], rect_box: &[Vec<Index>]) -> Vec<Piece> {
        let arity = target.len();
        debug_assert_eq!(arity, rect_box.len());
        debug_assert!(arity < usize::BITS as usize);

        // lists[0][d] = target ∩ box, lists[1][d] = target \ box
        let mut lists: [Vec<Option<Vec<Index>>>; 2] = [
            target
                .iter()
                .zip(rect_box)
                .map(|(t, b)| Some(sorted::intersection(t, b)))
                .collect(),
            target
                .iter()
                .zip(rect_box)
                .map(|(t, b)| Some(sorted::difference(t, b)))
                .collect(),
        ];
        let sizes: [Vec<usize>; 2] = [
            lists[0].iter().map(|l| l.as_ref().map_or(0, Vec::len)).collect(),
            lists[1].iter().map(|l| l.as_ref().map_or(0, Vec::len)).collect(),
        ];
        let selector = |n: usize, d: usize| (n >> d) & 1;

        let valid: Vec<usize> = (0..1usize << arity)
            .filter(|&n| (0..arity).all(|d| sizes[selector(n, d)][d] > 0))
            .collect();

        let mut last_use = [vec![usize::MAX; arity], vec![usize::MAX; arity]];
        for &n in &valid {
            for d in 0..arity {
                last_use[selector(n, d)][d] = n;
            }
        }

        let mut pieces = Vec::with_capacity(valid.len());
        for &n in &valid {
            let mut components = Vec::with_capacity(arity);
            let mut size = 1;
            for d in 0..arity {
                let s = selector(n, d);
                let list = if last_use[s][d] == n {
                    lists[s][d].take()
                } else {
                    lists[s][d].clone()
                };
                let list = list.unwrap_or_default();
                size *= list.len();
                components.push(list);
            }
            pieces.push(Piece {
                components,
                size,
                inside: n == 0,
            });
        }
        pieces
    }

    // ========================================================================
    // GEOMETRIC COMMIT
    // ========================================================================

    /// Commit the candidate without weights: the overlapped rectangles are
    /// replaced by all their outside pieces plus the candidate box.
    pub fn do_cluster(&mut self, partition: &mut Partition) -> Result<Vec<RectId>> {
        let candidate = self.take_candidate().ok_or(Error::NoCandidate)?;
        let Candidate {
            rect,
            to_del,
            splits,
            ..
        } = candidate;
        let mut new_rects: Vec<Rectangle> = splits
            .into_iter()
            .flat_map(|split| split.pieces.into_iter())
            .filter(|piece| !piece.inside)
            .map(|piece| Rectangle::from_sorted(piece.components))
            .collect();
        new_rects.push(rect);
        trace!(
            "do_cluster: -{} +{} rectangles",
            to_del.len(),
            new_rects.len()
        );
        Ok(partition.apply_edit(&to_del, new_rects))
    }
}
