//! Cost model and incremental re-scoring.
//!
//! Per rectangle `r` with cell count `|r|`:
//!
//! ```text
//! weight = Σ w            info = Σ w log2 w
//! loss   = -weight log2(weight / |r|)     (0 when weight = 0)
//! dkl    = info + loss
//! ```
//!
//! and for the whole partition:
//!
//! ```text
//! cost = (lambda / Ew) Σ dkl + penalty_factor · Rsize
//! ```
//!
//! [`Objective::initialize`] computes everything from the weight store.
//! After that the aggregates only move by the [`Delta`] of committed edits.
//!
//! # Weight inference
//!
//! The pieces of a split rectangle partition its cells, so their weights
//! (and infos) sum to the parent's. Within each split the first piece of
//! maximal cell count is not measured: its sums are the parent's minus those
//! of its siblings. When that piece is the one inside the box, no inside
//! measurement is needed at all. Pieces outside the box keep their own
//! measured or inferred sums; the inside pieces are merged into the box.

use log::{debug, trace};

use crate::config::ObjectiveConfig;
use crate::error::{Error, Result, EPSILON};
use crate::operator::{Candidate, Operator};
use crate::partition::Partition;
use crate::rect::{RectCost, Rectangle};
use crate::store::{Measure, WeightStore};

/// Aggregate cost fields of a partition
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CostSummary {
    pub rsize: usize,
    pub weight: f64,
    pub info: f64,
    pub loss: f64,
    pub dkl: f64,
    /// `dkl_factor * dkl`
    pub ldkl: f64,
    /// `penalty_factor * rsize`
    pub penalty: f64,
    pub cost: f64,
}

impl CostSummary {
    fn apply(&mut self, delta: &Delta) {
        self.rsize = self.rsize.saturating_add_signed(delta.d_rsize);
        self.weight += delta.d_weight;
        self.info += delta.d_info;
        self.loss += delta.d_loss;
        self.dkl += delta.d_dkl;
        self.ldkl += delta.d_ldkl;
        self.penalty += delta.d_penalty;
        self.cost += delta.d_cost;
    }
}

/// Change of every aggregate produced by one edit
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Delta {
    pub d_rsize: isize,
    pub d_weight: f64,
    pub d_info: f64,
    pub d_loss: f64,
    pub d_dkl: f64,
    pub d_ldkl: f64,
    pub d_penalty: f64,
    pub d_cost: f64,
    /// Weight gathered inside the candidate box
    pub box_weight: f64,
}

#[derive(Clone, Debug)]
pub struct Objective {
    config: ObjectiveConfig,
    total_weight: f64,
    dkl_factor: f64,
    summary: CostSummary,
}

impl Objective {
    /// An objective for `store`. Fails if the store carries no weight.
    pub fn new(config: ObjectiveConfig, store: &WeightStore) -> Result<Self> {
        let total_weight = store.total_weight();
        if total_weight <= 0.0 {
            return Err(Error::NoData);
        }
        Ok(Self {
            dkl_factor: config.lambda / total_weight,
            config,
            total_weight,
            summary: CostSummary::default(),
        })
    }

    pub fn config(&self) -> &ObjectiveConfig {
        &self.config
    }

    pub fn lambda(&self) -> f64 {
        self.config.lambda
    }

    /// `lambda / Ew`
    pub fn dkl_factor(&self) -> f64 {
        self.dkl_factor
    }

    /// Ew at construction
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Current aggregates
    pub fn summary(&self) -> &CostSummary {
        &self.summary
    }

    pub fn cost(&self) -> f64 {
        self.summary.cost
    }

    fn summarize(&self, rsize: usize, weight: f64, info: f64, loss: f64, dkl: f64) -> CostSummary {
        let ldkl = self.dkl_factor * dkl;
        let penalty = self.config.penalty_factor * rsize as f64;
        CostSummary {
            rsize,
            weight,
            info,
            loss,
            dkl,
            ldkl,
            penalty,
            cost: ldkl + penalty,
        }
    }

    /// Measure every rectangle of `partition` and reset the aggregates.
    pub fn initialize(&mut self, partition: &mut Partition, store: &WeightStore) -> Result<CostSummary> {
        if partition.dims() != store.dims() {
            return Err(Error::Dimension(format!(
                "partition grid {:?} does not match store grid {:?}",
                partition.dims(),
                store.dims()
            )));
        }
        let (mut weight, mut info, mut loss, mut dkl) = (0.0, 0.0, 0.0, 0.0);
        for (_, rect) in partition.iter_mut() {
            let measure = store.measure_in(rect.components());
            rect.set_measure(&measure);
            weight += rect.cost.weight;
            info += rect.cost.info;
            loss += rect.cost.loss;
            dkl += rect.cost.dkl;
        }
        self.summary = self.summarize(partition.rsize(), weight, info, loss, dkl);
        debug!(
            "objective initialized: Rsize {}, dkl {}, cost {}",
            self.summary.rsize, self.summary.dkl, self.summary.cost
        );
        Ok(self.summary)
    }

    /// Score an arbitrary list of rectangles from scratch, without touching
    /// any cached field.
    pub fn get_objective<'a>(
        &self,
        rects: impl IntoIterator<Item = &'a Rectangle>,
        store: &WeightStore,
    ) -> CostSummary {
        let (mut rsize, mut weight, mut info, mut loss, mut dkl) = (0, 0.0, 0.0, 0.0, 0.0);
        for rect in rects {
            let cost = RectCost::from_measure(&store.measure_in(rect.components()), rect.size());
            rsize += 1;
            weight += cost.weight;
            info += cost.info;
            loss += cost.loss;
            dkl += cost.dkl;
        }
        self.summarize(rsize, weight, info, loss, dkl)
    }

    /// dkl of the single rectangle covering the whole grid
    pub fn dkl_norm(store: &WeightStore) -> f64 {
        let full = Rectangle::full(store.dims());
        RectCost::from_measure(&store.measure_in(full.components()), full.size()).dkl
    }

    /// Score the operator's candidate: build its replacement rectangles and
    /// the cost change of committing them.
    ///
    /// The components of the surviving pieces move into the new rectangles.
    /// Scoring an already scored candidate returns the stored delta.
    pub fn delta_cost(
        &mut self,
        operator: &mut Operator,
        partition: &Partition,
        store: &WeightStore,
    ) -> Result<Delta> {
        let candidate = operator.candidate_mut().ok_or(Error::NoCandidate)?;
        if let Some(delta) = candidate.delta {
            return Ok(delta);
        }
        let mut delta = Delta::default();
        let mut new_rects = Vec::new();
        let mut box_info = 0.0;

        for split in &mut candidate.splits {
            let parent = match partition.get(split.source) {
                Some(rect) => rect.cost,
                None => {
                    return Err(Error::InvalidArgument(format!(
                        "candidate overlaps {} which is no longer in the partition",
                        split.source
                    )))
                }
            };
            let pieces = &mut split.pieces;

            let mut max_pos = 0;
            for (pos, piece) in pieces.iter().enumerate() {
                if piece.size > pieces[max_pos].size {
                    max_pos = pos;
                }
            }

            let mut measures = vec![Measure::default(); pieces.len()];
            let mut siblings = Measure::default();
            for (pos, piece) in pieces.iter().enumerate() {
                if pos != max_pos {
                    let m = store.measure_in(&piece.components);
                    siblings.weight += m.weight;
                    siblings.info += m.info;
                    measures[pos] = m;
                }
            }
            measures[max_pos].weight = parent.weight - siblings.weight;
            measures[max_pos].info = parent.info - siblings.info;

            for (piece, measure) in pieces.iter_mut().zip(&measures) {
                if piece.inside {
                    delta.box_weight += measure.weight;
                    box_info += measure.info;
                } else if measure.weight > EPSILON {
                    let mut rect = Rectangle::from_sorted(std::mem::take(&mut piece.components));
                    rect.cost = RectCost::from_parts(measure.weight, measure.info, piece.size);
                    new_rects.push(rect);
                }
            }

            delta.d_weight -= parent.weight;
            delta.d_info -= parent.info;
            delta.d_loss -= parent.loss;
            delta.d_dkl -= parent.dkl;
        }

        let box_cost = (delta.box_weight > EPSILON)
            .then(|| RectCost::from_parts(delta.box_weight, box_info, candidate.rect.size()));

        for cost in new_rects.iter().map(|rect| &rect.cost).chain(box_cost.as_ref()) {
            delta.d_weight += cost.weight;
            delta.d_info += cost.info;
            delta.d_loss += cost.loss;
            delta.d_dkl += cost.dkl;
        }
        let added = new_rects.len() + usize::from(box_cost.is_some());
        delta.d_rsize = added as isize - candidate.to_del.len() as isize;
        delta.d_ldkl = self.dkl_factor * delta.d_dkl;
        delta.d_penalty = self.config.penalty_factor * delta.d_rsize as f64;
        delta.d_cost = delta.d_ldkl + delta.d_penalty;

        trace!(
            "delta_cost: -{} +{} rectangles, d_dkl {}, d_cost {}",
            candidate.to_del.len(),
            added,
            delta.d_dkl,
            delta.d_cost
        );
        candidate.new_rects = new_rects;
        candidate.box_cost = box_cost;
        candidate.delta = Some(delta);
        Ok(delta)
    }

    /// Commit the scored candidate to `partition` and move the aggregates
    /// by its delta.
    pub fn do_operation(&mut self, operator: &mut Operator, partition: &mut Partition) -> Result<Delta> {
        let delta = match operator.candidate() {
            None => return Err(Error::NoCandidate),
            Some(candidate) => candidate.delta.ok_or(Error::Unscored)?,
        };
        let Candidate {
            mut rect,
            to_del,
            mut new_rects,
            box_cost,
            ..
        } = operator.take_candidate().ok_or(Error::NoCandidate)?;
        if let Some(cost) = box_cost {
            rect.cost = cost;
            rect.clear_check();
            new_rects.push(rect);
        }
        partition.apply_edit(&to_del, new_rects);
        self.summary.apply(&delta);
        trace!(
            "do_operation: Rsize {}, cost {}",
            self.summary.rsize,
            self.summary.cost
        );
        Ok(delta)
    }

    /// Discard the candidate; the partition and the aggregates are untouched
    pub fn cancel_operation(&mut self, operator: &mut Operator) {
        operator.clean_operator();
    }

    /// Switch to another lambda and re-sum the aggregates of `partition`
    /// from its cached rectangle costs.
    pub fn set_lambda(&mut self, lambda: f64, partition: &Partition) -> CostSummary {
        self.config.lambda = lambda;
        self.dkl_factor = lambda / self.total_weight;
        self.reset_summary(partition)
    }

    /// Replace the aggregates, e.g. after restoring a snapshot whose
    /// rectangles carry their cached costs.
    pub fn reset_summary(&mut self, partition: &Partition) -> CostSummary {
        let (mut weight, mut info, mut loss, mut dkl) = (0.0, 0.0, 0.0, 0.0);
        for (_, rect) in partition.iter() {
            weight += rect.cost.weight;
            info += rect.cost.info;
            loss += rect.cost.loss;
            dkl += rect.cost.dkl;
        }
        self.summary = self.summarize(partition.rsize(), weight, info, loss, dkl);
        self.summary
    }
}
