//! An optimization session: one partition, its operator and its objective
//! over a borrowed weight store.
//!
//! The session is the single owner of the mutable state. Proposals only
//! read the partition; [`Session::do_operation`] is the only call that
//! edits it incrementally, and it updates the rectangles, the registers and
//! the aggregates together.

use log::debug;

use crate::checker;
use crate::config::{ObjectiveConfig, OperatorConfig};
use crate::error::{Error, Result, EPSILON};
use crate::objective::{CostSummary, Delta, Objective};
use crate::operator::{Candidate, Operator};
use crate::partition::{Partition, PartitionSnapshot};
use crate::rect::Rectangle;
use crate::store::WeightStore;

/// Owned copy of a scored partition
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub partition: PartitionSnapshot,
    pub summary: CostSummary,
    pub lambda: f64,
}

pub struct Session<'a> {
    store: &'a WeightStore,
    partition: Partition,
    operator: Operator,
    objective: Objective,
}

impl<'a> Session<'a> {
    /// A session starting from the macro partition, already scored.
    pub fn new(
        store: &'a WeightStore,
        operator_config: OperatorConfig,
        objective_config: ObjectiveConfig,
    ) -> Result<Self> {
        let mut partition = Partition::for_store(store)?;
        let operator = Operator::for_partition(&partition, operator_config)?;
        let mut objective = Objective::new(objective_config, store)?;
        partition.macro_partition();
        objective.initialize(&mut partition, store)?;
        debug!(
            "session over {:?}: E = {}, Ew = {}",
            store.dims(),
            store.edges(),
            store.total_weight()
        );
        Ok(Self {
            store,
            partition,
            operator,
            objective,
        })
    }

    pub fn store(&self) -> &'a WeightStore {
        self.store
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn operator_mut(&mut self) -> &mut Operator {
        &mut self.operator
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        self.operator.candidate()
    }

    pub fn summary(&self) -> &CostSummary {
        self.objective.summary()
    }

    pub fn cost(&self) -> f64 {
        self.objective.cost()
    }

    pub fn rsize(&self) -> usize {
        self.partition.rsize()
    }

    pub fn lambda(&self) -> f64 {
        self.objective.lambda()
    }

    /// Score the current partition under another lambda from now on
    pub fn set_lambda(&mut self, lambda: f64) -> CostSummary {
        self.objective.set_lambda(lambda, &self.partition)
    }

    /// Aggregates of a snapshot's rectangles measured on this session's
    /// store, under this session's lambda. Nothing cached is touched.
    pub fn score(&self, partition: &PartitionSnapshot) -> CostSummary {
        self.objective.get_objective(&partition.rects, self.store)
    }

    // ========================================================================
    // (RE)INITIALIZATION
    // ========================================================================

    /// Recompute every cached cost field from the store
    pub fn initialize_objective(&mut self) -> Result<CostSummary> {
        self.objective.initialize(&mut self.partition, self.store)
    }

    /// Reset to the single full-grid rectangle and rescore
    pub fn macro_partition(&mut self) -> Result<CostSummary> {
        self.operator.clean_operator();
        self.partition.macro_partition();
        self.initialize_objective()
    }

    /// Reset to one rectangle per nonzero cell and rescore
    pub fn micro_partition(&mut self) -> Result<CostSummary> {
        self.operator.clean_operator();
        self.partition.micro_partition(self.store)?;
        self.initialize_objective()
    }

    pub fn reg_of_r(&mut self) {
        self.partition.reg_of_r();
    }

    pub fn build_r(&mut self) {
        self.partition.build_r();
    }

    pub fn clean_r(&mut self) {
        self.operator.clean_operator();
        self.partition.clean_r();
    }

    pub fn clean_registers(&mut self) {
        self.partition.clean_registers();
    }

    pub fn copy_partition(&self) -> Snapshot {
        Snapshot {
            partition: self.partition.copy_partition(),
            summary: *self.objective.summary(),
            lambda: self.objective.lambda(),
        }
    }

    /// Go back to a snapshot taken from a session over the same grid.
    ///
    /// The aggregates are re-summed from the rectangles' cached costs under
    /// this session's lambda and penalty factor. When those costs do not add
    /// up to the store's total weight the snapshot was scored against other
    /// data, and every rectangle is measured again.
    pub fn restore(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.operator.clean_operator();
        self.partition.restore(&snapshot.partition)?;
        let summary = self.objective.reset_summary(&self.partition);
        let total = self.store.total_weight();
        if (summary.weight - total).abs() > EPSILON * total.max(1.0) {
            debug!(
                "snapshot weight {} does not match store weight {total}, rescoring",
                summary.weight
            );
            self.initialize_objective()?;
        }
        Ok(())
    }

    // ========================================================================
    // EDITS
    // ========================================================================

    pub fn find_cluster(&mut self) -> bool {
        self.operator.find_cluster(&self.partition)
    }

    pub fn find_union_constrained(&mut self) -> bool {
        self.operator.find_union_constrained(&self.partition)
    }

    pub fn find_division(&mut self) -> bool {
        self.operator.find_division(&self.partition)
    }

    pub fn apply_cluster(&mut self, rect_box: &Rectangle) -> bool {
        self.operator.apply_cluster(&self.partition, rect_box)
    }

    pub fn delta_cost(&mut self) -> Result<Delta> {
        self.objective
            .delta_cost(&mut self.operator, &self.partition, self.store)
    }

    pub fn do_operation(&mut self) -> Result<Delta> {
        self.objective
            .do_operation(&mut self.operator, &mut self.partition)
    }

    pub fn cancel_operation(&mut self) {
        self.objective.cancel_operation(&mut self.operator);
    }

    pub fn clean_operator(&mut self) {
        self.operator.clean_operator();
    }

    /// Score and commit the in-flight candidate in one step
    pub fn commit(&mut self) -> Result<Delta> {
        if !self.operator.has_candidate() {
            return Err(Error::NoCandidate);
        }
        self.delta_cost()?;
        self.do_operation()
    }

    // ========================================================================
    // VERIFICATION
    // ========================================================================

    /// Run every structural and cost check
    pub fn verify(&mut self) -> Result<()> {
        checker::check_all(&self.partition, Some(self.store))?;
        checker::check_objective(&mut self.partition, &self.objective, self.store)?;
        Ok(())
    }
}
