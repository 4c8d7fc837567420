//! Outer search loops driving a [`Session`].
//!
//! All loops are greedy and randomized: a proposal is scored, committed if
//! it lowers the cost, cancelled otherwise. None of them claims to reach a
//! global optimum.

use log::{debug, info};

use crate::config::OptimizerConfig;
use crate::error::{Error, Result};
use crate::operator::Operator;
use crate::partition::Partition;
use crate::session::{Session, Snapshot};

/// Which proposal strategy a descent uses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Proposal {
    Cluster,
    Union,
    Division,
}

/// Counters of one search run
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OptimizerReport {
    /// Proposals drawn
    pub iterations: usize,
    /// Proposals that produced a usable candidate
    pub found: usize,
    /// Candidates committed
    pub accepted: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub final_rsize: usize,
}

impl OptimizerReport {
    fn start(session: &Session<'_>) -> Self {
        Self {
            initial_cost: session.cost(),
            final_cost: session.cost(),
            final_rsize: session.rsize(),
            ..Self::default()
        }
    }

    fn finish(mut self, session: &Session<'_>) -> Self {
        self.final_cost = session.cost();
        self.final_rsize = session.rsize();
        self
    }

    fn absorb(&mut self, other: &OptimizerReport) {
        self.iterations += other.iterations;
        self.found += other.found;
        self.accepted += other.accepted;
        self.final_cost = other.final_cost;
        self.final_rsize = other.final_rsize;
    }
}

fn propose(session: &mut Session<'_>, proposal: Proposal) -> bool {
    match proposal {
        Proposal::Cluster => session.find_cluster(),
        Proposal::Union => session.find_union_constrained(),
        Proposal::Division => session.find_division(),
    }
}

#[derive(Clone, Debug)]
pub struct Optimizer {
    config: OptimizerConfig,
    ndiv_limit: usize,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            ndiv_limit: config.ndiv_start,
            config,
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Divisions the next `divide_random` will attempt
    pub fn ndiv_limit(&self) -> usize {
        self.ndiv_limit
    }

    /// Greedy descent: commit a proposal iff it strictly lowers the cost.
    ///
    /// Stops after `nfail_limit` consecutive failures (degenerate draws and
    /// rejected candidates alike) or when a single rectangle is left.
    pub fn gradient_descent(&mut self, session: &mut Session<'_>, proposal: Proposal) -> Result<OptimizerReport> {
        let mut report = OptimizerReport::start(session);
        let mut nfail = 0;
        while nfail < self.config.nfail_limit && session.rsize() > 1 {
            report.iterations += 1;
            if !propose(session, proposal) {
                session.clean_operator();
                nfail += 1;
                continue;
            }
            report.found += 1;
            let delta = session.delta_cost()?;
            if delta.d_cost < 0.0 {
                session.do_operation()?;
                report.accepted += 1;
                nfail = 0;
            } else {
                session.cancel_operation();
                nfail += 1;
            }
        }
        let report = report.finish(session);
        debug!(
            "{proposal:?} descent: {} iterations, {} accepted, cost {} -> {}",
            report.iterations, report.accepted, report.initial_cost, report.final_cost
        );
        Ok(report)
    }

    pub fn gradient_descent_cluster(&mut self, session: &mut Session<'_>) -> Result<OptimizerReport> {
        self.gradient_descent(session, Proposal::Cluster)
    }

    pub fn gradient_descent_union(&mut self, session: &mut Session<'_>) -> Result<OptimizerReport> {
        self.gradient_descent(session, Proposal::Union)
    }

    /// Commit `ndiv_limit` random divisions unconditionally
    pub fn divide_random(&mut self, session: &mut Session<'_>) -> Result<OptimizerReport> {
        let mut report = OptimizerReport::start(session);
        for _ in 0..self.ndiv_limit {
            report.iterations += 1;
            if session.find_division() {
                report.found += 1;
                session.delta_cost()?;
                session.do_operation()?;
                report.accepted += 1;
            } else {
                session.clean_operator();
            }
        }
        Ok(report.finish(session))
    }

    /// Union descent, then `ncycle` rounds of random division followed by
    /// union descent. A round that beats the best cost so far becomes the
    /// new best and resets the division count; any other round is rolled
    /// back to the best and widens the next division phase.
    ///
    /// The session is left on the best partition found.
    pub fn mix_program(&mut self, session: &mut Session<'_>) -> Result<OptimizerReport> {
        let mut report = OptimizerReport::start(session);
        report.absorb(&self.gradient_descent_union(session)?);
        let mut best = session.copy_partition();
        self.ndiv_limit = self.config.ndiv_start;

        for cycle in 0..self.config.ncycle {
            report.absorb(&self.divide_random(session)?);
            report.absorb(&self.gradient_descent_union(session)?);

            if session.cost() < best.summary.cost {
                best = session.copy_partition();
                self.ndiv_limit = self.config.ndiv_start;
            } else {
                session.restore(&best)?;
                self.ndiv_limit += self.config.ndiv_increm;
            }
            info!(
                "mix cycle {cycle}: best cost {}, Rsize {}, next divisions {}",
                best.summary.cost,
                best.partition.len(),
                self.ndiv_limit
            );
        }
        Ok(report.finish(session))
    }

    // ========================================================================
    // LAMBDA SEARCH
    // ========================================================================

    /// `nsearch` restarts from the micro partition, each followed by the mix
    /// program, at the session's current lambda. The session is left on the
    /// cheapest result, which is also returned.
    pub fn optimization_program(&mut self, session: &mut Session<'_>) -> Result<Snapshot> {
        session.micro_partition()?;
        self.mix_program(session)?;
        let mut best = session.copy_partition();
        for search in 1..self.config.nsearch {
            session.micro_partition()?;
            self.mix_program(session)?;
            if session.cost() < best.summary.cost {
                best = session.copy_partition();
            }
            debug!(
                "search {search} at lambda {}: cost {}, best {}",
                session.lambda(),
                session.cost(),
                best.summary.cost
            );
        }
        session.restore(&best)?;
        Ok(best)
    }

    /// Trace the trade-off curve between fidelity and size.
    ///
    /// Starts from the macro partition at `lambda_low` and the micro
    /// partition at `lambda_high`, then repeatedly bisects two neighbouring
    /// lambdas whose partitions differ and lie more than `lambda_gap` apart,
    /// running [`Optimizer::optimization_program`] at the midpoint. A new
    /// point takes a neighbour's partition when that one is cheaper at the
    /// new lambda, and hands its own partition to a neighbour that it beats
    /// at the neighbour's lambda. The points are finally passed through
    /// [`Optimizer::make_homogeneous`].
    ///
    /// Returns one snapshot per explored lambda, in increasing lambda order.
    /// The session's partition and lambda are scratch state afterwards.
    pub fn dichotomic_search(&mut self, session: &mut Session<'_>) -> Result<Vec<Snapshot>> {
        let (low, high, gap) = (
            self.config.lambda_low,
            self.config.lambda_high,
            self.config.lambda_gap,
        );
        if !(low.is_finite() && high.is_finite() && low >= 0.0 && low < high) {
            return Err(Error::InvalidArgument(format!(
                "lambda search needs 0 <= low < high, got [{low}, {high}]"
            )));
        }
        if !(gap.is_finite() && gap > 0.0) {
            return Err(Error::InvalidArgument(format!("lambda gap must be positive, got {gap}")));
        }

        session.set_lambda(low);
        session.macro_partition()?;
        let mut explored = vec![session.copy_partition()];
        session.set_lambda(high);
        session.micro_partition()?;
        explored.push(session.copy_partition());

        let mut pos = 0;
        while pos + 1 < explored.len() {
            let (lower, upper) = (&explored[pos], &explored[pos + 1]);
            let width = upper.lambda - lower.lambda;
            if width <= gap || lower.partition.same_rectangles(&upper.partition) {
                pos += 1;
                continue;
            }
            let lambda = lower.lambda + width / 2.0;
            session.set_lambda(lambda);
            let mut trial = self.optimization_program(session)?;

            for neighbour in [pos, pos + 1] {
                let rival = rescored(session, &explored[neighbour]);
                if rival.summary.cost < trial.summary.cost {
                    trial = rival;
                }
            }
            for neighbour in [pos, pos + 1] {
                session.set_lambda(explored[neighbour].lambda);
                let challenger = rescored(session, &trial);
                if challenger.summary.cost <= explored[neighbour].summary.cost
                    && !challenger.partition.same_rectangles(&explored[neighbour].partition)
                {
                    explored[neighbour] = challenger;
                }
            }
            info!(
                "lambda {lambda}: cost {}, Rsize {}",
                trial.summary.cost,
                trial.partition.len()
            );
            explored.insert(pos + 1, trial);
        }

        self.make_homogeneous(session, &mut explored);
        Ok(explored)
    }

    /// Give every point the cheapest partition among its own and its
    /// neighbours', all scored from the store at the point's lambda.
    /// Repeats until no point changes, so every point is at least as cheap
    /// as both neighbours' partitions at its own lambda.
    ///
    /// Returns the number of replacements.
    pub fn make_homogeneous(&self, session: &mut Session<'_>, points: &mut [Snapshot]) -> usize {
        for point in points.iter_mut() {
            session.set_lambda(point.lambda);
            point.summary = session.score(&point.partition);
        }
        let mut swaps = 0;
        loop {
            let mut changed = false;
            for i in 0..points.len() {
                session.set_lambda(points[i].lambda);
                let neighbours = [i.checked_sub(1), (i + 1 < points.len()).then_some(i + 1)];
                for j in neighbours.into_iter().flatten() {
                    if points[j].partition.same_rectangles(&points[i].partition) {
                        continue;
                    }
                    let rival = rescored(session, &points[j]);
                    if rival.summary.cost < points[i].summary.cost {
                        points[i] = rival;
                        changed = true;
                        swaps += 1;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        debug!("homogenized {} points with {swaps} replacements", points.len());
        swaps
    }
}

/// `snapshot`'s rectangles scored from the store at the session's lambda
fn rescored(session: &Session<'_>, snapshot: &Snapshot) -> Snapshot {
    Snapshot {
        summary: session.score(&snapshot.partition),
        partition: snapshot.partition.clone(),
        lambda: session.lambda(),
    }
}

/// Commit `n` random cluster proposals geometrically, without scoring.
/// Returns the number of commits.
pub fn shuffle_partition(partition: &mut Partition, operator: &mut Operator, n: usize) -> Result<usize> {
    let mut commits = 0;
    for _ in 0..n {
        if operator.find_cluster(partition) {
            operator.do_cluster(partition)?;
            commits += 1;
        } else {
            operator.clean_operator();
        }
    }
    debug!("shuffled partition: {commits} commits, Rsize {}", partition.rsize());
    Ok(commits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker;
    use crate::config::{ObjectiveConfig, OperatorConfig};
    use crate::store::WeightStore;

    fn block_store() -> WeightStore {
        // two dense blocks on the diagonal
        let mut store = WeightStore::new(vec![6, 6]).unwrap();
        for i in 0..6 {
            for j in 0..6 {
                if (i < 3) == (j < 3) {
                    store.insert(&[i, j], if i < 3 { 2.0 } else { 5.0 }).unwrap();
                }
            }
        }
        store
    }

    #[test]
    fn test_descent_never_raises_cost() {
        let store = block_store();
        let mut session = Session::new(
            &store,
            OperatorConfig::default().with_seed(5),
            ObjectiveConfig::new(10.0),
        )
        .unwrap();
        session.micro_partition().unwrap();
        let mut optimizer = Optimizer::new(OptimizerConfig::default().with_nfail_limit(100));
        let report = optimizer.gradient_descent_union(&mut session).unwrap();
        assert!(report.final_cost <= report.initial_cost);
        assert!(report.accepted > 0);
        session.verify().unwrap();
    }

    #[test]
    fn test_shuffle_keeps_partition_valid() {
        let mut partition = Partition::new(vec![5, 4]).unwrap();
        partition.macro_partition();
        let mut operator =
            Operator::for_partition(&partition, OperatorConfig::default().with_seed(9)).unwrap();
        let commits = shuffle_partition(&mut partition, &mut operator, 30).unwrap();
        assert!(commits > 0);
        assert_eq!(checker::check_all(&partition, None), Ok(()));
    }
}
