//! Configuration for the operator, the objective and the search loops.

/// Parameters of the box-proposal strategies
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Per-dimension Bernoulli inclusion probability used by `find_cluster`.
    /// Dimensions past the end of the vector use the last value (or 0.5 if empty).
    pub cluster_p: Vec<f64>,
    /// Probability of keeping each component element in `find_division`
    pub division_p: f64,
    /// Fixed rng seed. `None` seeds from the operating system.
    pub seed: Option<u64>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            cluster_p: vec![0.5; 5],
            division_p: 0.5,
            seed: None,
        }
    }
}

impl OperatorConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_cluster_p(mut self, cluster_p: Vec<f64>) -> Self {
        self.cluster_p = cluster_p.into_iter().map(|p| p.clamp(0.0, 1.0)).collect();
        self
    }

    pub fn with_division_p(mut self, division_p: f64) -> Self {
        self.division_p = division_p.clamp(0.0, 1.0);
        self
    }

    /// Inclusion probability for dimension `dim`
    pub fn cluster_p(&self, dim: usize) -> f64 {
        self.cluster_p
            .get(dim)
            .or_else(|| self.cluster_p.last())
            .copied()
            .unwrap_or(0.5)
            .clamp(0.0, 1.0)
    }
}

/// Weights of the two cost components
#[derive(Clone, Debug)]
pub struct ObjectiveConfig {
    /// Trade-off between fidelity and model size. The dkl sum is scaled by `lambda / Ew`.
    pub lambda: f64,
    /// Cost of one rectangle
    pub penalty_factor: f64,
}

impl Default for ObjectiveConfig {
    fn default() -> Self {
        Self {
            lambda: 1.0,
            penalty_factor: 1.0,
        }
    }
}

impl ObjectiveConfig {
    pub fn new(lambda: f64) -> Self {
        Self {
            lambda,
            ..Self::default()
        }
    }

    pub fn with_penalty_factor(mut self, penalty_factor: f64) -> Self {
        self.penalty_factor = penalty_factor;
        self
    }
}

/// Limits of the outer search loops
#[derive(Clone, Debug)]
pub struct OptimizerConfig {
    /// Consecutive rejected or degenerate proposals before a descent stops
    pub nfail_limit: usize,
    /// Divisions per cycle after an improving cycle
    pub ndiv_start: usize,
    /// Extra divisions added after each non-improving cycle
    pub ndiv_increm: usize,
    /// Number of divide/descend cycles in the mix program
    pub ncycle: usize,
    /// Restarts of the optimization program at one lambda
    pub nsearch: usize,
    /// Lambda scanned first by the dichotomic search, with the macro partition
    pub lambda_low: f64,
    /// Lambda scanned second, with the micro partition
    pub lambda_high: f64,
    /// Two neighbouring lambdas closer than this are not bisected further
    pub lambda_gap: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            nfail_limit: 200,
            ndiv_start: 10,
            ndiv_increm: 5,
            ncycle: 10,
            nsearch: 3,
            lambda_low: 0.0,
            lambda_high: 100.0,
            lambda_gap: 1.0,
        }
    }
}

impl OptimizerConfig {
    pub fn with_nfail_limit(mut self, nfail_limit: usize) -> Self {
        self.nfail_limit = nfail_limit;
        self
    }

    pub fn with_divisions(mut self, ndiv_start: usize, ndiv_increm: usize) -> Self {
        self.ndiv_start = ndiv_start;
        self.ndiv_increm = ndiv_increm;
        self
    }

    pub fn with_ncycle(mut self, ncycle: usize) -> Self {
        self.ncycle = ncycle;
        self
    }

    pub fn with_nsearch(mut self, nsearch: usize) -> Self {
        self.nsearch = nsearch;
        self
    }

    pub fn with_lambda_search(mut self, low: f64, high: f64, gap: f64) -> Self {
        self.lambda_low = low;
        self.lambda_high = high;
        self.lambda_gap = gap;
        self
    }
}
