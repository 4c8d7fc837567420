//! Populating weight stores: text readers and synthetic benchmark graphs.

use std::io::BufRead;

use log::debug;
use rand::Rng;
use rand_distr::{Beta, Distribution, Gamma, Poisson};

use super::WeightStore;
use crate::error::{Error, Result};
use crate::id::Index;

// ============================================================================
// READERS
// ============================================================================

/// Read a whitespace-separated dense matrix, one row per line.
///
/// Zero entries are skipped. The column count is the longest row; blank
/// lines are ignored.
pub fn from_dense_matrix<R: BufRead>(reader: R) -> Result<WeightStore> {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|token| {
                token.parse::<f64>().map_err(|e| Error::Parse {
                    line: lineno + 1,
                    message: format!("{token:?}: {e}"),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        rows.push(row);
    }
    let ncol = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut store = WeightStore::new(vec![rows.len(), ncol])?;
    for (i, row) in rows.iter().enumerate() {
        for (j, &value) in row.iter().enumerate() {
            store.insert(&[i, j], value)?;
        }
    }
    debug!(
        "read {}x{} matrix: E = {}, Ew = {}",
        rows.len(),
        ncol,
        store.edges(),
        store.total_weight()
    );
    Ok(store)
}

/// Build a store from `(tuple, weight)` hyperlinks; repeated tuples add up.
pub fn from_hyperlinks<I>(dims: Vec<usize>, links: I) -> Result<WeightStore>
where
    I: IntoIterator<Item = (Vec<Index>, f64)>,
{
    let mut store = WeightStore::new(dims)?;
    for (tuple, weight) in links {
        store.insert(&tuple, weight)?;
    }
    Ok(store)
}

/// Read hyperlinks, one per line: `i0 i1 … iD-1 weight`.
///
/// Blank lines and lines starting with `#` are skipped.
pub fn read_hyperlinks<R: BufRead>(reader: R, dims: Vec<usize>) -> Result<WeightStore> {
    let arity = dims.len();
    let mut store = WeightStore::new(dims)?;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parse_error = |message: String| Error::Parse {
            line: lineno + 1,
            message,
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != arity + 1 {
            return Err(parse_error(format!(
                "expected {} fields, found {}",
                arity + 1,
                tokens.len()
            )));
        }
        let tuple = tokens[..arity]
            .iter()
            .map(|t| t.parse::<Index>().map_err(|e| parse_error(format!("{t:?}: {e}"))))
            .collect::<Result<Vec<_>>>()?;
        let weight = tokens[arity]
            .parse::<f64>()
            .map_err(|e| parse_error(format!("{:?}: {e}", tokens[arity])))?;
        store.insert(&tuple, weight)?;
    }
    debug!("read hyperlinks: E = {}, Ew = {}", store.edges(), store.total_weight());
    Ok(store)
}

// ============================================================================
// BENCHMARK GRAPHS
// ============================================================================

const INCREMENTS: [f64; 4] = [0.0, 0.1, 0.3, 0.6];

/// 4×4 matrix whose row `i` is uniform with weight `1 + INCREMENTS[i]`
pub fn small_tester() -> Result<WeightStore> {
    let mut store = WeightStore::new(vec![4, 4])?;
    for (i, inc) in INCREMENTS.iter().enumerate() {
        for j in 0..4 {
            store.insert(&[i, j], 1.0 + inc)?;
        }
    }
    Ok(store)
}

/// Fill `rows × [x, x + widths[0]·n) …` with consecutive horizontal bands,
/// band `k` weighing `base + INCREMENTS[k]`.
fn horizontal_bands(
    store: &mut WeightStore,
    rows: std::ops::Range<usize>,
    start: usize,
    widths: &[usize],
    n: usize,
    base: f64,
) -> Result<()> {
    for i in rows {
        let mut x = start;
        for (k, &width) in widths.iter().enumerate() {
            for j in x..x + width * n {
                store.insert(&[i, j], base + INCREMENTS[k])?;
            }
            x += width * n;
        }
    }
    Ok(())
}

/// Dense `8n × 8n` multiscale benchmark: blocks of different sizes and
/// slightly different intensities, so that good partitions exist at
/// several values of lambda.
pub fn multiscale_complete(n: usize) -> Result<WeightStore> {
    if n == 0 {
        return Err(Error::InvalidArgument("scale must be positive".into()));
    }
    let mut store = WeightStore::new(vec![8 * n, 8 * n])?;
    horizontal_bands(&mut store, 0..4 * n, 0, &[1, 1, 2, 2], n, 1.0)?;

    let mut y = 0;
    for (k, &height) in [2, 2, 1, 1].iter().enumerate() {
        for i in y..y + height * n {
            for j in 6 * n..8 * n {
                store.insert(&[i, j], 2.0 + INCREMENTS[k])?;
            }
        }
        y += height * n;
    }

    horizontal_bands(&mut store, 6 * n..8 * n, 4 * n, &[1, 1, 1, 1], n, 3.0)?;
    horizontal_bands(&mut store, 4 * n..6 * n, 0, &[1, 1, 2, 2], n, 0.01)?;
    horizontal_bands(&mut store, 6 * n..8 * n, 0, &[1, 1, 2], n, 0.01)?;
    debug!(
        "multiscale complete benchmark n = {n}: E = {}, Ew = {}",
        store.edges(),
        store.total_weight()
    );
    Ok(store)
}

/// Sparse `8n × 8n` multiscale benchmark
pub fn multiscale_sparse(n: usize) -> Result<WeightStore> {
    if n == 0 {
        return Err(Error::InvalidArgument("scale must be positive".into()));
    }
    let mut store = WeightStore::new(vec![8 * n, 8 * n])?;
    horizontal_bands(&mut store, 0..2 * n, 0, &[1, 1, 1, 1], n, 1.0)?;

    for k in 0..4 {
        for i in k * n..(k + 1) * n {
            for j in 6 * n..8 * n {
                store.insert(&[i, j], 2.0 + INCREMENTS[k])?;
            }
        }
    }
    for i in 4 * n..5 * n {
        for j in 0..3 * n {
            store.insert(&[i, j], 3.0)?;
        }
    }
    for i in 6 * n..7 * n {
        for j in 2 * n..5 * n {
            store.insert(&[i, j], 4.0)?;
        }
    }
    Ok(store)
}

/// Stochastic block model of a social graph.
///
/// A Poisson number of communities is drawn. Each community picks its rows
/// and columns with Beta-distributed probabilities and a Gamma-distributed
/// intensity, and every cell it covers receives a Poisson count with that
/// intensity.
#[derive(Clone, Debug)]
pub struct SocialModel {
    /// Overall density; scales the expected number of communities
    pub w: f64,
    pub alpha1: f64,
    pub beta1: f64,
    pub alpha2: f64,
    pub beta2: f64,
    pub shape: f64,
    pub scale: f64,
}

impl Default for SocialModel {
    fn default() -> Self {
        Self {
            w: 1.0,
            alpha1: 1.0,
            beta1: 10.0,
            alpha2: 1.0,
            beta2: 10.0,
            shape: 2.0,
            scale: 2.0,
        }
    }
}

impl SocialModel {
    /// Expected number of communities
    pub fn rate(&self) -> f64 {
        self.w * (self.alpha1 + self.beta1) * (self.alpha2 + self.beta2)
            / (self.shape * self.scale * self.alpha1 * self.alpha2)
    }

    pub fn generate<R: Rng>(&self, dims: [usize; 2], rng: &mut R) -> Result<WeightStore> {
        let invalid = |e: String| Error::InvalidArgument(format!("social model: {e}"));
        let communities = Poisson::new(self.rate()).map_err(|e| invalid(e.to_string()))?;
        let rows = Beta::new(self.alpha1, self.beta1).map_err(|e| invalid(e.to_string()))?;
        let cols = Beta::new(self.alpha2, self.beta2).map_err(|e| invalid(e.to_string()))?;
        let intensity = Gamma::new(self.shape, self.scale).map_err(|e| invalid(e.to_string()))?;

        let mut store = WeightStore::new(dims.to_vec())?;
        let count = (communities.sample(rng) as usize).max(1);
        for _ in 0..count {
            let p1 = rows.sample(rng);
            let p2 = cols.sample(rng);
            let lambda = intensity.sample(rng);
            let Ok(cell_weight) = Poisson::new(lambda) else {
                continue;
            };
            let members: Vec<Index> = (0..dims[0]).filter(|_| rng.random::<f64>() < p1).collect();
            let columns: Vec<Index> = (0..dims[1]).filter(|_| rng.random::<f64>() < p2).collect();
            for &i in &members {
                for &j in &columns {
                    store.insert(&[i, j], cell_weight.sample(rng))?;
                }
            }
        }
        debug!(
            "social model: {count} communities, E = {}, Ew = {}",
            store.edges(),
            store.total_weight()
        );
        Ok(store)
    }
}
