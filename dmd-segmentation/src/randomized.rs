//! Randomized (compressed) DMD.
//!
//! An online range-finder accumulates a random sketch Ω of the snapshot
//! range while pairs arrive. On first decomposition use Ω is orthonormalized
//! into `Q` and the history is replaced by its coordinates `Qᵀx`, `Qᵀy`;
//! from then on the batch algorithm runs in dimension `rank + oversampling`
//! instead of `n`.

use faer::Mat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::engine::DmdEngine;
use crate::history::{History, SnapshotPair};
use crate::qr::{reorthogonalize, DEPENDENCE_TOL};
use crate::spectrum::{extract, predict, reduced_operator, truncated_svd};
use crate::types::{DmdError, ModeResiduals, Spectrum, TruncatedBasis};
use crate::utils::{column, mat_t_vec, mat_vec, norm, validate_vector};

/// Configuration for randomized DMD.
#[derive(Debug, Clone)]
pub struct RandomizedConfig {
    /// Truncation rank used in the compressed space.
    pub random_rank: usize,
    /// Extra sketch columns beyond `random_rank`.
    pub oversampling: usize,
    /// Gram-Schmidt passes per sketch column.
    pub num_reorth: usize,
    /// RNG seed. None draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for RandomizedConfig {
    fn default() -> Self {
        Self {
            random_rank: 10,
            oversampling: 5,
            num_reorth: 3,
            seed: None,
        }
    }
}

impl RandomizedConfig {
    /// Number of sketch columns, `random_rank + oversampling`.
    pub fn total_rank(&self) -> usize {
        self.random_rank + self.oversampling
    }

    pub fn validate(&self) -> Result<(), DmdError> {
        if self.random_rank == 0 {
            return Err(DmdError::InvalidConfig(
                "random_rank must be positive".into(),
            ));
        }
        if self.num_reorth == 0 {
            return Err(DmdError::InvalidConfig(
                "num_reorth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// DMD on a randomly compressed copy of the history.
///
/// Pairs recorded after compression are projected through `Q` immediately,
/// so the history always holds a single coordinate system.
#[derive(Debug, Clone)]
pub struct RandomizedDmd {
    config: RandomizedConfig,
    history: History,
    sketch: Option<Mat<f64>>,
    q: Option<Mat<f64>>,
    full_dim: Option<usize>,
    rng: StdRng,
}

impl RandomizedDmd {
    pub fn new(config: RandomizedConfig) -> Result<Self, DmdError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            config,
            history: History::unbounded(),
            sketch: None,
            q: None,
            full_dim: None,
            rng,
        })
    }

    /// Record one pair and fold `y` into the sketch.
    pub fn update(&mut self, x: &[f64], y: &[f64]) -> Result<(), DmdError> {
        if let Some(q) = &self.q {
            validate_vector(x, self.full_dim, "x")?;
            validate_vector(y, self.full_dim, "y")?;
            self.history.push(project(q, x, "x")?, project(q, y, "y")?)?;
            return Ok(());
        }

        self.history.push(x.to_vec(), y.to_vec())?;
        self.full_dim = Some(x.len());
        let omega = self.draw();
        let sketch = self
            .sketch
            .get_or_insert_with(|| Mat::<f64>::zeros(x.len(), omega.len()));
        add_outer(sketch, y, &omega);
        Ok(())
    }

    /// Orthonormalize the sketch and project the history onto it.
    ///
    /// Runs once; later calls are no-ops. Called implicitly by every query.
    pub fn compress(&mut self) -> Result<(), DmdError> {
        if self.q.is_some() {
            return Ok(());
        }
        let (Some(first), Some(sketch)) = (self.history.iter().next(), &self.sketch) else {
            return Err(DmdError::InsufficientData(
                "cannot compress before any update".into(),
            ));
        };

        // The sketch has seen every y; the first x completes the trajectory.
        let first_x = first.x.clone();
        let mut finalized = sketch.clone();
        let omega = self.draw();
        add_outer(&mut finalized, &first_x, &omega);

        let q = orthonormalize(&finalized, self.config.num_reorth)?;
        let compressed_dim = q.ncols();
        tracing::debug!(
            full_dim = finalized.nrows(),
            sketch_cols = finalized.ncols(),
            compressed_dim,
            pairs = self.history.len(),
            "compressed history"
        );

        self.history.transform(compressed_dim, |pair| SnapshotPair {
            x: mat_t_vec(&q, &pair.x),
            y: mat_t_vec(&q, &pair.y),
        });
        self.q = Some(q);
        self.sketch = None;
        Ok(())
    }

    /// Truncated SVD of the compressed x-matrix, rank `random_rank`.
    pub fn basis(&mut self) -> Result<TruncatedBasis, DmdError> {
        self.compress()?;
        truncated_svd(&self.history.x_matrix()?, Some(self.config.random_rank))
    }

    /// Reduced operator Ã in compressed coordinates.
    pub fn operator(&mut self) -> Result<Mat<f64>, DmdError> {
        let basis = self.basis()?;
        Ok(reduced_operator(&basis, &self.history.y_matrix()?))
    }

    /// Eigenvalues with modes lifted back through `Q`.
    pub fn modes(&mut self) -> Result<Spectrum, DmdError> {
        Ok(self.residuals()?.spectrum)
    }

    /// Residuals computed in compressed coordinates; `Q` is orthonormal so
    /// they equal their full-space values.
    pub fn residuals(&mut self) -> Result<ModeResiduals, DmdError> {
        let basis = self.basis()?;
        let y = self.history.y_matrix()?;
        extract(&basis, &y, self.q.as_ref())
    }

    /// One-step prediction Q · Y' V Σ⁻¹ Uᵀ · Qᵀx.
    pub fn apply(&mut self, x: &[f64]) -> Result<Vec<f64>, DmdError> {
        let basis = self.basis()?;
        let q = self.q.as_ref().ok_or_else(|| {
            DmdError::InsufficientData("history has not been compressed".into())
        })?;
        if x.len() != q.nrows() {
            return Err(DmdError::InvalidInput(format!(
                "x has length {}, expected {}",
                x.len(),
                q.nrows()
            )));
        }
        let pred = predict(&basis, &self.history.y_matrix()?, &mat_t_vec(q, x));
        Ok(mat_vec(q, &pred))
    }

    /// Orthonormal compression basis `Q` (n × k), once built.
    pub fn compressed_basis(&self) -> Option<&Mat<f64>> {
        self.q.as_ref()
    }

    /// Recorded pairs; in compressed coordinates once `Q` exists.
    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn is_compressed(&self) -> bool {
        self.q.is_some()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    fn draw(&mut self) -> Vec<f64> {
        (0..self.config.total_rank())
            .map(|_| self.rng.sample::<f64, _>(StandardNormal))
            .collect()
    }
}

impl DmdEngine for RandomizedDmd {
    fn update(&mut self, x: &[f64], y: &[f64]) -> Result<(), DmdError> {
        RandomizedDmd::update(self, x, y)
    }

    fn basis(&mut self) -> Result<TruncatedBasis, DmdError> {
        RandomizedDmd::basis(self)
    }

    fn operator(&mut self) -> Result<Mat<f64>, DmdError> {
        RandomizedDmd::operator(self)
    }

    fn modes(&mut self) -> Result<Spectrum, DmdError> {
        RandomizedDmd::modes(self)
    }

    fn residuals(&mut self) -> Result<ModeResiduals, DmdError> {
        RandomizedDmd::residuals(self)
    }

    fn apply(&mut self, x: &[f64]) -> Result<Vec<f64>, DmdError> {
        RandomizedDmd::apply(self, x)
    }

    fn len(&self) -> usize {
        RandomizedDmd::len(self)
    }
}

/// sketch += v · ωᵀ
/// Qᵀv, rejecting vectors with no component inside `span(Q)`.
fn project(q: &Mat<f64>, v: &[f64], name: &str) -> Result<Vec<f64>, DmdError> {
    let coords = mat_t_vec(q, v);
    if norm(&coords) <= DEPENDENCE_TOL * norm(v) {
        return Err(DmdError::InvalidInput(format!(
            "{name} lies outside the compressed subspace"
        )));
    }
    Ok(coords)
}

fn add_outer(sketch: &mut Mat<f64>, v: &[f64], omega: &[f64]) {
    for (j, &w) in omega.iter().enumerate() {
        for (i, &vi) in v.iter().enumerate() {
            sketch[(i, j)] += vi * w;
        }
    }
}

/// Orthonormal basis for the columns of `sketch`, one column at a time.
///
/// Each column gets `num_reorth` modified Gram-Schmidt passes against the
/// columns accepted so far. Columns left with a near-zero residual add no
/// new direction and are skipped.
pub fn orthonormalize(sketch: &Mat<f64>, num_reorth: usize) -> Result<Mat<f64>, DmdError> {
    let (n, cols) = (sketch.nrows(), sketch.ncols());
    let mut q = Mat::<f64>::zeros(n, cols.min(n));
    let mut k = 0;

    for j in 0..cols {
        if k == q.ncols() {
            break;
        }
        let mut v = column(sketch, j);
        let original = norm(&v);
        reorthogonalize(&q, k, &mut v, num_reorth);
        let nv = norm(&v);
        if original == 0.0 || nv <= DEPENDENCE_TOL * original {
            tracing::debug!(column = j, residual = nv, "skipping dependent sketch column");
            continue;
        }
        for (i, val) in v.iter().enumerate() {
            q[(i, k)] = val / nv;
        }
        k += 1;
    }

    if k == 0 {
        return Err(DmdError::NumericalInstability(
            "random sketch has no numerically independent column".into(),
        ));
    }
    Ok(q.subcols(0, k).to_owned())
}
