use faer::Mat;

use crate::engine::DmdEngine;
use crate::history::History;
use crate::spectrum::{extract, predict, reduced_operator, truncated_svd};
use crate::types::{DmdError, ModeResiduals, Spectrum, TruncatedBasis};

/// Configuration for batch DMD.
#[derive(Debug, Clone, Default)]
pub struct BatchConfig {
    /// Truncation rank. None keeps every singular value; larger values are clamped.
    pub max_rank: Option<usize>,
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), DmdError> {
        if self.max_rank == Some(0) {
            return Err(DmdError::InvalidConfig("max_rank must be positive".into()));
        }
        Ok(())
    }
}

/// Dynamic Mode Decomposition over the full snapshot history.
///
/// Nothing is cached: every query recomputes the truncated SVD of the
/// stacked x-snapshots.
///
/// # Algorithm
/// 1. Truncated SVD: X ≈ U Σ Vᵀ
/// 2. Reduced operator: Ã = Uᵀ Y V Σ⁻¹
/// 3. Eigendecomposition: Ã W = W Λ
/// 4. Modes: Φ = U W
/// 5. Residuals: ‖Y V Σ⁻¹ wⱼ − U wⱼ λⱼ‖
#[derive(Debug, Clone)]
pub struct BatchDmd {
    config: BatchConfig,
    history: History,
}

impl BatchDmd {
    pub fn new(config: BatchConfig) -> Result<Self, DmdError> {
        config.validate()?;
        Ok(Self {
            config,
            history: History::unbounded(),
        })
    }

    /// Record one snapshot pair.
    pub fn update(&mut self, x: &[f64], y: &[f64]) -> Result<(), DmdError> {
        self.history.push(x.to_vec(), y.to_vec())?;
        Ok(())
    }

    /// Truncated SVD of the x-matrix as `(U, V·S⁻¹)`.
    pub fn basis(&self) -> Result<TruncatedBasis, DmdError> {
        truncated_svd(&self.history.x_matrix()?, self.config.max_rank)
    }

    /// Reduced operator Ã (r × r).
    pub fn operator(&self) -> Result<Mat<f64>, DmdError> {
        let basis = self.basis()?;
        Ok(reduced_operator(&basis, &self.history.y_matrix()?))
    }

    /// Eigenvalues and full-space modes of Ã.
    pub fn modes(&self) -> Result<Spectrum, DmdError> {
        Ok(self.residuals()?.spectrum)
    }

    /// Modes with their residuals, in eigensolver order.
    pub fn residuals(&self) -> Result<ModeResiduals, DmdError> {
        let basis = self.basis()?;
        extract(&basis, &self.history.y_matrix()?, None)
    }

    /// One-step prediction Y V Σ⁻¹ Uᵀ x.
    pub fn apply(&self, x: &[f64]) -> Result<Vec<f64>, DmdError> {
        self.check_query_vector(x)?;
        let basis = self.basis()?;
        Ok(predict(&basis, &self.history.y_matrix()?, x))
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    fn check_query_vector(&self, x: &[f64]) -> Result<(), DmdError> {
        match self.history.dim() {
            Some(n) if n != x.len() => Err(DmdError::InvalidInput(format!(
                "x has length {}, expected {n}",
                x.len()
            ))),
            _ => Ok(()),
        }
    }
}

impl DmdEngine for BatchDmd {
    fn update(&mut self, x: &[f64], y: &[f64]) -> Result<(), DmdError> {
        BatchDmd::update(self, x, y)
    }

    fn basis(&mut self) -> Result<TruncatedBasis, DmdError> {
        BatchDmd::basis(self)
    }

    fn operator(&mut self) -> Result<Mat<f64>, DmdError> {
        BatchDmd::operator(self)
    }

    fn modes(&mut self) -> Result<Spectrum, DmdError> {
        BatchDmd::modes(self)
    }

    fn residuals(&mut self) -> Result<ModeResiduals, DmdError> {
        BatchDmd::residuals(self)
    }

    fn apply(&mut self, x: &[f64]) -> Result<Vec<f64>, DmdError> {
        BatchDmd::apply(self, x)
    }

    fn len(&self) -> usize {
        BatchDmd::len(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn assert_near(a: f64, b: f64, eps: f64) {
        assert!(
            (a - b).abs() < eps,
            "expected {a} ≈ {b} (diff = {})",
            (a - b).abs()
        );
    }

    /// Two sinusoids sampled along one trajectory, as (x, y) pairs.
    fn make_oscillatory_pairs(n_pairs: usize) -> Vec<(Vec<f64>, Vec<f64>)> {
        let dt = 0.1;
        let state = |t: usize| {
            let time = t as f64 * dt;
            vec![(2.0 * PI * 0.5 * time).cos(), (2.0 * PI * 0.5 * time).sin()]
        };
        (0..n_pairs).map(|t| (state(t), state(t + 1))).collect()
    }

    fn fitted(config: BatchConfig, n_pairs: usize) -> BatchDmd {
        let mut dmd = BatchDmd::new(config).unwrap();
        for (x, y) in make_oscillatory_pairs(n_pairs) {
            dmd.update(&x, &y).unwrap();
        }
        dmd
    }

    #[test]
    fn test_dmd_basic() {
        let dmd = fitted(BatchConfig::default(), 50);
        assert_eq!(dmd.len(), 50);
        let spectrum = dmd.modes().unwrap();
        assert_eq!(spectrum.len(), 2);
        assert_eq!(spectrum.dim(), 2);
    }

    #[test]
    fn test_dmd_eigenvalue_magnitude() {
        let dmd = fitted(BatchConfig::default(), 100);
        for ev in &dmd.modes().unwrap().eigenvalues {
            assert_near(ev.norm(), 1.0, 1e-8);
            assert_near(ev.arg().abs(), 2.0 * PI * 0.5 * 0.1, 1e-8);
        }
    }

    #[test]
    fn test_dmd_explicit_rank() {
        let dmd = fitted(
            BatchConfig {
                max_rank: Some(1),
            },
            20,
        );
        assert_eq!(dmd.basis().unwrap().rank(), 1);
        assert_eq!(dmd.operator().unwrap().nrows(), 1);
    }

    #[test]
    fn test_dmd_exact_fit() {
        let pairs = make_oscillatory_pairs(10);
        let dmd = fitted(BatchConfig { max_rank: Some(2) }, 10);
        for (x, y) in &pairs {
            let pred = dmd.apply(x).unwrap();
            for i in 0..2 {
                assert_near(pred[i], y[i], 1e-10);
            }
        }
    }

    #[test]
    fn test_dmd_residuals_small_for_linear_system() {
        let dmd = fitted(BatchConfig::default(), 30);
        let res = dmd.residuals().unwrap();
        assert_eq!(res.residuals.len(), 2);
        for r in &res.residuals {
            assert!(*r < 1e-8);
        }
    }

    #[test]
    fn test_dmd_query_before_update() {
        let dmd = BatchDmd::new(BatchConfig::default()).unwrap();
        assert!(matches!(dmd.modes(), Err(DmdError::InsufficientData(_))));
        assert!(matches!(dmd.apply(&[1.0]), Err(DmdError::InsufficientData(_))));
    }

    #[test]
    fn test_dmd_zero_rank_rejected() {
        assert!(BatchDmd::new(BatchConfig { max_rank: Some(0) }).is_err());
    }
}
