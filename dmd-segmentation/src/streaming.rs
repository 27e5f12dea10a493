//! Streaming DMD over an incrementally maintained QR factorization.
//!
//! The factorization stores each snapshot of the trajectory once:
//! `Q·R = [x₀ x₁ … x_{w-2} | y_latest]`, so `R[:, :-1]` holds the x-block and
//! `R[:, 1:]` the y-block in the `k`-dimensional coordinates of `Q`. All
//! decomposition work happens on `R`, independent of the state dimension.
//!
//! ```text
//! EMPTY ──update──▶ STEADY ──update──▶ STEADY
//!                     │  ▲
//!            adaptive │  │ oldest columns
//!            trigger  ▼  │ deleted
//!                     RESET
//! ```

use faer::Mat;

use crate::engine::DmdEngine;
use crate::history::{Capacity, History};
use crate::qr::IncrementalQr;
use crate::reconstruct::{reconstruct, Reconstruction};
use crate::spectrum::{extract, predict, reduced_operator, truncated_svd};
use crate::types::{DmdError, ModeResiduals, Spectrum, TruncatedBasis};
use crate::utils::{mat_t_vec, mat_vec, norm, relative_error};

/// Relative distance allowed between a new `x` and the previous `y`.
const CONTIGUITY_TOL: f64 = 1e-10;

/// Forgetting rule for detected changes in dynamics.
///
/// When the one-step relative prediction error exceeds `reset_tol` times the
/// previous update's error, the oldest `floor(width / reset_ratio)` columns
/// are dropped from the factorization. An update whose prediction cannot be
/// formed because the x-block is rank deficient also triggers a reset.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveReset {
    /// Fraction divisor of the window dropped on reset; must exceed 1.
    pub reset_ratio: f64,
    /// Error growth factor that triggers a reset.
    pub reset_tol: f64,
}

/// Configuration for streaming DMD.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Sliding-window length. None keeps the whole stream.
    pub max_hist: Option<usize>,
    /// Truncation rank. None keeps every singular value.
    pub max_rank: Option<usize>,
    /// Adaptive reset. None disables it.
    pub adaptive: Option<AdaptiveReset>,
    /// Gram-Schmidt passes per appended column.
    pub num_reorth: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            max_hist: None,
            max_rank: None,
            adaptive: None,
            num_reorth: 3,
        }
    }
}

impl StreamingConfig {
    pub fn validate(&self) -> Result<(), DmdError> {
        if matches!(self.max_hist, Some(h) if h < 2) {
            return Err(DmdError::InvalidConfig(
                "max_hist must be at least 2".into(),
            ));
        }
        if self.max_rank == Some(0) {
            return Err(DmdError::InvalidConfig("max_rank must be positive".into()));
        }
        if self.num_reorth == 0 {
            return Err(DmdError::InvalidConfig(
                "num_reorth must be at least 1".into(),
            ));
        }
        if let Some(adaptive) = &self.adaptive {
            if !(adaptive.reset_ratio > 1.0 && adaptive.reset_ratio.is_finite()) {
                return Err(DmdError::InvalidConfig(format!(
                    "reset_ratio must be a finite value above 1, got {}",
                    adaptive.reset_ratio
                )));
            }
            if !(adaptive.reset_tol > 0.0) {
                return Err(DmdError::InvalidConfig(format!(
                    "reset_tol must be positive, got {}",
                    adaptive.reset_tol
                )));
            }
        }
        Ok(())
    }
}

/// DMD over a stream of snapshots with bounded memory.
///
/// Updates must follow one trajectory: every `x` after the first equals the
/// previous `y`. A failed update leaves the engine unchanged.
#[derive(Debug, Clone)]
pub struct StreamingDmd {
    config: StreamingConfig,
    history: History,
    factors: Option<IncrementalQr>,
    last_error: f64,
    resets: usize,
}

impl StreamingDmd {
    pub fn new(config: StreamingConfig) -> Result<Self, DmdError> {
        config.validate()?;
        let capacity = match config.max_hist {
            Some(h) => Capacity::Bounded(h),
            None => Capacity::Unbounded,
        };
        Ok(Self {
            config,
            history: History::new(capacity),
            factors: None,
            last_error: f64::INFINITY,
            resets: 0,
        })
    }

    /// Record one pair and extend the factorization by `y`.
    pub fn update(&mut self, x: &[f64], y: &[f64]) -> Result<(), DmdError> {
        self.history.check(x, y)?;
        let num_reorth = self.config.num_reorth;

        let (mut factors, last_error, reset) = match &self.factors {
            None => (
                IncrementalQr::from_pair(x, y, num_reorth)?,
                self.last_error,
                false,
            ),
            Some(current) => {
                self.check_contiguous(x)?;
                let (shrunk, last_error) = self.adapt(current, x, y)?;
                let base = shrunk.as_ref().unwrap_or(current);
                (base.appended(y, num_reorth).0, last_error, shrunk.is_some())
            }
        };

        if let Some(max_hist) = self.config.max_hist {
            if factors.width() > max_hist {
                factors = factors.without_leading(factors.width() - max_hist)?;
            }
        }

        if self.history.push(x.to_vec(), y.to_vec())?.is_some() {
            tracing::trace!(len = self.history.len(), "evicted oldest pair");
        }
        self.factors = Some(factors);
        self.last_error = last_error;
        self.resets += usize::from(reset);
        Ok(())
    }

    /// Adaptive check: the factorization to append to if a reset fired, and
    /// the new reference error.
    fn adapt(
        &self,
        current: &IncrementalQr,
        x: &[f64],
        y: &[f64],
    ) -> Result<(Option<IncrementalQr>, f64), DmdError> {
        let Some(adaptive) = self.config.adaptive else {
            return Ok((None, self.last_error));
        };

        let measured = self.measured_error(current, x, y)?;
        let threshold = adaptive.reset_tol * self.last_error;
        let error = match measured {
            Some(error) if error <= threshold => return Ok((None, error)),
            Some(error) => error,
            // A rank-deficient x-block cannot predict; treat it as a change.
            None => f64::INFINITY,
        };

        let width = current.width();
        let drop = (width as f64 / adaptive.reset_ratio).floor() as usize;
        if drop == 0 {
            tracing::debug!(
                width,
                error,
                threshold,
                "reset triggered on a window too short to shrink"
            );
            return Ok((None, error));
        }
        tracing::info!(
            width,
            error,
            threshold,
            reset_tol = adaptive.reset_tol,
            last_error = self.last_error,
            measurable = measured.is_some(),
            drop,
            "RESET: prediction error exceeds threshold"
        );
        let shrunk = current.without_leading(drop)?;
        // The prediction must be recomputed: the operator changed with the window.
        let error = self
            .measured_error(&shrunk, x, y)?
            .unwrap_or(f64::INFINITY);
        Ok((Some(shrunk), error))
    }

    /// Prediction error, or None when the x-block is numerically rank
    /// deficient and the operator cannot be formed.
    fn measured_error(
        &self,
        factors: &IncrementalQr,
        x: &[f64],
        y: &[f64],
    ) -> Result<Option<f64>, DmdError> {
        match self.prediction_error(factors, x, y) {
            Ok(error) => Ok(Some(error)),
            Err(DmdError::NumericalInstability(reason)) => {
                tracing::debug!(%reason, "prediction unavailable");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// ‖y − apply(x)‖ / ‖y‖ under `factors`; 1 when no x-column is left.
    fn prediction_error(
        &self,
        factors: &IncrementalQr,
        x: &[f64],
        y: &[f64],
    ) -> Result<f64, DmdError> {
        if factors.width() < 2 {
            return Ok(1.0);
        }
        let pred = factor_predict(factors, self.config.max_rank, x)?;
        Ok(relative_error(y, &pred))
    }

    fn check_contiguous(&self, x: &[f64]) -> Result<(), DmdError> {
        let Some(prev) = self.history.last() else {
            return Ok(());
        };
        let gap: f64 = x
            .iter()
            .zip(&prev.y)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();
        if gap > CONTIGUITY_TOL * norm(&prev.y) {
            return Err(DmdError::InvalidInput(format!(
                "x differs from the previous y by {gap:e}; streaming updates must follow one trajectory"
            )));
        }
        Ok(())
    }

    /// Truncated SVD of the x-block `R[:, :-1]`.
    pub fn basis(&self) -> Result<TruncatedBasis, DmdError> {
        factor_basis(self.require_factors()?, self.config.max_rank)
    }

    /// Reduced operator Ã in `R` coordinates.
    pub fn operator(&self) -> Result<Mat<f64>, DmdError> {
        let factors = self.require_factors()?;
        let basis = factor_basis(factors, self.config.max_rank)?;
        Ok(reduced_operator(&basis, &y_block(factors)))
    }

    /// Eigenvalues with modes lifted through `Q`, in eigensolver order.
    pub fn modes(&self) -> Result<Spectrum, DmdError> {
        Ok(self.extract()?.spectrum)
    }

    /// Modes with residuals, sorted by ascending residual.
    pub fn residuals(&self) -> Result<ModeResiduals, DmdError> {
        let mut result = self.extract()?;
        result.sort_ascending();
        Ok(result)
    }

    /// One-step prediction Q · R_y V Σ⁻¹ Uᵀ · Qᵀx.
    pub fn apply(&self, x: &[f64]) -> Result<Vec<f64>, DmdError> {
        let factors = self.require_factors()?;
        if x.len() != factors.q().nrows() {
            return Err(DmdError::InvalidInput(format!(
                "x has length {}, expected {}",
                x.len(),
                factors.q().nrows()
            )));
        }
        factor_predict(factors, self.config.max_rank, x)
    }

    /// Fit amplitudes of `spectrum` to the stored x-history and evaluate
    /// `Σⱼ φⱼ αⱼ λⱼᵗ` at `times` (default: the training indices).
    pub fn reconstruct(
        &self,
        spectrum: &Spectrum,
        times: Option<&[f64]>,
    ) -> Result<Reconstruction, DmdError> {
        reconstruct(spectrum, &self.history.x_matrix()?, times)
    }

    /// Number of factored columns; 0 before the first update.
    pub fn width(&self) -> usize {
        self.factors.as_ref().map_or(0, IncrementalQr::width)
    }

    /// Relative prediction error of the latest update (∞ until measured, or
    /// when the prediction could not be formed).
    pub fn last_error(&self) -> f64 {
        self.last_error
    }

    /// How many adaptive resets have shrunk the factorization.
    pub fn reset_count(&self) -> usize {
        self.resets
    }

    pub fn factors(&self) -> Option<&IncrementalQr> {
        self.factors.as_ref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    fn require_factors(&self) -> Result<&IncrementalQr, DmdError> {
        self.factors.as_ref().ok_or_else(|| {
            DmdError::InsufficientData("no snapshot pairs have been recorded".into())
        })
    }

    fn extract(&self) -> Result<ModeResiduals, DmdError> {
        let factors = self.require_factors()?;
        let basis = factor_basis(factors, self.config.max_rank)?;
        extract(&basis, &y_block(factors), Some(factors.q()))
    }
}

impl DmdEngine for StreamingDmd {
    fn update(&mut self, x: &[f64], y: &[f64]) -> Result<(), DmdError> {
        StreamingDmd::update(self, x, y)
    }

    fn basis(&mut self) -> Result<TruncatedBasis, DmdError> {
        StreamingDmd::basis(self)
    }

    fn operator(&mut self) -> Result<Mat<f64>, DmdError> {
        StreamingDmd::operator(self)
    }

    fn modes(&mut self) -> Result<Spectrum, DmdError> {
        StreamingDmd::modes(self)
    }

    fn residuals(&mut self) -> Result<ModeResiduals, DmdError> {
        StreamingDmd::residuals(self)
    }

    fn apply(&mut self, x: &[f64]) -> Result<Vec<f64>, DmdError> {
        StreamingDmd::apply(self, x)
    }

    fn len(&self) -> usize {
        StreamingDmd::len(self)
    }
}

fn factor_basis(factors: &IncrementalQr, max_rank: Option<usize>) -> Result<TruncatedBasis, DmdError> {
    let w = factors.width();
    if w < 2 {
        return Err(DmdError::InsufficientData(
            "factorization holds no x-column".into(),
        ));
    }
    truncated_svd(&factors.r().subcols(0, w - 1).to_owned(), max_rank)
}

fn y_block(factors: &IncrementalQr) -> Mat<f64> {
    let w = factors.width();
    factors.r().subcols(1, w - 1).to_owned()
}

fn factor_predict(
    factors: &IncrementalQr,
    max_rank: Option<usize>,
    x: &[f64],
) -> Result<Vec<f64>, DmdError> {
    let basis = factor_basis(factors, max_rank)?;
    let coords = mat_t_vec(factors.q(), x);
    let pred = predict(&basis, &y_block(factors), &coords);
    Ok(mat_vec(factors.q(), &pred))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_near(a: f64, b: f64, eps: f64) {
        assert!(
            (a - b).abs() < eps,
            "expected {a} ≈ {b} (diff = {})",
            (a - b).abs()
        );
    }

    /// Snapshots of a generic trajectory: each state adds a new direction.
    fn generic_trajectory(n: usize, steps: usize) -> Vec<Vec<f64>> {
        (0..=steps)
            .map(|t| {
                (0..n)
                    .map(|i| ((i * 5 + t * 11) as f64 * 0.29).sin() + if i == t { 2.0 } else { 0.0 })
                    .collect()
            })
            .collect()
    }

    fn assert_factors_match(dmd: &StreamingDmd, columns: &[Vec<f64>]) {
        let prod = dmd.factors().unwrap().product();
        assert_eq!(prod.ncols(), columns.len());
        for (j, col) in columns.iter().enumerate() {
            for (i, &val) in col.iter().enumerate() {
                assert_near(prod[(i, j)], val, 1e-10);
            }
        }
    }

    #[test]
    fn test_rotation_scenario() {
        let mut dmd = StreamingDmd::new(StreamingConfig {
            max_rank: Some(2),
            ..Default::default()
        })
        .unwrap();
        dmd.update(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        dmd.update(&[0.0, 1.0], &[-1.0, 0.0]).unwrap();

        let pred = dmd.apply(&[0.0, 1.0]).unwrap();
        assert_near(pred[0], -1.0, 1e-10);
        assert_near(pred[1], 0.0, 1e-10);

        let spectrum = dmd.modes().unwrap();
        assert_eq!(spectrum.len(), 2);
        for ev in &spectrum.eigenvalues {
            assert_near(ev.norm(), 1.0, 1e-10);
        }
    }

    #[test]
    fn test_first_update_factors_pair() {
        let traj = generic_trajectory(6, 1);
        let mut dmd = StreamingDmd::new(StreamingConfig::default()).unwrap();
        assert_eq!(dmd.width(), 0);
        dmd.update(&traj[0], &traj[1]).unwrap();
        assert_eq!(dmd.width(), 2);
        assert_factors_match(&dmd, &traj[..2]);
    }

    #[test]
    fn test_factorization_tracks_trajectory() {
        let traj = generic_trajectory(10, 6);
        let mut dmd = StreamingDmd::new(StreamingConfig::default()).unwrap();
        for t in 0..6 {
            dmd.update(&traj[t], &traj[t + 1]).unwrap();
            assert_factors_match(&dmd, &traj[..t + 2]);
        }
    }

    #[test]
    fn test_sliding_window() {
        let traj = generic_trajectory(12, 8);
        let mut dmd = StreamingDmd::new(StreamingConfig {
            max_hist: Some(4),
            ..Default::default()
        })
        .unwrap();
        for t in 0..8 {
            dmd.update(&traj[t], &traj[t + 1]).unwrap();
            assert!(dmd.width() <= 4);
        }
        assert_eq!(dmd.width(), 4);
        assert_eq!(dmd.len(), 4);
        assert_eq!(dmd.history().iter().next().unwrap().x, traj[4]);
        assert_factors_match(&dmd, &traj[5..]);
    }

    #[test]
    fn test_residuals_sorted() {
        let traj = generic_trajectory(10, 6);
        let mut dmd = StreamingDmd::new(StreamingConfig::default()).unwrap();
        for t in 0..6 {
            dmd.update(&traj[t], &traj[t + 1]).unwrap();
        }
        let res = dmd.residuals().unwrap();
        assert!(res.residuals.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(res.spectrum.dim(), 10);
    }

    #[test]
    fn test_non_contiguous_update_rejected() {
        let mut dmd = StreamingDmd::new(StreamingConfig::default()).unwrap();
        dmd.update(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        let err = dmd.update(&[0.0, 0.0, 1.0], &[1.0, 0.0, 0.0]);
        assert!(matches!(err, Err(DmdError::InvalidInput(_))));
        assert_eq!(dmd.len(), 1);
        assert_eq!(dmd.width(), 2);
    }

    #[test]
    fn test_query_before_update() {
        let dmd = StreamingDmd::new(StreamingConfig::default()).unwrap();
        assert!(matches!(dmd.modes(), Err(DmdError::InsufficientData(_))));
        assert!(matches!(dmd.apply(&[1.0]), Err(DmdError::InsufficientData(_))));
    }

    #[test]
    fn test_invalid_configs() {
        let bad = [
            StreamingConfig {
                max_hist: Some(1),
                ..Default::default()
            },
            StreamingConfig {
                max_rank: Some(0),
                ..Default::default()
            },
            StreamingConfig {
                adaptive: Some(AdaptiveReset {
                    reset_ratio: 1.0,
                    reset_tol: 2.0,
                }),
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(StreamingDmd::new(config).is_err());
        }
    }

    /// Offset unit vector: distinct `i` give linearly independent frames.
    fn spike(n: usize, i: usize) -> Vec<f64> {
        (0..n).map(|j| if j == i { 4.0 } else { 1.0 }).collect()
    }

    #[test]
    fn test_adaptive_recovers_after_repeated_snapshots() {
        let (f, g, h, k) = (spike(8, 0), spike(8, 1), spike(8, 2), spike(8, 3));
        let mut dmd = StreamingDmd::new(StreamingConfig {
            max_hist: Some(5),
            adaptive: Some(AdaptiveReset {
                reset_ratio: 2.0,
                reset_tol: 1e3,
            }),
            ..Default::default()
        })
        .unwrap();
        dmd.update(&f, &f).unwrap();
        dmd.update(&f, &f).unwrap();
        dmd.update(&f, &g).unwrap();

        // The x-block now repeats f while Q also spans g.
        let resets = dmd.reset_count();
        dmd.update(&g, &h).unwrap();
        assert_eq!(dmd.reset_count(), resets + 1);
        assert_eq!(dmd.width(), 3);
        assert_eq!(dmd.history().last().unwrap().y, h);

        dmd.update(&h, &k).unwrap();
        assert!(dmd.modes().is_ok());
        assert!(dmd.apply(&k).is_ok());
    }

    #[test]
    fn test_trigger_without_room_to_shrink() {
        let traj = generic_trajectory(6, 4);
        let mut dmd = StreamingDmd::new(StreamingConfig {
            max_hist: Some(2),
            adaptive: Some(AdaptiveReset {
                reset_ratio: 3.0,
                reset_tol: 1e-12,
            }),
            ..Default::default()
        })
        .unwrap();
        // Every measured error exceeds the threshold, but floor(2 / 3) = 0.
        for t in 0..4 {
            dmd.update(&traj[t], &traj[t + 1]).unwrap();
            assert_eq!(dmd.width(), 2);
        }
        assert_eq!(dmd.reset_count(), 0);
        assert!(dmd.last_error().is_finite());
    }

    #[test]
    fn test_adaptive_error_tracked() {
        let traj = generic_trajectory(10, 4);
        let mut dmd = StreamingDmd::new(StreamingConfig {
            adaptive: Some(AdaptiveReset {
                reset_ratio: 2.0,
                reset_tol: 1e12,
            }),
            ..Default::default()
        })
        .unwrap();
        dmd.update(&traj[0], &traj[1]).unwrap();
        assert!(dmd.last_error().is_infinite());
        dmd.update(&traj[1], &traj[2]).unwrap();
        assert!(dmd.last_error().is_finite());
        assert_eq!(dmd.reset_count(), 0);
    }
}
