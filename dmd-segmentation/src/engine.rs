use faer::Mat;

use crate::types::{DmdError, ModeResiduals, Spectrum, TruncatedBasis};
use crate::utils::relative_error;

/// Common interface of the batch, randomized and streaming engines.
///
/// Queries take `&mut self` because the randomized engine compresses its
/// history lazily on first use. Engines are single-writer objects: a host
/// loop calls [`update`](DmdEngine::update) once per observed pair and
/// queries between updates.
pub trait DmdEngine {
    /// Record the pair (x at time t, y at time t+1).
    fn update(&mut self, x: &[f64], y: &[f64]) -> Result<(), DmdError>;

    /// Orthonormal left basis and right factor `(U, V·S⁻¹)`.
    fn basis(&mut self) -> Result<TruncatedBasis, DmdError>;

    /// Reduced operator Ã.
    fn operator(&mut self) -> Result<Mat<f64>, DmdError>;

    /// Eigenvalues with full-space modes.
    fn modes(&mut self) -> Result<Spectrum, DmdError>;

    /// Modes with their eigenproblem residuals.
    fn residuals(&mut self) -> Result<ModeResiduals, DmdError>;

    /// One-step prediction of the state following `x`.
    fn apply(&mut self, x: &[f64]) -> Result<Vec<f64>, DmdError>;

    /// Number of recorded pairs.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// ‖y − apply(x)‖ / ‖y‖ for any engine.
pub fn prediction_error<E: DmdEngine + ?Sized>(
    engine: &mut E,
    x: &[f64],
    y: &[f64],
) -> Result<f64, DmdError> {
    let pred = engine.apply(x)?;
    if pred.len() != y.len() {
        return Err(DmdError::InvalidInput(format!(
            "y has length {}, expected {}",
            y.len(),
            pred.len()
        )));
    }
    Ok(relative_error(y, &pred))
}
