use faer::Mat;

/// Error types for DMD operations.
#[derive(Debug, thiserror::Error)]
pub enum DmdError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("numerical instability: {0}")]
    NumericalInstability(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("SVD computation failed: {0}")]
    SvdFailed(String),

    #[error("eigendecomposition failed: {0}")]
    EigenFailed(String),

    #[error("linear solve failed: {0}")]
    SolveFailed(String),
}

/// Rank-limited SVD of the snapshot matrix, arranged as a stable pseudoinverse.
///
/// `u` is the orthonormal left basis (rows × r) and `v_s_inv` is `V·S⁻¹`
/// (cols × r), so that `v_s_inv · uᵀ` is the truncated pseudoinverse.
#[derive(Debug, Clone)]
pub struct TruncatedBasis {
    /// Left singular vectors (rows × r).
    pub u: Mat<f64>,
    /// Right factor V·S⁻¹ (cols × r).
    pub v_s_inv: Mat<f64>,
    /// Retained singular values, descending.
    pub singular_values: Vec<f64>,
}

impl TruncatedBasis {
    /// Number of retained singular triplets.
    pub fn rank(&self) -> usize {
        self.singular_values.len()
    }
}

/// Eigenvalues of the reduced operator with their modes lifted to full space.
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Eigenvalues λ (r).
    pub eigenvalues: Vec<C64>,
    /// Full-space modes; `modes[j]` pairs with `eigenvalues[j]`.
    pub modes: Vec<Vec<C64>>,
}

impl Spectrum {
    /// Number of modes.
    pub fn len(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eigenvalues.is_empty()
    }

    /// State dimension of the lifted modes.
    pub fn dim(&self) -> usize {
        self.modes.first().map_or(0, Vec::len)
    }

    /// Keep only the modes at `indices`, in the given order.
    pub fn select(&self, indices: &[usize]) -> Result<Spectrum, DmdError> {
        let rank = self.len();
        let mut eigenvalues = Vec::with_capacity(indices.len());
        let mut modes = Vec::with_capacity(indices.len());
        for &i in indices {
            if i >= rank {
                return Err(DmdError::InvalidInput(format!(
                    "mode index {i} out of range (rank={rank})"
                )));
            }
            eigenvalues.push(self.eigenvalues[i]);
            modes.push(self.modes[i].clone());
        }
        Ok(Spectrum { eigenvalues, modes })
    }
}

/// A spectrum together with the per-mode residual of the approximate eigenproblem.
#[derive(Debug, Clone)]
pub struct ModeResiduals {
    /// Residual ‖Y·V·S⁻¹·w − U·w·λ‖ per mode.
    pub residuals: Vec<f64>,
    /// The modes the residuals refer to, in the same order.
    pub spectrum: Spectrum,
}

impl ModeResiduals {
    /// Smallest residual, i.e. the most coherent mode's.
    pub fn min_residual(&self) -> Option<f64> {
        self.residuals.iter().copied().reduce(f64::min)
    }

    /// Reorder all entries by ascending residual.
    pub fn sort_ascending(&mut self) {
        let mut order: Vec<usize> = (0..self.residuals.len()).collect();
        order.sort_by(|&a, &b| self.residuals[a].total_cmp(&self.residuals[b]));
        self.residuals = order.iter().map(|&i| self.residuals[i]).collect();
        self.spectrum.eigenvalues = order.iter().map(|&i| self.spectrum.eigenvalues[i]).collect();
        self.spectrum.modes = order
            .iter()
            .map(|&i| std::mem::take(&mut self.spectrum.modes[i]))
            .collect();
    }
}

/// Complex number type (re, im).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct C64 {
    pub re: f64,
    pub im: f64,
}

impl C64 {
    /// Create a new complex number.
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    /// Magnitude |z| = sqrt(re² + im²).
    pub fn norm(&self) -> f64 {
        self.re.hypot(self.im)
    }

    /// Squared magnitude re² + im².
    pub fn norm_sqr(&self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    /// Phase angle atan2(im, re).
    pub fn arg(&self) -> f64 {
        self.im.atan2(self.re)
    }

    /// Complex conjugate (re, -im).
    pub fn conj(&self) -> Self {
        Self {
            re: self.re,
            im: -self.im,
        }
    }

    /// Principal logarithm ln|z| + i·arg z.
    pub fn ln(&self) -> Self {
        Self {
            re: self.norm().ln(),
            im: self.arg(),
        }
    }

    /// Raise to a real power: (r e^{iθ})^p = r^p e^{ipθ}.
    pub fn powf(&self, p: f64) -> Self {
        let r = self.norm();
        let theta = self.arg();
        let rp = r.powf(p);
        Self {
            re: rp * (p * theta).cos(),
            im: rp * (p * theta).sin(),
        }
    }

    /// The zero complex number (0 + 0i).
    pub fn zero() -> Self {
        Self { re: 0.0, im: 0.0 }
    }
}

impl From<f64> for C64 {
    fn from(re: f64) -> Self {
        Self { re, im: 0.0 }
    }
}

impl std::ops::Add for C64 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            re: self.re + rhs.re,
            im: self.im + rhs.im,
        }
    }
}

impl std::ops::AddAssign for C64 {
    fn add_assign(&mut self, rhs: Self) {
        self.re += rhs.re;
        self.im += rhs.im;
    }
}

impl std::ops::Sub for C64 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            re: self.re - rhs.re,
            im: self.im - rhs.im,
        }
    }
}

impl std::ops::SubAssign for C64 {
    fn sub_assign(&mut self, rhs: Self) {
        self.re -= rhs.re;
        self.im -= rhs.im;
    }
}

impl std::ops::Mul for C64 {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self {
            re: self.re * rhs.re - self.im * rhs.im,
            im: self.re * rhs.im + self.im * rhs.re,
        }
    }
}

impl std::ops::Mul<f64> for C64 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self {
            re: self.re * rhs,
            im: self.im * rhs,
        }
    }
}

impl std::ops::Div<f64> for C64 {
    type Output = Self;
    fn div(self, rhs: f64) -> Self {
        Self {
            re: self.re / rhs,
            im: self.im / rhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum_of(evals: &[f64]) -> Spectrum {
        Spectrum {
            eigenvalues: evals.iter().map(|&e| C64::from(e)).collect(),
            modes: evals.iter().map(|&e| vec![C64::from(e); 2]).collect(),
        }
    }

    #[test]
    fn test_select_out_of_range() {
        let s = spectrum_of(&[1.0, 0.5]);
        assert!(s.select(&[2]).is_err());
        let picked = s.select(&[1]).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked.eigenvalues[0], C64::from(0.5));
    }

    #[test]
    fn test_sort_ascending_keeps_pairs_aligned() {
        let mut r = ModeResiduals {
            residuals: vec![0.3, 0.1, 0.2],
            spectrum: spectrum_of(&[3.0, 1.0, 2.0]),
        };
        r.sort_ascending();
        assert_eq!(r.residuals, vec![0.1, 0.2, 0.3]);
        assert_eq!(r.spectrum.eigenvalues[0], C64::from(1.0));
        assert_eq!(r.spectrum.modes[2][0], C64::from(3.0));
        assert_eq!(r.min_residual(), Some(0.1));
    }

    #[test]
    fn test_ln_of_unit_rotation() {
        let z = C64::new(0.0, 1.0);
        let l = z.ln();
        assert!(l.re.abs() < 1e-12);
        assert!((l.im - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }
}
