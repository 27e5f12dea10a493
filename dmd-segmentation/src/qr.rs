//! Thin QR factorization maintained one column at a time.

use faer::Mat;

use crate::types::DmdError;
use crate::utils::norm;

/// Relative residual below which a new column counts as linearly dependent.
pub const DEPENDENCE_TOL: f64 = 1e-10;

/// Remove from `v` its components along the first `ncols` columns of `basis`.
///
/// Runs `passes` rounds of modified Gram-Schmidt and returns the accumulated
/// projection coefficients.
pub fn reorthogonalize(basis: &Mat<f64>, ncols: usize, v: &mut [f64], passes: usize) -> Vec<f64> {
    let n = basis.nrows();
    let mut coeffs = vec![0.0; ncols];
    for _ in 0..passes {
        for (j, coeff) in coeffs.iter_mut().enumerate() {
            let c: f64 = (0..n).map(|i| basis[(i, j)] * v[i]).sum();
            for (i, val) in v.iter_mut().enumerate() {
                *val -= c * basis[(i, j)];
            }
            *coeff += c;
        }
    }
    coeffs
}

/// Thin factorization `Q·R` of a column-stacked snapshot matrix.
///
/// `Q` is n × k with orthonormal columns and `R` is k × w upper trapezoidal.
/// Columns that add no new direction are absorbed into `R` without growing
/// `Q`, so k ≤ w.
#[derive(Debug, Clone)]
pub struct IncrementalQr {
    q: Mat<f64>,
    r: Mat<f64>,
}

impl IncrementalQr {
    /// Factor the two-column matrix `[x | y]`.
    pub fn from_pair(x: &[f64], y: &[f64], num_reorth: usize) -> Result<Self, DmdError> {
        let nx = norm(x);
        if nx == 0.0 || x.len() != y.len() {
            return Err(DmdError::InvalidInput(
                "initial pair must be nonzero and of equal length".into(),
            ));
        }
        let mut q = Mat::<f64>::zeros(x.len(), 1);
        for (i, &val) in x.iter().enumerate() {
            q[(i, 0)] = val / nx;
        }
        let mut r = Mat::<f64>::zeros(1, 1);
        r[(0, 0)] = nx;
        let (factors, _) = Self { q, r }.appended(y, num_reorth);
        Ok(factors)
    }

    /// Factorization of `[Q·R | v]`, and whether `Q` gained a column.
    pub fn appended(&self, v: &[f64], num_reorth: usize) -> (Self, bool) {
        let (n, k, w) = (self.q.nrows(), self.q.ncols(), self.r.ncols());
        let mut residual = v.to_vec();
        let coeffs = reorthogonalize(&self.q, k, &mut residual, num_reorth);
        let nv = norm(&residual);
        let extend = k < n && nv > DEPENDENCE_TOL * norm(v);
        let new_k = if extend { k + 1 } else { k };

        let mut q = Mat::<f64>::zeros(n, new_k);
        let mut r = Mat::<f64>::zeros(new_k, w + 1);
        for j in 0..k {
            for i in 0..n {
                q[(i, j)] = self.q[(i, j)];
            }
        }
        for j in 0..w {
            for i in 0..k {
                r[(i, j)] = self.r[(i, j)];
            }
        }
        for (i, &c) in coeffs.iter().enumerate() {
            r[(i, w)] = c;
        }
        if extend {
            for (i, &val) in residual.iter().enumerate() {
                q[(i, k)] = val / nv;
            }
            r[(k, w)] = nv;
        } else {
            tracing::debug!(residual = nv, width = w + 1, "absorbed dependent column");
        }
        (Self { q, r }, extend)
    }

    /// Factorization with the `p` oldest columns deleted (QR downdate).
    ///
    /// Givens rotations restore the trapezoidal shape of the shifted `R`;
    /// the same rotations are applied to `Q`, which then sheds the columns
    /// no longer needed.
    pub fn without_leading(&self, p: usize) -> Result<Self, DmdError> {
        let w = self.width();
        if w <= 1 || p >= w {
            return Err(DmdError::InvalidOperation(format!(
                "cannot delete {p} columns from a factorization of width {w}"
            )));
        }
        if p == 0 {
            return Ok(self.clone());
        }

        let (n, k) = (self.q.nrows(), self.q.ncols());
        let new_w = w - p;
        let mut r = self.r.subcols(p, new_w).to_owned();
        let mut q = self.q.clone();

        for j in 0..new_w.min(k) {
            let last = (j + p).min(k - 1);
            for i in ((j + 1)..=last).rev() {
                let a = r[(i - 1, j)];
                let b = r[(i, j)];
                if b == 0.0 {
                    continue;
                }
                let h = a.hypot(b);
                let (c, s) = (a / h, b / h);
                for col in j..new_w {
                    let (ra, rb) = (r[(i - 1, col)], r[(i, col)]);
                    r[(i - 1, col)] = c * ra + s * rb;
                    r[(i, col)] = c * rb - s * ra;
                }
                for row in 0..n {
                    let (qa, qb) = (q[(row, i - 1)], q[(row, i)]);
                    q[(row, i - 1)] = c * qa + s * qb;
                    q[(row, i)] = c * qb - s * qa;
                }
                r[(i, j)] = 0.0;
            }
        }

        let new_k = k.min(new_w);
        Ok(Self {
            q: q.subcols(0, new_k).to_owned(),
            r: r.subrows(0, new_k).to_owned(),
        })
    }

    /// Number of factored columns.
    pub fn width(&self) -> usize {
        self.r.ncols()
    }

    /// Number of orthonormal directions in `Q`.
    pub fn rank(&self) -> usize {
        self.q.ncols()
    }

    pub fn q(&self) -> &Mat<f64> {
        &self.q
    }

    pub fn r(&self) -> &Mat<f64> {
        &self.r
    }

    /// `Q·R`, the factored matrix.
    pub fn product(&self) -> Mat<f64> {
        &self.q * &self.r
    }
}
