//! Mode and residual extraction shared by every engine.
//!
//! Each engine only decides how to build its basis: the batch engine
//! decomposes the raw x-matrix, the randomized engine the compressed
//! x-matrix, and the streaming engine the x-block of its `R` factor.
//! Everything downstream of `(U, V·S⁻¹)` and the matching y-data lives here.

use faer::Mat;

use crate::types::{DmdError, ModeResiduals, Spectrum, TruncatedBasis, C64};
use crate::utils::{determine_rank, mat_t_vec, mat_vec};

/// Truncated SVD of `x`, returned as `(U, V·S⁻¹)`.
///
/// Keeps at most `max_rank` singular triplets (clamped to what `x` has) and
/// fails if any retained singular value is numerically zero.
pub fn truncated_svd(x: &Mat<f64>, max_rank: Option<usize>) -> Result<TruncatedBasis, DmdError> {
    let (rows, cols) = (x.nrows(), x.ncols());
    if rows == 0 || cols == 0 {
        return Err(DmdError::InsufficientData(format!(
            "cannot decompose a {rows}×{cols} snapshot matrix"
        )));
    }

    let svd = x
        .thin_svd()
        .map_err(|e| DmdError::SvdFailed(format!("{e:?}")))?;
    let u_full = svd.U();
    let v_full = svd.V();
    let s_col = svd.S().column_vector();

    let n_sv = s_col.nrows();
    let s_vals: Vec<f64> = (0..n_sv).map(|i| s_col[i]).collect();
    let rank = determine_rank(n_sv, max_rank);

    let s_max = s_vals.iter().copied().fold(0.0_f64, f64::max);
    let tol = s_max * rows.max(cols) as f64 * f64::EPSILON;
    if let Some((idx, s)) = s_vals[..rank]
        .iter()
        .enumerate()
        .find(|&(_, &s)| s_max == 0.0 || s <= tol)
    {
        return Err(DmdError::NumericalInstability(format!(
            "singular value {idx} is {s:e} (tolerance {tol:e}); lower max_rank"
        )));
    }

    let u = u_full.subcols(0, rank).to_owned();
    let mut v_s_inv = Mat::<f64>::zeros(cols, rank);
    for j in 0..rank {
        for i in 0..cols {
            v_s_inv[(i, j)] = v_full[(i, j)] / s_vals[j];
        }
    }

    Ok(TruncatedBasis {
        u,
        v_s_inv,
        singular_values: s_vals[..rank].to_vec(),
    })
}

/// Reduced operator Ã = Uᵀ · Y · V·S⁻¹ (r × r).
pub fn reduced_operator(basis: &TruncatedBasis, y: &Mat<f64>) -> Mat<f64> {
    let y_v = y * &basis.v_s_inv;
    basis.u.transpose() * &y_v
}

/// One-step prediction Y · V·S⁻¹ · (Uᵀ · x), without forming Ã.
///
/// `x` and the result are in the coordinates `basis.u` and `y` live in.
pub fn predict(basis: &TruncatedBasis, y: &Mat<f64>, x: &[f64]) -> Vec<f64> {
    let coeffs = mat_t_vec(&basis.u, x);
    let weights = mat_vec(&basis.v_s_inv, &coeffs);
    mat_vec(y, &weights)
}

/// Eigendecomposition of Ã with modes, lifted to full space, and residuals.
///
/// `y` holds the successor snapshots in the same coordinates as `basis.u`.
/// When `lift` is given, modes are mapped through it (`lift · U · w`);
/// residuals stay in basis coordinates, which preserves their norm as
/// long as `lift` has orthonormal columns.
pub fn extract(
    basis: &TruncatedBasis,
    y: &Mat<f64>,
    lift: Option<&Mat<f64>>,
) -> Result<ModeResiduals, DmdError> {
    let rank = basis.rank();
    let y_v = y * &basis.v_s_inv;
    let a_tilde = basis.u.transpose() * &y_v;

    let eigen = a_tilde
        .as_ref()
        .eigen()
        .map_err(|e| DmdError::EigenFailed(format!("{e:?}")))?;
    let eigenvalues_diag = eigen.S().column_vector();
    let eigenvectors = eigen.U();

    let mut eigenvalues = Vec::with_capacity(rank);
    let mut w_re = Mat::<f64>::zeros(rank, rank);
    let mut w_im = Mat::<f64>::zeros(rank, rank);
    for j in 0..rank {
        let ev = eigenvalues_diag[j];
        eigenvalues.push(C64::new(ev.re, ev.im));
        for i in 0..rank {
            let v = eigenvectors[(i, j)];
            w_re[(i, j)] = v.re;
            w_im[(i, j)] = v.im;
        }
    }

    // Complex products split into real and imaginary parts.
    let uw_re = &basis.u * &w_re;
    let uw_im = &basis.u * &w_im;
    let pw_re = &y_v * &w_re;
    let pw_im = &y_v * &w_im;

    let residuals = (0..rank)
        .map(|j| {
            let lambda = eigenvalues[j];
            (0..uw_re.nrows())
                .map(|i| {
                    let uw = C64::new(uw_re[(i, j)], uw_im[(i, j)]);
                    let pw = C64::new(pw_re[(i, j)], pw_im[(i, j)]);
                    (pw - uw * lambda).norm_sqr()
                })
                .sum::<f64>()
                .sqrt()
        })
        .collect();

    let (modes_re, modes_im) = match lift {
        Some(q) => (q * &uw_re, q * &uw_im),
        None => (uw_re, uw_im),
    };
    let modes = (0..rank)
        .map(|j| {
            (0..modes_re.nrows())
                .map(|i| C64::new(modes_re[(i, j)], modes_im[(i, j)]))
                .collect()
        })
        .collect();

    Ok(ModeResiduals {
        residuals,
        spectrum: Spectrum { eigenvalues, modes },
    })
}
