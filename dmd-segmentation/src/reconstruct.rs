use faer::Mat;

use crate::types::{DmdError, Spectrum, C64};

/// States synthesized from a set of modes.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// Fitted amplitude αⱼ per mode.
    pub amplitudes: Vec<C64>,
    /// Evaluation times.
    pub times: Vec<f64>,
    /// `states[k]` is the complex state at `times[k]`.
    pub states: Vec<Vec<C64>>,
}

impl Reconstruction {
    /// Real parts as an n × T matrix, one column per time.
    pub fn real(&self) -> Mat<f64> {
        let n = self.states.first().map_or(0, Vec::len);
        let mut out = Mat::<f64>::zeros(n, self.states.len());
        for (k, state) in self.states.iter().enumerate() {
            for (i, z) in state.iter().enumerate() {
                out[(i, k)] = z.re;
            }
        }
        out
    }

    /// Real part of the state at position `k`.
    pub fn real_state(&self, k: usize) -> Option<Vec<f64>> {
        self.states.get(k).map(|s| s.iter().map(|z| z.re).collect())
    }
}

/// Fit amplitudes of `spectrum` to `snapshots` and evaluate the model at `times`.
///
/// Column `t` of `snapshots` is taken as the state at time `t`. The model is
/// x(t) ≈ Σⱼ φⱼ · αⱼ · λⱼᵗ; `times` defaults to `0..snapshots.ncols()`.
pub fn reconstruct(
    spectrum: &Spectrum,
    snapshots: &Mat<f64>,
    times: Option<&[f64]>,
) -> Result<Reconstruction, DmdError> {
    let amplitudes = fit_amplitudes(spectrum, snapshots)?;
    let times: Vec<f64> = match times {
        Some(t) => t.to_vec(),
        None => (0..snapshots.ncols()).map(|t| t as f64).collect(),
    };

    let n = spectrum.dim();
    let states = times
        .iter()
        .map(|&t| {
            let weights: Vec<C64> = spectrum
                .eigenvalues
                .iter()
                .zip(&amplitudes)
                .map(|(lambda, alpha)| *alpha * lambda.powf(t))
                .collect();
            (0..n)
                .map(|i| {
                    let mut val = C64::zero();
                    for (mode, &w) in spectrum.modes.iter().zip(&weights) {
                        val += mode[i] * w;
                    }
                    val
                })
                .collect()
        })
        .collect();

    Ok(Reconstruction {
        amplitudes,
        times,
        states,
    })
}

/// Least-squares amplitudes α minimizing Σₜ ‖Φ diag(α) vₜ − xₜ‖², vₜ = (λⱼᵗ)ⱼ.
///
/// Normal equations: [(ΦᴴΦ) ∘ (V̄ Vᵀ)] α = (V̄ ∘ ΦᴴX) · 1, solved by Cholesky.
pub fn fit_amplitudes(spectrum: &Spectrum, snapshots: &Mat<f64>) -> Result<Vec<C64>, DmdError> {
    let m = spectrum.len();
    if m == 0 {
        return Err(DmdError::InvalidInput("no modes to fit".into()));
    }
    let n = spectrum.dim();
    if snapshots.nrows() != n {
        return Err(DmdError::InvalidInput(format!(
            "snapshots have {} rows, modes have {n}",
            snapshots.nrows()
        )));
    }
    let n_time = snapshots.ncols();
    if n_time == 0 {
        return Err(DmdError::InsufficientData("no snapshots to fit".into()));
    }

    let modes = &spectrum.modes;
    let vander: Vec<Vec<C64>> = spectrum
        .eigenvalues
        .iter()
        .map(|lambda| (0..n_time).map(|t| lambda.powf(t as f64)).collect())
        .collect();

    // Φᴴ X (m × T)
    let proj: Vec<Vec<C64>> = modes
        .iter()
        .map(|mode| {
            (0..n_time)
                .map(|t| {
                    let mut val = C64::zero();
                    for (k, z) in mode.iter().enumerate() {
                        val += z.conj() * snapshots[(k, t)];
                    }
                    val
                })
                .collect()
        })
        .collect();

    let mut system = vec![vec![C64::zero(); m]; m];
    let mut rhs = vec![C64::zero(); m];
    for i in 0..m {
        for j in 0..m {
            let mut gram = C64::zero();
            for k in 0..n {
                gram += modes[i][k].conj() * modes[j][k];
            }
            let mut vv = C64::zero();
            for t in 0..n_time {
                vv += vander[i][t].conj() * vander[j][t];
            }
            system[i][j] = gram * vv;
        }
        for t in 0..n_time {
            rhs[i] += vander[i][t].conj() * proj[i][t];
        }
    }

    cholesky_solve(&system, &rhs)
}

/// Solve A x = b for Hermitian positive-definite A via A = L Lᴴ.
fn cholesky_solve(a: &[Vec<C64>], b: &[C64]) -> Result<Vec<C64>, DmdError> {
    let n = b.len();
    let mut l = vec![vec![C64::zero(); n]; n];

    for j in 0..n {
        let mut d = a[j][j].re;
        for k in 0..j {
            d -= l[j][k].norm_sqr();
        }
        if !(d > 0.0) || !d.is_finite() {
            return Err(DmdError::SolveFailed(format!(
                "system is not positive definite (pivot {j} = {d:e})"
            )));
        }
        let d = d.sqrt();
        l[j][j] = C64::new(d, 0.0);
        for i in (j + 1)..n {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k].conj();
            }
            l[i][j] = sum / d;
        }
    }

    // L z = b
    let mut z = vec![C64::zero(); n];
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[i][k] * z[k];
        }
        z[i] = sum / l[i][i].re;
    }

    // Lᴴ x = z
    let mut x = vec![C64::zero(); n];
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= l[k][i].conj() * x[k];
        }
        x[i] = sum / l[i][i].re;
    }

    Ok(x)
}
