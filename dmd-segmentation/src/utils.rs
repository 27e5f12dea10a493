use faer::Mat;

use crate::types::DmdError;

/// Validate a snapshot vector: non-empty, finite, nonzero, and of length `dim` if known.
pub fn validate_vector(v: &[f64], dim: Option<usize>, name: &str) -> Result<(), DmdError> {
    if v.is_empty() {
        return Err(DmdError::InvalidInput(format!("{name} is empty")));
    }
    if let Some(n) = dim {
        if v.len() != n {
            return Err(DmdError::InvalidInput(format!(
                "{name} has length {}, expected {n}",
                v.len()
            )));
        }
    }
    if v.iter().any(|val| !val.is_finite()) {
        return Err(DmdError::InvalidInput(format!(
            "{name} contains NaN or Inf values"
        )));
    }
    if norm(v) == 0.0 {
        return Err(DmdError::InvalidInput(format!("{name} has zero norm")));
    }
    Ok(())
}

/// Clamp a requested truncation rank to the `available` number of singular values.
///
/// `None` keeps everything. Requests above `available` are clamped rather than
/// rejected; a zero request is rejected when the config is validated.
pub fn determine_rank(available: usize, max_rank: Option<usize>) -> usize {
    match max_rank {
        Some(r) => r.min(available),
        None => available,
    }
}

/// Euclidean norm.
pub fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Scale `v` to unit norm. Returns the original norm.
pub fn normalize(v: &mut [f64]) -> Result<f64, DmdError> {
    let n = norm(v);
    if n == 0.0 || !n.is_finite() {
        return Err(DmdError::InvalidInput(
            "cannot normalize a zero or non-finite vector".into(),
        ));
    }
    for val in v.iter_mut() {
        *val /= n;
    }
    Ok(n)
}

/// ‖y − prediction‖ / ‖y‖.
pub fn relative_error(y: &[f64], prediction: &[f64]) -> f64 {
    let diff: f64 = y
        .iter()
        .zip(prediction)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt();
    diff / norm(y)
}

/// Dense product `m · v`.
pub fn mat_vec(m: &Mat<f64>, v: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; m.nrows()];
    for j in 0..m.ncols() {
        let vj = v[j];
        if vj == 0.0 {
            continue;
        }
        for (i, o) in out.iter_mut().enumerate() {
            *o += m[(i, j)] * vj;
        }
    }
    out
}

/// Dense product `mᵀ · v`.
pub fn mat_t_vec(m: &Mat<f64>, v: &[f64]) -> Vec<f64> {
    (0..m.ncols())
        .map(|j| (0..m.nrows()).map(|i| m[(i, j)] * v[i]).sum())
        .collect()
}

/// Copy column `j` of `m`.
pub fn column(m: &Mat<f64>, j: usize) -> Vec<f64> {
    (0..m.nrows()).map(|i| m[(i, j)]).collect()
}

/// Stack equally long vectors as the columns of a matrix.
pub fn from_columns<'a, I>(nrows: usize, columns: I) -> Mat<f64>
where
    I: ExactSizeIterator<Item = &'a [f64]>,
{
    let mut m = Mat::<f64>::zeros(nrows, columns.len());
    for (j, col) in columns.enumerate() {
        for (i, &val) in col.iter().enumerate() {
            m[(i, j)] = val;
        }
    }
    m
}
