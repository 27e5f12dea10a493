use crate::types::{Spectrum, C64};

/// Information about a single DMD mode.
#[derive(Debug, Clone)]
pub struct ModeInfo {
    /// Mode index.
    pub index: usize,
    /// Complex eigenvalue.
    pub eigenvalue: C64,
    /// Eigenvalue magnitude |λ|.
    pub magnitude: f64,
    /// Eigenvalue phase angle (radians).
    pub phase: f64,
    /// Oscillation frequency (cycles per dt).
    pub frequency: f64,
    /// Oscillation period (in dt units).
    pub period: f64,
    /// Growth rate (log|λ|/dt).
    pub growth_rate: f64,
    /// Half-life for decaying modes (positive), doubling time for growing (negative).
    pub half_life: Option<f64>,
    /// Stability classification.
    pub stability: Stability,
}

/// Stability classification of a mode or system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Decaying,
    Neutral,
    Growing,
}

impl std::fmt::Display for Stability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stability::Decaying => write!(f, "decaying"),
            Stability::Neutral => write!(f, "neutral"),
            Stability::Growing => write!(f, "growing"),
        }
    }
}

/// Result of stability analysis.
#[derive(Debug, Clone)]
pub struct StabilityResult {
    /// Whether no mode is growing.
    pub is_stable: bool,
    /// Whether any mode is exactly neutral (within tolerance).
    pub is_marginal: bool,
    /// Maximum eigenvalue magnitude.
    pub spectral_radius: f64,
    /// Per-mode stability classification.
    pub mode_stability: Vec<Stability>,
}

/// Per-mode magnitude, phase, frequency, growth rate and stability.
pub fn mode_info(spectrum: &Spectrum, dt: f64) -> Vec<ModeInfo> {
    spectrum
        .eigenvalues
        .iter()
        .enumerate()
        .map(|(index, &lambda)| {
            let magnitude = lambda.norm();
            let phase = lambda.arg();
            let frequency = phase.abs() / (2.0 * std::f64::consts::PI * dt);
            let period = if frequency > 1e-14 {
                1.0 / frequency
            } else {
                f64::INFINITY
            };
            let growth_rate = magnitude.ln() / dt;
            let half_life = if growth_rate.is_finite() && growth_rate.abs() > 1e-14 {
                Some(-(2.0_f64.ln()) / growth_rate)
            } else {
                None
            };
            ModeInfo {
                index,
                eigenvalue: lambda,
                magnitude,
                phase,
                frequency,
                period,
                growth_rate,
                half_life,
                stability: classify_eigenvalue(magnitude, 1e-6),
            }
        })
        .collect()
}

/// Classify every mode and summarize the spectrum.
pub fn stability(spectrum: &Spectrum, tol: f64) -> StabilityResult {
    let mode_stability: Vec<Stability> = spectrum
        .eigenvalues
        .iter()
        .map(|lambda| classify_eigenvalue(lambda.norm(), tol))
        .collect();

    let spectral_radius = spectrum
        .eigenvalues
        .iter()
        .map(|lambda| lambda.norm())
        .fold(0.0_f64, f64::max);

    StabilityResult {
        is_stable: !mode_stability.contains(&Stability::Growing),
        is_marginal: mode_stability.contains(&Stability::Neutral),
        spectral_radius,
        mode_stability,
    }
}

fn classify_eigenvalue(magnitude: f64, tol: f64) -> Stability {
    if magnitude > 1.0 + tol {
        Stability::Growing
    } else if magnitude < 1.0 - tol {
        Stability::Decaying
    } else {
        Stability::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(evals: &[C64]) -> Spectrum {
        Spectrum {
            eigenvalues: evals.to_vec(),
            modes: vec![vec![C64::new(1.0, 0.0)]; evals.len()],
        }
    }

    #[test]
    fn test_mode_info_rotation() {
        let theta = 0.25 * std::f64::consts::PI;
        let s = spectrum(&[C64::new(theta.cos(), theta.sin())]);
        let info = mode_info(&s, 1.0);
        assert_eq!(info.len(), 1);
        assert!((info[0].frequency - 0.125).abs() < 1e-12);
        assert!((info[0].period - 8.0).abs() < 1e-9);
        assert_eq!(info[0].stability, Stability::Neutral);
        assert!(info[0].half_life.is_none());
    }

    #[test]
    fn test_stability_summary() {
        let s = spectrum(&[C64::new(0.5, 0.0), C64::new(1.0, 0.0), C64::new(1.2, 0.0)]);
        let result = stability(&s, 1e-6);
        assert!(!result.is_stable);
        assert!(result.is_marginal);
        assert!((result.spectral_radius - 1.2).abs() < 1e-12);
        assert_eq!(
            result.mode_stability,
            vec![Stability::Decaying, Stability::Neutral, Stability::Growing]
        );
    }

    #[test]
    fn test_decaying_half_life() {
        let s = spectrum(&[C64::new(0.5, 0.0)]);
        let info = mode_info(&s, 1.0);
        assert_eq!(info[0].stability, Stability::Decaying);
        assert!((info[0].half_life.unwrap() - 1.0).abs() < 1e-12);
    }
}
