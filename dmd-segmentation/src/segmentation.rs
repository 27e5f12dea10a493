//! Background/foreground separation of a frame stream.
//!
//! Frames are flattened and unit-normalized, then fed to a [`StreamingDmd`]
//! as consecutive pairs. Modes with eigenvalues on the unit circle at angle
//! zero (|ln λ| ≈ 0) neither oscillate nor decay and make up the background;
//! whatever the background model fails to explain is foreground.

use crate::streaming::{StreamingConfig, StreamingDmd};
use crate::types::{DmdError, C64};
use crate::utils::{normalize, relative_error};

/// Thresholds for background selection and foreground masking.
#[derive(Debug, Clone)]
pub struct SegmentationConfig {
    /// Modes with |ln λ| below this are background.
    pub background_tol: f64,
    /// Foreground magnitude above which a pixel counts as moving.
    pub mask_threshold: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            background_tol: 1e-3,
            mask_threshold: 5e-4,
        }
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> Result<(), DmdError> {
        if !(self.background_tol > 0.0 && self.background_tol.is_finite()) {
            return Err(DmdError::InvalidConfig(format!(
                "background_tol must be positive and finite, got {}",
                self.background_tol
            )));
        }
        if !(self.mask_threshold >= 0.0 && self.mask_threshold.is_finite()) {
            return Err(DmdError::InvalidConfig(format!(
                "mask_threshold must be non-negative and finite, got {}",
                self.mask_threshold
            )));
        }
        Ok(())
    }
}

/// One frame split into background and foreground.
#[derive(Debug, Clone)]
pub struct FrameSplit {
    /// Unit-norm background estimate.
    pub background: Vec<f64>,
    /// |frame − background|, elementwise.
    pub foreground: Vec<f64>,
    /// Indices (in ascending-residual order) of the modes used as background.
    pub background_modes: Vec<usize>,
    /// Mode residuals, ascending.
    pub residuals: Vec<f64>,
}

impl FrameSplit {
    /// Residual of the most coherent mode.
    pub fn min_residual(&self) -> Option<f64> {
        self.residuals.first().copied()
    }
}

/// Indices of eigenvalues with |ln λ| < `tol`.
///
/// Falls back to index 0 when none qualifies; with residual-sorted
/// eigenvalues that is the most coherent mode.
pub fn background_modes(eigenvalues: &[C64], tol: f64) -> Vec<usize> {
    let selected: Vec<usize> = eigenvalues
        .iter()
        .enumerate()
        .filter(|(_, lambda)| lambda.norm() > 0.0 && lambda.ln().norm() < tol)
        .map(|(i, _)| i)
        .collect();
    if selected.is_empty() && !eigenvalues.is_empty() {
        vec![0]
    } else {
        selected
    }
}

/// Split `x` into background and foreground using the current model.
///
/// The background is the reconstruction of the background modes at the time
/// index following the stored history, scaled to unit norm.
pub fn separate(
    dmd: &StreamingDmd,
    x: &[f64],
    config: &SegmentationConfig,
) -> Result<FrameSplit, DmdError> {
    config.validate()?;
    let ranked = dmd.residuals()?;
    if x.len() != ranked.spectrum.dim() {
        return Err(DmdError::InvalidInput(format!(
            "frame has length {}, expected {}",
            x.len(),
            ranked.spectrum.dim()
        )));
    }

    let indices = background_modes(&ranked.spectrum.eigenvalues, config.background_tol);
    let selected = ranked.spectrum.select(&indices)?;
    let t = dmd.len() as f64;
    let recon = dmd.reconstruct(&selected, Some([t].as_slice()))?;
    let mut background = recon
        .real_state(0)
        .ok_or_else(|| DmdError::NumericalInstability("empty reconstruction".into()))?;
    normalize(&mut background).map_err(|_| {
        DmdError::NumericalInstability("background reconstruction vanished".into())
    })?;

    let foreground = x
        .iter()
        .zip(&background)
        .map(|(a, b)| (a - b).abs())
        .collect();

    tracing::trace!(
        modes = indices.len(),
        time = t,
        min_residual = ?ranked.min_residual(),
        "separated frame"
    );

    Ok(FrameSplit {
        background,
        foreground,
        background_modes: indices,
        residuals: ranked.residuals,
    })
}

/// `true` where the foreground exceeds `threshold`.
pub fn foreground_mask(foreground: &[f64], threshold: f64) -> Vec<bool> {
    foreground.iter().map(|&v| v > threshold).collect()
}

/// Streaming background subtraction over a sequence of frames.
///
/// ```
/// use dmd_segmentation::{BackgroundSubtractor, SegmentationConfig, StreamingConfig};
///
/// let mut sub = BackgroundSubtractor::new(
///     StreamingConfig { max_hist: Some(5), max_rank: Some(10), ..Default::default() },
///     SegmentationConfig::default(),
/// ).unwrap();
///
/// let frame = vec![1.0, 2.0, 3.0, 4.0];
/// assert!(sub.push_frame(&frame).unwrap().is_none());
/// assert!(sub.push_frame(&frame).unwrap().is_none());
/// let split = sub.push_frame(&frame).unwrap().unwrap();
/// assert!(split.foreground.iter().all(|&v| v < 1e-8));
/// ```
#[derive(Debug, Clone)]
pub struct BackgroundSubtractor {
    dmd: StreamingDmd,
    config: SegmentationConfig,
    previous: Option<Vec<f64>>,
    errors: Vec<f64>,
}

impl BackgroundSubtractor {
    pub fn new(
        streaming: StreamingConfig,
        config: SegmentationConfig,
    ) -> Result<Self, DmdError> {
        config.validate()?;
        Ok(Self {
            dmd: StreamingDmd::new(streaming)?,
            config,
            previous: None,
            errors: Vec::new(),
        })
    }

    /// Feed the next frame.
    ///
    /// The previous frame and this one form a snapshot pair. Once the model
    /// holds a pair, the previous frame is separated before the model is
    /// updated. Returns `None` while there is nothing to separate against.
    ///
    /// A separation failure is returned only after the pair has been
    /// recorded, so the stream keeps advancing and later frames can succeed.
    pub fn push_frame(&mut self, frame: &[f64]) -> Result<Option<FrameSplit>, DmdError> {
        let mut current = frame.to_vec();
        normalize(&mut current)?;

        let Some(x) = &self.previous else {
            self.previous = Some(current);
            return Ok(None);
        };

        let measured = if self.dmd.is_empty() {
            None
        } else {
            Some(self.measure(x, &current))
        };

        self.dmd.update(x, &current)?;
        self.previous = Some(current);
        match measured {
            None => Ok(None),
            Some(Ok((split, error))) => {
                self.errors.push(error);
                Ok(Some(split))
            }
            Some(Err(e)) => {
                tracing::debug!(error = %e, len = self.dmd.len(), "frame not separated");
                Err(e)
            }
        }
    }

    /// Split `x` and score the model's prediction of `next`.
    fn measure(&self, x: &[f64], next: &[f64]) -> Result<(FrameSplit, f64), DmdError> {
        let prediction = self.dmd.apply(x)?;
        let split = separate(&self.dmd, x, &self.config)?;
        Ok((split, relative_error(next, &prediction)))
    }

    /// One-step relative prediction errors, one per emitted split.
    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    pub fn mask(&self, split: &FrameSplit) -> Vec<bool> {
        foreground_mask(&split.foreground, self.config.mask_threshold)
    }

    pub fn dmd(&self) -> &StreamingDmd {
        &self.dmd
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }
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

    #[test]
    fn test_background_modes_selects_unit_eigenvalues() {
        let evals = [
            C64::new(0.9, 0.1),
            C64::new(1.0, 0.0),
            C64::new(0.5, 0.0),
            C64::new(0.9999, 0.0),
        ];
        assert_eq!(background_modes(&evals, 1e-3), vec![1, 3]);
    }

    #[test]
    fn test_background_modes_fallback() {
        let evals = [C64::new(0.5, 0.0), C64::new(0.0, 0.8)];
        assert_eq!(background_modes(&evals, 1e-3), vec![0]);
        assert!(background_modes(&[], 1e-3).is_empty());
    }

    #[test]
    fn test_rotating_mode_is_not_background() {
        let theta = 0.1_f64;
        let evals = [C64::new(theta.cos(), theta.sin())];
        // |ln λ| = θ even though |λ| = 1
        assert_eq!(background_modes(&evals, 1e-3), vec![0]);
        assert!(evals[0].ln().norm() > 1e-3);
    }

    #[test]
    fn test_foreground_mask() {
        assert_eq!(
            foreground_mask(&[0.0, 1e-3, 1e-4, 0.2], 5e-4),
            vec![false, true, false, true]
        );
    }

    #[test]
    fn test_static_scene_has_empty_foreground() {
        let frame: Vec<f64> = (0..20).map(|i| 1.0 + (i as f64 * 0.3).sin()).collect();
        let mut sub = BackgroundSubtractor::new(
            StreamingConfig {
                max_hist: Some(5),
                max_rank: Some(10),
                ..Default::default()
            },
            SegmentationConfig::default(),
        )
        .unwrap();

        assert!(sub.push_frame(&frame).unwrap().is_none());
        assert!(sub.push_frame(&frame).unwrap().is_none());
        for _ in 0..8 {
            let split = sub.push_frame(&frame).unwrap().unwrap();
            assert_eq!(split.background_modes, vec![0]);
            let bg_norm: f64 = split.background.iter().map(|v| v * v).sum::<f64>().sqrt();
            assert_near(bg_norm, 1.0, 1e-10);
            assert!(sub.mask(&split).iter().all(|&m| !m));
        }
        assert_eq!(sub.errors().len(), 8);
        assert!(sub.errors().iter().all(|&e| e < 1e-10));
        assert!(sub.dmd().width() <= 5);
    }

    #[test]
    fn test_split_invariants_on_changing_scene() {
        let mut sub = BackgroundSubtractor::new(
            StreamingConfig {
                max_hist: Some(5),
                ..Default::default()
            },
            SegmentationConfig::default(),
        )
        .unwrap();
        for t in 0..10 {
            let frame: Vec<f64> = (0..16)
                .map(|i| 2.0 + if i == t { 1.0 } else { 0.0 } + (i as f64 * 0.7).cos() * 0.1)
                .collect();
            if let Some(split) = sub.push_frame(&frame).unwrap() {
                assert_eq!(split.foreground.len(), 16);
                assert!(!split.background_modes.is_empty());
                assert!(split.residuals.windows(2).all(|w| w[0] <= w[1]));
                assert!(split.foreground.iter().all(|&v| v >= 0.0));
            }
        }
        assert_eq!(sub.errors().len(), 8);
    }

    #[test]
    fn test_stream_advances_past_unseparable_frames() {
        // A static run, then a spike that moves one pixel per frame.
        let frame = |spike: Option<usize>| -> Vec<f64> {
            (0..16)
                .map(|i| 1.0 + 0.1 * i as f64 + if Some(i) == spike { 2.0 } else { 0.0 })
                .collect()
        };
        let mut frames = vec![frame(None); 4];
        frames.extend((0..11).map(|t| frame(Some(t))));

        let mut sub = BackgroundSubtractor::new(
            StreamingConfig {
                max_hist: Some(5),
                max_rank: Some(10),
                ..Default::default()
            },
            SegmentationConfig::default(),
        )
        .unwrap();

        let mut outcomes = Vec::new();
        for raw in &frames {
            let outcome = sub.push_frame(raw);
            let mut expected = raw.clone();
            normalize(&mut expected).unwrap();
            // Recorded whether or not the split succeeded.
            assert_eq!(sub.previous.as_ref(), Some(&expected));
            outcomes.push(outcome.is_ok());
        }

        assert_eq!(sub.dmd().len(), 5);
        assert!(outcomes[outcomes.len() - 3..].iter().all(|&ok| ok));
        assert_eq!(
            sub.errors().len(),
            outcomes[2..].iter().filter(|&&ok| ok).count()
        );
    }

    #[test]
    fn test_zero_frame_rejected() {
        let mut sub =
            BackgroundSubtractor::new(StreamingConfig::default(), SegmentationConfig::default())
                .unwrap();
        assert!(matches!(
            sub.push_frame(&[0.0, 0.0]),
            Err(DmdError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_invalid_segmentation_config() {
        let config = SegmentationConfig {
            background_tol: 0.0,
            ..Default::default()
        };
        assert!(BackgroundSubtractor::new(StreamingConfig::default(), config).is_err());
    }
}
