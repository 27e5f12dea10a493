//! # dmd-segmentation
//!
//! Dynamic Mode Decomposition engines for separating stationary background
//! from transient foreground in streams of state vectors.
//!
//! - **Batch DMD** ([`BatchDmd`]): truncated SVD over the whole history
//! - **Randomized DMD** ([`RandomizedDmd`]): the same algorithm on a random
//!   range sketch, compressed lazily on first use
//! - **Streaming DMD** ([`StreamingDmd`]): incremental QR factorization with
//!   a sliding window and adaptive forgetting
//! - **Reconstruction** ([`reconstruct()`]): Vandermonde amplitude fit of a
//!   set of modes
//! - **Segmentation** ([`BackgroundSubtractor`], [`separate`]): background
//!   mode selection and background/foreground split
//!
//! All three engines implement [`DmdEngine`].
//!
//! ## Quick Start
//!
//! ```rust
//! use dmd_segmentation::{StreamingConfig, StreamingDmd};
//!
//! // Rotation by a fixed angle in the plane
//! let theta = 0.3_f64;
//! let states: Vec<Vec<f64>> = (0..10)
//!     .map(|t| vec![(theta * t as f64).cos(), (theta * t as f64).sin()])
//!     .collect();
//!
//! let mut dmd = StreamingDmd::new(StreamingConfig {
//!     max_hist: Some(6),
//!     ..Default::default()
//! })
//! .unwrap();
//! for pair in states.windows(2) {
//!     dmd.update(&pair[0], &pair[1]).unwrap();
//! }
//!
//! let ranked = dmd.residuals().unwrap();
//! for lambda in &ranked.spectrum.eigenvalues {
//!     assert!((lambda.norm() - 1.0).abs() < 1e-8);
//!     assert!((lambda.arg().abs() - theta).abs() < 1e-8);
//! }
//! ```
//!
//! ## References
//!
//! - Schmid (2010), *J. Fluid Mech.*, 656, 5-28
//! - Hemati, Williams & Rowley (2014), *Phys. Fluids*, 26, 111701
//! - Erichson et al. (2019), *J. Comput. Dyn.*, 6(2), 229-254
//! - Kutz et al. (2016), *Dynamic Mode Decomposition*, SIAM

pub mod types;
pub mod utils;

pub mod analysis;
pub mod dmd;
pub mod engine;
pub mod history;
pub mod qr;
pub mod randomized;
pub mod reconstruct;
pub mod segmentation;
pub mod spectrum;
pub mod streaming;

pub use analysis::{mode_info, stability, ModeInfo, Stability, StabilityResult};
pub use dmd::{BatchConfig, BatchDmd};
pub use engine::{prediction_error, DmdEngine};
pub use history::{Capacity, History, SnapshotPair};
pub use qr::IncrementalQr;
pub use randomized::{RandomizedConfig, RandomizedDmd};
pub use reconstruct::{fit_amplitudes, reconstruct, Reconstruction};
pub use segmentation::{
    background_modes, foreground_mask, separate, BackgroundSubtractor, FrameSplit,
    SegmentationConfig,
};
pub use streaming::{AdaptiveReset, StreamingConfig, StreamingDmd};
pub use types::{DmdError, ModeResiduals, Spectrum, TruncatedBasis, C64};
