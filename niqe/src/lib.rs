//! Rust implementation of the NIQE no-reference image quality metric.
//!
//! NIQE scores a single grayscale frame against pretrained natural-scene
//! statistics; no reference image is needed and lower scores are better.

#![deny(clippy::all)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::exit)]
#![warn(clippy::map_err_ignore)]
#![warn(clippy::mem_forget)]
#![warn(clippy::mod_module_files)]
#![warn(clippy::rest_pat_in_fully_bound_structs)]
#![warn(clippy::undocumented_unsafe_blocks)]
#![warn(clippy::unnecessary_self_imports)]
#![warn(clippy::use_debug)]
#![warn(clippy::verbose_file_reads)]

mod aggd;
mod features;
mod model;
pub mod mscn;
mod plane;
mod resize;

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

pub use aggd::{AggdFit, ShapeTable};
pub use features::{PATCH_FEATURES, SUBBAND_FEATURES};
pub use model::ReferenceModel;
pub use plane::Plane;

/// Errors produced by scoring or model loading.
#[derive(Debug, Error)]
pub enum NiqeError {
    /// The patch grid needs both dimensions strictly greater than
    /// `2 * patch_size + 1`.
    #[error("frame is {width}x{height} but both dimensions must exceed {min} pixels")]
    FrameTooSmall {
        width: usize,
        height: usize,
        min: usize,
    },
    /// Patch sizes must be even so the half-resolution scale tiles evenly.
    #[error("patch size must be an even, nonzero number of pixels, got {0}")]
    InvalidPatchSize(usize),
    /// The model artifact could not be parsed.
    #[error("malformed reference model: {0}")]
    MalformedModel(String),
    /// The model was fit for a different feature dimension.
    #[error("reference model dimension is {model}, the scorer produces {features} features")]
    DimensionMismatch { model: usize, features: usize },
    /// The model artifact could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Relative singular values below this are zeroed by the pseudo-inverse.
const PINV_EPS: f64 = 1e-10;

/// NIQE scorer: a shape lookup table plus a population reference model.
///
/// Both members are write-once-then-read-only, so one scorer can be shared
/// freely across threads scoring different frames.
#[derive(Debug, Clone)]
pub struct Niqe {
    table: ShapeTable,
    model: ReferenceModel,
}

impl Niqe {
    /// Scorer over the bundled reference model (patch size 96).
    #[must_use]
    pub fn new() -> Self {
        Self::with_model(ReferenceModel::bundled())
    }

    /// Scorer over a caller-supplied model.
    #[must_use]
    pub fn with_model(model: ReferenceModel) -> Self {
        Self {
            table: ShapeTable::new(),
            model,
        }
    }

    #[must_use]
    pub fn model(&self) -> &ReferenceModel {
        &self.model
    }

    /// Computes the NIQE score for one grayscale frame. Lower is better.
    ///
    /// # Errors
    /// - [`NiqeError::FrameTooSmall`] if either dimension is not strictly
    ///   greater than `2 * patch_size + 1`
    /// - [`NiqeError::DimensionMismatch`] if the model dimension does not
    ///   match the 36 features produced per patch
    pub fn score(&self, frame: &Plane) -> Result<f64, NiqeError> {
        let patch_size = self.model.patch_size();
        let min = 2 * patch_size + 1;
        if frame.width() <= min || frame.height() <= min {
            return Err(NiqeError::FrameTooSmall {
                width: frame.width(),
                height: frame.height(),
                min,
            });
        }
        if self.model.dimension() != PATCH_FEATURES {
            return Err(NiqeError::DimensionMismatch {
                model: self.model.dimension(),
                features: PATCH_FEATURES,
            });
        }

        let rows = features::collect_patch_features(frame, patch_size, &self.table);
        Ok(self.score_features(&rows))
    }

    /// Mahalanobis-style distance between the sample statistics and the
    /// population model, with a pooled covariance inverted via SVD so
    /// ill-conditioned cases (few patches, flat content) stay well-defined.
    fn score_features(&self, rows: &[[f64; PATCH_FEATURES]]) -> f64 {
        // the frame-size check guarantees at least a 2x2 patch grid
        let count = rows.len() as f64;

        let mut sample_mean = DVector::zeros(PATCH_FEATURES);
        for row in rows {
            for (i, &v) in row.iter().enumerate() {
                sample_mean[i] += v;
            }
        }
        sample_mean /= count;

        let mut sample_cov = DMatrix::zeros(PATCH_FEATURES, PATCH_FEATURES);
        for row in rows {
            let diff = DVector::from_row_slice(row) - &sample_mean;
            sample_cov += &diff * diff.transpose();
        }
        sample_cov /= count - 1.0;

        let pooled = (self.model.covariance() + sample_cov) * 0.5;
        let pinv = pooled
            .pseudo_inverse(PINV_EPS)
            .expect("epsilon is non-negative");

        let diff = sample_mean - self.model.mean();
        let quad = (diff.transpose() * pinv * &diff)[(0, 0)];
        quad.max(0.0).sqrt()
    }
}

impl Default for Niqe {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the NIQE score of `frame` with the bundled reference model.
///
/// Builds a fresh scorer per call; reuse a [`Niqe`] when scoring many frames.
///
/// # Errors
/// Same as [`Niqe::score`].
pub fn compute_frame_niqe(frame: &Plane) -> Result<f64, NiqeError> {
    Niqe::new().score(frame)
}
