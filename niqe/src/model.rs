//! Pretrained population statistics consumed by the scorer.

use std::path::Path;

use nalgebra::{DMatrix, DVector};

use crate::NiqeError;

const MAGIC: [u8; 4] = *b"NIQM";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 16;

/// Immutable population mean and covariance for one patch size.
///
/// Loaded once and shared read-only by every scoring call. The artifact
/// layout is little-endian: `"NIQM"`, version `u32`, patch size `u32`,
/// dimension `u32`, then `dim` mean values and `dim * dim` row-major
/// covariance values as `f64`.
#[derive(Debug, Clone)]
pub struct ReferenceModel {
    patch_size: usize,
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
}

impl ReferenceModel {
    /// The model bundled with the crate, fit for patch size 96.
    #[must_use]
    pub fn bundled() -> Self {
        Self::from_bytes(include_bytes!("../data/model_p96.bin")).expect("bundled model is valid")
    }

    /// Builds a model from in-memory parts, e.g. one trained elsewhere or a
    /// small synthetic model in tests.
    ///
    /// # Errors
    /// - [`NiqeError::InvalidPatchSize`] for a zero or odd patch size
    /// - [`NiqeError::MalformedModel`] when the covariance is not square with
    ///   the mean's dimension
    pub fn from_parts(
        patch_size: usize,
        mean: DVector<f64>,
        covariance: DMatrix<f64>,
    ) -> Result<Self, NiqeError> {
        if patch_size == 0 || patch_size % 2 != 0 {
            return Err(NiqeError::InvalidPatchSize(patch_size));
        }
        let dim = mean.len();
        if covariance.nrows() != dim || covariance.ncols() != dim {
            return Err(NiqeError::MalformedModel(format!(
                "covariance is {}x{}, expected {dim}x{dim}",
                covariance.nrows(),
                covariance.ncols()
            )));
        }
        Ok(Self {
            patch_size,
            mean,
            covariance,
        })
    }

    /// Parses the binary artifact format.
    ///
    /// # Errors
    /// [`NiqeError::MalformedModel`] on a bad magic, unsupported version or
    /// size mismatch; [`NiqeError::InvalidPatchSize`] for a zero or odd
    /// declared patch size.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NiqeError> {
        if bytes.len() < HEADER_LEN {
            return Err(NiqeError::MalformedModel("truncated header".into()));
        }
        if bytes[..4] != MAGIC {
            return Err(NiqeError::MalformedModel("bad magic".into()));
        }
        let version = read_u32(bytes, 4);
        if version != VERSION {
            return Err(NiqeError::MalformedModel(format!(
                "unsupported version {version}"
            )));
        }
        let patch_size = read_u32(bytes, 8) as usize;
        let dim = read_u32(bytes, 12) as usize;
        if dim == 0 {
            return Err(NiqeError::MalformedModel("zero dimension".into()));
        }
        let expected = HEADER_LEN + 8 * (dim + dim * dim);
        if bytes.len() != expected {
            return Err(NiqeError::MalformedModel(format!(
                "expected {expected} bytes, got {}",
                bytes.len()
            )));
        }

        let mut values = bytes[HEADER_LEN..]
            .chunks_exact(8)
            .map(|chunk| f64::from_le_bytes(chunk.try_into().expect("chunk is 8 bytes")));
        let mean = DVector::from_iterator(dim, values.by_ref().take(dim));
        let covariance = DMatrix::from_row_iterator(dim, dim, values);
        Self::from_parts(patch_size, mean, covariance)
    }

    /// Reads and parses an artifact from disk.
    ///
    /// # Errors
    /// [`NiqeError::Io`] when the file cannot be read, plus everything
    /// [`Self::from_bytes`] reports.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, NiqeError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Patch size the population statistics were fit at.
    #[must_use]
    pub fn patch_size(&self) -> usize {
        self.patch_size
    }

    /// Length of the population mean vector.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    #[must_use]
    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    #[must_use]
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(
        bytes[offset..offset + 4]
            .try_into()
            .expect("slice is 4 bytes"),
    )
}

#[cfg(test)]
mod tests {
    use super::ReferenceModel;
    use crate::NiqeError;
    use nalgebra::{DMatrix, DVector};

    #[test]
    fn bundled_model_parses_with_the_documented_shape() {
        let model = ReferenceModel::bundled();
        assert_eq!(model.patch_size(), 96);
        assert_eq!(model.dimension(), 36);
        assert_eq!(model.covariance().nrows(), 36);
        assert_eq!(model.covariance().ncols(), 36);
    }

    #[test]
    fn bundled_covariance_is_symmetric() {
        let model = ReferenceModel::bundled();
        let cov = model.covariance();
        for i in 0..cov.nrows() {
            for j in 0..i {
                assert!((cov[(i, j)] - cov[(j, i)]).abs() < 1e-12);
            }
            assert!(cov[(i, i)] > 0.0);
        }
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = include_bytes!("../data/model_p96.bin").to_vec();
        bytes[0] = b'X';
        assert!(matches!(
            ReferenceModel::from_bytes(&bytes),
            Err(NiqeError::MalformedModel(_))
        ));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let bytes = include_bytes!("../data/model_p96.bin");
        assert!(matches!(
            ReferenceModel::from_bytes(&bytes[..bytes.len() - 8]),
            Err(NiqeError::MalformedModel(_))
        ));
    }

    #[test]
    fn odd_patch_size_is_rejected() {
        let err = ReferenceModel::from_parts(95, DVector::zeros(4), DMatrix::zeros(4, 4));
        assert!(matches!(err, Err(NiqeError::InvalidPatchSize(95))));
    }

    #[test]
    fn covariance_shape_mismatch_is_rejected() {
        let err = ReferenceModel::from_parts(96, DVector::zeros(4), DMatrix::zeros(4, 5));
        assert!(matches!(err, Err(NiqeError::MalformedModel(_))));
    }
}
