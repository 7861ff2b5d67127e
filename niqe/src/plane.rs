use num_traits::AsPrimitive;

/// A single grayscale frame: row-major `f32` samples plus dimensions.
///
/// The bundled reference model was fit against 8-bit luma in the 0-255 range;
/// the type itself imposes no range.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    data: Vec<f32>,
    width: usize,
    height: usize,
}

impl Plane {
    /// Builds a plane from row-major samples.
    ///
    /// # Panics
    /// If `data.len() != width * height`.
    #[must_use]
    pub fn from_raw(data: Vec<f32>, width: usize, height: usize) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "sample count must match dimensions"
        );
        Self {
            data,
            width,
            height,
        }
    }

    /// Builds a plane from any primitive sample type, e.g. 8-bit luma.
    ///
    /// # Panics
    /// If `samples.len() != width * height`.
    #[must_use]
    pub fn from_samples<T: AsPrimitive<f32>>(samples: &[T], width: usize, height: usize) -> Self {
        assert_eq!(
            samples.len(),
            width * height,
            "sample count must match dimensions"
        );
        Self {
            data: samples.iter().map(|s| s.as_()).collect(),
            width,
            height,
        }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Row-major samples.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub(crate) fn row(&self, y: usize) -> &[f32] {
        &self.data[y * self.width..][..self.width]
    }

    /// Copies the top-left `width x height` region.
    pub(crate) fn crop(&self, width: usize, height: usize) -> Self {
        assert!(width <= self.width && height <= self.height);
        if width == self.width && height == self.height {
            return self.clone();
        }
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            data.extend_from_slice(&self.row(y)[..width]);
        }
        Self {
            data,
            width,
            height,
        }
    }
}
