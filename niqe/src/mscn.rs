//! Mean Subtracted Contrast Normalized transform.
//!
//! Locally whitens a frame: each sample has the Gaussian-weighted local mean
//! subtracted and is divided by the local standard deviation plus a small
//! stabilizing constant.

use crate::plane::Plane;

/// Border extension used by the separable window filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Border {
    /// Extend with a fixed value outside the frame.
    Constant(f32),
    /// Repeat the edge sample outside the frame.
    Replicate,
}

impl Default for Border {
    fn default() -> Self {
        Self::Constant(0.0)
    }
}

pub(crate) const DEFAULT_RADIUS: usize = 3;
pub(crate) const DEFAULT_SIGMA: f64 = 7.0 / 6.0;

/// Stabilizing constant added to the local standard deviation.
pub const DEFAULT_C: f32 = 1.0;

/// Output of the local-contrast normalization.
#[derive(Debug, Clone)]
pub struct MscnMaps {
    /// Locally normalized coefficients, same shape as the input.
    pub mscn: Plane,
    /// Local standard deviation map.
    pub sigma: Plane,
    /// Local mean map.
    pub mu: Plane,
}

/// Discretized Gaussian window of `2 * radius + 1` taps, normalized to sum 1.
#[must_use]
pub fn gaussian_window(radius: usize, sigma: f64) -> Vec<f32> {
    let taps: Vec<f64> = (-(radius as isize)..=radius as isize)
        .map(|i| (-0.5 * (i * i) as f64 / (sigma * sigma)).exp())
        .collect();
    let sum: f64 = taps.iter().sum();
    taps.iter().map(|t| (t / sum) as f32).collect()
}

/// Applies the MSCN transform with the default window (radius 3, sigma 7/6),
/// constant C = 1 and constant-zero border extension.
#[must_use]
pub fn transform(frame: &Plane) -> MscnMaps {
    transform_with(
        frame,
        &gaussian_window(DEFAULT_RADIUS, DEFAULT_SIGMA),
        DEFAULT_C,
        Border::default(),
    )
}

/// Applies the MSCN transform with an explicit window, constant and border.
///
/// The local variance is clamped to zero before the square root, so the
/// output is free of NaN/Inf for any finite input as long as `c > 0`.
///
/// # Panics
/// If the window length is even or zero.
#[must_use]
pub fn transform_with(frame: &Plane, window: &[f32], c: f32, border: Border) -> MscnMaps {
    assert!(
        window.len() % 2 == 1,
        "window must have an odd number of taps"
    );

    let width = frame.width();
    let height = frame.height();

    let mu = separable(frame.data(), width, height, window, border);
    let squared: Vec<f32> = frame.data().iter().map(|&v| v * v).collect();
    let mu_sq = separable(&squared, width, height, window, border);

    let mut sigma = vec![0f32; width * height];
    let mut mscn = vec![0f32; width * height];
    for i in 0..width * height {
        let var = mu[i].mul_add(-mu[i], mu_sq[i]).max(0f32);
        sigma[i] = var.sqrt();
        mscn[i] = (frame.data()[i] - mu[i]) / (sigma[i] + c);
    }

    MscnMaps {
        mscn: Plane::from_raw(mscn, width, height),
        sigma: Plane::from_raw(sigma, width, height),
        mu: Plane::from_raw(mu, width, height),
    }
}

/// Separable correlation: the window applied along rows, then columns.
fn separable(
    input: &[f32],
    width: usize,
    height: usize,
    window: &[f32],
    border: Border,
) -> Vec<f32> {
    let mut tmp = vec![0f32; width * height];
    filter_rows(input, &mut tmp, width, window, border);
    let mut out = vec![0f32; width * height];
    filter_cols(&tmp, &mut out, width, height, window, border);
    out
}

#[cfg(feature = "rayon")]
fn filter_rows(input: &[f32], output: &mut [f32], width: usize, window: &[f32], border: Border) {
    use rayon::iter::{IndexedParallelIterator, ParallelIterator};
    use rayon::prelude::ParallelSliceMut;
    use rayon::slice::ParallelSlice;

    input
        .par_chunks_exact(width)
        .zip(output.par_chunks_exact_mut(width))
        .for_each(|(row_in, row_out)| filter_row(row_in, row_out, window, border));
}

#[cfg(not(feature = "rayon"))]
fn filter_rows(input: &[f32], output: &mut [f32], width: usize, window: &[f32], border: Border) {
    for (row_in, row_out) in input
        .chunks_exact(width)
        .zip(output.chunks_exact_mut(width))
    {
        filter_row(row_in, row_out, window, border);
    }
}

fn filter_row(input: &[f32], output: &mut [f32], window: &[f32], border: Border) {
    let radius = (window.len() / 2) as isize;
    let len = input.len() as isize;
    for (x, out) in output.iter_mut().enumerate() {
        let mut acc = 0f32;
        for (k, &wk) in window.iter().enumerate() {
            let pos = x as isize + k as isize - radius;
            acc = wk.mul_add(sample(input, pos, len, border), acc);
        }
        *out = acc;
    }
}

#[inline]
fn sample(data: &[f32], pos: isize, len: isize, border: Border) -> f32 {
    if pos >= 0 && pos < len {
        data[pos as usize]
    } else {
        match border {
            Border::Constant(value) => value,
            Border::Replicate => data[pos.clamp(0, len - 1) as usize],
        }
    }
}

#[cfg(feature = "rayon")]
fn filter_cols(
    input: &[f32],
    output: &mut [f32],
    width: usize,
    height: usize,
    window: &[f32],
    border: Border,
) {
    use rayon::iter::{IndexedParallelIterator, ParallelIterator};
    use rayon::prelude::ParallelSliceMut;

    output
        .par_chunks_exact_mut(width)
        .enumerate()
        .for_each(|(y, row_out)| col_row(input, row_out, y, width, height, window, border));
}

#[cfg(not(feature = "rayon"))]
fn filter_cols(
    input: &[f32],
    output: &mut [f32],
    width: usize,
    height: usize,
    window: &[f32],
    border: Border,
) {
    for (y, row_out) in output.chunks_exact_mut(width).enumerate() {
        col_row(input, row_out, y, width, height, window, border);
    }
}

/// One output row of the column pass, accumulated row-at-a-time so the
/// traversal stays cache friendly.
#[allow(clippy::too_many_arguments)]
fn col_row(
    input: &[f32],
    row_out: &mut [f32],
    y: usize,
    width: usize,
    height: usize,
    window: &[f32],
    border: Border,
) {
    let radius = (window.len() / 2) as isize;
    row_out.fill(0f32);
    for (k, &wk) in window.iter().enumerate() {
        let pos = y as isize + k as isize - radius;
        if pos >= 0 && (pos as usize) < height {
            let row_in = &input[pos as usize * width..][..width];
            for (out, &v) in row_out.iter_mut().zip(row_in) {
                *out = wk.mul_add(v, *out);
            }
        } else {
            match border {
                Border::Constant(value) => {
                    for out in row_out.iter_mut() {
                        *out = wk.mul_add(value, *out);
                    }
                }
                Border::Replicate => {
                    let clamped = pos.clamp(0, height as isize - 1) as usize;
                    let row_in = &input[clamped * width..][..width];
                    for (out, &v) in row_out.iter_mut().zip(row_in) {
                        *out = wk.mul_add(v, *out);
                    }
                }
            }
        }
    }
}
