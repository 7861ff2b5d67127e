//! Factor-of-two downsampling for the half-resolution pyramid level.

use crate::plane::Plane;

/// Catmull-Rom (a = -0.5) taps for a 2x decimation, evaluated at the
/// half-phase offsets -3.5..3.5 and normalized to sum 1. Every tap is an
/// exact binary fraction, so the interior weight sum is exactly 1.
const KERNEL: [f32; 8] = [
    -0.011_718_75,
    -0.035_156_25,
    0.113_281_25,
    0.433_593_75,
    0.433_593_75,
    0.113_281_25,
    -0.035_156_25,
    -0.011_718_75,
];

/// Downscales a plane by exactly 2 in both dimensions with the separable
/// bicubic-equivalent kernel above. Windows that overlap the frame edge are
/// clipped and their weights renormalized.
///
/// Substituting a different resampling filter changes feature values and
/// therefore scores against a given reference model.
#[must_use]
pub(crate) fn downscale_by_2(src: &Plane) -> Plane {
    let out_width = src.width() / 2;
    let out_height = src.height() / 2;

    let mut tmp = vec![0f32; out_width * src.height()];
    for (y, row) in src.data().chunks_exact(src.width()).enumerate() {
        downscale_row(row, &mut tmp[y * out_width..][..out_width]);
    }

    let mut out = vec![0f32; out_width * out_height];
    downscale_cols(&tmp, &mut out, out_width, src.height(), out_height);
    Plane::from_raw(out, out_width, out_height)
}

fn downscale_row(input: &[f32], output: &mut [f32]) {
    let len = input.len() as isize;
    for (j, out) in output.iter_mut().enumerate() {
        let start = 2 * j as isize - 3;
        let mut acc = 0f32;
        let mut weight_sum = 0f32;
        for (k, &wk) in KERNEL.iter().enumerate() {
            let pos = start + k as isize;
            if pos >= 0 && pos < len {
                acc = wk.mul_add(input[pos as usize], acc);
                weight_sum += wk;
            }
        }
        *out = acc / weight_sum;
    }
}

fn downscale_cols(
    input: &[f32],
    output: &mut [f32],
    width: usize,
    in_height: usize,
    out_height: usize,
) {
    for i in 0..out_height {
        let start = 2 * i as isize - 3;
        let row_out = &mut output[i * width..][..width];
        row_out.fill(0f32);
        let mut weight_sum = 0f32;
        for (k, &wk) in KERNEL.iter().enumerate() {
            let pos = start + k as isize;
            if pos >= 0 && (pos as usize) < in_height {
                let row_in = &input[pos as usize * width..][..width];
                for (out, &v) in row_out.iter_mut().zip(row_in) {
                    *out = wk.mul_add(v, *out);
                }
                weight_sum += wk;
            }
        }
        for out in row_out.iter_mut() {
            *out /= weight_sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{downscale_by_2, KERNEL};
    use crate::plane::Plane;

    #[test]
    fn kernel_is_normalized() {
        let sum: f32 = KERNEL.iter().sum();
        assert!((sum - 1.0).abs() < 1e-7);
    }

    #[test]
    fn constant_plane_stays_constant() {
        let src = Plane::from_raw(vec![5.0; 16 * 16], 16, 16);
        let half = downscale_by_2(&src);
        assert_eq!(half.width(), 8);
        assert_eq!(half.height(), 8);
        for &v in half.data() {
            assert!((v - 5.0).abs() < 1e-5);
        }
    }

    #[test]
    fn linear_ramp_is_reproduced_in_the_interior() {
        // Catmull-Rom has linear precision: interior output j samples the
        // ramp at input coordinate 2j + 0.5.
        let width = 32;
        let data: Vec<f32> = (0..width * 8)
            .map(|i| (i % width) as f32)
            .collect();
        let half = downscale_by_2(&Plane::from_raw(data, width, 8));
        for j in 2..half.width() - 2 {
            let expected = 2.0 * j as f32 + 0.5;
            let got = half.data()[2 * half.width() + j];
            assert!((got - expected).abs() < 1e-4, "col {j}: {got} vs {expected}");
        }
    }

    #[test]
    fn output_dimensions_are_halved() {
        let src = Plane::from_raw(vec![0.0; 96 * 192], 96, 192);
        let half = downscale_by_2(&src);
        assert_eq!((half.width(), half.height()), (48, 96));
    }
}
