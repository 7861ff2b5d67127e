//! Patch-level features: pairwise products, per-patch AGGD statistics, and
//! the two-scale aggregation producing the per-frame feature matrix.

use crate::aggd::{AggdFit, ShapeTable};
use crate::mscn;
use crate::plane::Plane;
use crate::resize;

/// Feature count contributed by one scale of one patch.
pub const SUBBAND_FEATURES: usize = 18;

/// Feature count of a full two-scale patch row.
pub const PATCH_FEATURES: usize = 2 * SUBBAND_FEATURES;

/// MSCN patch variance at or below this is treated as flat.
const VARIANCE_FLOOR: f64 = 1e-10;

/// Collects the `patches x 36` feature matrix for one frame: MSCN at full and
/// half resolution, tiled into non-overlapping blocks in row-major order,
/// block `i` of each scale concatenated into one row.
///
/// The caller is responsible for rejecting frames too small for the patch
/// grid; by the time this runs the cropped frame holds at least one full
/// patch per axis.
pub(crate) fn collect_patch_features(
    frame: &Plane,
    patch_size: usize,
    table: &ShapeTable,
) -> Vec<[f64; PATCH_FEATURES]> {
    debug_assert!(patch_size > 0 && patch_size % 2 == 0);

    let cropped_width = frame.width() - frame.width() % patch_size;
    let cropped_height = frame.height() - frame.height() % patch_size;
    let cropped = frame.crop(cropped_width, cropped_height);
    let half = resize::downscale_by_2(&cropped);

    let full_maps = mscn::transform(&cropped);
    let half_maps = mscn::transform(&half);

    let full = patch_features(&full_maps.mscn, patch_size, table);
    let halved = patch_features(&half_maps.mscn, patch_size / 2, table);
    debug_assert_eq!(full.len(), halved.len());

    full.into_iter()
        .zip(halved)
        .map(|(first, second)| {
            let mut row = [0f64; PATCH_FEATURES];
            row[..SUBBAND_FEATURES].copy_from_slice(&first);
            row[SUBBAND_FEATURES..].copy_from_slice(&second);
            row
        })
        .collect()
}

#[cfg(feature = "rayon")]
fn patch_features(
    map: &Plane,
    patch: usize,
    table: &ShapeTable,
) -> Vec<[f64; SUBBAND_FEATURES]> {
    use rayon::iter::{IntoParallelIterator, ParallelIterator};

    let cols = map.width() / patch;
    let rows = map.height() / patch;
    (0..rows * cols)
        .into_par_iter()
        .map(|i| block_features(map, patch, i / cols, i % cols, table))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn patch_features(
    map: &Plane,
    patch: usize,
    table: &ShapeTable,
) -> Vec<[f64; SUBBAND_FEATURES]> {
    let cols = map.width() / patch;
    let rows = map.height() / patch;
    (0..rows * cols)
        .map(|i| block_features(map, patch, i / cols, i % cols, table))
        .collect()
}

fn block_features(
    map: &Plane,
    patch: usize,
    block_row: usize,
    block_col: usize,
    table: &ShapeTable,
) -> [f64; SUBBAND_FEATURES] {
    let block = extract_block(map, patch, block_row, block_col);

    // Flat blocks cannot support a fit; flag them with the deterministic
    // degenerate-limit row so the patch grid and scale pairing stay intact.
    if variance(&block) <= VARIANCE_FLOOR {
        return degenerate_row(table);
    }

    let mscn_fit = table.fit(&block);
    let (alpha_m, _, beta_left_m, beta_right_m) = finite_params(&mscn_fit, table);

    let mut out = [0f64; SUBBAND_FEATURES];
    out[0] = alpha_m;
    out[1] = 0.5 * (beta_left_m + beta_right_m);
    for (slot, product) in paired_products(&block, patch).iter().enumerate() {
        let fit = table.fit(product);
        let (alpha, asymmetry, beta_left, beta_right) = finite_params(&fit, table);
        let base = 2 + slot * 4;
        out[base] = alpha;
        out[base + 1] = asymmetry;
        out[base + 2] = beta_left;
        out[base + 3] = beta_right;
    }
    out
}

fn extract_block(map: &Plane, patch: usize, block_row: usize, block_col: usize) -> Vec<f32> {
    let mut block = Vec::with_capacity(patch * patch);
    for y in 0..patch {
        let row = map.row(block_row * patch + y);
        block.extend_from_slice(&row[block_col * patch..][..patch]);
    }
    block
}

/// Elementwise products of a block with its four one-pixel circular shifts:
/// right, down, down-right and down-left. Border samples wrap to the opposite
/// edge; the wraparound is intentional and kept for reference-model
/// compatibility.
fn paired_products(block: &[f32], size: usize) -> [Vec<f32>; 4] {
    let count = size * size;
    let mut horizontal = vec![0f32; count];
    let mut vertical = vec![0f32; count];
    let mut diagonal = vec![0f32; count];
    let mut anti_diagonal = vec![0f32; count];

    for y in 0..size {
        let up = (y + size - 1) % size;
        for x in 0..size {
            let left = (x + size - 1) % size;
            let right = (x + 1) % size;
            let i = y * size + x;
            let center = block[i];
            horizontal[i] = block[y * size + left] * center;
            vertical[i] = block[up * size + x] * center;
            diagonal[i] = block[up * size + left] * center;
            anti_diagonal[i] = block[up * size + right] * center;
        }
    }

    [horizontal, vertical, diagonal, anti_diagonal]
}

/// Maps a fit onto feature values, substituting the degenerate-limit values
/// when the fit carries the infinite-shape sentinel so that infinities never
/// reach the covariance step.
fn finite_params(fit: &AggdFit, table: &ShapeTable) -> (f64, f64, f64, f64) {
    if fit.is_degenerate() {
        (table.first_shape(), 0.0, 0.0, 0.0)
    } else {
        (fit.alpha, fit.asymmetry, fit.beta_left, fit.beta_right)
    }
}

fn degenerate_row(table: &ShapeTable) -> [f64; SUBBAND_FEATURES] {
    let mut row = [0f64; SUBBAND_FEATURES];
    row[0] = table.first_shape();
    for slot in 0..4 {
        row[2 + slot * 4] = table.first_shape();
    }
    row
}

fn variance(data: &[f32]) -> f64 {
    let count = data.len() as f64;
    let mut sum = 0f64;
    let mut sum_sq = 0f64;
    for &v in data {
        let v = f64::from(v);
        sum += v;
        sum_sq += v * v;
    }
    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::{
        collect_patch_features, degenerate_row, paired_products, patch_features,
        PATCH_FEATURES, SUBBAND_FEATURES,
    };
    use crate::aggd::ShapeTable;
    use crate::plane::Plane;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn paired_products_wrap_at_the_block_border() {
        let block: Vec<f32> = (1..=9).map(|v| v as f32).collect();
        let [horizontal, vertical, diagonal, anti_diagonal] = paired_products(&block, 3);

        // interior: each sample pairs with its left/up neighbor
        assert_eq!(horizontal[5], 5.0 * 6.0);
        assert_eq!(vertical[4], 2.0 * 5.0);
        assert_eq!(diagonal[8], 5.0 * 9.0);
        assert_eq!(anti_diagonal[4], 3.0 * 5.0);

        // border: the shift wraps to the opposite edge
        assert_eq!(horizontal[0], 3.0 * 1.0);
        assert_eq!(vertical[1], 8.0 * 2.0);
        assert_eq!(diagonal[0], 9.0 * 1.0);
        assert_eq!(anti_diagonal[2], 7.0 * 3.0);
    }

    #[test]
    fn feature_rows_have_the_fixed_width() {
        assert_eq!(SUBBAND_FEATURES, 18);
        assert_eq!(PATCH_FEATURES, 36);
    }

    #[test]
    fn full_and_half_scale_tile_counts_pair_up() {
        let mut rng = StdRng::seed_from_u64(23);
        let data: Vec<f32> = (0..384 * 384).map(|_| rng.gen_range(0.0f32..255.0)).collect();
        let frame = Plane::from_raw(data, 384, 384);
        let rows = collect_patch_features(&frame, 96, &ShapeTable::new());
        assert_eq!(rows.len(), 16);
        assert!(rows
            .iter()
            .all(|row| row.iter().all(|v| v.is_finite())));
    }

    #[test]
    fn trailing_rows_and_columns_are_dropped() {
        let mut rng = StdRng::seed_from_u64(29);
        let data: Vec<f32> = (0..400 * 300).map(|_| rng.gen_range(0.0f32..255.0)).collect();
        let frame = Plane::from_raw(data, 400, 300);
        // crops to 384x288 -> 4x3 patches
        let rows = collect_patch_features(&frame, 96, &ShapeTable::new());
        assert_eq!(rows.len(), 12);
    }

    #[test]
    fn flat_blocks_are_flagged_with_the_degenerate_row() {
        let table = ShapeTable::new();
        let map = Plane::from_raw(vec![0.0; 64 * 64], 64, 64);
        let rows = patch_features(&map, 32, &table);
        assert_eq!(rows.len(), 4);
        for row in rows {
            assert_eq!(row, degenerate_row(&table));
            assert!(row.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn patches_are_ordered_row_major() {
        // four 2x2 blocks with distinct magnitudes; the noisy block's row
        // must land at its row-major index
        let table = ShapeTable::new();
        let mut data = vec![0.0f32; 4 * 4];
        // bottom-right block gets a +/- pattern, everything else stays flat
        data[2 * 4 + 2] = 1.0;
        data[2 * 4 + 3] = -1.0;
        data[3 * 4 + 2] = -1.0;
        data[3 * 4 + 3] = 1.0;
        let rows = patch_features(&Plane::from_raw(data, 4, 4), 2, &table);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], degenerate_row(&table));
        assert_eq!(rows[1], degenerate_row(&table));
        assert_eq!(rows[2], degenerate_row(&table));
        assert_ne!(rows[3], degenerate_row(&table));
    }
}
