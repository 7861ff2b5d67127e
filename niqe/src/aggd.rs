//! Asymmetric generalized Gaussian fitting against a precomputed shape table.

use statrs::function::gamma::gamma;

const TABLE_START: f64 = 0.2;
const TABLE_END: f64 = 10.0;
const TABLE_STEP: f64 = 0.001;

/// Dense table mapping candidate shape parameters to the distribution ratio
/// `gamma(2/a)^2 / (gamma(1/a) * gamma(3/a))`.
///
/// Built once and shared read-only by every fit; the fitter inverts the ratio
/// by nearest-entry search instead of solving the nonlinear equation.
#[derive(Debug, Clone)]
pub struct ShapeTable {
    shapes: Vec<f64>,
    ratios: Vec<f64>,
}

impl ShapeTable {
    /// The default table: shapes 0.2 to 10 in steps of 0.001.
    #[must_use]
    pub fn new() -> Self {
        Self::with_range(TABLE_START, TABLE_END, TABLE_STEP)
    }

    /// Builds a table over `[start, end)` with the given step. A coarser
    /// range is useful in tests; nearest-entry semantics are unchanged.
    ///
    /// # Panics
    /// If `step <= 0` or `end <= start`.
    #[must_use]
    pub fn with_range(start: f64, end: f64, step: f64) -> Self {
        assert!(step > 0.0 && end > start, "invalid shape range");
        let len = ((end - start) / step).ceil() as usize;
        let mut shapes = Vec::with_capacity(len);
        let mut ratios = Vec::with_capacity(len);
        for i in 0..len {
            let shape = (i as f64).mul_add(step, start);
            let num = gamma(2.0 / shape);
            shapes.push(shape);
            ratios.push(num * num / (gamma(1.0 / shape) * gamma(3.0 / shape)));
        }
        Self { shapes, ratios }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Smallest tabulated shape; the limit selected for degenerate ratios.
    #[must_use]
    pub(crate) fn first_shape(&self) -> f64 {
        self.shapes[0]
    }

    /// Index of the entry whose ratio is closest (minimum squared distance)
    /// to `target`. Ties break toward the smaller shape.
    fn nearest(&self, target: f64) -> usize {
        let mut best = 0usize;
        let mut best_dist = f64::INFINITY;
        for (i, &ratio) in self.ratios.iter().enumerate() {
            let dist = (ratio - target) * (ratio - target);
            if dist < best_dist {
                best_dist = dist;
                best = i;
            }
        }
        best
    }

    /// Fits an asymmetric generalized Gaussian to `signal`.
    ///
    /// Degenerate signals (empty, zero mean square, or an empty non-negative
    /// side) yield the infinite-shape sentinel instead of an error; check
    /// with [`AggdFit::is_degenerate`].
    #[must_use]
    pub fn fit(&self, signal: &[f32]) -> AggdFit {
        let mut left_sq = 0f64;
        let mut left_count = 0usize;
        let mut right_sq = 0f64;
        let mut right_count = 0usize;
        let mut abs_sum = 0f64;
        for &v in signal {
            let v = f64::from(v);
            if v < 0.0 {
                left_sq += v * v;
                left_count += 1;
            } else {
                right_sq += v * v;
                right_count += 1;
            }
            abs_sum += v.abs();
        }

        let left_mean_sqrt = if left_count > 0 {
            (left_sq / left_count as f64).sqrt()
        } else {
            0.0
        };
        let right_mean_sqrt = if right_count > 0 {
            (right_sq / right_count as f64).sqrt()
        } else {
            0.0
        };

        if signal.is_empty() {
            return AggdFit::degenerate(left_mean_sqrt, right_mean_sqrt);
        }

        let gamma_hat = if right_mean_sqrt == 0.0 {
            f64::INFINITY
        } else {
            left_mean_sqrt / right_mean_sqrt
        };

        let count = signal.len() as f64;
        let mean_sq = (left_sq + right_sq) / count;
        let mean_abs = abs_sum / count;
        let r_hat = if mean_sq == 0.0 {
            f64::INFINITY
        } else {
            mean_abs * mean_abs / mean_sq
        };

        let g_sq = gamma_hat * gamma_hat;
        let r_hat_norm =
            r_hat * ((g_sq * gamma_hat + 1.0) * (gamma_hat + 1.0)) / ((g_sq + 1.0) * (g_sq + 1.0));
        if !r_hat_norm.is_finite() {
            return AggdFit::degenerate(left_mean_sqrt, right_mean_sqrt);
        }

        let alpha = self.shapes[self.nearest(r_hat_norm)];
        let gam1 = gamma(1.0 / alpha);
        let gam2 = gamma(2.0 / alpha);
        let gam3 = gamma(3.0 / alpha);
        let aggd_ratio = gam1.sqrt() / gam3.sqrt();
        let beta_left = aggd_ratio * left_mean_sqrt;
        let beta_right = aggd_ratio * right_mean_sqrt;
        let asymmetry = (beta_right - beta_left) * (gam2 / gam1);

        AggdFit {
            alpha,
            asymmetry,
            beta_left,
            beta_right,
            left_mean_sqrt,
            right_mean_sqrt,
        }
    }
}

impl Default for ShapeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-fit asymmetric generalized Gaussian parameters for one signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggdFit {
    /// Shape parameter; infinite when the signal was degenerate.
    pub alpha: f64,
    /// Scale-asymmetry term N; infinite when the signal was degenerate.
    pub asymmetry: f64,
    /// Left (negative-side) scale.
    pub beta_left: f64,
    /// Right (non-negative-side) scale.
    pub beta_right: f64,
    /// Root mean square of the negative-side magnitudes.
    pub left_mean_sqrt: f64,
    /// Root mean square of the non-negative-side magnitudes.
    pub right_mean_sqrt: f64,
}

impl AggdFit {
    fn degenerate(left_mean_sqrt: f64, right_mean_sqrt: f64) -> Self {
        Self {
            alpha: f64::INFINITY,
            asymmetry: f64::INFINITY,
            beta_left: 0.0,
            beta_right: 0.0,
            left_mean_sqrt,
            right_mean_sqrt,
        }
    }

    /// True when the signal could not support a stable estimate.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        !self.alpha.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::ShapeTable;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn default_table_covers_the_documented_range() {
        let table = ShapeTable::new();
        assert_eq!(table.len(), 9800);
        assert!((table.first_shape() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn table_construction_is_deterministic() {
        let a = ShapeTable::new();
        let b = ShapeTable::new();
        assert_eq!(a.shapes, b.shapes);
        assert_eq!(a.ratios, b.ratios);
    }

    #[test]
    fn fit_is_deterministic() {
        let table = ShapeTable::new();
        let signal: Vec<f32> = (0..256).map(|i| ((i * 37) % 101) as f32 - 50.0).collect();
        let a = table.fit(&signal);
        let b = table.fit(&signal);
        assert_eq!(a.alpha.to_bits(), b.alpha.to_bits());
        assert_eq!(a.asymmetry.to_bits(), b.asymmetry.to_bits());
        assert_eq!(a.beta_left.to_bits(), b.beta_left.to_bits());
        assert_eq!(a.beta_right.to_bits(), b.beta_right.to_bits());
    }

    #[test]
    fn all_zero_signal_yields_the_degenerate_sentinel() {
        let table = ShapeTable::new();
        let fit = table.fit(&[0.0; 64]);
        assert!(fit.is_degenerate());
        assert!(fit.alpha.is_infinite());
        assert!(fit.asymmetry.is_infinite());
    }

    #[test]
    fn laplacian_samples_fit_near_shape_one() {
        // inverse-CDF sampling of a symmetric Laplace distribution
        let mut rng = StdRng::seed_from_u64(11);
        let signal: Vec<f32> = (0..20_000)
            .map(|_| {
                let u: f64 = rng.gen_range(1e-9..1.0);
                let magnitude = -u.ln();
                let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                (sign * magnitude) as f32
            })
            .collect();
        let fit = ShapeTable::new().fit(&signal);
        assert!(
            (0.8..1.25).contains(&fit.alpha),
            "laplace alpha {}",
            fit.alpha
        );
        assert!(fit.asymmetry.abs() < 0.25);
    }

    #[test]
    fn gaussian_samples_fit_near_shape_two() {
        // sum of uniforms as an approximate normal
        let mut rng = StdRng::seed_from_u64(13);
        let signal: Vec<f32> = (0..20_000)
            .map(|_| {
                let sum: f32 = (0..12).map(|_| rng.gen_range(0.0f32..1.0)).sum();
                sum - 6.0
            })
            .collect();
        let fit = ShapeTable::new().fit(&signal);
        assert!(
            (1.6..2.7).contains(&fit.alpha),
            "gaussian alpha {}",
            fit.alpha
        );
    }

    #[test]
    fn coarse_table_still_selects_the_nearest_entry() {
        let coarse = ShapeTable::with_range(0.5, 4.0, 0.5);
        assert_eq!(coarse.len(), 7);
        // symmetric Laplace-like signal resolves to the entry nearest 1.0
        let mut rng = StdRng::seed_from_u64(17);
        let signal: Vec<f32> = (0..20_000)
            .map(|_| {
                let u: f64 = rng.gen_range(1e-9..1.0);
                let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                (sign * -u.ln()) as f32
            })
            .collect();
        let fit = coarse.fit(&signal);
        assert!((fit.alpha - 1.0).abs() < 1e-12);
    }
}
