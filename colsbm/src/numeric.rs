//! Epsilon-guarded numeric primitives.
//!
//! Everything that takes a log, a logit or a softmax in the fitter goes
//! through here so that exact 0/1 probabilities and NaN never reach `ln`.

use nalgebra::DMatrix;
use special::Gamma as SpecialGamma;

/// Lower clamp for membership probabilities
pub const TAU_EPS: f64 = 1e-10;

/// Floor (and `1 - ceiling`) for connectivity probabilities and rates
pub const PROB_EPS: f64 = 1e-6;

/// `ln(x)` with `x` floored at `TAU_EPS`; NaN maps to the floor too
#[inline]
pub fn safe_ln(x: f64) -> f64 {
    if x.is_nan() {
        return TAU_EPS.ln();
    }
    x.max(TAU_EPS).ln()
}

/// Clamp a probability into `[PROB_EPS, 1 - PROB_EPS]`
#[inline]
pub fn clamp_prob(p: f64) -> f64 {
    if p.is_nan() {
        return PROB_EPS;
    }
    p.clamp(PROB_EPS, 1.0 - PROB_EPS)
}

/// Clamp a Poisson rate to `[PROB_EPS, inf)`
#[inline]
pub fn clamp_rate(r: f64) -> f64 {
    if r.is_nan() {
        return PROB_EPS;
    }
    r.max(PROB_EPS)
}

/// `ln(p / (1 - p))` on a clamped `p`
#[inline]
pub fn logit(p: f64) -> f64 {
    let p = clamp_prob(p);
    p.ln() - (1.0 - p).ln()
}

/// `ln(x!)` for a non-negative count
#[inline]
pub fn ln_factorial(x: f64) -> f64 {
    if x <= 1.0 {
        0.0
    } else {
        SpecialGamma::ln_gamma(x + 1.0).0
    }
}

/// Clamp every entry into `(TAU_EPS, 1 - TAU_EPS)` and renormalize rows
/// to sum to one.
pub fn clamp_rows_inplace(tau: &mut DMatrix<f64>) {
    for mut row in tau.row_iter_mut() {
        for x in row.iter_mut() {
            *x = if x.is_nan() {
                TAU_EPS
            } else {
                x.clamp(TAU_EPS, 1.0 - TAU_EPS)
            };
        }
        let total: f64 = row.iter().sum();
        row /= total;
    }
}

/// Row-wise softmax of log-weights: subtract the row max, exponentiate,
/// normalize, then clamp away from 0/1.
pub fn softmax_rows_inplace(log_weights: &mut DMatrix<f64>) {
    for mut row in log_weights.row_iter_mut() {
        let max = row
            .iter()
            .cloned()
            .filter(|x| x.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);

        if !max.is_finite() {
            let k = row.len() as f64;
            row.fill(1.0 / k);
            continue;
        }

        for x in row.iter_mut() {
            *x = if x.is_finite() { (*x - max).exp() } else { 0.0 };
        }
        let total: f64 = row.iter().sum();
        row /= total;
    }
    clamp_rows_inplace(log_weights);
}

/// Soft one-hot encoding of hard labels, clamped away from 0/1.
/// Labels `>= k` are folded into the last block.
pub fn one_hot(labels: &[usize], k: usize) -> DMatrix<f64> {
    let mut tau = DMatrix::zeros(labels.len(), k);
    for (i, &l) in labels.iter().enumerate() {
        tau[(i, l.min(k - 1))] = 1.0;
    }
    clamp_rows_inplace(&mut tau);
    tau
}

/// `-Σ τ ln τ`
pub fn entropy(tau: &DMatrix<f64>) -> f64 {
    -tau.iter().map(|&t| t * safe_ln(t)).sum::<f64>()
}

/// Quadratic form `aᵀ · m · b`
pub fn quad_form(a: &DMatrix<f64>, m: &DMatrix<f64>, b: &DMatrix<f64>) -> DMatrix<f64> {
    a.transpose() * m * b
}

/// Euclidean distance between two parameter vectors of equal length;
/// infinite when the lengths differ.
pub fn param_distance(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Root of a decreasing function on `(lo, hi)` by bisection.
///
/// Returns `lo` if `f(lo) <= 0` and `hi` if `f(hi) >= 0`.
pub fn bisect_decreasing<F>(f: F, lo: f64, hi: f64, iters: usize) -> f64
where
    F: Fn(f64) -> f64,
{
    if f(lo) <= 0.0 {
        return lo;
    }
    if f(hi) >= 0.0 {
        return hi;
    }
    let (mut a, mut b) = (lo, hi);
    for _ in 0..iters {
        let mid = 0.5 * (a + b);
        if f(mid) > 0.0 {
            a = mid;
        } else {
            b = mid;
        }
    }
    0.5 * (a + b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_safe_ln_guards_zero_and_nan() {
        assert!(safe_ln(0.0).is_finite());
        assert!(safe_ln(f64::NAN).is_finite());
        assert_abs_diff_eq!(safe_ln(1.0), 0.0);
    }

    #[test]
    fn test_logit_is_finite_at_bounds() {
        assert!(logit(0.0).is_finite());
        assert!(logit(1.0).is_finite());
        assert_abs_diff_eq!(logit(0.5), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let mut m = DMatrix::from_row_slice(
            3,
            3,
            &[1000.0, 0.0, -1000.0, 1.0, 1.0, 1.0, f64::NEG_INFINITY, 0.0, 0.0],
        );
        softmax_rows_inplace(&mut m);
        for row in m.row_iter() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
            assert!(row.iter().all(|&x| x > 0.0 && x < 1.0));
        }
        assert_abs_diff_eq!(m[(1, 0)], 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_softmax_all_infinite_row_is_uniform() {
        let mut m = DMatrix::from_element(1, 4, f64::NEG_INFINITY);
        softmax_rows_inplace(&mut m);
        assert_abs_diff_eq!(m[(0, 2)], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_one_hot_single_block() {
        let tau = one_hot(&[0, 0, 0], 1);
        assert!(tau.iter().all(|&x| (x - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_entropy_of_hard_assignment_is_near_zero() {
        let tau = one_hot(&[0, 1, 1], 2);
        assert!(entropy(&tau) < 1e-6);
        let uniform = DMatrix::from_element(2, 2, 0.5);
        assert_abs_diff_eq!(entropy(&uniform), 2.0 * 2f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_ln_factorial() {
        assert_abs_diff_eq!(ln_factorial(0.0), 0.0);
        assert_abs_diff_eq!(ln_factorial(5.0), 120f64.ln(), epsilon = 1e-10);
    }

    #[test]
    fn test_bisect_decreasing() {
        let root = bisect_decreasing(|x| 2.0 - x, 0.0, 10.0, 80);
        assert_abs_diff_eq!(root, 2.0, epsilon = 1e-9);
        assert_eq!(bisect_decreasing(|x| -x - 1.0, 0.0, 1.0, 10), 0.0);
        assert_eq!(bisect_decreasing(|x| 5.0 - x, 0.0, 1.0, 10), 1.0);
    }

    #[test]
    fn test_quad_form_shape() {
        let a = DMatrix::from_element(4, 2, 0.5);
        let m = DMatrix::from_element(4, 5, 1.0);
        let b = DMatrix::from_element(5, 3, 1.0 / 3.0);
        let q = quad_form(&a, &m, &b);
        assert_eq!(q.shape(), (2, 3));
        assert_abs_diff_eq!(q[(0, 0)], 4.0 * 5.0 * 0.5 / 3.0, epsilon = 1e-12);
    }
}
