//! Small numeric helpers shared by the data generators, the estimator and
//! the report layer.
//!
//! Quantiles use linear interpolation between order statistics (the common
//! statistical-software default), so tercile cuts land where users of those
//! tools expect them.

/// Arithmetic mean. Returns `0.0` for an empty slice.
///
/// The zero convention is load-bearing: honest leaves that receive no
/// estimation rows must predict zero, not NaN.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (`n - 1` denominator).
///
/// Returns `0.0` when fewer than two values are present.
pub fn sample_sd(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// Median via [`quantile`] at `q = 0.5`.
pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Linearly interpolated quantile of unsorted data, `q` in `[0, 1]`.
///
/// Empty input yields NaN; callers that may see empty slices should guard.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    quantile_sorted(&sorted, q)
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let h = (n - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = h - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Tercile boundaries `(q33, q67)`, or `None` when the input is empty.
pub fn tercile_bounds(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let q1 = quantile(values, 1.0 / 3.0);
    let q2 = quantile(values, 2.0 / 3.0);
    Some((q1, q2))
}

/// Discretize into ordered classes `1..=3` by tercile.
///
/// `v <= q33` maps to 1, `v <= q67` to 2, everything above to 3. Returns
/// `None` when the input is empty.
pub fn tercile_classes(values: &[f64]) -> Option<Vec<u32>> {
    let (q1, q2) = tercile_bounds(values)?;
    Some(
        values
            .iter()
            .map(|&v| {
                if v <= q1 {
                    1
                } else if v <= q2 {
                    2
                } else {
                    3
                }
            })
            .collect(),
    )
}

/// Upper tail of the standard normal distribution, `P(Z > x)`.
///
/// Built on the Abramowitz & Stegun rational approximation of `erfc`,
/// accurate to about `1.5e-7` over the whole line. Plenty for p-values.
pub fn normal_sf(x: f64) -> f64 {
    0.5 * erfc(x / std::f64::consts::SQRT_2)
}

/// Complementary error function via Abramowitz & Stegun 7.1.26, reflected
/// for negative arguments.
fn erfc(x: f64) -> f64 {
    let ax = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * ax);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    let tail = poly * (-ax * ax).exp();
    if x >= 0.0 { tail } else { 2.0 - tail }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_empty_slice_is_zero() {
        assert_eq!(mean(&[]), 0.0, "empty honest leaves must predict zero");
    }

    #[test]
    fn sample_sd_uses_the_n_minus_one_denominator() {
        let sd = sample_sd(&[1.0, 2.0, 3.0, 4.0]);
        // variance = (2.25 + 0.25 + 0.25 + 2.25) / 3
        assert!(
            (sd - (5.0f64 / 3.0).sqrt()).abs() < 1e-12,
            "expected sqrt(5/3), got {sd}"
        );
        assert_eq!(sample_sd(&[7.0]), 0.0, "single value has no spread");
    }

    #[test]
    fn quantile_interpolates_between_order_statistics() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert!((quantile(&values, 0.5) - 2.5).abs() < 1e-12);
        assert!((quantile(&values, 1.0 / 3.0) - 2.0).abs() < 1e-12);
        assert!((quantile(&values, 2.0 / 3.0) - 3.0).abs() < 1e-12);
        assert_eq!(quantile(&values, 0.0), 1.0);
        assert_eq!(quantile(&values, 1.0), 4.0);
    }

    #[test]
    fn tercile_classes_split_one_to_nine_evenly() {
        let values: Vec<f64> = (1..=9).map(f64::from).collect();
        let classes = tercile_classes(&values).expect("non-empty input");
        assert_eq!(classes, vec![1, 1, 1, 2, 2, 2, 3, 3, 3]);
    }

    #[test]
    fn tercile_classes_of_empty_input_is_none() {
        assert!(tercile_classes(&[]).is_none());
    }

    #[test]
    fn normal_sf_matches_known_tail_values() {
        assert!((normal_sf(0.0) - 0.5).abs() < 1e-9);
        assert!(
            (normal_sf(1.96) - 0.024_997_9).abs() < 1e-5,
            "two-sided 5% critical value"
        );
        let x = 1.3;
        assert!(
            (normal_sf(-x) + normal_sf(x) - 1.0).abs() < 1e-7,
            "tails must be symmetric"
        );
    }
}
