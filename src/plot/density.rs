//! Gaussian kernel density estimation for the diagnostic plots.

use crate::math::sample_sd;

/// Bandwidth floor so constant samples still render as a (very sharp) spike
/// instead of dividing by zero.
const MIN_BANDWIDTH: f64 = 1e-3;

/// Evenly spaced grid over `[0, 1]` with `n` points (at least 2).
pub fn probability_grid(n: usize) -> Vec<f64> {
    let n = n.max(2);
    (0..n).map(|i| i as f64 / (n as f64 - 1.0)).collect()
}

/// Gaussian KDE of `values` evaluated at each grid point.
///
/// Bandwidth is Silverman's rule of thumb, `1.06 * sd * n^(-1/5)`, floored
/// at [`MIN_BANDWIDTH`]. Returns zeros when `values` is empty.
pub fn gaussian_kde(values: &[f64], grid: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return vec![0.0; grid.len()];
    }

    let n = values.len() as f64;
    let bw = (1.06 * sample_sd(values) * n.powf(-0.2)).max(MIN_BANDWIDTH);
    let norm = 1.0 / (n * bw * (2.0 * std::f64::consts::PI).sqrt());

    grid.iter()
        .map(|&g| {
            let sum: f64 = values
                .iter()
                .map(|&v| {
                    let z = (g - v) / bw;
                    (-0.5 * z * z).exp()
                })
                .sum();
            norm * sum
        })
        .collect()
}

/// Rescale in place so the maximum becomes 1. Leaves all-zero input alone.
pub fn scale_to_peak(values: &mut [f64]) {
    let peak = values.iter().copied().fold(0.0, f64::max);
    if peak > 0.0 {
        for v in values.iter_mut() {
            *v /= peak;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_spans_zero_to_one() {
        let grid = probability_grid(101);
        assert_eq!(grid.len(), 101);
        assert!((grid[0] - 0.0).abs() < 1e-12);
        assert!((grid[100] - 1.0).abs() < 1e-12);
        assert!((grid[50] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn kde_peaks_near_the_sample_center() {
        let values = vec![0.45, 0.5, 0.5, 0.55];
        let grid = probability_grid(201);
        let dens = gaussian_kde(&values, &grid);

        let peak_idx = dens
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        let peak_x = grid[peak_idx];
        assert!(
            (peak_x - 0.5).abs() < 0.05,
            "density should peak near 0.5, got {peak_x}"
        );
    }

    #[test]
    fn constant_sample_stays_finite() {
        let values = vec![0.3; 50];
        let grid = probability_grid(101);
        let dens = gaussian_kde(&values, &grid);
        assert!(dens.iter().all(|v| v.is_finite()));
        assert!(dens.iter().any(|v| *v > 0.0));
    }

    #[test]
    fn scale_to_peak_normalizes_max_to_one() {
        let mut dens = vec![0.2, 0.8, 0.4];
        scale_to_peak(&mut dens);
        assert!((dens[1] - 1.0).abs() < 1e-12);
        assert!((dens[0] - 0.25).abs() < 1e-12);

        let mut zeros = vec![0.0, 0.0];
        scale_to_peak(&mut zeros);
        assert_eq!(zeros, vec![0.0, 0.0]);
    }

    #[test]
    fn empty_sample_yields_zero_density() {
        let grid = probability_grid(11);
        let dens = gaussian_kde(&[], &grid);
        assert!(dens.iter().all(|v| *v == 0.0));
    }
}
