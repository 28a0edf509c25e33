//! Accuracy measures for fitted probability matrices.

use crate::domain::Measures;
use crate::error::AppError;

/// Computes the three benchmark measures from outcomes and class probabilities.
///
/// `y` holds the observed classes (1-based), `probs` holds one probability row
/// per observation. The first measure is the mean squared distance between the
/// probability row and the one-hot encoding of the outcome, the second is the
/// squared error of the expected class, and accuracy scores the modal class.
pub fn compute_measures(y: &[u32], probs: &[Vec<f64>]) -> Result<Measures, AppError> {
    if y.is_empty() || y.len() != probs.len() {
        return Err(AppError::new(
            4,
            format!(
                "Measure inputs are misaligned: {} outcomes vs {} probability rows",
                y.len(),
                probs.len()
            ),
        ));
    }
    let n_class = probs[0].len();
    if probs.iter().any(|row| row.len() != n_class) {
        return Err(AppError::new(
            4,
            "Probability rows have inconsistent class counts".to_string(),
        ));
    }

    let n = y.len() as f64;
    let mut sum_rps = 0.0;
    let mut sum_sq = 0.0;
    let mut hits = 0usize;
    for (&yi, row) in y.iter().zip(probs) {
        let mut row_err = 0.0;
        let mut expected = 0.0;
        for (c, &p) in row.iter().enumerate() {
            let class = (c + 1) as f64;
            let onehot = if yi as usize == c + 1 { 1.0 } else { 0.0 };
            row_err += (onehot - p) * (onehot - p);
            expected += p * class;
        }
        sum_rps += row_err;
        let diff = yi as f64 - expected;
        sum_sq += diff * diff;
        if modal_class(row) == yi {
            hits += 1;
        }
    }

    Ok(Measures {
        mse1: sum_rps / n,
        mse2: sum_sq / n,
        accuracy: hits as f64 / n,
    })
}

/// Modal class of a probability row, ties resolved toward the lower class.
fn modal_class(row: &[f64]) -> u32 {
    let mut best = 0usize;
    for (c, &p) in row.iter().enumerate() {
        if p > row[best] {
            best = c;
        }
    }
    (best + 1) as u32
}

/// Square confusion matrix with truth on rows and predictions on columns.
#[derive(Debug, Clone)]
pub struct Confusion {
    pub n_class: usize,
    /// Row-major counts, `counts[truth - 1][pred - 1]`.
    pub counts: Vec<Vec<usize>>,
}

/// Tallies predicted against observed classes.
pub fn confusion_matrix(y: &[u32], y_pred: &[u32], n_class: usize) -> Result<Confusion, AppError> {
    if y.len() != y_pred.len() {
        return Err(AppError::new(
            4,
            format!(
                "Confusion inputs are misaligned: {} outcomes vs {} predictions",
                y.len(),
                y_pred.len()
            ),
        ));
    }
    let mut counts = vec![vec![0usize; n_class]; n_class];
    for (&truth, &pred) in y.iter().zip(y_pred) {
        let t = truth as usize;
        let p = pred as usize;
        if t < 1 || t > n_class || p < 1 || p > n_class {
            return Err(AppError::new(
                4,
                format!("Class {truth}/{pred} outside 1..={n_class} in confusion tally"),
            ));
        }
        counts[t - 1][p - 1] += 1;
    }
    Ok(Confusion { n_class, counts })
}
