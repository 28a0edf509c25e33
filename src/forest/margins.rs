//! Marginal effects of the covariates on the class probabilities.
//!
//! Effects are finite differences: each covariate is moved up and down by a
//! window of its standard deviation (whole units for dummies and
//! categoricals), predictions are re-run through the fit's own path, and
//! the averaged difference is scaled back per unit of movement. Inference
//! fits additionally carry weight-based standard errors.

use log::debug;
use nalgebra::DMatrix;

use crate::domain::EvalPoint;
use crate::error::AppError;
use crate::forest::ordered::{OrderedForest, class_probs_from_cumulative, combine_class_variance};
use crate::math;

/// How a covariate moves during evaluation, decided by its distinct count
/// over the evaluation rows: two values make a dummy, up to ten a
/// categorical, more a continuous column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Dummy,
    Categorical,
    Continuous,
}

impl ColumnKind {
    pub fn label(self) -> &'static str {
        match self {
            ColumnKind::Dummy => "dummy",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Continuous => "continuous",
        }
    }
}

/// Marginal effects output, one row per covariate.
#[derive(Debug, Clone)]
pub struct MarginsResult {
    pub eval_point: EvalPoint,
    pub window: f64,
    pub feature_names: Vec<String>,
    pub kinds: Vec<ColumnKind>,
    /// `features × classes` effects.
    pub effects: Vec<Vec<f64>>,
    /// Standard errors, t-values and p-values; `None` without inference.
    pub std_errors: Option<Vec<Vec<f64>>>,
    pub t_values: Option<Vec<Vec<f64>>>,
    pub p_values: Option<Vec<Vec<f64>>>,
}

impl MarginsResult {
    pub fn n_features(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

/// Compute in-sample marginal effects for every covariate of a fit.
pub fn margins(
    fit: &OrderedForest,
    eval_point: EvalPoint,
    window: f64,
    feature_names: &[String],
) -> Result<MarginsResult, AppError> {
    if !(window > 0.0 && window <= 1.0) {
        return Err(AppError::new(2, "Margins window must be in (0, 1]."));
    }

    // Honest fits are evaluated on the honest rows only; the trees have
    // never seen those, which keeps the effects honest too.
    let x_eval: Vec<Vec<f64>> = if fit.options().honesty {
        fit.ind_est.iter().map(|&i| fit.x[i].clone()).collect()
    } else {
        fit.x.clone()
    };
    let n_eval = x_eval.len();
    if n_eval == 0 {
        return Err(AppError::new(3, "No rows available for margin evaluation."));
    }
    let p = x_eval[0].len();
    if feature_names.len() != p {
        return Err(AppError::new(
            4,
            "Feature name count does not match the covariates.",
        ));
    }

    let mut kinds = Vec::with_capacity(p);
    let mut sds = Vec::with_capacity(p);
    let mut mins = Vec::with_capacity(p);
    let mut maxs = Vec::with_capacity(p);
    let mut means = Vec::with_capacity(p);
    let mut medians = Vec::with_capacity(p);
    for j in 0..p {
        let col: Vec<f64> = x_eval.iter().map(|row| row[j]).collect();
        kinds.push(column_kind(&col, &feature_names[j])?);
        sds.push(math::sample_sd(&col));
        mins.push(col.iter().copied().fold(f64::INFINITY, f64::min));
        maxs.push(col.iter().copied().fold(f64::NEG_INFINITY, f64::max));
        means.push(math::mean(&col));
        medians.push(math::median(&col));
    }

    let base: Vec<Vec<f64>> = match eval_point {
        EvalPoint::Mean => x_eval,
        EvalPoint::Atmean => vec![means],
        EvalPoint::Atmedian => vec![medians],
    };

    let n_class = fit.n_class();
    let mut effects = vec![vec![0.0; n_class]; p];
    let mut variances: Option<Vec<Vec<f64>>> = if fit.options().inference {
        Some(vec![vec![0.0; n_class]; p])
    } else {
        None
    };

    for j in 0..p {
        let (up_col, down_col, scaling) =
            moved_column(&base, j, kinds[j], sds[j], mins[j], maxs[j], window);
        if !(scaling.is_finite() && scaling != 0.0) {
            return Err(AppError::new(
                4,
                format!(
                    "Degenerate evaluation window for covariate {}.",
                    feature_names[j]
                ),
            ));
        }

        let x_up = replace_column(&base, j, &up_col);
        let x_down = replace_column(&base, j, &down_col);

        if let Some(vars) = variances.as_mut() {
            let (cum_up, w_up) = fit.predict_cumulative_weighted(&x_up);
            let (cum_down, w_down) = fit.predict_cumulative_weighted(&x_down);
            let probs_up = mean_class_probs(&cum_up);
            let probs_down = mean_class_probs(&cum_down);
            for c in 0..n_class {
                effects[j][c] = (probs_up[c] - probs_down[c]) / scaling;
            }
            vars[j] = margin_variance(&w_up, &w_down, &fit.outcome_est, scaling, n_class);
        } else {
            let probs_up = mean_class_probs(&fit.predict_cumulative(&x_up));
            let probs_down = mean_class_probs(&fit.predict_cumulative(&x_down));
            for c in 0..n_class {
                effects[j][c] = (probs_up[c] - probs_down[c]) / scaling;
            }
        }
    }

    let (std_errors, t_values, p_values) = match &variances {
        Some(vars) => {
            let mut se = vec![vec![0.0; n_class]; p];
            let mut tv = vec![vec![0.0; n_class]; p];
            let mut pv = vec![vec![0.0; n_class]; p];
            for j in 0..p {
                for c in 0..n_class {
                    let sd = vars[j][c].max(0.0).sqrt();
                    se[j][c] = sd;
                    let t = if sd > 0.0 { effects[j][c] / sd } else { 0.0 };
                    tv[j][c] = t;
                    pv[j][c] = 2.0 * math::normal_sf(t.abs());
                }
            }
            (Some(se), Some(tv), Some(pv))
        }
        None => (None, None, None),
    };

    debug!(
        "margins over {p} covariates at {} (window {window})",
        eval_point.label()
    );

    Ok(MarginsResult {
        eval_point,
        window,
        feature_names: feature_names.to_vec(),
        kinds,
        effects,
        std_errors,
        t_values,
        p_values,
    })
}

fn column_kind(values: &[f64], name: &str) -> Result<ColumnKind, AppError> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted.dedup();
    match sorted.len() {
        0 | 1 => Err(AppError::new(
            3,
            format!("Covariate {name} is constant; margins are undefined."),
        )),
        2 => Ok(ColumnKind::Dummy),
        3..=10 => Ok(ColumnKind::Categorical),
        _ => Ok(ColumnKind::Continuous),
    }
}

/// Moved up/down values for one covariate over the base rows, plus the
/// scaling that converts the probability difference into a per-unit effect.
fn moved_column(
    base: &[Vec<f64>],
    j: usize,
    kind: ColumnKind,
    sd: f64,
    min: f64,
    max: f64,
    window: f64,
) -> (Vec<f64>, Vec<f64>, f64) {
    let shift = window * sd;
    let rows = base.len();
    match kind {
        ColumnKind::Dummy => (vec![max; rows], vec![min; rows], 1.0),
        ColumnKind::Categorical => {
            // One whole level up versus one level down from there.
            let up: Vec<f64> = base.iter().map(|row| (row[j] + shift).ceil()).collect();
            let down: Vec<f64> = up.iter().map(|v| v - 1.0).collect();
            (up, down, 1.0)
        }
        ColumnKind::Continuous => {
            let mut up = Vec::with_capacity(rows);
            let mut down = Vec::with_capacity(rows);
            for row in base {
                let v = row[j];
                let mut u = v + shift;
                if u >= max {
                    u = max;
                }
                if u <= min {
                    u = min + shift;
                }
                let mut d = v - shift;
                if d <= min {
                    d = min;
                }
                if d >= max {
                    d = max - shift;
                }
                if u == d {
                    // Both ends clamped onto the same point; reopen a gap.
                    u += 0.5 * shift;
                    d -= 0.5 * shift;
                    u = u.clamp(min, max);
                    d = d.clamp(min, max);
                }
                up.push(u);
                down.push(d);
            }
            let gaps: Vec<f64> = up.iter().zip(&down).map(|(u, d)| u - d).collect();
            let scaling = math::mean(&gaps);
            (up, down, scaling)
        }
    }
}

fn replace_column(base: &[Vec<f64>], j: usize, values: &[f64]) -> Vec<Vec<f64>> {
    base.iter()
        .zip(values)
        .map(|(row, &v)| {
            let mut row = row.clone();
            row[j] = v;
            row
        })
        .collect()
}

/// Average cumulative predictions over the evaluation rows, then difference
/// into class probabilities.
fn mean_class_probs(cumulative: &[Vec<f64>]) -> Vec<f64> {
    let thresholds = cumulative.first().map(Vec::len).unwrap_or(0);
    let mut avg = vec![0.0; thresholds];
    for row in cumulative {
        for (a, v) in avg.iter_mut().zip(row) {
            *a += v;
        }
    }
    if !cumulative.is_empty() {
        let inv = 1.0 / cumulative.len() as f64;
        for a in &mut avg {
            *a *= inv;
        }
    }
    class_probs_from_cumulative(std::slice::from_ref(&avg))
        .pop()
        .unwrap_or_default()
}

/// Weight-based variance of one covariate's effects, per class.
fn margin_variance(
    w_up: &[DMatrix<f64>],
    w_down: &[DMatrix<f64>],
    outcome_est: &[Vec<f64>],
    scaling: f64,
    n_class: usize,
) -> Vec<f64> {
    let n_est = outcome_est[0].len();
    let norm = n_est as f64 / (n_est.saturating_sub(1)).max(1) as f64;

    let mut demeaned: Vec<Vec<f64>> = Vec::with_capacity(n_class - 1);
    for k in 0..n_class - 1 {
        let yk = &outcome_est[k];
        let rows_up = w_up[k].nrows() as f64;
        let rows_down = w_down[k].nrows() as f64;
        let prods: Vec<f64> = (0..n_est)
            .map(|j| {
                let mean_up = w_up[k].column(j).sum() / rows_up;
                let mean_down = w_down[k].column(j).sum() / rows_down;
                (mean_up - mean_down) * yk[j]
            })
            .collect();
        let center = math::mean(&prods);
        demeaned.push(prods.iter().map(|v| v - center).collect());
    }

    combine_class_variance(&demeaned, norm, n_class)
        .into_iter()
        .map(|v| v / (scaling * scaling))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::ordered::{OrderedOptions, fit};

    fn mixed_data(n: usize) -> (Vec<Vec<f64>>, Vec<u32>, Vec<String>) {
        let x: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![i as f64 + 0.25, (i % 2) as f64, ((i % 4) + 1) as f64])
            .collect();
        let y: Vec<u32> = (0..n).map(|i| (i * 3 / n + 1) as u32).collect();
        let names = vec!["x1".to_string(), "flag".to_string(), "level".to_string()];
        (x, y, names)
    }

    fn opts(replace: bool, honesty: bool, inference: bool) -> OrderedOptions {
        OrderedOptions {
            trees: 16,
            min_leaf: 2,
            max_features: 1.0,
            sample_fraction: 0.7,
            honesty_fraction: 0.5,
            replace,
            honesty,
            inference,
            seed: 5,
        }
    }

    #[test]
    fn column_kinds_are_detected_from_distinct_counts() {
        let (x, y, names) = mixed_data(24);
        let fitted = fit(&x, &y, &opts(true, false, false)).expect("fit succeeds");
        let result = margins(&fitted, EvalPoint::Mean, 0.1, &names).expect("margins succeed");
        assert_eq!(
            result.kinds,
            vec![
                ColumnKind::Continuous,
                ColumnKind::Dummy,
                ColumnKind::Categorical
            ]
        );
        assert!(result.std_errors.is_none(), "no inference, no errors");
    }

    #[test]
    fn effects_have_one_row_per_feature_and_class() {
        let (x, y, names) = mixed_data(24);
        let fitted = fit(&x, &y, &opts(false, true, false)).expect("fit succeeds");
        let result = margins(&fitted, EvalPoint::Mean, 0.1, &names).expect("margins succeed");
        assert_eq!(result.effects.len(), names.len());
        for row in &result.effects {
            assert_eq!(row.len(), 3);
            assert!(row.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn inference_margins_produce_valid_pvalues() {
        let (x, y, names) = mixed_data(24);
        let fitted = fit(&x, &y, &opts(false, true, true)).expect("fit succeeds");
        let result = margins(&fitted, EvalPoint::Mean, 0.1, &names).expect("margins succeed");

        let se = result.std_errors.as_ref().expect("inference stores errors");
        let tv = result.t_values.as_ref().expect("inference stores t-values");
        let pv = result.p_values.as_ref().expect("inference stores p-values");
        for j in 0..names.len() {
            for c in 0..3 {
                assert!(se[j][c] >= 0.0, "standard error must be nonnegative");
                assert!(
                    (0.0..=1.0).contains(&pv[j][c]),
                    "p-value {} out of range",
                    pv[j][c]
                );
                if se[j][c] == 0.0 {
                    assert_eq!(tv[j][c], 0.0, "zero spread pins the t-value at zero");
                }
            }
        }
    }

    #[test]
    fn constant_column_is_a_data_error() {
        let (mut x, y, names) = mixed_data(24);
        for row in &mut x {
            row[1] = 1.0;
        }
        let fitted = fit(&x, &y, &opts(true, false, false)).expect("fit succeeds");
        let err = margins(&fitted, EvalPoint::Mean, 0.1, &names).expect_err("must fail");
        assert_eq!(err.exit_code(), 3);
        assert!(
            err.to_string().contains("flag"),
            "error should name the offending covariate: {err}"
        );
    }

    #[test]
    fn window_outside_unit_interval_is_a_usage_error() {
        let (x, y, names) = mixed_data(24);
        let fitted = fit(&x, &y, &opts(true, false, false)).expect("fit succeeds");
        for window in [0.0, 1.5, -0.2] {
            let err = margins(&fitted, EvalPoint::Mean, window, &names).expect_err("must fail");
            assert_eq!(err.exit_code(), 2, "window {window} should be rejected");
        }
    }

    #[test]
    fn collapsed_evaluation_points_still_produce_effects() {
        let (x, y, names) = mixed_data(24);
        let fitted = fit(&x, &y, &opts(true, false, false)).expect("fit succeeds");
        for point in [EvalPoint::Atmean, EvalPoint::Atmedian] {
            let result = margins(&fitted, point, 0.1, &names).expect("margins succeed");
            assert_eq!(result.eval_point, point);
            assert_eq!(result.effects.len(), names.len());
            assert!(
                result
                    .effects
                    .iter()
                    .flatten()
                    .all(|v| v.is_finite()),
                "effects at {point:?} must be finite"
            );
        }
    }
}
