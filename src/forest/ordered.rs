//! The ordered forest estimator.
//!
//! One regression forest is grown per cumulative threshold `P(Y <= k)`,
//! `k = 1..n_class-1`; class probabilities come from differencing adjacent
//! threshold predictions. The three grid switches select the prediction
//! path:
//!
//! - plain fits (bootstrap or subsample) predict in-sample via out-of-bag
//! - honest fits re-estimate leaf means on held-out rows and push every row
//!   through the honest leaves
//! - inference fits express predictions as weighted sums of honest outcomes,
//!   which makes weight-based variance estimates possible

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use rand::prelude::*;
use rand::rngs::StdRng;

use crate::domain::{BenchConfig, ForestFlags};
use crate::error::AppError;
use crate::forest::base::{ForestOptions, RegressionForest};

/// Estimator settings: hyperparameters plus the three grid switches.
#[derive(Debug, Clone, Copy)]
pub struct OrderedOptions {
    pub trees: usize,
    pub min_leaf: usize,
    pub max_features: f64,
    pub sample_fraction: f64,
    pub honesty_fraction: f64,
    pub replace: bool,
    pub honesty: bool,
    pub inference: bool,
    pub seed: u64,
}

impl OrderedOptions {
    /// Assemble estimator options for one grid cell of a benchmark run.
    pub fn from_bench(config: &BenchConfig, flags: ForestFlags) -> Self {
        Self {
            trees: config.trees,
            min_leaf: config.min_leaf,
            max_features: config.max_features,
            sample_fraction: config.sample_fraction,
            honesty_fraction: config.honesty_fraction,
            replace: flags.replace,
            honesty: flags.honesty,
            inference: flags.inference,
            seed: config.seed,
        }
    }

    pub fn flags(&self) -> ForestFlags {
        ForestFlags::new(self.replace, self.honesty, self.inference)
    }

    /// Reject incoherent settings before any work happens.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.trees == 0 {
            return Err(AppError::new(2, "Tree count must be > 0."));
        }
        if self.min_leaf == 0 {
            return Err(AppError::new(2, "Minimum leaf size must be > 0."));
        }
        if !(self.max_features > 0.0 && self.max_features <= 1.0) {
            return Err(AppError::new(2, "Feature fraction must be in (0, 1]."));
        }
        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(AppError::new(2, "Sample fraction must be in (0, 1]."));
        }
        if !(self.honesty_fraction > 0.0 && self.honesty_fraction < 1.0) {
            return Err(AppError::new(
                2,
                "Honesty fraction must be strictly between 0 and 1.",
            ));
        }
        if self.honesty && self.replace {
            return Err(AppError::new(
                2,
                "Honesty requires subsampling; disable draws with replacement.",
            ));
        }
        if self.inference && !self.honesty {
            return Err(AppError::new(
                2,
                "Inference requires an honest fit; enable honesty.",
            ));
        }
        if self.inference && self.replace {
            return Err(AppError::new(
                2,
                "Inference requires subsampling; disable draws with replacement.",
            ));
        }
        Ok(())
    }
}

/// A fitted ordered forest.
#[derive(Debug)]
pub struct OrderedForest {
    pub(crate) options: OrderedOptions,
    pub(crate) n_class: usize,
    /// Original class labels, sorted; position maps recoded class to label.
    pub(crate) labels: Vec<u32>,
    /// Recoded outcomes, `1..=n_class`.
    pub(crate) y: Vec<u32>,
    /// Covariates the fit was produced on (margins re-evaluate on them).
    pub(crate) x: Vec<Vec<f64>>,
    /// Honest split, both sides sorted; `ind_est` is empty without honesty.
    pub(crate) ind_tr: Vec<usize>,
    pub(crate) ind_est: Vec<usize>,
    /// One forest per threshold.
    pub(crate) forests: Vec<RegressionForest>,
    /// Honest outcome indicators per threshold (inference fits only).
    pub(crate) outcome_est: Vec<Vec<f64>>,
    /// In-sample honest weights per threshold (inference fits only).
    pub(crate) weights: Vec<DMatrix<f64>>,
    /// In-sample class probabilities (`rows × n_class`).
    pub(crate) probs: Vec<Vec<f64>>,
    /// In-sample prediction variances (inference fits only).
    pub(crate) variances: Option<Vec<Vec<f64>>>,
    /// Count of (row, threshold) out-of-bag misses that fell back to the
    /// full ensemble.
    pub(crate) oob_fallbacks: usize,
}

/// Fit an ordered forest on a covariate matrix and ordered outcome labels.
pub fn fit(x: &[Vec<f64>], y: &[u32], options: &OrderedOptions) -> Result<OrderedForest, AppError> {
    options.validate()?;

    let n = x.len();
    if n == 0 {
        return Err(AppError::new(3, "Cannot fit on an empty dataset."));
    }
    if y.len() != n {
        return Err(AppError::new(4, "Covariate and outcome lengths differ."));
    }
    let width = x[0].len();
    if width == 0 || x.iter().any(|row| row.len() != width) {
        return Err(AppError::new(
            3,
            "Covariate rows must be non-empty and rectangular.",
        ));
    }
    if options.honesty && n < 2 {
        return Err(AppError::new(3, "Need at least two rows for an honest split."));
    }

    // Recode labels to 1..=n_class by rank so gaps in user labels are fine.
    let mut labels: Vec<u32> = y.to_vec();
    labels.sort_unstable();
    labels.dedup();
    let n_class = labels.len();
    if n_class < 2 {
        return Err(AppError::new(3, "Outcome needs at least two classes."));
    }
    let y: Vec<u32> = y
        .iter()
        .map(|v| match labels.binary_search(v) {
            Ok(pos) => Ok((pos + 1) as u32),
            Err(_) => Err(AppError::new(4, "Label lookup failed during recoding.")),
        })
        .collect::<Result<_, _>>()?;

    // Honest split: a seeded shuffle, then both sides sorted so that row
    // indexing stays stable everywhere downstream.
    let (ind_tr, ind_est) = if options.honesty {
        let mut perm: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(derive_seed(options.seed, "split", 0));
        perm.shuffle(&mut rng);
        let n_est = ((options.honesty_fraction * n as f64).ceil() as usize).clamp(1, n - 1);
        let mut est = perm[..n_est].to_vec();
        est.sort_unstable();
        let mut tr = perm[n_est..].to_vec();
        tr.sort_unstable();
        (tr, est)
    } else {
        ((0..n).collect(), Vec::new())
    };

    let (x_tr, x_est) = if options.honesty {
        (subset(x, &ind_tr), subset(x, &ind_est))
    } else {
        (Vec::new(), Vec::new())
    };

    let mut cumulative = vec![vec![0.0; n_class - 1]; n];
    let mut forests: Vec<RegressionForest> = Vec::with_capacity(n_class - 1);
    let mut outcome_est: Vec<Vec<f64>> = Vec::new();
    let mut weights: Vec<DMatrix<f64>> = Vec::new();
    let mut oob_fallbacks = 0usize;

    for k in 1..n_class {
        let forest_opts = ForestOptions {
            trees: options.trees,
            min_leaf: options.min_leaf,
            max_features: options.max_features,
            replace: options.replace,
            sample_fraction: options.sample_fraction,
            seed: derive_seed(options.seed, "threshold", k),
        };

        if !options.honesty {
            let y_ind = indicator(&y, &ind_tr, k);
            let forest = RegressionForest::fit(x, &y_ind, &forest_opts)?;
            let (preds, fallbacks) = forest.oob_predict(x);
            oob_fallbacks += fallbacks;
            for (i, v) in preds.into_iter().enumerate() {
                cumulative[i][k - 1] = v;
            }
            forests.push(forest);
        } else {
            let y_ind_tr = indicator(&y, &ind_tr, k);
            let y_ind_est = indicator(&y, &ind_est, k);
            let mut forest = RegressionForest::fit(&x_tr, &y_ind_tr, &forest_opts)?;
            if options.inference {
                let w = honest_weights(&forest, x, &x_est);
                let preds = &w * DVector::from_column_slice(&y_ind_est);
                for i in 0..n {
                    cumulative[i][k - 1] = preds[i];
                }
                weights.push(w);
                outcome_est.push(y_ind_est);
            } else {
                honest_leaf_means(&mut forest, &x_est, &y_ind_est);
                let preds = forest.predict(x);
                for (i, v) in preds.into_iter().enumerate() {
                    cumulative[i][k - 1] = v;
                }
            }
            forests.push(forest);
        }
    }

    if oob_fallbacks > 0 {
        warn!("{oob_fallbacks} out-of-bag predictions fell back to the full ensemble");
    }

    let probs = class_probs_from_cumulative(&cumulative);
    let variances = if options.inference {
        Some(in_sample_variance(
            &cumulative,
            &weights,
            &outcome_est,
            &ind_tr,
            &ind_est,
            n_class,
        ))
    } else {
        None
    };

    debug!(
        "fitted {} threshold forests on {} rows ({} honest)",
        n_class - 1,
        n,
        ind_est.len()
    );

    Ok(OrderedForest {
        options: *options,
        n_class,
        labels,
        y,
        x: x.to_vec(),
        ind_tr,
        ind_est,
        forests,
        outcome_est,
        weights,
        probs,
        variances,
        oob_fallbacks,
    })
}

impl OrderedForest {
    pub fn options(&self) -> &OrderedOptions {
        &self.options
    }

    pub fn n_class(&self) -> usize {
        self.n_class
    }

    /// Original sorted labels; position `c - 1` holds the label of class `c`.
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Recoded outcomes, `1..=n_class`.
    pub fn y(&self) -> &[u32] {
        &self.y
    }

    pub fn ind_tr(&self) -> &[usize] {
        &self.ind_tr
    }

    pub fn ind_est(&self) -> &[usize] {
        &self.ind_est
    }

    /// In-sample class probabilities (`rows × n_class`).
    pub fn probs(&self) -> &[Vec<f64>] {
        &self.probs
    }

    pub fn variances(&self) -> Option<&[Vec<f64>]> {
        self.variances.as_deref()
    }

    pub fn oob_fallbacks(&self) -> usize {
        self.oob_fallbacks
    }

    /// Most likely class per row, in recoded labels `1..=n_class`.
    ///
    /// Ties go to the lower class.
    pub fn class_predictions(&self) -> Vec<u32> {
        self.probs
            .iter()
            .map(|row| {
                let mut best = 0usize;
                let mut best_p = f64::NEG_INFINITY;
                for (idx, &p) in row.iter().enumerate() {
                    if p > best_p {
                        best_p = p;
                        best = idx;
                    }
                }
                (best + 1) as u32
            })
            .collect()
    }

    /// Cumulative threshold predictions for arbitrary rows, following the
    /// fit's own path: honest fits go through the re-estimated leaves,
    /// plain fits through the ensemble mean.
    pub(crate) fn predict_cumulative(&self, x_eval: &[Vec<f64>]) -> Vec<Vec<f64>> {
        if self.options.inference {
            return self.predict_cumulative_weighted(x_eval).0;
        }
        let mut cumulative = vec![vec![0.0; self.forests.len()]; x_eval.len()];
        for (k, forest) in self.forests.iter().enumerate() {
            for (i, v) in forest.predict(x_eval).into_iter().enumerate() {
                cumulative[i][k] = v;
            }
        }
        cumulative
    }

    /// Weighted cumulative predictions plus the per-threshold weight
    /// matrices (`x_eval rows × honest rows`). Inference fits only.
    pub(crate) fn predict_cumulative_weighted(
        &self,
        x_eval: &[Vec<f64>],
    ) -> (Vec<Vec<f64>>, Vec<DMatrix<f64>>) {
        let x_est = subset(&self.x, &self.ind_est);
        let mut cumulative = vec![vec![0.0; self.forests.len()]; x_eval.len()];
        let mut out_weights = Vec::with_capacity(self.forests.len());
        for (k, forest) in self.forests.iter().enumerate() {
            let w = honest_weights(forest, x_eval, &x_est);
            let preds = &w * DVector::from_column_slice(&self.outcome_est[k]);
            for (i, row) in cumulative.iter_mut().enumerate() {
                row[k] = preds[i];
            }
            out_weights.push(w);
        }
        (cumulative, out_weights)
    }
}

/// Difference cumulative threshold predictions into class probabilities:
/// prepend a zero, append a one, take adjacent differences, clamp negatives
/// to zero and renormalize each row to sum to one.
pub(crate) fn class_probs_from_cumulative(cumulative: &[Vec<f64>]) -> Vec<Vec<f64>> {
    cumulative
        .iter()
        .map(|row| {
            let n_class = row.len() + 1;
            let mut probs = Vec::with_capacity(n_class);
            let mut prev = 0.0;
            for &c in row {
                probs.push(c - prev);
                prev = c;
            }
            probs.push(1.0 - prev);
            for p in &mut probs {
                if *p < 0.0 {
                    *p = 0.0;
                }
            }
            let total: f64 = probs.iter().sum();
            if total > 0.0 {
                for p in &mut probs {
                    *p /= total;
                }
            } else {
                // Everything clamped away; fall back to the uniform row.
                let u = 1.0 / n_class as f64;
                for p in &mut probs {
                    *p = u;
                }
            }
            probs
        })
        .collect()
}

/// Combine per-threshold demeaned weight products into per-class variances.
///
/// Class variance = var(threshold above) + var(threshold below) minus twice
/// their covariance, with zero padding at both ends of the class range.
/// Tiny negatives from float cancellation are clamped to zero.
pub(crate) fn combine_class_variance(demeaned: &[Vec<f64>], norm: f64, n_class: usize) -> Vec<f64> {
    let var: Vec<f64> = demeaned
        .iter()
        .map(|d| norm * d.iter().map(|v| v * v).sum::<f64>())
        .collect();
    let mut out = vec![0.0; n_class];
    for c in 1..=n_class {
        let v_last = if c <= n_class - 1 { var[c - 1] } else { 0.0 };
        let v_first = if c >= 2 { var[c - 2] } else { 0.0 };
        let cov = if c >= 2 && c <= n_class - 1 {
            let dot: f64 = demeaned[c - 1]
                .iter()
                .zip(&demeaned[c - 2])
                .map(|(a, b)| a * b)
                .sum();
            2.0 * norm * dot
        } else {
            0.0
        };
        out[c - 1] = (v_last + v_first - cov).max(0.0);
    }
    out
}

/// Weight-based variance of the in-sample class probabilities.
///
/// Honest rows are scored against the honest sample size and training rows
/// against the training sample size, both with honest outcomes; the two
/// blocks are then written back into original row order.
fn in_sample_variance(
    cumulative: &[Vec<f64>],
    weights: &[DMatrix<f64>],
    outcome_est: &[Vec<f64>],
    ind_tr: &[usize],
    ind_est: &[usize],
    n_class: usize,
) -> Vec<Vec<f64>> {
    let mut out = vec![vec![0.0; n_class]; cumulative.len()];
    for rows in [ind_est, ind_tr] {
        let n_scale = rows.len();
        let norm = n_scale as f64 / (n_scale.saturating_sub(1)).max(1) as f64;
        for &i in rows {
            let mut demeaned: Vec<Vec<f64>> = Vec::with_capacity(n_class - 1);
            for k in 0..n_class - 1 {
                let w = &weights[k];
                let yk = &outcome_est[k];
                let m = cumulative[i][k] / n_scale as f64;
                demeaned.push((0..yk.len()).map(|j| w[(i, j)] * yk[j] - m).collect());
            }
            out[i] = combine_class_variance(&demeaned, norm, n_class);
        }
    }
    out
}

/// Replace every leaf value of every tree with the mean outcome of the
/// honest rows that land in that leaf. Leaves no honest row reaches get a
/// zero.
fn honest_leaf_means(forest: &mut RegressionForest, x_est: &[Vec<f64>], y_est: &[f64]) {
    let leaves_est = forest.apply(x_est);
    for t in 0..forest.n_trees() {
        let n_leaves = forest.trees()[t].n_leaves();
        let mut sums = vec![0.0; n_leaves];
        let mut counts = vec![0usize; n_leaves];
        for (j, &leaf) in leaves_est[t].iter().enumerate() {
            sums[leaf] += y_est[j];
            counts[leaf] += 1;
        }
        let means: Vec<f64> = sums
            .iter()
            .zip(&counts)
            .map(|(&s, &c)| if c == 0 { 0.0 } else { s / c as f64 })
            .collect();
        forest.set_tree_leaf_values(t, &means);
    }
}

/// Honest prediction weights: `w[i][j]` is the average over trees of
/// `1/|leaf|` when evaluation row `i` and honest row `j` share a leaf.
/// Rows that land in leaves no honest row reaches contribute zero weight.
fn honest_weights(
    forest: &RegressionForest,
    x_eval: &[Vec<f64>],
    x_est: &[Vec<f64>],
) -> DMatrix<f64> {
    let mut w = DMatrix::zeros(x_eval.len(), x_est.len());
    let leaves_eval = forest.apply(x_eval);
    let leaves_est = forest.apply(x_est);
    for (t, tree) in forest.trees().iter().enumerate() {
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); tree.n_leaves()];
        for (j, &leaf) in leaves_est[t].iter().enumerate() {
            members[leaf].push(j);
        }
        for (i, &leaf) in leaves_eval[t].iter().enumerate() {
            let bucket = &members[leaf];
            if bucket.is_empty() {
                continue;
            }
            let share = 1.0 / bucket.len() as f64;
            for &j in bucket {
                w[(i, j)] += share;
            }
        }
    }
    w.scale_mut(1.0 / forest.n_trees() as f64);
    w
}

fn subset(x: &[Vec<f64>], rows: &[usize]) -> Vec<Vec<f64>> {
    rows.iter().map(|&i| x[i].clone()).collect()
}

fn indicator(y: &[u32], rows: &[usize], k: usize) -> Vec<f64> {
    rows.iter()
        .map(|&i| if (y[i] as usize) <= k { 1.0 } else { 0.0 })
        .collect()
}

fn derive_seed(seed: u64, label: &str, index: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    label.hash(&mut hasher);
    index.hash(&mut hasher);
    hasher.finish()
}
