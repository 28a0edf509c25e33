//! Regression forest: bagged or subsampled trees with out-of-bag prediction.
//!
//! Trees are grown in parallel but each one owns an RNG seeded from the
//! forest seed and its index, so results do not depend on scheduling.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::error::AppError;
use crate::forest::tree::{RegressionTree, TreeOptions};

/// Forest growth settings, shared by every threshold forest of a fit.
#[derive(Debug, Clone, Copy)]
pub struct ForestOptions {
    pub trees: usize,
    pub min_leaf: usize,
    /// Share of features considered per split, in `(0, 1]`.
    pub max_features: f64,
    /// Draw tree samples with replacement (bootstrap) instead of subsampling.
    pub replace: bool,
    /// Share of rows drawn per tree, in `(0, 1]`.
    pub sample_fraction: f64,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct RegressionForest {
    trees: Vec<RegressionTree>,
    /// `trees × rows`: whether a training row entered a tree's sample.
    in_bag: Vec<Vec<bool>>,
    n_train: usize,
}

impl RegressionForest {
    pub fn fit(x: &[Vec<f64>], y: &[f64], opts: &ForestOptions) -> Result<Self, AppError> {
        if opts.trees == 0 {
            return Err(AppError::new(2, "Tree count must be > 0."));
        }
        let n = x.len();
        if n == 0 {
            return Err(AppError::new(3, "Cannot grow a forest on zero rows."));
        }
        if y.len() != n {
            return Err(AppError::new(4, "Covariate and outcome lengths differ."));
        }
        let p = x[0].len();
        if p == 0 {
            return Err(AppError::new(3, "Cannot grow a forest without features."));
        }

        // Feature fractions floor (at least one feature); row fractions round.
        let mtry = ((opts.max_features * p as f64).floor() as usize).clamp(1, p);
        let draw = ((opts.sample_fraction * n as f64).round() as usize).clamp(1, n);
        let tree_opts = TreeOptions {
            min_leaf: opts.min_leaf,
            mtry,
        };

        let grown: Vec<(RegressionTree, Vec<bool>)> = (0..opts.trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(tree_seed(opts.seed, t));
                let mut mask = vec![false; n];
                let rows: Vec<usize> = if opts.replace {
                    (0..draw)
                        .map(|_| {
                            let i = rng.gen_range(0..n);
                            mask[i] = true;
                            i
                        })
                        .collect()
                } else {
                    let mut idx: Vec<usize> = (0..n).collect();
                    idx.shuffle(&mut rng);
                    idx.truncate(draw);
                    for &i in &idx {
                        mask[i] = true;
                    }
                    idx
                };
                let tree = RegressionTree::fit(x, y, &rows, &tree_opts, &mut rng);
                (tree, mask)
            })
            .collect();

        let mut trees = Vec::with_capacity(grown.len());
        let mut in_bag = Vec::with_capacity(grown.len());
        for (tree, mask) in grown {
            trees.push(tree);
            in_bag.push(mask);
        }

        Ok(Self {
            trees,
            in_bag,
            n_train: n,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_train(&self) -> usize {
        self.n_train
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// Ensemble mean prediction for each row.
    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        let mut out = vec![0.0; x.len()];
        for tree in &self.trees {
            for (acc, row) in out.iter_mut().zip(x) {
                *acc += tree.predict_row(row);
            }
        }
        let inv = 1.0 / self.trees.len() as f64;
        for acc in &mut out {
            *acc *= inv;
        }
        out
    }

    /// Out-of-bag prediction for the training rows.
    ///
    /// A row that every tree happened to draw has no out-of-bag trees; such
    /// rows fall back to the full ensemble mean and are counted so callers
    /// can log them.
    pub fn oob_predict(&self, x: &[Vec<f64>]) -> (Vec<f64>, usize) {
        debug_assert_eq!(x.len(), self.n_train, "out-of-bag needs the training rows");
        let mut preds = vec![0.0; x.len()];
        let mut fallbacks = 0;
        for (i, row) in x.iter().enumerate() {
            let mut sum = 0.0;
            let mut used = 0usize;
            for (tree, bag) in self.trees.iter().zip(&self.in_bag) {
                if !bag[i] {
                    sum += tree.predict_row(row);
                    used += 1;
                }
            }
            if used == 0 {
                let full: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
                preds[i] = full / self.trees.len() as f64;
                fallbacks += 1;
            } else {
                preds[i] = sum / used as f64;
            }
        }
        (preds, fallbacks)
    }

    /// Leaf id of every row in every tree (`trees × rows`).
    pub fn apply(&self, x: &[Vec<f64>]) -> Vec<Vec<usize>> {
        self.trees
            .iter()
            .map(|tree| x.iter().map(|row| tree.apply_row(row)).collect())
            .collect()
    }

    /// Overwrite the leaf values of one tree (honest re-estimation).
    pub fn set_tree_leaf_values(&mut self, tree: usize, values: &[f64]) {
        self.trees[tree].set_leaf_values(values);
    }
}

fn tree_seed(seed: u64, index: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    index.hash(&mut hasher);
    hasher.finish()
}
