//! A single regression tree grown on a row subset.
//!
//! Trees live in a flat arena (`Vec<Node>`, root at index 0). Leaves carry a
//! dense id so their values can be swapped out after honest re-estimation
//! without touching the split structure.

use rand::prelude::*;
use rand::rngs::StdRng;

/// Splits must beat the parent sum of squares by at least this much.
const SPLIT_TOL: f64 = 1e-12;

/// Per-tree growth settings.
#[derive(Debug, Clone, Copy)]
pub struct TreeOptions {
    /// Minimum rows on each side of every split.
    pub min_leaf: usize,
    /// Number of candidate features drawn per split.
    pub mtry: usize,
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        id: usize,
        value: f64,
    },
}

#[derive(Debug, Clone)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    n_leaves: usize,
}

impl RegressionTree {
    /// Grow a tree on `rows` (indices into `x` / `y`).
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        rows: &[usize],
        opts: &TreeOptions,
        rng: &mut StdRng,
    ) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            n_leaves: 0,
        };
        let mut rows = rows.to_vec();
        tree.grow(x, y, &mut rows, opts, rng);
        tree
    }

    fn grow(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        rows: &mut [usize],
        opts: &TreeOptions,
        rng: &mut StdRng,
    ) -> usize {
        if let Some((feature, threshold)) = best_split(x, y, rows, opts, rng) {
            let split_at = partition(x, rows, feature, threshold);
            let node_idx = self.nodes.len();
            // Children indices are patched in after both subtrees exist.
            self.nodes.push(Node::Split {
                feature,
                threshold,
                left: 0,
                right: 0,
            });
            let (lo, hi) = rows.split_at_mut(split_at);
            let left = self.grow(x, y, lo, opts, rng);
            let right = self.grow(x, y, hi, opts, rng);
            if let Node::Split {
                left: l, right: r, ..
            } = &mut self.nodes[node_idx]
            {
                *l = left;
                *r = right;
            }
            node_idx
        } else {
            let id = self.n_leaves;
            self.n_leaves += 1;
            let value = if rows.is_empty() {
                0.0
            } else {
                rows.iter().map(|&i| y[i]).sum::<f64>() / rows.len() as f64
            };
            let node_idx = self.nodes.len();
            self.nodes.push(Node::Leaf { id, value });
            node_idx
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.n_leaves
    }

    /// Leaf id reached by a row.
    pub fn apply_row(&self, row: &[f64]) -> usize {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                Node::Leaf { id, .. } => return *id,
            }
        }
    }

    /// Leaf value reached by a row.
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                Node::Leaf { value, .. } => return *value,
            }
        }
    }

    /// Replace every leaf value; `values` is indexed by leaf id.
    pub fn set_leaf_values(&mut self, values: &[f64]) {
        debug_assert_eq!(values.len(), self.n_leaves, "one value per leaf");
        for node in &mut self.nodes {
            if let Node::Leaf { id, value } = node {
                *value = values[*id];
            }
        }
    }
}

/// Exhaustive best-split search over a random feature subset.
///
/// Candidate thresholds are midpoints between adjacent distinct values.
/// Both children must keep at least `min_leaf` rows, and the split must
/// reduce the parent sum of squares. Returns `None` for pure or small nodes.
fn best_split(
    x: &[Vec<f64>],
    y: &[f64],
    rows: &[usize],
    opts: &TreeOptions,
    rng: &mut StdRng,
) -> Option<(usize, f64)> {
    let n = rows.len();
    if n < 2 * opts.min_leaf.max(1) {
        return None;
    }

    let total_sum: f64 = rows.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = rows.iter().map(|&i| y[i] * y[i]).sum();
    let parent_sse = total_sq - total_sum * total_sum / n as f64;
    if parent_sse <= SPLIT_TOL {
        return None;
    }

    let p = x[rows[0]].len();
    let mut features: Vec<usize> = (0..p).collect();
    features.shuffle(rng);
    features.truncate(opts.mtry.clamp(1, p));

    let mut best: Option<(usize, f64, f64)> = None;
    let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);
    for &feature in &features {
        pairs.clear();
        pairs.extend(rows.iter().map(|&i| (x[i][feature], y[i])));
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 1..n {
            let (v_prev, y_prev) = pairs[k - 1];
            left_sum += y_prev;
            left_sq += y_prev * y_prev;
            let v = pairs[k].0;
            if v <= v_prev {
                continue;
            }
            if k < opts.min_leaf || n - k < opts.min_leaf {
                continue;
            }
            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / k as f64)
                + (right_sq - right_sum * right_sum / (n - k) as f64);
            if best.map_or(true, |(_, _, s)| sse < s) {
                best = Some((feature, 0.5 * (v_prev + v), sse));
            }
        }
    }

    best.filter(|&(_, _, sse)| sse < parent_sse - SPLIT_TOL)
        .map(|(feature, threshold, _)| (feature, threshold))
}

/// Move rows with `x[feature] <= threshold` to the front; returns the cut.
fn partition(x: &[Vec<f64>], rows: &mut [usize], feature: usize, threshold: f64) -> usize {
    let mut split_at = 0;
    for i in 0..rows.len() {
        if x[rows[i]][feature] <= threshold {
            rows.swap(i, split_at);
            split_at += 1;
        }
    }
    split_at
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64]).collect();
        let y = vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn separable_step_is_recovered_exactly() {
        let (x, y) = step_data();
        let rows: Vec<usize> = (0..x.len()).collect();
        let opts = TreeOptions {
            min_leaf: 1,
            mtry: 1,
        };
        let tree = RegressionTree::fit(&x, &y, &rows, &opts, &mut rng());

        for (row, &target) in x.iter().zip(&y) {
            assert_eq!(
                tree.predict_row(row),
                target,
                "row {row:?} should predict its own side of the step"
            );
        }
    }

    #[test]
    fn min_leaf_bounds_the_leaf_count() {
        let (x, y) = step_data();
        let rows: Vec<usize> = (0..x.len()).collect();
        let opts = TreeOptions {
            min_leaf: 4,
            mtry: 1,
        };
        let tree = RegressionTree::fit(&x, &y, &rows, &opts, &mut rng());
        assert!(
            tree.n_leaves() <= 2,
            "eight rows with min_leaf=4 allow at most one split, got {} leaves",
            tree.n_leaves()
        );
    }

    #[test]
    fn pure_node_stays_a_single_leaf() {
        let x: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64]).collect();
        let y = vec![0.5; 6];
        let rows: Vec<usize> = (0..6).collect();
        let opts = TreeOptions {
            min_leaf: 1,
            mtry: 1,
        };
        let tree = RegressionTree::fit(&x, &y, &rows, &opts, &mut rng());
        assert_eq!(tree.n_leaves(), 1, "constant outcome must not split");
        assert_eq!(tree.predict_row(&[3.0]), 0.5);
    }

    #[test]
    fn leaf_values_can_be_replaced_wholesale() {
        let (x, y) = step_data();
        let rows: Vec<usize> = (0..x.len()).collect();
        let opts = TreeOptions {
            min_leaf: 4,
            mtry: 1,
        };
        let mut tree = RegressionTree::fit(&x, &y, &rows, &opts, &mut rng());
        assert_eq!(tree.n_leaves(), 2);

        let replacement: Vec<f64> = (0..tree.n_leaves()).map(|id| 10.0 + id as f64).collect();
        tree.set_leaf_values(&replacement);

        let low = tree.apply_row(&[0.0]);
        let high = tree.apply_row(&[7.0]);
        assert_ne!(low, high, "step sides must reach different leaves");
        assert_eq!(tree.predict_row(&[0.0]), replacement[low]);
        assert_eq!(tree.predict_row(&[7.0]), replacement[high]);
    }

    #[test]
    fn growth_is_deterministic_for_a_fixed_rng_seed() {
        let (x, y) = step_data();
        let rows: Vec<usize> = (0..x.len()).collect();
        let opts = TreeOptions {
            min_leaf: 1,
            mtry: 1,
        };
        let a = RegressionTree::fit(&x, &y, &rows, &opts, &mut rng());
        let b = RegressionTree::fit(&x, &y, &rows, &opts, &mut rng());
        for row in &x {
            assert_eq!(a.predict_row(row), b.predict_row(row));
            assert_eq!(a.apply_row(row), b.apply_row(row));
        }
    }
}
