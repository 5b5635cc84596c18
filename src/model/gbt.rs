//! Gradient boosted trees for race-4 win prediction.
//!
//! Trees are regression stumps over the logistic loss: each round fits a
//! depth-limited tree to the current gradient and hessian, with
//! Newton-step leaf values and an xgboost-style split gain.

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::ModelError;

/// Boosting hyperparameters.
#[derive(Debug, Clone)]
pub struct GbtParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows sampled per tree; 1.0 uses every row
    pub subsample: f64,
    pub seed: u64,
}

impl Default for GbtParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 5,
            subsample: 1.0,
            seed: 42,
        }
    }
}

/// L2 regularization on leaf values.
const LAMBDA: f64 = 1.0;

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let exp_z = z.exp();
        exp_z / (1.0 + exp_z)
    }
}

#[derive(Debug, Clone)]
struct Node {
    feature: usize,
    threshold: f64,
    left: usize,
    right: usize,
    value: f64,
    is_leaf: bool,
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            let node = &self.nodes[idx];
            if node.is_leaf {
                return node.value;
            }
            idx = if row[node.feature] <= node.threshold {
                node.left
            } else {
                node.right
            };
        }
    }
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    grad: &'a [f64],
    hess: &'a [f64],
    max_depth: usize,
    min_samples_leaf: usize,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn build(mut self, indices: &[usize]) -> Tree {
        self.grow(indices, 0);
        Tree { nodes: self.nodes }
    }

    fn sums(&self, indices: &[usize]) -> (f64, f64) {
        let g = indices.iter().map(|&i| self.grad[i]).sum();
        let h = indices.iter().map(|&i| self.hess[i]).sum();
        (g, h)
    }

    fn push_leaf(&mut self, value: f64) -> usize {
        self.nodes.push(Node {
            feature: 0,
            threshold: 0.0,
            left: 0,
            right: 0,
            value,
            is_leaf: true,
        });
        self.nodes.len() - 1
    }

    fn grow(&mut self, indices: &[usize], depth: usize) -> usize {
        let (sum_g, sum_h) = self.sums(indices);
        let leaf_value = sum_g / (sum_h + LAMBDA);

        if depth >= self.max_depth || indices.len() < 2 * self.min_samples_leaf.max(1) {
            return self.push_leaf(leaf_value);
        }
        let split = match self.best_split(indices, sum_g, sum_h) {
            Some(split) => split,
            None => return self.push_leaf(leaf_value),
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.x[[i, split.feature]] <= split.threshold);

        let node_id = self.nodes.len();
        self.nodes.push(Node {
            feature: split.feature,
            threshold: split.threshold,
            left: 0,
            right: 0,
            value: leaf_value,
            is_leaf: false,
        });
        let left = self.grow(&left_idx, depth + 1);
        let right = self.grow(&right_idx, depth + 1);
        self.nodes[node_id].left = left;
        self.nodes[node_id].right = right;
        node_id
    }

    fn best_split(&self, indices: &[usize], sum_g: f64, sum_h: f64) -> Option<Split> {
        let parent_score = sum_g * sum_g / (sum_h + LAMBDA);
        let min_leaf = self.min_samples_leaf.max(1);
        let mut best: Option<Split> = None;

        for feature in 0..self.x.ncols() {
            let mut ordered: Vec<(f64, f64, f64)> = indices
                .iter()
                .map(|&i| (self.x[[i, feature]], self.grad[i], self.hess[i]))
                .collect();
            ordered.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let mut g_left = 0.0;
            let mut h_left = 0.0;
            for k in 0..ordered.len() - 1 {
                g_left += ordered[k].1;
                h_left += ordered[k].2;
                if ordered[k].0 == ordered[k + 1].0 {
                    continue;
                }
                let left_n = k + 1;
                let right_n = ordered.len() - left_n;
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }
                let g_right = sum_g - g_left;
                let h_right = sum_h - h_left;
                let gain = g_left * g_left / (h_left + LAMBDA)
                    + g_right * g_right / (h_right + LAMBDA)
                    - parent_score;
                if gain > best.as_ref().map_or(1e-12, |b| b.gain) {
                    best = Some(Split {
                        feature,
                        threshold: (ordered[k].0 + ordered[k + 1].0) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Gradient boosted tree classifier.
#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    params: GbtParams,
    trees: Vec<Tree>,
    base_score: f64,
    n_features: usize,
}

impl Default for GradientBoostedTrees {
    fn default() -> Self {
        Self::new(GbtParams::default())
    }
}

impl GradientBoostedTrees {
    pub fn new(params: GbtParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
            base_score: 0.0,
            n_features: 0,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError> {
        if x.nrows() == 0 {
            return Err(ModelError::EmptyData);
        }
        if x.nrows() != y.len() {
            return Err(ModelError::DimensionMismatch {
                expected: x.nrows(),
                got: y.len(),
            });
        }

        let n = x.nrows();
        self.n_features = x.ncols();
        let pos_rate = (y.sum() / n as f64).clamp(1e-6, 1.0 - 1e-6);
        self.base_score = (pos_rate / (1.0 - pos_rate)).ln();
        self.trees.clear();

        let mut scores = vec![self.base_score; n];
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let all: Vec<usize> = (0..n).collect();

        for _ in 0..self.params.n_estimators {
            let mut grad = vec![0.0; n];
            let mut hess = vec![0.0; n];
            for i in 0..n {
                let p = sigmoid(scores[i]);
                grad[i] = y[i] - p;
                hess[i] = (p * (1.0 - p)).max(1e-12);
            }

            let sample: Vec<usize> = if self.params.subsample < 1.0 {
                let take = ((n as f64 * self.params.subsample).round() as usize).clamp(1, n);
                let mut idx = all.clone();
                idx.shuffle(&mut rng);
                idx.truncate(take);
                idx
            } else {
                all.clone()
            };

            let tree = TreeBuilder {
                x,
                grad: &grad,
                hess: &hess,
                max_depth: self.params.max_depth,
                min_samples_leaf: self.params.min_samples_leaf,
                nodes: Vec::new(),
            }
            .build(&sample);

            for i in 0..n {
                scores[i] += self.params.learning_rate * tree.predict_row(x.row(i));
            }
            self.trees.push(tree);
        }

        tracing::debug!(trees = self.trees.len(), "boosting finished");
        Ok(())
    }

    /// Predicted win probabilities.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::NotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(ModelError::DimensionMismatch {
                expected: self.n_features,
                got: x.ncols(),
            });
        }

        let mut out = Array1::zeros(x.nrows());
        for i in 0..x.nrows() {
            let mut score = self.base_score;
            for tree in &self.trees {
                score += self.params.learning_rate * tree.predict_row(x.row(i));
            }
            out[i] = sigmoid(score);
        }
        Ok(out)
    }

    /// Predicted labels at the 0.5 threshold.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        let proba = self.predict_proba(x)?;
        Ok(proba.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
