use ndarray::{Array2, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::IsolationForestConfig;
use crate::error::{Error, Result};
use crate::eval::metrics::quantile;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// Isolation forest anomaly detector.
///
/// Scores follow the sklearn convention: `score_samples` is in [-1, 0) with
/// lower meaning more anomalous, and `decision_function` subtracts the
/// contamination-quantile offset computed on the training data so that
/// negative values are predicted outliers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<TreeNode>,
    sample_size: usize,
    offset: f64,
}

impl IsolationForest {
    pub fn fit(x: &Array2<f64>, config: &IsolationForestConfig, seed: u64) -> Result<Self> {
        let n = x.nrows();
        if n < 2 {
            return Err(Error::InsufficientData(format!(
                "isolation forest requires at least 2 rows, got {}",
                n
            )));
        }

        let sample_size = config.max_samples.min(n);
        let height_limit = (sample_size as f64).log2().ceil() as usize;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut trees = Vec::with_capacity(config.n_estimators);
        for _ in 0..config.n_estimators {
            let indices: Vec<usize> = if config.bootstrap {
                (0..sample_size).map(|_| rng.gen_range(0..n)).collect()
            } else {
                rand::seq::index::sample(&mut rng, n, sample_size).into_vec()
            };
            trees.push(build_tree(x, &indices, 0, height_limit, &mut rng));
        }

        let mut forest = Self {
            trees,
            sample_size,
            offset: 0.0,
        };

        // The contamination fraction of training rows falls below the
        // offset and is predicted anomalous.
        let train_scores = forest.score_samples(x);
        forest.offset = quantile(&train_scores, config.contamination).unwrap_or(0.0);

        Ok(forest)
    }

    /// Anomaly score per row, lower = more anomalous.
    pub fn score_samples(&self, x: &Array2<f64>) -> Vec<f64> {
        let normalizer = average_path_length(self.sample_size);
        x.rows()
            .into_iter()
            .map(|row| {
                let total: f64 = self
                    .trees
                    .iter()
                    .map(|tree| path_length(&row, tree, 0.0))
                    .sum();
                let mean_path = total / self.trees.len() as f64;
                -(2f64.powf(-mean_path / normalizer))
            })
            .collect()
    }

    /// Shifted anomaly score: negative values are predicted outliers.
    pub fn decision_function(&self, x: &Array2<f64>) -> Vec<f64> {
        self.score_samples(x)
            .into_iter()
            .map(|s| s - self.offset)
            .collect()
    }

    /// Binary outlier labels: -1 anomaly, 1 normal.
    pub fn predict(&self, x: &Array2<f64>) -> Vec<i32> {
        self.decision_function(x)
            .into_iter()
            .map(|d| if d < 0.0 { -1 } else { 1 })
            .collect()
    }
}

fn build_tree(
    x: &Array2<f64>,
    indices: &[usize],
    depth: usize,
    height_limit: usize,
    rng: &mut ChaCha8Rng,
) -> TreeNode {
    if depth >= height_limit || indices.len() <= 1 {
        return TreeNode::Leaf {
            size: indices.len(),
        };
    }

    // Only features that still vary across this partition can split it.
    let splittable: Vec<(usize, f64, f64)> = (0..x.ncols())
        .filter_map(|feature| {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for &i in indices {
                let v = x[[i, feature]];
                lo = lo.min(v);
                hi = hi.max(v);
            }
            (lo < hi).then_some((feature, lo, hi))
        })
        .collect();

    if splittable.is_empty() {
        return TreeNode::Leaf {
            size: indices.len(),
        };
    }

    let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
    let threshold = rng.gen_range(lo..hi);

    let (left, right): (Vec<usize>, Vec<usize>) =
        indices.iter().partition(|&&i| x[[i, feature]] < threshold);

    TreeNode::Split {
        feature,
        threshold,
        left: Box::new(build_tree(x, &left, depth + 1, height_limit, rng)),
        right: Box::new(build_tree(x, &right, depth + 1, height_limit, rng)),
    }
}

fn path_length(row: &ArrayView1<f64>, node: &TreeNode, depth: f64) -> f64 {
    match node {
        TreeNode::Leaf { size } => depth + average_path_length(*size),
        TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if row[*feature] < *threshold {
                path_length(row, left, depth + 1.0)
            } else {
                path_length(row, right, depth + 1.0)
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over n points.
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
}
