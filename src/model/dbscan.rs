use std::collections::VecDeque;

use ndarray::Array2;

/// Cluster label assigned to points that belong to no cluster.
pub const NOISE_LABEL: i64 = -1;

/// Density-based clustering. Points in no dense region are labeled noise
/// and treated as anomalies by the ensemble.
///
/// There is no fitted state to keep: clustering has no out-of-sample
/// inference mode, so every scoring batch is re-clustered from scratch.
/// Labels are therefore not comparable across batches with different rows.
pub fn fit_predict(x: &Array2<f64>, eps: f64, min_samples: usize) -> Vec<i64> {
    let n = x.nrows();
    let mut labels = vec![NOISE_LABEL; n];
    if n == 0 {
        return labels;
    }

    // A point's own position counts toward min_samples, as in sklearn.
    let neighborhoods: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| distance(x, i, j) <= eps)
                .collect::<Vec<_>>()
        })
        .collect();

    let mut visited = vec![false; n];
    let mut cluster = 0i64;

    for start in 0..n {
        if visited[start] || neighborhoods[start].len() < min_samples {
            continue;
        }

        // Expand a new cluster from this core point.
        let mut queue: VecDeque<usize> = VecDeque::new();
        queue.push_back(start);
        visited[start] = true;

        while let Some(point) = queue.pop_front() {
            labels[point] = cluster;
            if neighborhoods[point].len() < min_samples {
                continue; // border point, do not expand through it
            }
            for &neighbor in &neighborhoods[point] {
                if !visited[neighbor] {
                    visited[neighbor] = true;
                    queue.push_back(neighbor);
                }
            }
        }

        cluster += 1;
    }

    labels
}

fn distance(x: &Array2<f64>, i: usize, j: usize) -> f64 {
    x.row(i)
        .iter()
        .zip(x.row(j).iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Number of clusters found, excluding the noise label.
pub fn n_clusters(labels: &[i64]) -> usize {
    labels
        .iter()
        .filter(|&&l| l != NOISE_LABEL)
        .collect::<std::collections::HashSet<_>>()
        .len()
}
