//! Label-free quality indices. Each clustering index returns `None` on
//! degenerate input (a single cluster, coincident centroids) instead of
//! erroring, so a bad label distribution never aborts an evaluation run.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};

/// Quantile with linear interpolation between order statistics, matching
/// the conventions of the numeric stack the scores are analyzed with.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        return Some(sorted[lower]);
    }
    let weight = position - lower as f64;
    Some(sorted[lower] * (1.0 - weight) + sorted[upper] * weight)
}

/// Mean silhouette coefficient. None when fewer than 2 clusters or when
/// every point is its own cluster.
pub fn silhouette_score(x: &Array2<f64>, labels: &[i64]) -> Option<f64> {
    let n = x.nrows();
    let clusters = cluster_indices(labels);
    if clusters.len() < 2 || clusters.len() >= n {
        return None;
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = &clusters[&labels[i]];
        let s = if own.len() <= 1 {
            0.0
        } else {
            let a = own
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| distance(x, i, j))
                .sum::<f64>()
                / (own.len() - 1) as f64;

            let b = clusters
                .iter()
                .filter(|(label, _)| **label != labels[i])
                .map(|(_, members)| {
                    members.iter().map(|&j| distance(x, i, j)).sum::<f64>()
                        / members.len() as f64
                })
                .fold(f64::INFINITY, f64::min);

            if a.max(b) == 0.0 {
                0.0
            } else {
                (b - a) / a.max(b)
            }
        };
        total += s;
    }

    Some(total / n as f64)
}

/// Ratio of between-cluster to within-cluster dispersion. None when the
/// within-cluster dispersion is zero or fewer than 2 clusters exist.
pub fn calinski_harabasz_score(x: &Array2<f64>, labels: &[i64]) -> Option<f64> {
    let n = x.nrows();
    let clusters = cluster_indices(labels);
    let k = clusters.len();
    if k < 2 || k >= n {
        return None;
    }

    let overall_mean = mean_row(x, &(0..n).collect::<Vec<_>>());

    let mut between = 0.0;
    let mut within = 0.0;
    for members in clusters.values() {
        let centroid = mean_row(x, members);
        between += members.len() as f64 * squared_distance(&centroid, &overall_mean);
        for &i in members {
            within += x
                .row(i)
                .iter()
                .zip(centroid.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>();
        }
    }

    if within == 0.0 {
        return None;
    }
    Some((between / (k - 1) as f64) / (within / (n - k) as f64))
}

/// Mean over clusters of the worst-case similarity to another cluster.
/// None when fewer than 2 clusters exist or two centroids coincide.
pub fn davies_bouldin_score(x: &Array2<f64>, labels: &[i64]) -> Option<f64> {
    let clusters = cluster_indices(labels);
    let k = clusters.len();
    if k < 2 {
        return None;
    }

    let keys: Vec<i64> = clusters.keys().copied().collect();
    let centroids: Vec<Array1<f64>> = keys.iter().map(|l| mean_row(x, &clusters[l])).collect();
    let scatter: Vec<f64> = keys
        .iter()
        .enumerate()
        .map(|(idx, l)| {
            let members = &clusters[l];
            members
                .iter()
                .map(|&i| {
                    x.row(i)
                        .iter()
                        .zip(centroids[idx].iter())
                        .map(|(a, b)| (a - b).powi(2))
                        .sum::<f64>()
                        .sqrt()
                })
                .sum::<f64>()
                / members.len() as f64
        })
        .collect();

    let mut total = 0.0;
    for i in 0..k {
        let mut worst = 0.0f64;
        for j in 0..k {
            if i == j {
                continue;
            }
            let centroid_distance = squared_distance(&centroids[i], &centroids[j]).sqrt();
            if centroid_distance == 0.0 {
                return None;
            }
            worst = worst.max((scatter[i] + scatter[j]) / centroid_distance);
        }
        total += worst;
    }

    Some(total / k as f64)
}

fn cluster_indices(labels: &[i64]) -> BTreeMap<i64, Vec<usize>> {
    let mut clusters: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        clusters.entry(label).or_default().push(i);
    }
    clusters
}

fn mean_row(x: &Array2<f64>, indices: &[usize]) -> Array1<f64> {
    let mut mean = Array1::zeros(x.ncols());
    for &i in indices {
        mean += &x.row(i);
    }
    mean / indices.len() as f64
}

fn distance(x: &Array2<f64>, i: usize, j: usize) -> f64 {
    x.row(i)
        .iter()
        .zip(x.row(j).iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn squared_distance(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}
