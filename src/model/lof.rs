use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Local outlier factor over the rows it was fitted on.
///
/// The factor is derived entirely from neighbor distances at fit time;
/// there is no out-of-sample scoring step. Factors follow the sklearn
/// convention of `negative_outlier_factor_`: close to -1 for inliers,
/// strongly negative for outliers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalOutlierFactor {
    n_neighbors: usize,
    negative_outlier_factor: Vec<f64>,
}

impl LocalOutlierFactor {
    pub fn fit(x: &Array2<f64>, n_neighbors: usize) -> Result<Self> {
        let n = x.nrows();
        if n <= n_neighbors {
            return Err(Error::InsufficientData(format!(
                "LOF with {} neighbors requires more than {} rows, got {}",
                n_neighbors, n_neighbors, n
            )));
        }

        // Brute-force neighbor search; batch sizes here are warehouse-scale
        // wallet tables, not streaming data.
        let distances = pairwise_distances(x);

        let mut neighbors: Vec<Vec<usize>> = Vec::with_capacity(n);
        let mut k_distance: Vec<f64> = Vec::with_capacity(n);
        for i in 0..n {
            let mut order: Vec<usize> = (0..n).filter(|&j| j != i).collect();
            order.sort_by(|&a, &b| distances[i][a].partial_cmp(&distances[i][b]).unwrap());
            order.truncate(n_neighbors);
            k_distance.push(distances[i][*order.last().unwrap()]);
            neighbors.push(order);
        }

        // Local reachability density, with sklearn's epsilon guard against
        // duplicate points collapsing the mean reachability to zero.
        let mut lrd: Vec<f64> = Vec::with_capacity(n);
        for i in 0..n {
            let mean_reach: f64 = neighbors[i]
                .iter()
                .map(|&j| distances[i][j].max(k_distance[j]))
                .sum::<f64>()
                / n_neighbors as f64;
            lrd.push(1.0 / (mean_reach + 1e-10));
        }

        let negative_outlier_factor: Vec<f64> = (0..n)
            .map(|i| {
                let neighbor_lrd: f64 =
                    neighbors[i].iter().map(|&j| lrd[j]).sum::<f64>() / n_neighbors as f64;
                -(neighbor_lrd / lrd[i])
            })
            .collect();

        Ok(Self {
            n_neighbors,
            negative_outlier_factor,
        })
    }

    /// Per-row factor for the fitted rows: ~-1 normal, << -1 outlier.
    pub fn negative_outlier_factor(&self) -> &[f64] {
        &self.negative_outlier_factor
    }

    pub fn n_samples(&self) -> usize {
        self.negative_outlier_factor.len()
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }
}

fn pairwise_distances(x: &Array2<f64>) -> Vec<Vec<f64>> {
    let n = x.nrows();
    let mut distances = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = x
                .row(i)
                .iter()
                .zip(x.row(j).iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                .sqrt();
            distances[i][j] = d;
            distances[j][i] = d;
        }
    }
    distances
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn cluster_with_outlier() -> Array2<f64> {
        let mut rows = Vec::new();
        for i in 0..4 {
            for j in 0..4 {
                rows.push([i as f64 * 0.1, j as f64 * 0.1]);
            }
        }
        rows.push([8.0, 8.0]);
        let n = rows.len();
        Array2::from_shape_vec((n, 2), rows.concat()).unwrap()
    }

    #[test]
    fn test_outlier_has_most_negative_factor() {
        let x = cluster_with_outlier();
        let lof = LocalOutlierFactor::fit(&x, 5).unwrap();
        let factors = lof.negative_outlier_factor();

        let outlier = x.nrows() - 1;
        let min_index = factors
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(min_index, outlier);
        assert!(factors[outlier] < -2.0);
    }

    #[test]
    fn test_inliers_near_minus_one() {
        let x = cluster_with_outlier();
        let lof = LocalOutlierFactor::fit(&x, 5).unwrap();
        let factors = lof.negative_outlier_factor();

        // Interior grid points sit at typical local density.
        assert!(factors[5] > -1.5 && factors[5] < -0.5);
    }

    #[test]
    fn test_too_few_rows() {
        let x = Array2::zeros((5, 2));
        assert!(matches!(
            LocalOutlierFactor::fit(&x, 5),
            Err(Error::InsufficientData(_))
        ));
    }

    #[test]
    fn test_duplicate_points_do_not_divide_by_zero() {
        let x = Array2::zeros((10, 2));
        let lof = LocalOutlierFactor::fit(&x, 3).unwrap();
        for f in lof.negative_outlier_factor() {
            assert!(f.is_finite());
        }
    }
}
