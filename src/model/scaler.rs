use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Standard scaler: zero mean, unit variance per column.
///
/// Fitted once during training and reused for every scoring batch; columns
/// with zero variance keep a unit scale so they pass through centered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Self {
        let n = x.nrows() as f64;
        let mut means = Vec::with_capacity(x.ncols());
        let mut scales = Vec::with_capacity(x.ncols());

        for column in x.axis_iter(Axis(1)) {
            let mean = column.sum() / n;
            let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            means.push(mean);
            scales.push(if std == 0.0 { 1.0 } else { std });
        }

        Self { means, scales }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut scaled = x.clone();
        for (j, mut column) in scaled.axis_iter_mut(Axis(1)).enumerate() {
            column.mapv_inplace(|v| (v - self.means[j]) / self.scales[j]);
        }
        scaled
    }

    pub fn fit_transform(x: &Array2<f64>) -> (Self, Array2<f64>) {
        let scaler = Self::fit(x);
        let scaled = scaler.transform(x);
        (scaler, scaled)
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_scaled_columns_have_zero_mean_unit_variance() {
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        let (_, scaled) = StandardScaler::fit_transform(&x);

        for column in scaled.axis_iter(Axis(1)) {
            let mean = column.sum() / column.len() as f64;
            let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / column.len() as f64;
            assert!(mean.abs() < 1e-12);
            assert!((var - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_zero_variance_column_passes_through() {
        let x = array![[5.0, 1.0], [5.0, 2.0], [5.0, 3.0]];
        let (scaler, scaled) = StandardScaler::fit_transform(&x);

        for v in scaled.column(0) {
            assert_eq!(*v, 0.0);
        }
        assert_eq!(scaler.n_features(), 2);
    }

    #[test]
    fn test_transform_reuses_fitted_parameters() {
        let train = array![[0.0], [10.0]];
        let scaler = StandardScaler::fit(&train);

        let test = array![[5.0]];
        let scaled = scaler.transform(&test);
        assert!(scaled[[0, 0]].abs() < 1e-12); // 5 is the training mean
    }
}
