use std::path::{Path, PathBuf};

use chrono::Utc;
use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::eval::metrics;
use crate::features::types::{WalletFeatures, FEATURE_COLUMNS};
use crate::model::dbscan::{self, NOISE_LABEL};
use crate::model::isolation_forest::IsolationForest;
use crate::model::lof::LocalOutlierFactor;
use crate::model::scaler::StandardScaler;
use crate::model::types::{
    ClusteringEvaluation, EvaluationMetrics, FraudScore, IsolationEvaluation, ModelArtifact,
    ModelKind, RiskCategory, SkippedDetector, TrainingMetadata, MODEL_VERSION,
};

/// Ensemble weights per detector family. Renormalized over whichever
/// families actually produced a signal for a batch.
const ISOLATION_WEIGHT: f64 = 0.5;
const DENSITY_WEIGHT: f64 = 0.3;
const CLUSTERING_WEIGHT: f64 = 0.2;

/// Unsupervised fraud detector over the wallet feature table.
///
/// `fit` trains the configured detector families on one feature snapshot;
/// `predict` scores a batch of rows with the fitted state. The scaler is
/// fitted exactly once, during training, and reused verbatim for scoring.
pub struct FraudDetector {
    config: ModelConfig,
    scaler: Option<StandardScaler>,
    isolation_forest: Option<IsolationForest>,
    lof: Option<LocalOutlierFactor>,
    feature_columns: Vec<String>,
    training_metadata: Option<TrainingMetadata>,
}

impl FraudDetector {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            scaler: None,
            isolation_forest: None,
            lof: None,
            feature_columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            training_metadata: None,
        }
    }

    pub fn training_metadata(&self) -> Option<&TrainingMetadata> {
        self.training_metadata.as_ref()
    }

    pub fn scaler(&self) -> Option<&StandardScaler> {
        self.scaler.as_ref()
    }

    pub fn isolation_forest(&self) -> Option<&IsolationForest> {
        self.isolation_forest.as_ref()
    }

    /// Train the configured families on the feature snapshot.
    ///
    /// In ensemble mode a family that cannot fit (too few rows for its
    /// hyperparameters) is logged and skipped; training fails only when no
    /// family fits. In single-family mode the failure propagates.
    pub fn fit(&mut self, rows: &[WalletFeatures]) -> Result<()> {
        if rows.is_empty() {
            return Err(Error::InsufficientData(
                "no feature rows to train on".to_string(),
            ));
        }

        let started_at = Utc::now();
        let kind = self.config.kind;
        let n = rows.len();

        let matrix = build_matrix(rows);
        let (scaler, scaled) = StandardScaler::fit_transform(&matrix);

        // Deterministic shuffle split; the held-out fraction is only used
        // for evaluation reporting, never for fitting the scaler.
        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.random_seed);
        indices.shuffle(&mut rng);
        let n_test = (((n as f64) * self.config.test_size).ceil() as usize).min(n - 1);
        let (test_indices, train_indices) = indices.split_at(n_test);
        let train = scaled.select(Axis(0), train_indices);
        let test = scaled.select(Axis(0), test_indices);

        tracing::info!(
            kind = kind.as_str(),
            total = n,
            train = train_indices.len(),
            test = test_indices.len(),
            "Training fraud detector"
        );

        let mut skipped: Vec<SkippedDetector> = Vec::new();
        let mut evaluation = EvaluationMetrics::default();

        if kind.wants_isolation() {
            match IsolationForest::fit(
                &train,
                &self.config.isolation_forest,
                self.config.random_seed,
            ) {
                Ok(forest) => {
                    evaluation.isolation_forest = evaluate_isolation(&forest, &test);
                    self.isolation_forest = Some(forest);
                }
                Err(e) => absorb_or_fail(kind, "isolation_forest", e, &mut skipped)?,
            }
        }

        // LOF factors are defined for the rows they were fitted on, so the
        // fit covers the full snapshot rather than the train split.
        if kind.wants_density() {
            match LocalOutlierFactor::fit(&scaled, self.config.lof.n_neighbors) {
                Ok(lof) => self.lof = Some(lof),
                Err(e) => absorb_or_fail(kind, "lof", e, &mut skipped)?,
            }
        }

        // Clustering keeps no fitted state; the held-out split is clustered
        // once here purely for the quality report.
        if kind.wants_clustering() && !test_indices.is_empty() {
            evaluation.clustering = Some(evaluate_clustering(
                &test,
                self.config.dbscan.eps,
                self.config.dbscan.min_samples,
            ));
        }

        let fitted_any = self.isolation_forest.is_some()
            || self.lof.is_some()
            || kind.wants_clustering();
        if !fitted_any {
            return Err(Error::InsufficientData(format!(
                "no detector family could be fitted on {} rows",
                n
            )));
        }

        for s in &skipped {
            tracing::warn!(family = %s.family, reason = %s.reason, "Detector family skipped");
        }

        let completed_at = Utc::now();
        self.scaler = Some(scaler);
        self.training_metadata = Some(TrainingMetadata {
            model_kind: kind.as_str().to_string(),
            training_samples: n,
            train_samples: train_indices.len(),
            test_samples: test_indices.len(),
            features_used: self.feature_columns.clone(),
            training_started_at: started_at,
            training_completed_at: completed_at,
            training_duration_seconds: (completed_at - started_at).num_milliseconds() as f64
                / 1000.0,
            random_seed: self.config.random_seed,
            test_size: self.config.test_size,
            contamination: self.config.isolation_forest.contamination,
            lof_contamination: self.config.lof.contamination,
            skipped_detectors: skipped,
            evaluation_metrics: evaluation,
        });

        tracing::info!(kind = kind.as_str(), "Training complete");
        Ok(())
    }

    /// Score a batch of feature rows with the fitted detector.
    pub fn predict(&self, rows: &[WalletFeatures]) -> Result<Vec<FraudScore>> {
        let scaler = self.scaler.as_ref().ok_or_else(|| {
            Error::Configuration("predict called before the detector was fitted".to_string())
        })?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let kind = self.config.kind;
        let n = rows.len();
        let scaled = scaler.transform(&build_matrix(rows));

        // Raw decision values and outlier factors stay internal; the
        // persisted per-model columns carry the normalized [0, 1] scores.
        let (iso_predictions, iso_probabilities) = match &self.isolation_forest {
            Some(forest) => {
                let decisions = forest.decision_function(&scaled);
                let predictions = forest.predict(&scaled);
                let probabilities = anomaly_score_to_probability(&decisions);
                (Some(predictions), Some(probabilities))
            }
            None => (None, None),
        };

        let lof_probabilities = self
            .density_factors(&scaled)
            .map(|factors| anomaly_score_to_probability(&factors));

        let cluster_labels = kind.wants_clustering().then(|| {
            dbscan::fit_predict(&scaled, self.config.dbscan.eps, self.config.dbscan.min_samples)
        });

        let scored_at = Utc::now();
        let mut scores = Vec::with_capacity(n);
        for i in 0..n {
            let mut weighted = 0.0;
            let mut weight_total = 0.0;
            if let Some(p) = &iso_probabilities {
                weighted += ISOLATION_WEIGHT * p[i];
                weight_total += ISOLATION_WEIGHT;
            }
            if let Some(p) = &lof_probabilities {
                weighted += DENSITY_WEIGHT * p[i];
                weight_total += DENSITY_WEIGHT;
            }
            let is_noise = cluster_labels.as_ref().map(|labels| labels[i] == NOISE_LABEL);
            if let Some(noise) = is_noise {
                weighted += CLUSTERING_WEIGHT * if noise { 1.0 } else { 0.0 };
                weight_total += CLUSTERING_WEIGHT;
            }
            let fraud_score = if weight_total > 0.0 {
                (weighted / weight_total).clamp(0.0, 1.0)
            } else {
                0.0
            };

            scores.push(FraudScore {
                wallet_address: rows[i].wallet_address.clone(),
                isolation_forest_score: iso_probabilities.as_ref().map(|p| p[i]),
                isolation_forest_prediction: iso_predictions.as_ref().map(|p| p[i]),
                lof_score: lof_probabilities.as_ref().map(|p| p[i]),
                dbscan_cluster: cluster_labels.as_ref().map(|labels| labels[i]),
                dbscan_is_noise: is_noise.map(|noise| noise as i32),
                fraud_score,
                risk_category: RiskCategory::from_score(fraud_score),
                scored_at,
                model_version: MODEL_VERSION.to_string(),
            });
        }

        Ok(scores)
    }

    /// Negative outlier factors for a scoring batch.
    ///
    /// The factors stored at fit time apply only to the exact rows they were
    /// fitted on; a batch of a different size is refitted in place. A batch
    /// too small to refit loses the density signal but keeps the others.
    fn density_factors(&self, scaled: &Array2<f64>) -> Option<Vec<f64>> {
        let fitted = self.lof.as_ref()?;
        if fitted.n_samples() == scaled.nrows() {
            return Some(fitted.negative_outlier_factor().to_vec());
        }
        match LocalOutlierFactor::fit(scaled, fitted.n_neighbors()) {
            Ok(lof) => Some(lof.negative_outlier_factor().to_vec()),
            Err(e) => {
                tracing::warn!(rows = scaled.nrows(), error = %e, "Density signal unavailable for batch");
                None
            }
        }
    }

    /// Snapshot of the fitted model for persistence.
    pub fn artifact(&self) -> Result<ModelArtifact> {
        let scaler = self.scaler.clone().ok_or_else(|| {
            Error::Configuration("cannot export an unfitted detector".to_string())
        })?;
        let metadata = self.training_metadata.clone().ok_or_else(|| {
            Error::Configuration("cannot export an unfitted detector".to_string())
        })?;
        Ok(ModelArtifact {
            scaler,
            isolation_forest: self.isolation_forest.clone(),
            lof: self.lof.clone(),
            feature_columns: self.feature_columns.clone(),
            metadata,
        })
    }

    /// Write the fitted model as a timestamped JSON artifact.
    pub fn save(&self, model_dir: &str) -> Result<PathBuf> {
        let artifact = self.artifact()?;
        std::fs::create_dir_all(model_dir)?;
        let path = Path::new(model_dir).join(format!(
            "fraud_model_{}.json",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        std::fs::write(&path, serde_json::to_string_pretty(&artifact)?)?;
        tracing::info!(path = %path.display(), "Saved model artifact");
        Ok(path)
    }

    /// Restore a detector from a saved artifact.
    pub fn load(path: &Path, config: ModelConfig) -> Result<Self> {
        let artifact: ModelArtifact = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        Ok(Self {
            config,
            scaler: Some(artifact.scaler),
            isolation_forest: artifact.isolation_forest,
            lof: artifact.lof,
            feature_columns: artifact.feature_columns,
            training_metadata: Some(artifact.metadata),
        })
    }
}

fn absorb_or_fail(
    kind: ModelKind,
    family: &str,
    error: Error,
    skipped: &mut Vec<SkippedDetector>,
) -> Result<()> {
    match (kind, error) {
        (ModelKind::Ensemble, Error::InsufficientData(reason)) => {
            skipped.push(SkippedDetector {
                family: family.to_string(),
                reason,
            });
            Ok(())
        }
        (_, error) => Err(error),
    }
}

fn evaluate_isolation(forest: &IsolationForest, test: &Array2<f64>) -> Option<IsolationEvaluation> {
    if test.nrows() == 0 {
        return None;
    }
    let anomalies = forest.predict(test).iter().filter(|&&p| p == -1).count();
    Some(IsolationEvaluation {
        test_samples: test.nrows(),
        anomalies_detected: anomalies,
        anomaly_ratio: anomalies as f64 / test.nrows() as f64,
    })
}

fn evaluate_clustering(test: &Array2<f64>, eps: f64, min_samples: usize) -> ClusteringEvaluation {
    let labels = dbscan::fit_predict(test, eps, min_samples);
    let noise = labels.iter().filter(|&&l| l == NOISE_LABEL).count();

    // Silhouette is defined only over clustered points.
    let clustered: Vec<usize> = (0..labels.len())
        .filter(|&i| labels[i] != NOISE_LABEL)
        .collect();
    let silhouette = if clustered.is_empty() {
        None
    } else {
        let subset = test.select(Axis(0), &clustered);
        let subset_labels: Vec<i64> = clustered.iter().map(|&i| labels[i]).collect();
        metrics::silhouette_score(&subset, &subset_labels)
    };

    ClusteringEvaluation {
        n_clusters: dbscan::n_clusters(&labels),
        noise_ratio: noise as f64 / labels.len().max(1) as f64,
        silhouette_score: silhouette,
    }
}

/// Feature matrix in canonical column order. Rows out of the extractor are
/// already finite; rows loaded from elsewhere get the same repair here:
/// NaN becomes the column median of finite values, infinities become zero.
pub(crate) fn build_matrix(rows: &[WalletFeatures]) -> Array2<f64> {
    let n = rows.len();
    let mut data = Vec::with_capacity(n * FEATURE_COLUMNS.len());
    for row in rows {
        data.extend(row.to_feature_vector());
    }
    let mut matrix = Array2::from_shape_vec((n, FEATURE_COLUMNS.len()), data)
        .unwrap_or_else(|_| Array2::zeros((n, FEATURE_COLUMNS.len())));

    for j in 0..matrix.ncols() {
        let column: Vec<f64> = matrix.column(j).iter().copied().collect();
        if column.iter().all(|v| v.is_finite()) {
            continue;
        }
        let finite: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
        let median = metrics::quantile(&finite, 0.5).unwrap_or(0.0);
        for value in matrix.column_mut(j).iter_mut() {
            if value.is_nan() {
                *value = median;
            } else if value.is_infinite() {
                *value = 0.0;
            }
        }
    }

    matrix
}

/// Map raw anomaly scores (lower = more anomalous) to [0, 1] where higher
/// means more suspicious. A constant batch maps to all zeros.
pub(crate) fn anomaly_score_to_probability(scores: &[f64]) -> Vec<f64> {
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() || max == min {
        return vec![0.0; scores.len()];
    }
    scores
        .iter()
        .map(|s| ((max - s) / (max - min)).clamp(0.0, 1.0))
        .collect()
}
