//! Label-free evaluation of a scoring run: score distribution analysis,
//! permutation feature importance, clustering quality, and the contrast
//! between high-risk and normal wallets.

pub mod metrics;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::error::Result;
use crate::features::types::{WalletFeatures, FEATURE_COLUMNS};
use crate::model::dbscan::NOISE_LABEL;
use crate::model::detector::{build_matrix, FraudDetector};
use crate::model::isolation_forest::IsolationForest;
use crate::model::types::{FraudScore, RiskCategory, TrainingMetadata, MODEL_VERSION};

/// Shape of the ensemble score distribution across one scored batch.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreDistribution {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub p1: f64,
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub risk_counts: RiskCounts,
    /// Wallets scoring strictly above each fixed threshold.
    pub above_0_5: usize,
    pub above_0_7: usize,
    pub above_0_9: usize,
    /// Fraction of wallets scoring strictly above the batch percentile.
    pub anomaly_rate_p90: f64,
    pub anomaly_rate_p95: f64,
    pub anomaly_rate_p99: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RiskCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

/// Permutation importance of one feature column against the isolation
/// forest decision function.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Clustering quality over the non-noise points of a labeled batch.
#[derive(Debug, Clone, Serialize)]
pub struct ClusteringQuality {
    pub n_clusters: usize,
    pub noise_ratio: f64,
    pub silhouette_score: Option<f64>,
    pub calinski_harabasz: Option<f64>,
    pub davies_bouldin: Option<f64>,
}

/// Mean of one feature among high-risk wallets against the rest.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureContrast {
    pub feature: String,
    pub high_risk_mean: f64,
    pub normal_mean: f64,
    pub ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub generated_at: DateTime<Utc>,
    pub model_version: String,
    pub distribution: ScoreDistribution,
    pub feature_importance: Vec<FeatureImportance>,
    pub high_risk_contrast: Vec<FeatureContrast>,
    pub training: Option<TrainingMetadata>,
}

/// Distribution statistics over the ensemble scores of one batch.
pub fn score_distribution(scores: &[FraudScore]) -> ScoreDistribution {
    let values: Vec<f64> = scores.iter().map(|s| s.fraud_score).collect();
    let n = values.len();
    let mean = if n == 0 {
        0.0
    } else {
        values.iter().sum::<f64>() / n as f64
    };
    let std = if n < 2 {
        0.0
    } else {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
    };

    let q = |p: f64| metrics::quantile(&values, p).unwrap_or(0.0);
    let above = |t: f64| values.iter().filter(|&&v| v > t).count();
    let rate_above = |t: f64| {
        if n == 0 {
            0.0
        } else {
            above(t) as f64 / n as f64
        }
    };

    let mut risk_counts = RiskCounts::default();
    for score in scores {
        match score.risk_category {
            RiskCategory::Low => risk_counts.low += 1,
            RiskCategory::Medium => risk_counts.medium += 1,
            RiskCategory::High => risk_counts.high += 1,
            RiskCategory::Critical => risk_counts.critical += 1,
        }
    }

    ScoreDistribution {
        count: n,
        mean,
        std,
        min: if n == 0 {
            0.0
        } else {
            values.iter().copied().fold(f64::INFINITY, f64::min)
        },
        max: if n == 0 {
            0.0
        } else {
            values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        },
        median: q(0.5),
        p1: q(0.01),
        p5: q(0.05),
        p10: q(0.1),
        p25: q(0.25),
        p75: q(0.75),
        p90: q(0.9),
        p95: q(0.95),
        p99: q(0.99),
        risk_counts,
        above_0_5: above(0.5),
        above_0_7: above(0.7),
        above_0_9: above(0.9),
        anomaly_rate_p90: rate_above(q(0.9)),
        anomaly_rate_p95: rate_above(q(0.95)),
        anomaly_rate_p99: rate_above(q(0.99)),
    }
}

/// Permutation importance of every feature column, normalized to sum to 1
/// and sorted descending.
///
/// Each column is shuffled with a fresh RNG seeded from the training seed,
/// so importances for the same model and batch reproduce exactly.
pub fn feature_importance(
    forest: &IsolationForest,
    scaled: &Array2<f64>,
    seed: u64,
) -> Vec<FeatureImportance> {
    if scaled.nrows() == 0 {
        return Vec::new();
    }
    let baseline = forest.decision_function(scaled);

    let mut importances: Vec<FeatureImportance> = (0..scaled.ncols())
        .map(|j| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut column: Vec<f64> = scaled.column(j).iter().copied().collect();
            column.shuffle(&mut rng);

            let mut permuted = scaled.clone();
            for (value, shuffled) in permuted.column_mut(j).iter_mut().zip(column) {
                *value = shuffled;
            }

            let shifted = forest.decision_function(&permuted);
            let importance = baseline
                .iter()
                .zip(shifted.iter())
                .map(|(a, b)| (a - b).abs())
                .sum::<f64>()
                / baseline.len() as f64;
            FeatureImportance {
                feature: FEATURE_COLUMNS[j].to_string(),
                importance,
            }
        })
        .collect();

    let total: f64 = importances.iter().map(|i| i.importance).sum();
    if total > 0.0 {
        for entry in &mut importances {
            entry.importance /= total;
        }
    }
    importances.sort_by(|a, b| b.importance.partial_cmp(&a.importance).unwrap());
    importances
}

/// Clustering quality indices over the non-noise points of one labeling.
pub fn clustering_quality(x: &Array2<f64>, labels: &[i64]) -> ClusteringQuality {
    let clustered: Vec<usize> = (0..labels.len())
        .filter(|&i| labels[i] != NOISE_LABEL)
        .collect();
    let noise = labels.len() - clustered.len();

    let (silhouette, calinski, davies) = if clustered.is_empty() {
        (None, None, None)
    } else {
        let subset = x.select(Axis(0), &clustered);
        let subset_labels: Vec<i64> = clustered.iter().map(|&i| labels[i]).collect();
        (
            metrics::silhouette_score(&subset, &subset_labels),
            metrics::calinski_harabasz_score(&subset, &subset_labels),
            metrics::davies_bouldin_score(&subset, &subset_labels),
        )
    };

    ClusteringQuality {
        n_clusters: crate::model::dbscan::n_clusters(labels),
        noise_ratio: noise as f64 / labels.len().max(1) as f64,
        silhouette_score: silhouette,
        calinski_harabasz: calinski,
        davies_bouldin: davies,
    }
}

/// Per-feature mean among wallets at or above the high-risk threshold
/// against everyone else, sorted by ratio descending.
pub fn high_risk_contrast(
    scores: &[FraudScore],
    features: &[WalletFeatures],
) -> Vec<FeatureContrast> {
    use crate::model::types::HIGH_RISK_THRESHOLD;

    let high: std::collections::HashSet<&str> = scores
        .iter()
        .filter(|s| s.fraud_score >= HIGH_RISK_THRESHOLD)
        .map(|s| s.wallet_address.as_str())
        .collect();

    let (high_rows, normal_rows): (Vec<&WalletFeatures>, Vec<&WalletFeatures>) = features
        .iter()
        .partition(|f| high.contains(f.wallet_address.as_str()));
    if high_rows.is_empty() || normal_rows.is_empty() {
        return Vec::new();
    }

    let column_mean = |rows: &[&WalletFeatures], column: &str| {
        rows.iter().map(|f| f.feature_value(column)).sum::<f64>() / rows.len() as f64
    };

    let mut contrasts: Vec<FeatureContrast> = FEATURE_COLUMNS
        .iter()
        .map(|column| {
            let high_risk_mean = column_mean(&high_rows, column);
            let normal_mean = column_mean(&normal_rows, column);
            FeatureContrast {
                feature: column.to_string(),
                high_risk_mean,
                normal_mean,
                // Floor, not magnitude: a non-positive normal mean pins the
                // denominator at 1e-10 and pushes the feature up the ranking.
                ratio: high_risk_mean / normal_mean.max(1e-10),
            }
        })
        .collect();
    contrasts.sort_by(|a, b| b.ratio.partial_cmp(&a.ratio).unwrap());
    contrasts
}

/// Full evaluation of one scoring run. Feature importance is included only
/// when an isolation forest was fitted.
pub fn generate_report(
    detector: &FraudDetector,
    features: &[WalletFeatures],
    scores: &[FraudScore],
) -> EvaluationReport {
    let importance = match (detector.isolation_forest(), detector.scaler()) {
        (Some(forest), Some(scaler)) => {
            let scaled = scaler.transform(&build_matrix(features));
            let seed = detector
                .training_metadata()
                .map(|m| m.random_seed)
                .unwrap_or_default();
            feature_importance(forest, &scaled, seed)
        }
        _ => Vec::new(),
    };

    let mut contrast = high_risk_contrast(scores, features);
    contrast.truncate(10);

    EvaluationReport {
        generated_at: Utc::now(),
        model_version: MODEL_VERSION.to_string(),
        distribution: score_distribution(scores),
        feature_importance: importance,
        high_risk_contrast: contrast,
        training: detector.training_metadata().cloned(),
    }
}

/// Write the report as a timestamped JSON file under `report_dir`.
pub fn write_report(report: &EvaluationReport, report_dir: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(report_dir)?;
    let path = Path::new(report_dir).join(format!(
        "evaluation_report_{}.json",
        report.generated_at.format("%Y%m%d_%H%M%S")
    ));
    std::fs::write(&path, serde_json::to_string_pretty(report)?)?;
    tracing::info!(path = %path.display(), "Wrote evaluation report");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IsolationForestConfig;
    use crate::features::types::sample_features;

    fn score(address: &str, value: f64) -> FraudScore {
        FraudScore {
            wallet_address: address.to_string(),
            isolation_forest_score: None,
            isolation_forest_prediction: None,
            lof_score: None,
            dbscan_cluster: None,
            dbscan_is_noise: None,
            fraud_score: value,
            risk_category: RiskCategory::from_score(value),
            scored_at: Utc::now(),
            model_version: MODEL_VERSION.to_string(),
        }
    }

    #[test]
    fn test_score_distribution_counts_and_thresholds() {
        let scores: Vec<FraudScore> = [0.1, 0.2, 0.45, 0.75, 0.95]
            .iter()
            .enumerate()
            .map(|(i, &v)| score(&format!("0x{}", i), v))
            .collect();

        let dist = score_distribution(&scores);
        assert_eq!(dist.count, 5);
        assert_eq!(dist.risk_counts.low, 2);
        assert_eq!(dist.risk_counts.medium, 1);
        assert_eq!(dist.risk_counts.high, 1);
        assert_eq!(dist.risk_counts.critical, 1);
        assert_eq!(dist.above_0_5, 2);
        assert_eq!(dist.above_0_7, 2);
        assert_eq!(dist.above_0_9, 1);
        assert_eq!(dist.max, 0.95);
        assert_eq!(dist.median, 0.45);
    }

    #[test]
    fn test_score_distribution_empty() {
        let dist = score_distribution(&[]);
        assert_eq!(dist.count, 0);
        assert_eq!(dist.mean, 0.0);
        assert_eq!(dist.anomaly_rate_p99, 0.0);
    }

    #[test]
    fn test_feature_importance_finds_separating_column() {
        // Column 0 cleanly separates the outlier; every other column is
        // identical noise-free constant, so column 0 must dominate.
        let mut data = vec![0.0; 21 * 2];
        for i in 0..20 {
            data[i * 2] = (i % 5) as f64 * 0.1;
            data[i * 2 + 1] = 1.0;
        }
        data[20 * 2] = 50.0;
        data[20 * 2 + 1] = 1.0;
        let x = Array2::from_shape_vec((21, 2), data).unwrap();

        let forest = IsolationForest::fit(&x, &IsolationForestConfig::default(), 42).unwrap();
        let baseline = forest.decision_function(&x);

        // Inline two-column importance computation mirrors the public one,
        // which is fixed to the canonical 35-column table.
        let mut importances = Vec::new();
        for j in 0..2 {
            let mut rng = ChaCha8Rng::seed_from_u64(42);
            let mut column: Vec<f64> = x.column(j).iter().copied().collect();
            column.shuffle(&mut rng);
            let mut permuted = x.clone();
            for (value, shuffled) in permuted.column_mut(j).iter_mut().zip(column) {
                *value = shuffled;
            }
            let shifted = forest.decision_function(&permuted);
            importances.push(
                baseline
                    .iter()
                    .zip(shifted.iter())
                    .map(|(a, b)| (a - b).abs())
                    .sum::<f64>()
                    / baseline.len() as f64,
            );
        }
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn test_feature_importance_normalized_and_sorted() {
        let rows: Vec<WalletFeatures> = (0..25)
            .map(|i| {
                let mut f = sample_features(&format!("0x{}", i));
                f.total_value = (i % 7) as f64 * 3.0;
                f.tx_count = 1 + (i % 4) as i64;
                f
            })
            .collect();
        let scaled = build_matrix(&rows);
        let forest = IsolationForest::fit(&scaled, &IsolationForestConfig::default(), 7).unwrap();

        let importances = feature_importance(&forest, &scaled, 7);
        assert_eq!(importances.len(), FEATURE_COLUMNS.len());
        let total: f64 = importances.iter().map(|i| i.importance).sum();
        assert!((total - 1.0).abs() < 1e-9);
        for pair in importances.windows(2) {
            assert!(pair[0].importance >= pair[1].importance);
        }
    }

    #[test]
    fn test_clustering_quality_all_noise() {
        let x = Array2::zeros((4, 2));
        let quality = clustering_quality(&x, &[NOISE_LABEL; 4]);
        assert_eq!(quality.n_clusters, 0);
        assert_eq!(quality.noise_ratio, 1.0);
        assert_eq!(quality.silhouette_score, None);
        assert_eq!(quality.calinski_harabasz, None);
        assert_eq!(quality.davies_bouldin, None);
    }

    #[test]
    fn test_high_risk_contrast_ranks_inflated_feature() {
        let mut features = Vec::new();
        let mut scores = Vec::new();
        for i in 0..10 {
            let address = format!("0x{}", i);
            let mut f = sample_features(&address);
            if i < 2 {
                f.total_value = 1000.0; // high-risk wallets move far more value
                scores.push(score(&address, 0.95));
            } else {
                scores.push(score(&address, 0.1));
            }
            features.push(f);
        }

        let contrasts = high_risk_contrast(&scores, &features);
        assert_eq!(contrasts[0].feature, "total_value");
        assert!(contrasts[0].ratio > 50.0);
    }

    #[test]
    fn test_high_risk_contrast_floors_negative_normal_mean() {
        // Normal wallets drain value (negative net_flow) while high-risk
        // wallets accumulate it; the floored denominator makes the sign
        // flip dominate the divergence ranking.
        let mut features = Vec::new();
        let mut scores = Vec::new();
        for i in 0..10 {
            let address = format!("0x{}", i);
            let mut f = sample_features(&address);
            if i < 2 {
                f.net_flow = 8.0;
                scores.push(score(&address, 0.95));
            } else {
                f.net_flow = -5.0;
                scores.push(score(&address, 0.1));
            }
            features.push(f);
        }

        let contrasts = high_risk_contrast(&scores, &features);
        assert_eq!(contrasts[0].feature, "net_flow");
        assert!(contrasts[0].ratio > 1e9, "ratio {}", contrasts[0].ratio);
        assert_eq!(contrasts[0].normal_mean, -5.0);
    }

    #[test]
    fn test_high_risk_contrast_empty_without_both_groups() {
        let features = vec![sample_features("0xa")];
        let scores = vec![score("0xa", 0.95)];
        assert!(high_risk_contrast(&scores, &features).is_empty());
    }
}
