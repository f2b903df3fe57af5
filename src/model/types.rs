use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::isolation_forest::IsolationForest;
use crate::model::lof::LocalOutlierFactor;
use crate::model::scaler::StandardScaler;

/// Version stamp written to every score row and model artifact.
pub const MODEL_VERSION: &str = "1.0.0";

/// Which detector family to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Tree-based isolation scoring.
    Isolation,
    /// Local-outlier-factor scoring from neighbor density.
    Density,
    /// DBSCAN noise-point detection.
    Clustering,
    /// All three, combined by weighted average.
    #[default]
    Ensemble,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Isolation => "isolation",
            Self::Density => "density",
            Self::Clustering => "clustering",
            Self::Ensemble => "ensemble",
        }
    }

    pub fn wants_isolation(&self) -> bool {
        matches!(self, Self::Isolation | Self::Ensemble)
    }

    pub fn wants_density(&self) -> bool {
        matches!(self, Self::Density | Self::Ensemble)
    }

    pub fn wants_clustering(&self) -> bool {
        matches!(self, Self::Clustering | Self::Ensemble)
    }
}

/// Discretization of the ensemble fraud score.
///
/// The threshold ladder is fixed and shared: any service that recomputes a
/// category from a stored score must produce exactly these boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
    Critical,
}

pub const CRITICAL_RISK_THRESHOLD: f64 = 0.9;
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.4;

impl RiskCategory {
    pub fn from_score(fraud_score: f64) -> Self {
        if fraud_score >= CRITICAL_RISK_THRESHOLD {
            Self::Critical
        } else if fraud_score >= HIGH_RISK_THRESHOLD {
            Self::High
        } else if fraud_score >= MEDIUM_RISK_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// One scored wallet. Per-model columns are present only for the detector
/// families that actually ran; `isolation_forest_score` and `lof_score` are
/// the per-batch normalized scores in [0, 1], higher = more anomalous.
#[derive(Debug, Clone, Serialize)]
pub struct FraudScore {
    pub wallet_address: String,
    pub isolation_forest_score: Option<f64>,
    pub isolation_forest_prediction: Option<i32>,
    pub lof_score: Option<f64>,
    pub dbscan_cluster: Option<i64>,
    pub dbscan_is_noise: Option<i32>,
    pub fraud_score: f64,
    pub risk_category: RiskCategory,
    pub scored_at: DateTime<Utc>,
    pub model_version: String,
}

/// A detector family that failed to fit in ensemble mode and was skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedDetector {
    pub family: String,
    pub reason: String,
}

/// Held-out evaluation of the isolation forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationEvaluation {
    pub test_samples: usize,
    pub anomalies_detected: usize,
    pub anomaly_ratio: f64,
}

/// Held-out evaluation of the clustering family (re-clustered on the
/// held-out split).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringEvaluation {
    pub n_clusters: usize,
    pub noise_ratio: f64,
    pub silhouette_score: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub isolation_forest: Option<IsolationEvaluation>,
    pub clustering: Option<ClusteringEvaluation>,
}

/// Metadata recorded for every training run, including which families were
/// skipped so a score table is never silently missing a contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub model_kind: String,
    pub training_samples: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    pub features_used: Vec<String>,
    pub training_started_at: DateTime<Utc>,
    pub training_completed_at: DateTime<Utc>,
    pub training_duration_seconds: f64,
    pub random_seed: u64,
    pub test_size: f64,
    pub contamination: f64,
    pub lof_contamination: f64,
    pub skipped_detectors: Vec<SkippedDetector>,
    pub evaluation_metrics: EvaluationMetrics,
}

/// A fully fitted model: scaler, detectors, the exact ordered feature list
/// used for fitting, and the training metadata. Immutable once produced;
/// a new training run produces a wholly new artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub scaler: StandardScaler,
    pub isolation_forest: Option<IsolationForest>,
    pub lof: Option<LocalOutlierFactor>,
    pub feature_columns: Vec<String>,
    pub metadata: TrainingMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_ladder_boundaries() {
        assert_eq!(RiskCategory::from_score(0.9), RiskCategory::Critical);
        assert_eq!(RiskCategory::from_score(0.89999), RiskCategory::High);
        assert_eq!(RiskCategory::from_score(0.7), RiskCategory::High);
        assert_eq!(RiskCategory::from_score(0.69999), RiskCategory::Medium);
        assert_eq!(RiskCategory::from_score(0.4), RiskCategory::Medium);
        assert_eq!(RiskCategory::from_score(0.39999), RiskCategory::Low);
        assert_eq!(RiskCategory::from_score(0.0), RiskCategory::Low);
        assert_eq!(RiskCategory::from_score(1.0), RiskCategory::Critical);
    }

    #[test]
    fn test_model_kind_parsing() {
        let kind: ModelKind = serde_json::from_str("\"density\"").unwrap();
        assert_eq!(kind, ModelKind::Density);
        assert!(serde_json::from_str::<ModelKind>("\"svm\"").is_err());
        assert_eq!(ModelKind::default(), ModelKind::Ensemble);
    }

    #[test]
    fn test_risk_category_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RiskCategory::Critical).unwrap(),
            "\"critical\""
        );
        assert_eq!(RiskCategory::High.as_str(), "high");
    }
}
