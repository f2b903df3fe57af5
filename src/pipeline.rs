use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::config::Config;
use crate::db::repository;
use crate::error::{Error, Result};
use crate::eval;
use crate::features::{FeatureExtractor, WalletFeatures};
use crate::model::types::HIGH_RISK_THRESHOLD;
use crate::model::FraudDetector;

/// Which pipeline stages to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Feature extraction, training, scoring, and evaluation.
    Full,
    /// Feature extraction and persistence only.
    Features,
    /// Train on the persisted feature table and save the model.
    Train,
    /// Score the persisted feature table with the newest saved model.
    Score,
}

impl PipelineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Features => "features",
            Self::Train => "train",
            Self::Score => "score",
        }
    }
}

impl FromStr for PipelineMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(Self::Full),
            "features" => Ok(Self::Features),
            "train" => Ok(Self::Train),
            "score" => Ok(Self::Score),
            other => Err(Error::Configuration(format!(
                "unknown pipeline mode '{}', expected full, features, train, or score",
                other
            ))),
        }
    }
}

/// What one pipeline run produced, persisted alongside the reports.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub feature_rows: Option<usize>,
    pub scored_rows: Option<usize>,
    pub high_risk_wallets: Option<usize>,
    pub model_path: Option<String>,
    pub report_path: Option<String>,
}

/// End-to-end orchestration: ledger to feature table to fraud scores.
pub struct FraudPipeline {
    config: Config,
}

impl FraudPipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(&self, pool: &PgPool, mode: PipelineMode) -> Result<RunSummary> {
        let started_at = Utc::now();
        tracing::info!(mode = mode.as_str(), "Pipeline run starting");

        let mut summary = RunSummary {
            mode: mode.as_str().to_string(),
            started_at,
            completed_at: started_at,
            feature_rows: None,
            scored_rows: None,
            high_risk_wallets: None,
            model_path: None,
            report_path: None,
        };

        match mode {
            PipelineMode::Features => {
                let rows = self.extract_and_save(pool).await?;
                summary.feature_rows = Some(rows.len());
            }
            PipelineMode::Train => {
                let rows = repository::load_wallet_features(pool).await?;
                summary.feature_rows = Some(rows.len());
                self.train(&rows, &mut summary)?;
            }
            PipelineMode::Score => {
                let rows = repository::load_wallet_features(pool).await?;
                summary.feature_rows = Some(rows.len());
                let path = newest_artifact(&self.config.output.model_dir)?;
                tracing::info!(path = %path.display(), "Loading saved model");
                let detector = FraudDetector::load(&path, self.config.model.clone())?;
                self.score_and_report(pool, &detector, &rows, &mut summary)
                    .await?;
            }
            PipelineMode::Full => {
                let rows = self.extract_and_save(pool).await?;
                summary.feature_rows = Some(rows.len());
                let detector = self.train(&rows, &mut summary)?;
                self.score_and_report(pool, &detector, &rows, &mut summary)
                    .await?;
            }
        }

        summary.completed_at = Utc::now();
        self.write_summary(&summary)?;
        tracing::info!(
            mode = mode.as_str(),
            feature_rows = summary.feature_rows,
            scored_rows = summary.scored_rows,
            "Pipeline run complete"
        );
        Ok(summary)
    }

    async fn extract_and_save(&self, pool: &PgPool) -> Result<Vec<WalletFeatures>> {
        let extractor = FeatureExtractor::new(self.config.features.clone());
        let rows = extractor.compute_all_features(pool).await?;
        repository::save_wallet_features(pool, &rows, false).await?;
        Ok(rows)
    }

    fn train(&self, rows: &[WalletFeatures], summary: &mut RunSummary) -> Result<FraudDetector> {
        let mut detector = FraudDetector::new(self.config.model.clone());
        detector.fit(rows)?;
        if self.config.output.save_model {
            let path = detector.save(&self.config.output.model_dir)?;
            summary.model_path = Some(path.display().to_string());
        }
        Ok(detector)
    }

    async fn score_and_report(
        &self,
        pool: &PgPool,
        detector: &FraudDetector,
        rows: &[WalletFeatures],
        summary: &mut RunSummary,
    ) -> Result<()> {
        let scores = detector.predict(rows)?;
        repository::save_fraud_scores(pool, &scores, false).await?;

        let high_risk = scores
            .iter()
            .filter(|s| s.fraud_score >= HIGH_RISK_THRESHOLD)
            .count();
        summary.scored_rows = Some(scores.len());
        summary.high_risk_wallets = Some(high_risk);
        tracing::info!(scored = scores.len(), high_risk, "Scoring complete");

        let report = eval::generate_report(detector, rows, &scores);
        let path = eval::write_report(&report, &self.config.output.report_dir)?;
        summary.report_path = Some(path.display().to_string());
        Ok(())
    }

    fn write_summary(&self, summary: &RunSummary) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.output.report_dir)?;
        let path = Path::new(&self.config.output.report_dir).join(format!(
            "pipeline_results_{}.json",
            summary.started_at.format("%Y%m%d_%H%M%S")
        ));
        std::fs::write(&path, serde_json::to_string_pretty(summary)?)?;
        Ok(path)
    }
}

/// Newest saved model artifact under `model_dir`. Artifact names embed a
/// sortable timestamp, so the lexicographic maximum is the newest.
fn newest_artifact(model_dir: &str) -> Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(model_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_artifact_name(path))
        .collect();
    candidates.sort();
    candidates.pop().ok_or_else(|| {
        Error::Configuration(format!(
            "no saved model found under '{}'; run the train stage first",
            model_dir
        ))
    })
}

fn is_artifact_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with("fraud_model_") && name.ends_with(".json"))
        .unwrap_or(false)
}
