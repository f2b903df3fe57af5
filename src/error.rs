use thiserror::Error;

/// Error taxonomy for the scoring pipeline.
///
/// Degenerate clustering-quality metrics (single cluster, zero
/// within-cluster variance) are not represented here: the evaluator reports
/// them as `None` and never propagates them to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// The ledger or persistence surface is unreachable. Fatal to the
    /// current run; retry is an orchestration concern, not ours.
    #[error("data surface unavailable: {0}")]
    DataUnavailable(#[from] sqlx::Error),

    /// Fewer rows than a detector's configured minimum. Fatal to that
    /// detector family; ensemble mode absorbs it and continues with the
    /// remaining families.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Unknown model kind or malformed hyperparameters. Surfaced at
    /// pipeline start, never silently defaulted.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Reading or writing a model artifact or report file failed.
    #[error("artifact i/o failed: {0}")]
    ArtifactIo(#[from] std::io::Error),

    /// A model artifact or report could not be (de)serialized.
    #[error("artifact format error: {0}")]
    ArtifactFormat(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
