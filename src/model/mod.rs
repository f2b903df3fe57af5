pub mod dbscan;
pub mod detector;
pub mod isolation_forest;
pub mod lof;
pub mod scaler;
pub mod types;

pub use detector::FraudDetector;
pub use types::{FraudScore, ModelKind, RiskCategory, TrainingMetadata, MODEL_VERSION};
