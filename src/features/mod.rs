pub mod extractor;
pub mod types;

pub use extractor::FeatureExtractor;
pub use types::{WalletFeatures, FEATURE_COLUMNS, FEATURE_VERSION};
