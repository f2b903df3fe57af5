use serde::Deserialize;

use crate::error::Error;
use crate::model::types::ModelKind;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

// ============================================================
// Feature Engineering Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct FeatureConfig {
    /// Minimum directional events for a wallet to be included.
    #[serde(default = "default_min_transactions")]
    pub min_transactions: u32,
    /// Time windows (days) for recency features. 7 and 30 are required;
    /// they are the only windows consumed downstream.
    #[serde(default = "default_time_windows")]
    pub time_windows: Vec<i64>,
    /// Transactions above this value (native units) count as high-value.
    #[serde(default = "default_high_value_threshold")]
    pub high_value_threshold: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            min_transactions: default_min_transactions(),
            time_windows: default_time_windows(),
            high_value_threshold: default_high_value_threshold(),
        }
    }
}

fn default_min_transactions() -> u32 {
    2
}

fn default_time_windows() -> Vec<i64> {
    vec![7, 30, 90]
}

fn default_high_value_threshold() -> f64 {
    10.0
}

// ============================================================
// Model Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Detector family: isolation, density, clustering, or ensemble.
    #[serde(default)]
    pub kind: ModelKind,
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    /// Held-out fraction used for evaluation reporting.
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default)]
    pub isolation_forest: IsolationForestConfig,
    #[serde(default)]
    pub lof: LofConfig,
    #[serde(default)]
    pub dbscan: DbscanConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::default(),
            random_seed: default_random_seed(),
            test_size: default_test_size(),
            isolation_forest: IsolationForestConfig::default(),
            lof: LofConfig::default(),
            dbscan: DbscanConfig::default(),
        }
    }
}

fn default_random_seed() -> u64 {
    42
}

fn default_test_size() -> f64 {
    0.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct IsolationForestConfig {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    #[serde(default = "default_contamination")]
    pub contamination: f64,
    #[serde(default)]
    pub bootstrap: bool,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_samples: default_max_samples(),
            contamination: default_contamination(),
            bootstrap: false,
        }
    }
}

fn default_n_estimators() -> usize {
    100
}

fn default_max_samples() -> usize {
    256
}

fn default_contamination() -> f64 {
    0.1
}

#[derive(Debug, Deserialize, Clone)]
pub struct LofConfig {
    #[serde(default = "default_n_neighbors")]
    pub n_neighbors: usize,
    #[serde(default = "default_contamination")]
    pub contamination: f64,
}

impl Default for LofConfig {
    fn default() -> Self {
        Self {
            n_neighbors: default_n_neighbors(),
            contamination: default_contamination(),
        }
    }
}

fn default_n_neighbors() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbscanConfig {
    #[serde(default = "default_eps")]
    pub eps: f64,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

impl Default for DbscanConfig {
    fn default() -> Self {
        Self {
            eps: default_eps(),
            min_samples: default_min_samples(),
        }
    }
}

fn default_eps() -> f64 {
    0.5
}

fn default_min_samples() -> usize {
    5
}

// ============================================================
// Output Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_true")]
    pub save_model: bool,
    #[serde(default = "default_model_dir")]
    pub model_dir: String,
    #[serde(default = "default_report_dir")]
    pub report_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_model: true,
            model_dir: default_model_dir(),
            report_dir: default_report_dir(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_model_dir() -> String {
    "models".to_string()
}

fn default_report_dir() -> String {
    "outputs".to_string()
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("failed to read config file '{}': {}", path, e))
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            Error::Configuration(format!("failed to parse config file '{}': {}", path, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.features.min_transactions == 0 {
            return Err(Error::Configuration(
                "features.min_transactions must be at least 1".to_string(),
            ));
        }
        for window in [7i64, 30] {
            if !self.features.time_windows.contains(&window) {
                return Err(Error::Configuration(format!(
                    "features.time_windows must contain the {}-day window",
                    window
                )));
            }
        }
        if !(self.model.test_size > 0.0 && self.model.test_size < 1.0) {
            return Err(Error::Configuration(format!(
                "model.test_size must be in (0, 1), got {}",
                self.model.test_size
            )));
        }
        for (name, contamination) in [
            ("isolation_forest", self.model.isolation_forest.contamination),
            ("lof", self.model.lof.contamination),
        ] {
            if !(contamination > 0.0 && contamination <= 0.5) {
                return Err(Error::Configuration(format!(
                    "model.{}.contamination must be in (0, 0.5], got {}",
                    name, contamination
                )));
            }
        }
        if self.model.isolation_forest.n_estimators == 0 {
            return Err(Error::Configuration(
                "model.isolation_forest.n_estimators must be at least 1".to_string(),
            ));
        }
        if self.model.isolation_forest.max_samples == 0 {
            return Err(Error::Configuration(
                "model.isolation_forest.max_samples must be at least 1".to_string(),
            ));
        }
        if self.model.lof.n_neighbors == 0 {
            return Err(Error::Configuration(
                "model.lof.n_neighbors must be at least 1".to_string(),
            ));
        }
        if self.model.dbscan.min_samples == 0 {
            return Err(Error::Configuration(
                "model.dbscan.min_samples must be at least 1".to_string(),
            ));
        }
        if !(self.model.dbscan.eps > 0.0) {
            return Err(Error::Configuration(format!(
                "model.dbscan.eps must be positive, got {}",
                self.model.dbscan.eps
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            database: DatabaseConfig {
                url: "postgres://localhost/test".to_string(),
                max_connections: 5,
            },
            features: FeatureConfig::default(),
            model: ModelConfig::default(),
            output: OutputConfig::default(),
        }
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[database]
url = "postgres://localhost/test"
max_connections = 5

[model]
kind = "ensemble"
random_seed = 7

[model.dbscan]
eps = 0.8
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.model.kind, ModelKind::Ensemble);
        assert_eq!(config.model.random_seed, 7);
        assert_eq!(config.model.dbscan.eps, 0.8);
        assert_eq!(config.model.dbscan.min_samples, 5); // default
        assert_eq!(config.features.min_transactions, 2); // default
        assert_eq!(config.features.time_windows, vec![7, 30, 90]); // default
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_model_kind_rejected() {
        let toml_str = r#"
[database]
url = "postgres://localhost/test"

[model]
kind = "one_class_svm"
"#;
        let parsed: Result<Config, _> = toml::from_str(toml_str);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate_bad_test_size() {
        let mut config = base_config();
        config.model.test_size = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_contamination() {
        let mut config = base_config();
        config.model.lof.contamination = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_missing_window() {
        let mut config = base_config();
        config.features.time_windows = vec![7, 90];
        assert!(config.validate().is_err());
    }
}
