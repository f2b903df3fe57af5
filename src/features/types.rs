use chrono::{DateTime, Utc};

/// Version stamp written to every feature row.
pub const FEATURE_VERSION: &str = "1.0.0";

/// Canonical model feature columns, in the exact order used for fitting.
/// `first_tx_time`, `last_tx_time`, and the metadata columns are excluded.
pub const FEATURE_COLUMNS: [&str; 35] = [
    // Basic
    "tx_count",
    "tx_count_in",
    "tx_count_out",
    "total_value",
    "total_value_in",
    "total_value_out",
    "avg_value",
    "std_value",
    "min_value",
    "max_value",
    "unique_counterparties",
    "avg_gas_used",
    "avg_gas_price",
    "activity_span_days",
    "active_days",
    "in_out_ratio",
    "net_flow",
    "tx_per_active_day",
    "value_per_tx",
    // Behavioral
    "avg_counterparty_value",
    "counterparty_concentration",
    "self_transactions",
    "round_value_ratio",
    "high_value_tx_ratio",
    "zero_value_tx_ratio",
    // Temporal
    "tx_frequency_per_hour",
    "avg_hours_between_tx",
    "tx_count_7d",
    "value_7d",
    "tx_count_30d",
    "value_30d",
    "unique_hours_active",
    "unique_days_of_week_active",
    "weekend_tx_ratio",
    "night_tx_ratio",
];

/// One row of the wallet feature table. Keyed by wallet address.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WalletFeatures {
    pub wallet_address: String,

    // Basic
    pub tx_count: i64,
    pub tx_count_in: i64,
    pub tx_count_out: i64,
    pub total_value: f64,
    pub total_value_in: f64,
    pub total_value_out: f64,
    pub avg_value: f64,
    pub std_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub unique_counterparties: i64,
    pub avg_gas_used: f64,
    pub avg_gas_price: f64,
    pub first_tx_time: DateTime<Utc>,
    pub last_tx_time: DateTime<Utc>,
    pub activity_span_days: i64,
    pub active_days: i64,
    pub in_out_ratio: f64,
    pub net_flow: f64,
    pub tx_per_active_day: f64,
    pub value_per_tx: f64,

    // Behavioral
    pub avg_counterparty_value: f64,
    pub counterparty_concentration: f64,
    pub self_transactions: i64,
    pub round_value_ratio: f64,
    pub high_value_tx_ratio: f64,
    pub zero_value_tx_ratio: f64,

    // Temporal
    pub tx_frequency_per_hour: f64,
    pub avg_hours_between_tx: f64,
    pub tx_count_7d: i64,
    pub value_7d: f64,
    pub tx_count_30d: i64,
    pub value_30d: f64,
    pub unique_hours_active: i64,
    pub unique_days_of_week_active: i64,
    pub weekend_tx_ratio: f64,
    pub night_tx_ratio: f64,

    // Metadata
    pub feature_timestamp: DateTime<Utc>,
    pub feature_version: String,
}

impl WalletFeatures {
    /// Read a model column by name. Integer-backed columns are widened to f64.
    pub fn feature_value(&self, column: &str) -> f64 {
        match column {
            "tx_count" => self.tx_count as f64,
            "tx_count_in" => self.tx_count_in as f64,
            "tx_count_out" => self.tx_count_out as f64,
            "total_value" => self.total_value,
            "total_value_in" => self.total_value_in,
            "total_value_out" => self.total_value_out,
            "avg_value" => self.avg_value,
            "std_value" => self.std_value,
            "min_value" => self.min_value,
            "max_value" => self.max_value,
            "unique_counterparties" => self.unique_counterparties as f64,
            "avg_gas_used" => self.avg_gas_used,
            "avg_gas_price" => self.avg_gas_price,
            "activity_span_days" => self.activity_span_days as f64,
            "active_days" => self.active_days as f64,
            "in_out_ratio" => self.in_out_ratio,
            "net_flow" => self.net_flow,
            "tx_per_active_day" => self.tx_per_active_day,
            "value_per_tx" => self.value_per_tx,
            "avg_counterparty_value" => self.avg_counterparty_value,
            "counterparty_concentration" => self.counterparty_concentration,
            "self_transactions" => self.self_transactions as f64,
            "round_value_ratio" => self.round_value_ratio,
            "high_value_tx_ratio" => self.high_value_tx_ratio,
            "zero_value_tx_ratio" => self.zero_value_tx_ratio,
            "tx_frequency_per_hour" => self.tx_frequency_per_hour,
            "avg_hours_between_tx" => self.avg_hours_between_tx,
            "tx_count_7d" => self.tx_count_7d as f64,
            "value_7d" => self.value_7d,
            "tx_count_30d" => self.tx_count_30d as f64,
            "value_30d" => self.value_30d,
            "unique_hours_active" => self.unique_hours_active as f64,
            "unique_days_of_week_active" => self.unique_days_of_week_active as f64,
            "weekend_tx_ratio" => self.weekend_tx_ratio,
            "night_tx_ratio" => self.night_tx_ratio,
            other => panic!("unknown feature column: {}", other),
        }
    }

    /// Overwrite a model column by name. Only float-backed columns can hold
    /// NaN, so imputation never needs to write an integer column; values
    /// written to one are truncated.
    pub fn set_feature_value(&mut self, column: &str, value: f64) {
        match column {
            "tx_count" => self.tx_count = value as i64,
            "tx_count_in" => self.tx_count_in = value as i64,
            "tx_count_out" => self.tx_count_out = value as i64,
            "total_value" => self.total_value = value,
            "total_value_in" => self.total_value_in = value,
            "total_value_out" => self.total_value_out = value,
            "avg_value" => self.avg_value = value,
            "std_value" => self.std_value = value,
            "min_value" => self.min_value = value,
            "max_value" => self.max_value = value,
            "unique_counterparties" => self.unique_counterparties = value as i64,
            "avg_gas_used" => self.avg_gas_used = value,
            "avg_gas_price" => self.avg_gas_price = value,
            "activity_span_days" => self.activity_span_days = value as i64,
            "active_days" => self.active_days = value as i64,
            "in_out_ratio" => self.in_out_ratio = value,
            "net_flow" => self.net_flow = value,
            "tx_per_active_day" => self.tx_per_active_day = value,
            "value_per_tx" => self.value_per_tx = value,
            "avg_counterparty_value" => self.avg_counterparty_value = value,
            "counterparty_concentration" => self.counterparty_concentration = value,
            "self_transactions" => self.self_transactions = value as i64,
            "round_value_ratio" => self.round_value_ratio = value,
            "high_value_tx_ratio" => self.high_value_tx_ratio = value,
            "zero_value_tx_ratio" => self.zero_value_tx_ratio = value,
            "tx_frequency_per_hour" => self.tx_frequency_per_hour = value,
            "avg_hours_between_tx" => self.avg_hours_between_tx = value,
            "tx_count_7d" => self.tx_count_7d = value as i64,
            "value_7d" => self.value_7d = value,
            "tx_count_30d" => self.tx_count_30d = value as i64,
            "value_30d" => self.value_30d = value,
            "unique_hours_active" => self.unique_hours_active = value as i64,
            "unique_days_of_week_active" => self.unique_days_of_week_active = value as i64,
            "weekend_tx_ratio" => self.weekend_tx_ratio = value,
            "night_tx_ratio" => self.night_tx_ratio = value,
            other => panic!("unknown feature column: {}", other),
        }
    }

    /// Model columns in canonical order, as one row of the feature matrix.
    pub fn to_feature_vector(&self) -> Vec<f64> {
        FEATURE_COLUMNS
            .iter()
            .map(|col| self.feature_value(col))
            .collect()
    }
}

/// Baseline feature row for model and evaluator tests.
#[cfg(test)]
pub(crate) fn sample_features(address: &str) -> WalletFeatures {
    use chrono::TimeZone;

    let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    WalletFeatures {
        wallet_address: address.to_string(),
        tx_count: 3,
        tx_count_in: 1,
        tx_count_out: 2,
        total_value: 12.0,
        total_value_in: 10.0,
        total_value_out: 2.0,
        avg_value: 4.0,
        std_value: 1.0,
        min_value: 1.0,
        max_value: 10.0,
        unique_counterparties: 2,
        avg_gas_used: 21000.0,
        avg_gas_price: 30.0,
        first_tx_time: ts,
        last_tx_time: ts,
        activity_span_days: 0,
        active_days: 1,
        in_out_ratio: 0.5,
        net_flow: 8.0,
        tx_per_active_day: 3.0,
        value_per_tx: 4.0,
        avg_counterparty_value: 6.0,
        counterparty_concentration: 0.5,
        self_transactions: 0,
        round_value_ratio: 0.0,
        high_value_tx_ratio: 0.0,
        zero_value_tx_ratio: 0.0,
        tx_frequency_per_hour: 3.0,
        avg_hours_between_tx: 0.0,
        tx_count_7d: 3,
        value_7d: 12.0,
        tx_count_30d: 3,
        value_30d: 12.0,
        unique_hours_active: 1,
        unique_days_of_week_active: 1,
        weekend_tx_ratio: 0.0,
        night_tx_ratio: 1.0,
        feature_timestamp: ts,
        feature_version: FEATURE_VERSION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_matches_column_order() {
        let features = sample_features("0xabc");
        let vector = features.to_feature_vector();
        assert_eq!(vector.len(), FEATURE_COLUMNS.len());
        assert_eq!(vector[0], 3.0); // tx_count
        assert_eq!(vector[15], 0.5); // in_out_ratio
        assert_eq!(vector[34], 1.0); // night_tx_ratio
    }

    #[test]
    fn test_get_set_roundtrip() {
        let mut features = sample_features("0xabc");
        for col in FEATURE_COLUMNS {
            let value = features.feature_value(col);
            features.set_feature_value(col, value + 1.0);
            assert_eq!(features.feature_value(col), value + 1.0, "column {}", col);
        }
    }
}
