use sqlx::PgPool;

use crate::error::{Error, Result};
use crate::features::types::WalletFeatures;
use crate::model::types::FraudScore;

/// Rows per multi-row INSERT. 40 columns per feature row keeps each batch
/// well under the PostgreSQL bind-parameter limit.
const INSERT_CHUNK: usize = 500;

/// Persist the wallet feature table.
///
/// Replace mode truncates and re-inserts inside one transaction, so readers
/// never observe a partially written table. Append mode skips the truncate.
pub async fn save_wallet_features(
    pool: &PgPool,
    features: &[WalletFeatures],
    append: bool,
) -> Result<u64> {
    let mut tx = pool.begin().await.map_err(Error::DataUnavailable)?;

    if !append {
        sqlx::query("TRUNCATE TABLE wallet_features")
            .execute(&mut *tx)
            .await
            .map_err(Error::DataUnavailable)?;
    }

    for chunk in features.chunks(INSERT_CHUNK) {
        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
            "INSERT INTO wallet_features (wallet_address, tx_count, tx_count_in, tx_count_out, \
             total_value, total_value_in, total_value_out, avg_value, std_value, min_value, \
             max_value, unique_counterparties, avg_gas_used, avg_gas_price, first_tx_time, \
             last_tx_time, activity_span_days, active_days, in_out_ratio, net_flow, \
             tx_per_active_day, value_per_tx, avg_counterparty_value, counterparty_concentration, \
             self_transactions, round_value_ratio, high_value_tx_ratio, zero_value_tx_ratio, \
             tx_frequency_per_hour, avg_hours_between_tx, tx_count_7d, value_7d, tx_count_30d, \
             value_30d, unique_hours_active, unique_days_of_week_active, weekend_tx_ratio, \
             night_tx_ratio, feature_timestamp, feature_version) ",
        );

        query_builder.push_values(chunk, |mut b, f| {
            b.push_bind(&f.wallet_address)
                .push_bind(f.tx_count)
                .push_bind(f.tx_count_in)
                .push_bind(f.tx_count_out)
                .push_bind(f.total_value)
                .push_bind(f.total_value_in)
                .push_bind(f.total_value_out)
                .push_bind(f.avg_value)
                .push_bind(f.std_value)
                .push_bind(f.min_value)
                .push_bind(f.max_value)
                .push_bind(f.unique_counterparties)
                .push_bind(f.avg_gas_used)
                .push_bind(f.avg_gas_price)
                .push_bind(f.first_tx_time)
                .push_bind(f.last_tx_time)
                .push_bind(f.activity_span_days)
                .push_bind(f.active_days)
                .push_bind(f.in_out_ratio)
                .push_bind(f.net_flow)
                .push_bind(f.tx_per_active_day)
                .push_bind(f.value_per_tx)
                .push_bind(f.avg_counterparty_value)
                .push_bind(f.counterparty_concentration)
                .push_bind(f.self_transactions)
                .push_bind(f.round_value_ratio)
                .push_bind(f.high_value_tx_ratio)
                .push_bind(f.zero_value_tx_ratio)
                .push_bind(f.tx_frequency_per_hour)
                .push_bind(f.avg_hours_between_tx)
                .push_bind(f.tx_count_7d)
                .push_bind(f.value_7d)
                .push_bind(f.tx_count_30d)
                .push_bind(f.value_30d)
                .push_bind(f.unique_hours_active)
                .push_bind(f.unique_days_of_week_active)
                .push_bind(f.weekend_tx_ratio)
                .push_bind(f.night_tx_ratio)
                .push_bind(f.feature_timestamp)
                .push_bind(&f.feature_version);
        });

        query_builder
            .build()
            .execute(&mut *tx)
            .await
            .map_err(Error::DataUnavailable)?;
    }

    tx.commit().await.map_err(Error::DataUnavailable)?;

    tracing::info!(rows = features.len(), append, "Saved wallet features");
    Ok(features.len() as u64)
}

/// Load the full feature table, newest computation first.
pub async fn load_wallet_features(pool: &PgPool) -> Result<Vec<WalletFeatures>> {
    let rows: Vec<WalletFeatures> = sqlx::query_as(
        "SELECT * FROM wallet_features ORDER BY feature_timestamp DESC, wallet_address",
    )
    .fetch_all(pool)
    .await
    .map_err(Error::DataUnavailable)?;

    tracing::info!(rows = rows.len(), "Loaded wallet features");
    Ok(rows)
}

/// Persist the fraud score table. Same replace/append semantics as the
/// feature table: a scoring run supersedes the previous one wholesale.
pub async fn save_fraud_scores(
    pool: &PgPool,
    scores: &[FraudScore],
    append: bool,
) -> Result<u64> {
    let mut tx = pool.begin().await.map_err(Error::DataUnavailable)?;

    if !append {
        sqlx::query("TRUNCATE TABLE wallet_fraud_scores")
            .execute(&mut *tx)
            .await
            .map_err(Error::DataUnavailable)?;
    }

    for chunk in scores.chunks(INSERT_CHUNK) {
        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
            "INSERT INTO wallet_fraud_scores (wallet_address, isolation_forest_score, \
             isolation_forest_prediction, lof_score, dbscan_cluster, dbscan_is_noise, \
             fraud_score, risk_category, scored_at, model_version) ",
        );

        query_builder.push_values(chunk, |mut b, s| {
            b.push_bind(&s.wallet_address)
                .push_bind(s.isolation_forest_score)
                .push_bind(s.isolation_forest_prediction)
                .push_bind(s.lof_score)
                .push_bind(s.dbscan_cluster)
                .push_bind(s.dbscan_is_noise)
                .push_bind(s.fraud_score)
                .push_bind(s.risk_category.as_str())
                .push_bind(s.scored_at)
                .push_bind(&s.model_version);
        });

        query_builder
            .build()
            .execute(&mut *tx)
            .await
            .map_err(Error::DataUnavailable)?;
    }

    tx.commit().await.map_err(Error::DataUnavailable)?;

    tracing::info!(rows = scores.len(), append, "Saved fraud scores");
    Ok(scores.len() as u64)
}
