use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::{Error, Result};

/// One raw ledger transaction. Read-only input to feature extraction.
///
/// `to_address` is null only for contract-creation transactions; every
/// record carries a sender.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TxRecord {
    pub tx_hash: String,
    pub block_number: i64,
    pub from_address: String,
    pub to_address: Option<String>,
    pub value: f64,
    pub gas_used: f64,
    pub gas_price: f64,
    pub block_timestamp: DateTime<Utc>,
}

/// Fetch the full transaction ledger snapshot for feature extraction.
///
/// A failed fetch is reported as `DataUnavailable`, never as an empty
/// ledger: callers must be able to tell an outage from an empty dataset.
pub async fn fetch_transactions(pool: &PgPool) -> Result<Vec<TxRecord>> {
    let rows: Vec<TxRecord> = sqlx::query_as(
        "SELECT tx_hash, block_number, from_address, to_address,
                value::DOUBLE PRECISION AS value,
                gas_used::DOUBLE PRECISION AS gas_used,
                gas_price::DOUBLE PRECISION AS gas_price,
                block_timestamp
         FROM raw_transactions
         WHERE from_address IS NOT NULL
         ORDER BY block_number, tx_hash",
    )
    .fetch_all(pool)
    .await
    .map_err(Error::DataUnavailable)?;

    tracing::info!(transactions = rows.len(), "Fetched ledger snapshot");
    Ok(rows)
}
