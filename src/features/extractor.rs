use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use sqlx::PgPool;

use crate::config::FeatureConfig;
use crate::db::ledger::{self, TxRecord};
use crate::error::Result;
use crate::features::types::{WalletFeatures, FEATURE_COLUMNS, FEATURE_VERSION};

/// A transaction viewed from one wallet's perspective. Every ledger
/// transaction produces an outflow event for the sender and, when a
/// receiver exists, an inflow event for the receiver.
#[derive(Debug, Clone)]
struct WalletEvent {
    counterparty: Option<String>,
    value: f64,
    gas_used: f64,
    gas_price: f64,
    timestamp: DateTime<Utc>,
    direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    In,
    Out,
}

#[derive(Debug)]
struct BasicFeatures {
    tx_count: i64,
    tx_count_in: i64,
    tx_count_out: i64,
    total_value: f64,
    total_value_in: f64,
    total_value_out: f64,
    avg_value: f64,
    std_value: f64,
    min_value: f64,
    max_value: f64,
    unique_counterparties: i64,
    avg_gas_used: f64,
    avg_gas_price: f64,
    first_tx_time: DateTime<Utc>,
    last_tx_time: DateTime<Utc>,
    activity_span_days: i64,
    active_days: i64,
    in_out_ratio: f64,
    net_flow: f64,
    tx_per_active_day: f64,
    value_per_tx: f64,
}

#[derive(Debug, Default)]
struct BehavioralFeatures {
    avg_counterparty_value: f64,
    counterparty_concentration: f64,
    self_transactions: i64,
    round_value_ratio: f64,
    high_value_tx_ratio: f64,
    zero_value_tx_ratio: f64,
}

#[derive(Debug, Default)]
struct TemporalFeatures {
    tx_frequency_per_hour: f64,
    avg_hours_between_tx: f64,
    tx_count_7d: i64,
    value_7d: f64,
    tx_count_30d: i64,
    value_30d: f64,
    unique_hours_active: i64,
    unique_days_of_week_active: i64,
    weekend_tx_ratio: f64,
    night_tx_ratio: f64,
}

/// Computes the per-wallet feature table from the transaction ledger.
///
/// The ledger is viewed two-sided: each transaction contributes a directional
/// event to both participants, accumulated into a per-wallet map in a single
/// pass. The three feature groups are then computed as independent passes
/// over that map and merged, with basic features defining the row universe.
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Fetch the ledger and compute the full feature table.
    pub async fn compute_all_features(&self, pool: &PgPool) -> Result<Vec<WalletFeatures>> {
        let transactions = ledger::fetch_transactions(pool).await?;
        Ok(self.compute_features(&transactions))
    }

    /// Compute one feature row per qualifying wallet. Pure and synchronous.
    ///
    /// Guarantees: unique wallet key, every numeric column finite, rows
    /// sorted by wallet address so repeated runs over the same snapshot are
    /// identical except for the computation timestamp.
    pub fn compute_features(&self, transactions: &[TxRecord]) -> Vec<WalletFeatures> {
        let grouped = group_by_wallet(transactions);

        // Recency windows are anchored to the newest timestamp in the whole
        // ledger, not wall clock, so a frozen snapshot reproduces exactly.
        let Some(ledger_max_time) = transactions.iter().map(|t| t.block_timestamp).max() else {
            return Vec::new();
        };

        let min_tx = self.config.min_transactions as usize;
        let basic = compute_basic_features(&grouped, min_tx);
        let behavioral =
            compute_behavioral_features(&grouped, min_tx, self.config.high_value_threshold);
        let temporal = compute_temporal_features(&grouped, min_tx, ledger_max_time);

        tracing::info!(
            wallets = basic.len(),
            min_transactions = min_tx,
            "Computed feature groups"
        );

        let mut rows = merge_feature_groups(basic, behavioral, temporal);
        impute_missing(&mut rows);

        tracing::info!(
            wallets = rows.len(),
            features = FEATURE_COLUMNS.len(),
            "Feature engineering complete"
        );

        rows
    }
}

/// Single pass over the ledger: two accumulator updates per transaction.
fn group_by_wallet(transactions: &[TxRecord]) -> BTreeMap<String, Vec<WalletEvent>> {
    let mut grouped: BTreeMap<String, Vec<WalletEvent>> = BTreeMap::new();

    for tx in transactions {
        grouped
            .entry(tx.from_address.clone())
            .or_default()
            .push(WalletEvent {
                counterparty: tx.to_address.clone(),
                value: tx.value,
                gas_used: tx.gas_used,
                gas_price: tx.gas_price,
                timestamp: tx.block_timestamp,
                direction: Direction::Out,
            });

        if let Some(to) = &tx.to_address {
            grouped.entry(to.clone()).or_default().push(WalletEvent {
                counterparty: Some(tx.from_address.clone()),
                value: tx.value,
                gas_used: tx.gas_used,
                gas_price: tx.gas_price,
                timestamp: tx.block_timestamp,
                direction: Direction::In,
            });
        }
    }

    grouped
}

fn compute_basic_features(
    grouped: &BTreeMap<String, Vec<WalletEvent>>,
    min_tx: usize,
) -> BTreeMap<String, BasicFeatures> {
    let mut result = BTreeMap::new();

    for (wallet, events) in grouped {
        let n = events.len();
        if n < min_tx {
            continue;
        }

        let tx_count_in = events
            .iter()
            .filter(|e| e.direction == Direction::In)
            .count() as i64;
        let tx_count_out = n as i64 - tx_count_in;

        let total_value: f64 = events.iter().map(|e| e.value).sum();
        let total_value_in: f64 = events
            .iter()
            .filter(|e| e.direction == Direction::In)
            .map(|e| e.value)
            .sum();
        let total_value_out: f64 = events
            .iter()
            .filter(|e| e.direction == Direction::Out)
            .map(|e| e.value)
            .sum();

        let avg_value = total_value / n as f64;
        let std_value = sample_std(events.iter().map(|e| e.value), avg_value, n);
        let min_value = events.iter().map(|e| e.value).fold(f64::INFINITY, f64::min);
        let max_value = events
            .iter()
            .map(|e| e.value)
            .fold(f64::NEG_INFINITY, f64::max);

        let unique_counterparties = events
            .iter()
            .filter_map(|e| e.counterparty.as_deref())
            .collect::<HashSet<_>>()
            .len() as i64;

        let avg_gas_used = events.iter().map(|e| e.gas_used).sum::<f64>() / n as f64;
        let avg_gas_price = events.iter().map(|e| e.gas_price).sum::<f64>() / n as f64;

        let first_tx_time = events.iter().map(|e| e.timestamp).min().unwrap();
        let last_tx_time = events.iter().map(|e| e.timestamp).max().unwrap();
        let activity_span_days = (last_tx_time - first_tx_time).num_days();
        let active_days = events
            .iter()
            .map(|e| e.timestamp.date_naive())
            .collect::<HashSet<_>>()
            .len() as i64;

        let in_out_ratio = if tx_count_out == 0 {
            // Imputed with the column median at merge time.
            f64::NAN
        } else {
            tx_count_in as f64 / tx_count_out as f64
        };

        result.insert(
            wallet.clone(),
            BasicFeatures {
                tx_count: n as i64,
                tx_count_in,
                tx_count_out,
                total_value,
                total_value_in,
                total_value_out,
                avg_value,
                std_value,
                min_value,
                max_value,
                unique_counterparties,
                avg_gas_used,
                avg_gas_price,
                first_tx_time,
                last_tx_time,
                activity_span_days,
                active_days,
                in_out_ratio,
                net_flow: total_value_in - total_value_out,
                tx_per_active_day: n as f64 / active_days.max(1) as f64,
                value_per_tx: total_value / n as f64,
            },
        );
    }

    result
}

fn compute_behavioral_features(
    grouped: &BTreeMap<String, Vec<WalletEvent>>,
    min_tx: usize,
    high_value_threshold: f64,
) -> BTreeMap<String, BehavioralFeatures> {
    let mut result = BTreeMap::new();

    for (wallet, events) in grouped {
        let n = events.len();
        if n < min_tx {
            continue;
        }

        // Per-counterparty event counts and value sums, named counterparties
        // only (a missing receiver means contract creation, not a peer).
        let mut counterparties: HashMap<&str, (i64, f64)> = HashMap::new();
        for event in events {
            if let Some(cp) = event.counterparty.as_deref() {
                let entry = counterparties.entry(cp).or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += event.value;
            }
        }

        let (avg_counterparty_value, counterparty_concentration) = if counterparties.is_empty() {
            (0.0, 0.0)
        } else {
            let total_events: i64 = counterparties.values().map(|(count, _)| count).sum();
            let max_events = counterparties
                .values()
                .map(|(count, _)| *count)
                .max()
                .unwrap();
            let value_sum: f64 = counterparties.values().map(|(_, value)| value).sum();
            (
                value_sum / counterparties.len() as f64,
                max_events as f64 / total_events as f64,
            )
        };

        let self_transactions = i64::from(counterparties.contains_key(wallet.as_str()));

        let round_count = events
            .iter()
            .filter(|e| ((e.value * 1000.0).trunc() as i64) % 1000 == 0)
            .count();
        let high_value_count = events
            .iter()
            .filter(|e| e.value > high_value_threshold)
            .count();
        let zero_value_count = events.iter().filter(|e| e.value == 0.0).count();

        result.insert(
            wallet.clone(),
            BehavioralFeatures {
                avg_counterparty_value,
                counterparty_concentration,
                self_transactions,
                round_value_ratio: round_count as f64 / n as f64,
                high_value_tx_ratio: high_value_count as f64 / n as f64,
                zero_value_tx_ratio: zero_value_count as f64 / n as f64,
            },
        );
    }

    result
}

fn compute_temporal_features(
    grouped: &BTreeMap<String, Vec<WalletEvent>>,
    min_tx: usize,
    ledger_max_time: DateTime<Utc>,
) -> BTreeMap<String, TemporalFeatures> {
    let cutoff_7d = ledger_max_time - Duration::days(7);
    let cutoff_30d = ledger_max_time - Duration::days(30);

    let mut result = BTreeMap::new();

    for (wallet, events) in grouped {
        let n = events.len();
        if n < min_tx {
            continue;
        }

        let first = events.iter().map(|e| e.timestamp).min().unwrap();
        let last = events.iter().map(|e| e.timestamp).max().unwrap();
        // Whole hours, matching the warehouse's integer timestamp diff.
        let span_hours = (last - first).num_hours();

        let tx_count_7d = events.iter().filter(|e| e.timestamp >= cutoff_7d).count() as i64;
        let value_7d: f64 = events
            .iter()
            .filter(|e| e.timestamp >= cutoff_7d)
            .map(|e| e.value)
            .sum();
        let tx_count_30d = events.iter().filter(|e| e.timestamp >= cutoff_30d).count() as i64;
        let value_30d: f64 = events
            .iter()
            .filter(|e| e.timestamp >= cutoff_30d)
            .map(|e| e.value)
            .sum();

        let unique_hours_active = events
            .iter()
            .map(|e| e.timestamp.hour())
            .collect::<HashSet<_>>()
            .len() as i64;
        let unique_days_of_week_active = events
            .iter()
            .map(|e| e.timestamp.weekday())
            .collect::<HashSet<_>>()
            .len() as i64;

        let weekend_count = events
            .iter()
            .filter(|e| {
                matches!(e.timestamp.weekday(), Weekday::Sat | Weekday::Sun)
            })
            .count();
        let night_count = events.iter().filter(|e| e.timestamp.hour() <= 6).count();

        result.insert(
            wallet.clone(),
            TemporalFeatures {
                tx_frequency_per_hour: n as f64 / span_hours.max(1) as f64,
                avg_hours_between_tx: span_hours as f64 / (n as i64 - 1).max(1) as f64,
                tx_count_7d,
                value_7d,
                tx_count_30d,
                value_30d,
                unique_hours_active,
                unique_days_of_week_active,
                weekend_tx_ratio: weekend_count as f64 / n as f64,
                night_tx_ratio: night_count as f64 / n as f64,
            },
        );
    }

    result
}

/// Left-join behavioral and temporal groups onto the basic row universe.
/// A wallet missing from a joined group gets that group's zero defaults.
fn merge_feature_groups(
    basic: BTreeMap<String, BasicFeatures>,
    mut behavioral: BTreeMap<String, BehavioralFeatures>,
    mut temporal: BTreeMap<String, TemporalFeatures>,
) -> Vec<WalletFeatures> {
    let feature_timestamp = Utc::now();

    basic
        .into_iter()
        .map(|(wallet, b)| {
            let bh = behavioral.remove(&wallet).unwrap_or_default();
            let t = temporal.remove(&wallet).unwrap_or_default();

            WalletFeatures {
                wallet_address: wallet,
                tx_count: b.tx_count,
                tx_count_in: b.tx_count_in,
                tx_count_out: b.tx_count_out,
                total_value: b.total_value,
                total_value_in: b.total_value_in,
                total_value_out: b.total_value_out,
                avg_value: b.avg_value,
                std_value: b.std_value,
                min_value: b.min_value,
                max_value: b.max_value,
                unique_counterparties: b.unique_counterparties,
                avg_gas_used: b.avg_gas_used,
                avg_gas_price: b.avg_gas_price,
                first_tx_time: b.first_tx_time,
                last_tx_time: b.last_tx_time,
                activity_span_days: b.activity_span_days,
                active_days: b.active_days,
                in_out_ratio: b.in_out_ratio,
                net_flow: b.net_flow,
                tx_per_active_day: b.tx_per_active_day,
                value_per_tx: b.value_per_tx,
                avg_counterparty_value: bh.avg_counterparty_value,
                counterparty_concentration: bh.counterparty_concentration,
                self_transactions: bh.self_transactions,
                round_value_ratio: bh.round_value_ratio,
                high_value_tx_ratio: bh.high_value_tx_ratio,
                zero_value_tx_ratio: bh.zero_value_tx_ratio,
                tx_frequency_per_hour: t.tx_frequency_per_hour,
                avg_hours_between_tx: t.avg_hours_between_tx,
                tx_count_7d: t.tx_count_7d,
                value_7d: t.value_7d,
                tx_count_30d: t.tx_count_30d,
                value_30d: t.value_30d,
                unique_hours_active: t.unique_hours_active,
                unique_days_of_week_active: t.unique_days_of_week_active,
                weekend_tx_ratio: t.weekend_tx_ratio,
                night_tx_ratio: t.night_tx_ratio,
                feature_timestamp,
                feature_version: FEATURE_VERSION.to_string(),
            }
        })
        .collect()
}

/// Replace NaN with the column median, then any remaining non-finite value
/// with 0. Rows are never dropped.
fn impute_missing(rows: &mut [WalletFeatures]) {
    for column in FEATURE_COLUMNS {
        let values: Vec<f64> = rows.iter().map(|r| r.feature_value(column)).collect();
        if values.iter().all(|v| v.is_finite()) {
            continue;
        }

        let median = column_median(&values).unwrap_or(0.0);
        for row in rows.iter_mut() {
            let value = row.feature_value(column);
            if value.is_nan() {
                row.set_feature_value(column, median);
            } else if value.is_infinite() {
                row.set_feature_value(column, 0.0);
            }
        }
    }
}

/// Median of the finite values in a column. None when the column has no
/// finite value at all.
fn column_median(values: &[f64]) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = finite.len() / 2;
    if finite.len() % 2 == 0 {
        Some((finite[mid - 1] + finite[mid]) / 2.0)
    } else {
        Some(finite[mid])
    }
}

fn sample_std(values: impl Iterator<Item = f64>, mean: f64, n: usize) -> f64 {
    if n < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (n - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(FeatureConfig::default())
    }

    fn tx(
        from: &str,
        to: Option<&str>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> TxRecord {
        TxRecord {
            tx_hash: format!("0x{}{}{}", from, to.unwrap_or("create"), value),
            block_number: 1,
            from_address: from.to_string(),
            to_address: to.map(|s| s.to_string()),
            value,
            gas_used: 21000.0,
            gas_price: 20.0,
            block_timestamp: timestamp,
        }
    }

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn row<'a>(rows: &'a [WalletFeatures], wallet: &str) -> &'a WalletFeatures {
        rows.iter()
            .find(|r| r.wallet_address == wallet)
            .unwrap_or_else(|| panic!("wallet {} missing", wallet))
    }

    #[test]
    fn test_three_wallet_scenario() {
        // A sends 10 to B once; B sends 1 to C twice; C sends nothing.
        // Directional events: A=1, B=3 (1 in, 2 out), C=2 (2 in).
        let txs = vec![
            tx("a", Some("b"), 10.0, ts(1, 10)),
            tx("b", Some("c"), 1.0, ts(2, 11)),
            tx("b", Some("c"), 1.0, ts(3, 12)),
        ];
        let rows = extractor().compute_features(&txs);

        let wallets: Vec<&str> = rows.iter().map(|r| r.wallet_address.as_str()).collect();
        assert_eq!(wallets, vec!["b", "c"]);

        let b = row(&rows, "b");
        assert_eq!(b.tx_count, 3);
        assert_eq!(b.tx_count_in, 1);
        assert_eq!(b.tx_count_out, 2);
        assert_eq!(b.total_value_in, 10.0);
        assert_eq!(b.total_value_out, 2.0);
        assert_eq!(b.net_flow, 8.0);
        assert_eq!(b.unique_counterparties, 2);

        let c = row(&rows, "c");
        assert_eq!(c.tx_count, 2);
        assert_eq!(c.tx_count_in, 2);
        assert_eq!(c.tx_count_out, 0);
    }

    #[test]
    fn test_tx_count_equals_in_plus_out() {
        let txs = vec![
            tx("a", Some("b"), 1.0, ts(1, 1)),
            tx("b", Some("a"), 2.0, ts(2, 2)),
            tx("a", Some("c"), 3.0, ts(3, 3)),
            tx("c", Some("b"), 4.0, ts(4, 4)),
            tx("a", None, 0.0, ts(5, 5)), // contract creation
        ];
        let mut config = FeatureConfig::default();
        config.min_transactions = 1;
        let rows = FeatureExtractor::new(config).compute_features(&txs);

        assert!(!rows.is_empty());
        for r in &rows {
            assert_eq!(r.tx_count, r.tx_count_in + r.tx_count_out);
        }
    }

    #[test]
    fn test_counterparty_concentration_bounds() {
        let txs = vec![
            tx("a", Some("b"), 1.0, ts(1, 1)),
            tx("a", Some("b"), 1.0, ts(2, 1)),
            tx("a", Some("b"), 1.0, ts(3, 1)),
            tx("c", Some("d"), 1.0, ts(1, 2)),
            tx("c", Some("e"), 1.0, ts(2, 2)),
        ];
        let rows = extractor().compute_features(&txs);

        for r in &rows {
            assert!(r.counterparty_concentration >= 0.0);
            assert!(r.counterparty_concentration <= 1.0);
            if r.counterparty_concentration == 1.0 {
                assert_eq!(r.unique_counterparties, 1);
            }
        }

        // a only ever talks to b.
        assert_eq!(row(&rows, "a").counterparty_concentration, 1.0);
        assert_eq!(row(&rows, "a").unique_counterparties, 1);
        // c splits evenly between d and e.
        assert_eq!(row(&rows, "c").counterparty_concentration, 0.5);
    }

    #[test]
    fn test_zero_variance_values() {
        let txs = vec![
            tx("a", Some("b"), 5.0, ts(1, 1)),
            tx("a", Some("b"), 5.0, ts(2, 1)),
            tx("a", Some("b"), 5.0, ts(3, 1)),
        ];
        let rows = extractor().compute_features(&txs);

        let a = row(&rows, "a");
        assert_eq!(a.std_value, 0.0);
        // 5.0 * 1000 = 5000, an exact multiple of 1000.
        assert_eq!(a.round_value_ratio, 1.0);
        assert_eq!(a.avg_value, 5.0);
    }

    #[test]
    fn test_round_value_ratio_partial() {
        let txs = vec![
            tx("a", Some("b"), 1.0, ts(1, 1)),    // round
            tx("a", Some("b"), 1.5, ts(2, 1)),    // 1500 % 1000 != 0
            tx("a", Some("b"), 0.0015, ts(3, 1)), // 1.5 truncated to 1
            tx("a", Some("b"), 2.0, ts(4, 1)),    // round
        ];
        let mut config = FeatureConfig::default();
        config.min_transactions = 4;
        let rows = FeatureExtractor::new(config).compute_features(&txs);

        assert_eq!(row(&rows, "a").round_value_ratio, 0.5);
    }

    #[test]
    fn test_idempotent_except_timestamp() {
        let txs = vec![
            tx("a", Some("b"), 10.0, ts(1, 10)),
            tx("b", Some("c"), 1.0, ts(2, 11)),
            tx("b", Some("c"), 1.0, ts(3, 12)),
            tx("c", Some("a"), 7.7, ts(4, 23)),
        ];
        let ex = extractor();
        let first = ex.compute_features(&txs);
        let second = ex.compute_features(&txs);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.wallet_address, b.wallet_address);
            assert_eq!(a.to_feature_vector(), b.to_feature_vector());
            assert_eq!(a.first_tx_time, b.first_tx_time);
            assert_eq!(a.last_tx_time, b.last_tx_time);
        }
    }

    #[test]
    fn test_recency_anchored_to_ledger_max() {
        // Wallet "old" was active long before the newest ledger entry.
        let txs = vec![
            tx("old", Some("x"), 1.0, ts(1, 1)),
            tx("old", Some("x"), 1.0, ts(2, 1)),
            tx("fresh", Some("y"), 1.0, ts(29, 1)),
            tx("fresh", Some("y"), 1.0, ts(30, 1)),
        ];
        let rows = extractor().compute_features(&txs);

        let old = row(&rows, "old");
        assert_eq!(old.tx_count_7d, 0);
        assert_eq!(old.tx_count_30d, 2);

        let fresh = row(&rows, "fresh");
        assert_eq!(fresh.tx_count_7d, 2);
        assert_eq!(fresh.value_7d, 2.0);
    }

    #[test]
    fn test_recency_full_when_ledger_is_old() {
        // The anchor is the ledger's own max, so a wholly historical
        // snapshot still counts its newest activity as recent.
        let txs = vec![
            tx("a", Some("b"), 1.0, ts(1, 1)),
            tx("a", Some("b"), 1.0, ts(2, 1)),
        ];
        let rows = extractor().compute_features(&txs);
        assert_eq!(row(&rows, "a").tx_count_7d, 2);
    }

    #[test]
    fn test_self_transaction_flag() {
        let txs = vec![
            tx("a", Some("a"), 1.0, ts(1, 1)),
            tx("a", Some("b"), 1.0, ts(2, 1)),
            tx("c", Some("b"), 1.0, ts(3, 1)),
            tx("c", Some("b"), 1.0, ts(4, 1)),
        ];
        let rows = extractor().compute_features(&txs);

        assert_eq!(row(&rows, "a").self_transactions, 1);
        assert_eq!(row(&rows, "c").self_transactions, 0);
    }

    #[test]
    fn test_in_out_ratio_imputed_for_receive_only_wallet() {
        let txs = vec![
            tx("a", Some("b"), 1.0, ts(1, 1)),
            tx("a", Some("b"), 2.0, ts(2, 1)),
            tx("c", Some("b"), 1.0, ts(3, 1)),
        ];
        let rows = extractor().compute_features(&txs);

        // b never sends; its NaN ratio is replaced by the column median,
        // and every column must come out finite.
        for r in &rows {
            for col in FEATURE_COLUMNS {
                assert!(
                    r.feature_value(col).is_finite(),
                    "wallet {} column {} not finite",
                    r.wallet_address,
                    col
                );
            }
        }
        // a sends only, so its ratio is 0; the column median is 0.
        assert_eq!(row(&rows, "b").in_out_ratio, 0.0);
    }

    #[test]
    fn test_night_and_weekend_ratios() {
        // 2024-03-02 is a Saturday, 2024-03-04 a Monday.
        let txs = vec![
            tx("a", Some("b"), 1.0, ts(2, 3)),  // weekend + night
            tx("a", Some("b"), 1.0, ts(4, 12)), // weekday, daytime
        ];
        let rows = extractor().compute_features(&txs);

        let a = row(&rows, "a");
        assert_eq!(a.weekend_tx_ratio, 0.5);
        assert_eq!(a.night_tx_ratio, 0.5);
    }

    #[test]
    fn test_empty_ledger_yields_empty_table() {
        assert!(extractor().compute_features(&[]).is_empty());
    }

    #[test]
    fn test_column_median() {
        assert_eq!(column_median(&[1.0, 3.0, 2.0]), Some(2.0));
        assert_eq!(column_median(&[1.0, 2.0, 3.0, 4.0]), Some(2.5));
        assert_eq!(column_median(&[f64::NAN, 5.0]), Some(5.0));
        assert_eq!(column_median(&[f64::NAN]), None);
    }
}
