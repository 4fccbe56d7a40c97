//! Daily capture of the full price table and of the market turnover.
//!
//! Both run as side effects of read paths, so neither ever returns an error: every failure
//! is logged and reported through the outcome value instead.

use super::workbook::StoreStatus;
use crate::domain::turnover::TurnoverRow;
use crate::market::types::{MarketPriceRow, MarketSummary, DATE_FIELD};
use chrono::NaiveDate;
use serde_json::Value;

/// Snapshot columns after the leading date, in sheet order.
pub const SNAPSHOT_FIELDS: [&str; 24] = [
    "S.No",
    "Symbol",
    "Conf.",
    "Open",
    "High",
    "Low",
    "Close",
    "LTP",
    "Close - LTP",
    "Close - LTP %",
    "VWAP",
    "Vol",
    "Prev. Close",
    "Turnover",
    "Trans.",
    "Diff",
    "Range",
    "Diff %",
    "Range %",
    "VWAP %",
    "52 Weeks High",
    "52 Weeks Low",
    "120 Days",
    "180 Days",
];

const MISSING: &str = "N/A";

pub fn snapshot_columns() -> Vec<&'static str> {
    std::iter::once(DATE_FIELD)
        .chain(SNAPSHOT_FIELDS.iter().copied())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Saved { rows: usize },
    AlreadySaved,
    Empty,
    StoreUnavailable,
    Failed,
}

pub fn snapshot_row(date: &str, row: &MarketPriceRow) -> Vec<Value> {
    std::iter::once(date)
        .chain(SNAPSHOT_FIELDS.iter().map(|f| row.get(f).unwrap_or(MISSING)))
        .map(|s| Value::String(s.to_string()))
        .collect()
}

/// Writes one batch per calendar day: if any row is already dated `today` the whole batch is
/// skipped.
pub async fn save_daily_snapshot(
    status: &StoreStatus,
    rows: &[MarketPriceRow],
    today: NaiveDate,
) -> SnapshotOutcome {
    let date = today.format("%Y-%m-%d").to_string();

    let book = match status.workbook() {
        Ok(book) => book,
        Err(e) => {
            tracing::warn!(%date, error = %e, "store unavailable; daily snapshot not saved");
            return SnapshotOutcome::StoreUnavailable;
        }
    };

    if rows.is_empty() {
        tracing::info!(%date, "no price rows; daily snapshot not saved");
        return SnapshotOutcome::Empty;
    }

    let batch: Vec<Vec<Value>> = rows.iter().map(|r| snapshot_row(&date, r)).collect();
    let len = batch.len();

    match book.append_snapshot(&date, batch).await {
        Ok(true) => {
            tracing::info!(%date, rows = len, "saved daily market snapshot");
            SnapshotOutcome::Saved { rows: len }
        }
        Ok(false) => {
            tracing::info!(%date, "daily market snapshot already saved");
            SnapshotOutcome::AlreadySaved
        }
        Err(e) => {
            tracing::error!(%date, error = %e, "failed to save daily market snapshot");
            SnapshotOutcome::Failed
        }
    }
}

/// Records the summary's totals in the turnover history, once per trading date.
pub async fn record_turnover(status: &StoreStatus, summary: &MarketSummary) -> SnapshotOutcome {
    let book = match status.workbook() {
        Ok(book) => book,
        Err(e) => {
            tracing::warn!(error = %e, "store unavailable; turnover not recorded");
            return SnapshotOutcome::StoreUnavailable;
        }
    };

    let Some(row) = TurnoverRow::from_summary(summary) else {
        tracing::warn!("market summary has no trading date; turnover not recorded");
        return SnapshotOutcome::Empty;
    };
    let date = row.date.clone();

    match book.append_turnover(row).await {
        Ok(true) => {
            tracing::info!(%date, "recorded market turnover");
            SnapshotOutcome::Saved { rows: 1 }
        }
        Ok(false) => {
            tracing::debug!(%date, "market turnover already recorded");
            SnapshotOutcome::AlreadySaved
        }
        Err(e) => {
            tracing::error!(%date, error = %e, "failed to record market turnover");
            SnapshotOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryTable;
    use crate::storage::workbook::Workbook;
    use crate::storage::{CellRef, TabularStore};
    use crate::domain::Record;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn price(symbol: &str, ltp: &str) -> MarketPriceRow {
        [("Symbol", symbol), ("LTP", ltp), ("Extra", "ignored")]
            .into_iter()
            .collect()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 12).unwrap()
    }

    #[test]
    fn row_has_date_then_fixed_fields() {
        let row = snapshot_row("2025-06-12", &price("ABC", "1,234.50"));
        assert_eq!(row.len(), 1 + SNAPSHOT_FIELDS.len());
        assert_eq!(row[0], json!("2025-06-12"));
        assert_eq!(row[1], json!("N/A"));
        assert_eq!(row[2], json!("ABC"));
        assert_eq!(row[8], json!("1,234.50"));
        assert_eq!(snapshot_columns().len(), row.len());
    }

    #[tokio::test]
    async fn saves_once_per_day() {
        let status = StoreStatus::Connected(Arc::new(Workbook::in_memory()));
        let rows = vec![price("ABC", "10"), price("XYZ", "20")];

        let first = save_daily_snapshot(&status, &rows, day()).await;
        assert_eq!(first, SnapshotOutcome::Saved { rows: 2 });

        let second = save_daily_snapshot(&status, &rows, day()).await;
        assert_eq!(second, SnapshotOutcome::AlreadySaved);

        let book = status.workbook().unwrap();
        assert_eq!(book.snapshot_records().await.unwrap().len(), 2);

        let next_day = day().succ_opt().unwrap();
        let third = save_daily_snapshot(&status, &rows, next_day).await;
        assert_eq!(third, SnapshotOutcome::Saved { rows: 2 });
        assert_eq!(book.snapshot_records().await.unwrap().len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_write_one_batch() {
        let status = StoreStatus::Connected(Arc::new(Workbook::in_memory()));
        let rows = vec![price("ABC", "10"), price("XYZ", "20")];

        let (a, b) = tokio::join!(
            save_daily_snapshot(&status, &rows, day()),
            save_daily_snapshot(&status, &rows, day()),
        );
        let mut outcomes = vec![a, b];

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let status = status.clone();
                let rows = rows.clone();
                tokio::spawn(async move { save_daily_snapshot(&status, &rows, day()).await })
            })
            .collect();
        for h in handles {
            outcomes.push(h.await.unwrap());
        }

        let saved = outcomes
            .iter()
            .filter(|o| matches!(o, SnapshotOutcome::Saved { .. }))
            .count();
        assert_eq!(saved, 1);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, SnapshotOutcome::Saved { .. } | SnapshotOutcome::AlreadySaved)));

        let book = status.workbook().unwrap();
        assert_eq!(book.snapshot_records().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unavailable_store_is_a_quiet_no_op() {
        let status = StoreStatus::Unavailable("not configured".to_string());
        let outcome = save_daily_snapshot(&status, &[price("ABC", "10")], day()).await;
        assert_eq!(outcome, SnapshotOutcome::StoreUnavailable);
    }

    #[tokio::test]
    async fn empty_input_writes_nothing() {
        let status = StoreStatus::Connected(Arc::new(Workbook::in_memory()));
        assert_eq!(save_daily_snapshot(&status, &[], day()).await, SnapshotOutcome::Empty);
        let book = status.workbook().unwrap();
        assert!(book.snapshot_records().await.unwrap().is_empty());
    }

    /// A table whose every call fails, to check failures never escape.
    struct BrokenTable;

    #[async_trait::async_trait]
    impl TabularStore for BrokenTable {
        fn name(&self) -> &str {
            "broken"
        }
        async fn get_all_records(&self) -> anyhow::Result<Vec<Record>> {
            anyhow::bail!("quota exceeded")
        }
        async fn append_rows(&self, _rows: Vec<Vec<Value>>) -> anyhow::Result<()> {
            anyhow::bail!("quota exceeded")
        }
        async fn find_cell(&self, _value: &str, _column: usize) -> anyhow::Result<Option<CellRef>> {
            anyhow::bail!("quota exceeded")
        }
        async fn delete_row(&self, _row_index: usize) -> anyhow::Result<()> {
            anyhow::bail!("quota exceeded")
        }
    }

    #[tokio::test]
    async fn backend_failures_are_swallowed() {
        let memory = || Arc::new(MemoryTable::new("t", &["a"])) as Arc<dyn TabularStore>;
        let book = Workbook::new(memory(), Arc::new(BrokenTable), Arc::new(BrokenTable), memory());
        let status = StoreStatus::Connected(Arc::new(book));

        let outcome = save_daily_snapshot(&status, &[price("ABC", "10")], day()).await;
        assert_eq!(outcome, SnapshotOutcome::Failed);

        let mut fields = BTreeMap::new();
        fields.insert("Date".to_string(), "2025-06-12".to_string());
        let outcome = record_turnover(&status, &MarketSummary(fields)).await;
        assert_eq!(outcome, SnapshotOutcome::Failed);
    }

    #[tokio::test]
    async fn turnover_recorded_once_per_trading_date() {
        let status = StoreStatus::Connected(Arc::new(Workbook::in_memory()));
        let mut fields = BTreeMap::new();
        fields.insert("Date".to_string(), "2025-06-12".to_string());
        fields.insert("Total Turnover".to_string(), "4,512,334,120.15".to_string());
        let summary = MarketSummary(fields);

        assert_eq!(record_turnover(&status, &summary).await, SnapshotOutcome::Saved { rows: 1 });
        assert_eq!(record_turnover(&status, &summary).await, SnapshotOutcome::AlreadySaved);

        let records = status.workbook().unwrap().turnover_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["Total Turnover"], json!("4,512,334,120.15"));
        assert_eq!(records[0]["Total Transactions"], json!("N/A"));
    }

    #[tokio::test]
    async fn summary_without_date_is_not_recorded() {
        let status = StoreStatus::Connected(Arc::new(Workbook::in_memory()));
        let outcome = record_turnover(&status, &MarketSummary::default()).await;
        assert_eq!(outcome, SnapshotOutcome::Empty);
    }
}
