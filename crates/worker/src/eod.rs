//! End-of-day capture: price snapshot first, then the market turnover.

use chrono::{DateTime, NaiveDate, Utc};
use sharefolio_core::market::MarketDataSource;
use sharefolio_core::storage::snapshots::{record_turnover, save_daily_snapshot, SnapshotOutcome};
use sharefolio_core::storage::StoreStatus;
use sharefolio_core::time::market_date::market_today;

#[derive(Debug, Clone, Copy, Default)]
pub struct EodOptions {
    pub skip_turnover: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EodReport {
    pub prices: usize,
    pub snapshot: SnapshotOutcome,
    pub turnover: Option<SnapshotOutcome>,
}

impl EodReport {
    pub fn failed(&self) -> bool {
        self.snapshot == SnapshotOutcome::Failed || self.turnover == Some(SnapshotOutcome::Failed)
    }
}

/// Snapshots are keyed by the exchange date at `now_utc`; any other `as_of_date` is refused
/// before fetching.
pub async fn run_eod(
    source: &dyn MarketDataSource,
    store: &StoreStatus,
    as_of_date: NaiveDate,
    now_utc: DateTime<Utc>,
    opts: EodOptions,
) -> anyhow::Result<EodReport> {
    let today = market_today(now_utc)?;
    anyhow::ensure!(
        as_of_date == today,
        "as-of date {as_of_date} is not today's market date {today}; only --dry-run may use another date"
    );

    let rows = source.fetch_price_table().await?;
    tracing::info!(%as_of_date, source = source.source_name(), rows = rows.len(), "fetched price table");

    let snapshot = save_daily_snapshot(store, &rows, today).await;

    let turnover = if opts.skip_turnover {
        None
    } else {
        // The snapshot stays written even if the summary fails.
        match source.fetch_market_summary().await {
            Ok(summary) => Some(record_turnover(store, &summary).await),
            Err(e) => {
                tracing::warn!(%as_of_date, error = %e, "market summary unavailable; turnover skipped");
                Some(SnapshotOutcome::Failed)
            }
        }
    };

    Ok(EodReport {
        prices: rows.len(),
        snapshot,
        turnover,
    })
}
