use super::memory::MemoryTable;
use super::postgres::PgTable;
use super::sheets::SheetsClient;
use super::snapshots::snapshot_columns;
use super::TabularStore;
use crate::domain::holding::{HoldingRecord, HOLDING_COLUMNS};
use crate::domain::turnover::{TurnoverRow, TURNOVER_COLUMNS};
use crate::domain::Record;
use crate::error::{Error, Result};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const WATCHLIST_COLUMNS: [&str; 1] = ["symbol"];

/// Worksheet (or logical sheet) names, overridable with `SHEET_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTitles {
    pub portfolio: String,
    pub turnover: String,
    pub snapshots: String,
    pub watchlist: String,
}

impl Default for SheetTitles {
    fn default() -> Self {
        Self {
            portfolio: "Portfolio".to_string(),
            turnover: "Turnover".to_string(),
            snapshots: "MarketSnapshots".to_string(),
            watchlist: "Watchlist".to_string(),
        }
    }
}

impl SheetTitles {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let title = |key: &str, default: String| {
            std::env::var(key)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(default)
        };
        Self {
            portfolio: title("SHEET_PORTFOLIO", defaults.portfolio),
            turnover: title("SHEET_TURNOVER", defaults.turnover),
            snapshots: title("SHEET_SNAPSHOTS", defaults.snapshots),
            watchlist: title("SHEET_WATCHLIST", defaults.watchlist),
        }
    }
}

/// The four tables the service persists to. Check-then-append sequences on a table run
/// under that table's guard, so concurrent requests in one process cannot both insert the
/// same key.
pub struct Workbook {
    holdings: Arc<dyn TabularStore>,
    turnover: Arc<dyn TabularStore>,
    snapshots: Arc<dyn TabularStore>,
    watchlist: Arc<dyn TabularStore>,

    turnover_guard: Mutex<()>,
    snapshot_guard: Mutex<()>,
    watchlist_guard: Mutex<()>,
}

impl fmt::Debug for Workbook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workbook")
            .field("holdings", &self.holdings.name())
            .field("turnover", &self.turnover.name())
            .field("snapshots", &self.snapshots.name())
            .field("watchlist", &self.watchlist.name())
            .finish()
    }
}

impl Workbook {
    pub fn new(
        holdings: Arc<dyn TabularStore>,
        turnover: Arc<dyn TabularStore>,
        snapshots: Arc<dyn TabularStore>,
        watchlist: Arc<dyn TabularStore>,
    ) -> Self {
        Self {
            holdings,
            turnover,
            snapshots,
            watchlist,
            turnover_guard: Mutex::new(()),
            snapshot_guard: Mutex::new(()),
            watchlist_guard: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        let titles = SheetTitles::default();
        Self::new(
            Arc::new(MemoryTable::new(titles.portfolio, &HOLDING_COLUMNS)),
            Arc::new(MemoryTable::new(titles.turnover, &TURNOVER_COLUMNS)),
            Arc::new(MemoryTable::new(titles.snapshots, &snapshot_columns())),
            Arc::new(MemoryTable::new(titles.watchlist, &WATCHLIST_COLUMNS)),
        )
    }

    pub fn from_postgres(pool: sqlx::PgPool, titles: &SheetTitles) -> Self {
        Self::new(
            Arc::new(PgTable::new(pool.clone(), &titles.portfolio, &HOLDING_COLUMNS)),
            Arc::new(PgTable::new(pool.clone(), &titles.turnover, &TURNOVER_COLUMNS)),
            Arc::new(PgTable::new(pool.clone(), &titles.snapshots, &snapshot_columns())),
            Arc::new(PgTable::new(pool, &titles.watchlist, &WATCHLIST_COLUMNS)),
        )
    }

    pub async fn from_sheets(client: SheetsClient, titles: &SheetTitles) -> anyhow::Result<Self> {
        let client = Arc::new(client);
        Ok(Self::new(
            Arc::new(client.ensure_table(&titles.portfolio, &HOLDING_COLUMNS).await?),
            Arc::new(client.ensure_table(&titles.turnover, &TURNOVER_COLUMNS).await?),
            Arc::new(client.ensure_table(&titles.snapshots, &snapshot_columns()).await?),
            Arc::new(client.ensure_table(&titles.watchlist, &WATCHLIST_COLUMNS).await?),
        ))
    }

    pub async fn holdings_records(&self) -> Result<Vec<Record>> {
        Ok(self.holdings.get_all_records().await?)
    }

    pub async fn holdings(&self) -> Result<Vec<HoldingRecord>> {
        let records = self.holdings_records().await?;
        Ok(records.iter().map(HoldingRecord::from_record).collect())
    }

    /// Appends a ledger row; repeated symbols are new rows, never merged.
    pub async fn add_holding(&self, holding: HoldingRecord) -> Result<()> {
        let symbol = holding.symbol.clone();
        self.holdings.append_row(holding.into_row()).await?;
        tracing::info!(%symbol, "added holding");
        Ok(())
    }

    pub async fn turnover_records(&self) -> Result<Vec<Record>> {
        Ok(self.turnover.get_all_records().await?)
    }

    /// Appends a turnover row unless one exists for its date. Returns whether it was written.
    pub async fn append_turnover(&self, row: TurnoverRow) -> Result<bool> {
        let date = row.date.clone();
        append_if_absent(
            self.turnover.as_ref(),
            &self.turnover_guard,
            &date,
            vec![row.into_row()],
        )
        .await
    }

    pub async fn add_turnover(&self, row: TurnoverRow) -> Result<()> {
        let date = row.date.clone();
        if !self.append_turnover(row).await? {
            return Err(Error::Conflict(format!("Turnover for {date} already recorded.")));
        }
        Ok(())
    }

    /// Appends a snapshot batch unless the date is already present. Returns whether it was
    /// written.
    pub async fn append_snapshot(&self, date: &str, rows: Vec<Vec<Value>>) -> Result<bool> {
        append_if_absent(self.snapshots.as_ref(), &self.snapshot_guard, date, rows).await
    }

    pub async fn snapshot_records(&self) -> Result<Vec<Record>> {
        Ok(self.snapshots.get_all_records().await?)
    }

    pub async fn watchlist_records(&self) -> Result<Vec<Record>> {
        Ok(self.watchlist.get_all_records().await?)
    }

    /// Exact, case-sensitive match on the symbol column.
    pub async fn add_to_watchlist(&self, symbol: &str) -> Result<()> {
        let added = append_if_absent(
            self.watchlist.as_ref(),
            &self.watchlist_guard,
            symbol,
            vec![vec![Value::String(symbol.to_string())]],
        )
        .await?;
        if !added {
            return Err(Error::Conflict(format!("{symbol} is already in the watchlist.")));
        }
        tracing::info!(%symbol, "added to watchlist");
        Ok(())
    }

    pub async fn remove_from_watchlist(&self, symbol: &str) -> Result<()> {
        let _guard = self.watchlist_guard.lock().await;
        let cell = self
            .watchlist
            .find_cell(symbol, 1)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{symbol} is not in the watchlist.")))?;
        self.watchlist.delete_row(cell.row).await?;
        tracing::info!(%symbol, row = cell.row, "removed from watchlist");
        Ok(())
    }
}

async fn append_if_absent(
    table: &dyn TabularStore,
    guard: &Mutex<()>,
    key: &str,
    rows: Vec<Vec<Value>>,
) -> Result<bool> {
    let _guard = guard.lock().await;
    if table.find_cell(key, 1).await?.is_some() {
        return Ok(false);
    }
    table.append_rows(rows).await?;
    Ok(true)
}

/// Outcome of store initialization, injected into whoever needs the store.
#[derive(Debug, Clone)]
pub enum StoreStatus {
    Connected(Arc<Workbook>),
    Unavailable(String),
}

impl StoreStatus {
    pub fn workbook(&self) -> Result<&Workbook> {
        match self {
            StoreStatus::Connected(book) => Ok(book),
            StoreStatus::Unavailable(reason) => Err(Error::StoreUnavailable(reason.clone())),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, StoreStatus::Connected(_))
    }
}

impl From<anyhow::Result<Workbook>> for StoreStatus {
    fn from(res: anyhow::Result<Workbook>) -> Self {
        match res {
            Ok(book) => StoreStatus::Connected(Arc::new(book)),
            Err(e) => StoreStatus::Unavailable(format!("{e:#}")),
        }
    }
}
