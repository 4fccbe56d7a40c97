use crate::config::Settings;
use crate::domain::{cell_text, Record};
use anyhow::Context;
use serde_json::Value;

pub mod memory;
pub mod postgres;
pub mod sheets;
pub mod snapshots;
pub mod workbook;

pub use workbook::{StoreStatus, Workbook};

/// Row 1 of every table is its header; data starts on row 2.
pub const FIRST_DATA_ROW: usize = 2;

/// 1-based position of a cell, spreadsheet style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

/// A header-keyed table: the contract every persistence backend provides.
#[async_trait::async_trait]
pub trait TabularStore: Send + Sync {
    fn name(&self) -> &str;

    async fn get_all_records(&self) -> anyhow::Result<Vec<Record>>;

    async fn append_row(&self, values: Vec<Value>) -> anyhow::Result<()> {
        self.append_rows(vec![values]).await
    }

    async fn append_rows(&self, rows: Vec<Vec<Value>>) -> anyhow::Result<()>;

    /// First data row whose cell in `column` displays exactly `value`.
    async fn find_cell(&self, value: &str, column: usize) -> anyhow::Result<Option<CellRef>>;

    async fn delete_row(&self, row_index: usize) -> anyhow::Result<()>;
}

/// Which backend `connect` builds, from `STORE_BACKEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sheets,
    Postgres,
    Memory,
}

impl StoreBackend {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        match settings
            .store_backend
            .as_deref()
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("sheets") => Ok(Self::Sheets),
            Some("postgres") => Ok(Self::Postgres),
            Some("memory") => Ok(Self::Memory),
            Some(other) => anyhow::bail!("unknown STORE_BACKEND {other:?} (expected sheets, postgres or memory)"),
        }
    }
}

/// Builds the workbook for the configured backend. Errors here mean the store is
/// unavailable; callers decide whether that is fatal.
pub async fn connect(settings: &Settings) -> anyhow::Result<Workbook> {
    let backend = StoreBackend::from_settings(settings)?;
    let titles = workbook::SheetTitles::from_env();

    let book = match backend {
        StoreBackend::Sheets => {
            let client = sheets::SheetsClient::from_settings(settings)?;
            workbook::Workbook::from_sheets(client, &titles).await?
        }
        StoreBackend::Postgres => {
            let db_url = settings.require_database_url()?;
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .context("connect DATABASE_URL failed")?;
            migrate(&pool).await?;
            workbook::Workbook::from_postgres(pool, &titles)
        }
        StoreBackend::Memory => workbook::Workbook::in_memory(),
    };

    tracing::info!(?backend, "store connected");
    Ok(book)
}

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Zips data rows with the header; short rows are padded with empty strings and extra
/// cells beyond the header are dropped.
pub(crate) fn records_from_rows(headers: &[String], rows: Vec<Vec<Value>>) -> Vec<Record> {
    rows.into_iter()
        .map(|row| {
            let mut cells = row.into_iter();
            headers
                .iter()
                .map(|h| (h.clone(), cells.next().unwrap_or_else(|| Value::String(String::new()))))
                .collect()
        })
        .collect()
}

pub(crate) fn find_in_rows(rows: &[Vec<Value>], value: &str, column: usize) -> Option<CellRef> {
    let idx = column.checked_sub(1)?;
    rows.iter()
        .position(|row| row.get(idx).map(cell_text).as_deref() == Some(value))
        .map(|pos| CellRef {
            row: pos + FIRST_DATA_ROW,
            col: column,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pads_short_rows() {
        let headers = vec!["a".to_string(), "b".to_string()];
        let records = records_from_rows(&headers, vec![vec![json!(1)], vec![json!(2), json!("x"), json!("extra")]]);
        assert_eq!(records[0]["b"], json!(""));
        assert_eq!(records[1]["b"], json!("x"));
        assert_eq!(records[1].len(), 2);
    }

    #[test]
    fn finds_by_display_text() {
        let rows = vec![vec![json!("ABC")], vec![json!(42)], vec![json!("abc")]];
        assert_eq!(find_in_rows(&rows, "42", 1), Some(CellRef { row: 3, col: 1 }));
        assert_eq!(find_in_rows(&rows, "abc", 1), Some(CellRef { row: 4, col: 1 }));
        assert_eq!(find_in_rows(&rows, "ABC", 2), None);
        assert_eq!(find_in_rows(&rows, "ABC", 0), None);
    }

    #[test]
    fn backend_defaults_to_sheets() {
        let mut settings = Settings {
            scrape_base_url: None,
            store_backend: None,
            google_credential: None,
            spreadsheet_id: None,
            database_url: None,
            sentry_dsn: None,
        };
        assert_eq!(StoreBackend::from_settings(&settings).unwrap(), StoreBackend::Sheets);
        settings.store_backend = Some("Memory".to_string());
        assert_eq!(StoreBackend::from_settings(&settings).unwrap(), StoreBackend::Memory);
        settings.store_backend = Some("excel".to_string());
        assert!(StoreBackend::from_settings(&settings).is_err());
    }
}
