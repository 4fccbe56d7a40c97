use super::{find_in_rows, records_from_rows, CellRef, TabularStore, FIRST_DATA_ROW};
use crate::domain::Record;
use serde_json::Value;
use tokio::sync::Mutex;

/// Process-local table for tests and `STORE_BACKEND=memory`.
#[derive(Debug)]
pub struct MemoryTable {
    name: String,
    headers: Vec<String>,
    rows: Mutex<Vec<Vec<Value>>>,
}

impl MemoryTable {
    pub fn new(name: impl Into<String>, headers: &[&str]) -> Self {
        Self {
            name: name.into(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Mutex::new(Vec::new()),
        }
    }

    #[cfg(test)]
    pub(crate) async fn row_count(&self) -> usize {
        self.rows.lock().await.len()
    }
}

#[async_trait::async_trait]
impl TabularStore for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_all_records(&self) -> anyhow::Result<Vec<Record>> {
        let rows = self.rows.lock().await.clone();
        Ok(records_from_rows(&self.headers, rows))
    }

    async fn append_rows(&self, rows: Vec<Vec<Value>>) -> anyhow::Result<()> {
        self.rows.lock().await.extend(rows);
        Ok(())
    }

    async fn find_cell(&self, value: &str, column: usize) -> anyhow::Result<Option<CellRef>> {
        let rows = self.rows.lock().await;
        Ok(find_in_rows(&rows, value, column))
    }

    async fn delete_row(&self, row_index: usize) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().await;
        let idx = row_index
            .checked_sub(FIRST_DATA_ROW)
            .filter(|i| *i < rows.len())
            .ok_or_else(|| anyhow::anyhow!("{}: row {row_index} out of range", self.name))?;
        rows.remove(idx);
        Ok(())
    }
}
