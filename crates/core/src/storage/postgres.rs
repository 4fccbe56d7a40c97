use super::{CellRef, TabularStore, FIRST_DATA_ROW};
use crate::domain::Record;
use anyhow::Context;
use serde_json::Value;

/// One logical sheet stored in `sheet_rows`. Row order is insertion order.
#[derive(Debug, Clone)]
pub struct PgTable {
    pool: sqlx::PgPool,
    sheet: String,
    headers: Vec<String>,
}

impl PgTable {
    pub fn new(pool: sqlx::PgPool, sheet: impl Into<String>, headers: &[&str]) -> Self {
        Self {
            pool,
            sheet: sheet.into(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
        }
    }
}

#[async_trait::async_trait]
impl TabularStore for PgTable {
    fn name(&self) -> &str {
        &self.sheet
    }

    async fn get_all_records(&self) -> anyhow::Result<Vec<Record>> {
        let rows = sqlx::query_scalar::<_, Value>(
            "SELECT cells FROM sheet_rows WHERE sheet = $1 ORDER BY id ASC",
        )
        .bind(&self.sheet)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("select sheet_rows failed (sheet={})", self.sheet))?;

        let rows = rows
            .into_iter()
            .map(|cells| match cells {
                Value::Array(cells) => cells,
                other => vec![other],
            })
            .collect();
        Ok(super::records_from_rows(&self.headers, rows))
    }

    async fn append_rows(&self, rows: Vec<Vec<Value>>) -> anyhow::Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let t0 = std::time::Instant::now();
        let mut qb: sqlx::QueryBuilder<sqlx::Postgres> =
            sqlx::QueryBuilder::new("INSERT INTO sheet_rows (sheet, cells) ");
        qb.push_values(&rows, |mut b, row| {
            b.push_bind(self.sheet.clone()).push_bind(Value::Array(row.clone()));
        });

        let res = qb
            .build()
            .persistent(false)
            .execute(&self.pool)
            .await
            .with_context(|| format!("batch insert sheet_rows failed (sheet={})", self.sheet))?;

        tracing::debug!(
            sheet = %self.sheet,
            rows = res.rows_affected(),
            elapsed_ms = t0.elapsed().as_millis(),
            "sheet_rows batch insert"
        );
        Ok(())
    }

    async fn find_cell(&self, value: &str, column: usize) -> anyhow::Result<Option<CellRef>> {
        let Some(idx) = column.checked_sub(1) else {
            return Ok(None);
        };

        // `->>` renders strings unquoted and numbers as their JSON text, matching cell_text.
        let pos: Option<i64> = sqlx::query_scalar(
            "SELECT rn FROM ( \
               SELECT row_number() OVER (ORDER BY id ASC) AS rn, cells ->> $2 AS v \
               FROM sheet_rows WHERE sheet = $1 \
             ) t \
             WHERE v = $3 \
             ORDER BY rn ASC \
             LIMIT 1",
        )
        .bind(&self.sheet)
        .bind(idx as i32)
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("find in sheet_rows failed (sheet={})", self.sheet))?;

        Ok(pos.map(|rn| CellRef {
            row: rn as usize - 1 + FIRST_DATA_ROW,
            col: column,
        }))
    }

    async fn delete_row(&self, row_index: usize) -> anyhow::Result<()> {
        let offset = row_index
            .checked_sub(FIRST_DATA_ROW)
            .with_context(|| format!("{}: cannot delete header row {row_index}", self.sheet))?;

        let res = sqlx::query(
            "DELETE FROM sheet_rows WHERE id = ( \
               SELECT id FROM sheet_rows WHERE sheet = $1 ORDER BY id ASC OFFSET $2 LIMIT 1 \
             )",
        )
        .bind(&self.sheet)
        .bind(offset as i64)
        .execute(&self.pool)
        .await
        .with_context(|| format!("delete from sheet_rows failed (sheet={})", self.sheet))?;

        anyhow::ensure!(
            res.rows_affected() == 1,
            "{}: row {row_index} out of range",
            self.sheet
        );
        Ok(())
    }
}
