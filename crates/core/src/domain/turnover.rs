use crate::market::types::{MarketSummary, DATE_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Turnover sheet header, in column order. Every column after `Date` is a cleaned
/// market-summary label.
pub const TURNOVER_COLUMNS: [&str; 7] = [
    DATE_FIELD,
    "Total Turnover",
    "Total Traded Shares",
    "Total Transactions",
    "Total Scrips Traded",
    "Total Market Capitalization",
    "Total Float Market Capitalization",
];

const MISSING: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnoverRow {
    pub date: String,
    /// Values for `TURNOVER_COLUMNS[1..]`, in order.
    pub totals: Vec<String>,
}

impl TurnoverRow {
    /// Projects a scraped summary onto the turnover columns. `None` when the summary carries
    /// no trading date, since the date is the row key.
    pub fn from_summary(summary: &MarketSummary) -> Option<Self> {
        let date = summary
            .trading_date()
            .map(str::trim)
            .filter(|d| !d.is_empty())?
            .to_string();

        let totals = TURNOVER_COLUMNS[1..]
            .iter()
            .map(|label| summary.get(label).unwrap_or(MISSING).to_string())
            .collect();

        Some(Self { date, totals })
    }

    pub fn into_row(self) -> Vec<Value> {
        std::iter::once(self.date)
            .chain(self.totals)
            .map(Value::String)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn projects_summary_with_missing_totals() {
        let mut fields = BTreeMap::new();
        fields.insert("Date".to_string(), "2025-06-12".to_string());
        fields.insert("Total Turnover".to_string(), "4,512,334,120.15".to_string());
        fields.insert("Total Transactions".to_string(), "61,022".to_string());
        let summary = MarketSummary(fields);

        let row = TurnoverRow::from_summary(&summary).unwrap();
        assert_eq!(row.date, "2025-06-12");
        assert_eq!(row.totals.len(), TURNOVER_COLUMNS.len() - 1);
        assert_eq!(row.totals[0], "4,512,334,120.15");
        assert_eq!(row.totals[1], "N/A");
        assert_eq!(row.totals[2], "61,022");

        let values = row.into_row();
        assert_eq!(values.len(), TURNOVER_COLUMNS.len());
        assert_eq!(values[0], Value::String("2025-06-12".to_string()));
    }

    #[test]
    fn summary_without_date_has_no_row() {
        let summary = MarketSummary(BTreeMap::new());
        assert!(TurnoverRow::from_summary(&summary).is_none());
    }
}
