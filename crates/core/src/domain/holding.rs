use crate::domain::{cell_text, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Holdings sheet header, in column order.
pub const HOLDING_COLUMNS: [&str; 5] = ["scrip", "quantity", "purchasePrice", "sector", "date"];

pub const DEFAULT_SECTOR: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingRecord {
    pub symbol: String,
    pub quantity: f64,
    pub purchase_price: f64,
    pub sector: String,
    pub date: Option<String>,
}

impl HoldingRecord {
    /// Reads a holdings row as returned by the store. Never fails: numeric cells that do not
    /// parse count as zero and a blank sector becomes "N/A".
    pub fn from_record(record: &Record) -> Self {
        let symbol = record
            .get("scrip")
            .or_else(|| record.get("symbol"))
            .map(cell_text)
            .unwrap_or_default()
            .trim()
            .to_string();

        let sector = record
            .get("sector")
            .map(cell_text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SECTOR.to_string());

        let date = record
            .get("date")
            .map(cell_text)
            .filter(|s| !s.trim().is_empty());

        Self {
            symbol,
            quantity: coerce_number(record.get("quantity")),
            purchase_price: coerce_number(record.get("purchasePrice")),
            sector,
            date,
        }
    }

    pub fn purchase_value(&self) -> f64 {
        self.quantity * self.purchase_price
    }

    /// Row values in `HOLDING_COLUMNS` order.
    pub fn into_row(self) -> Vec<Value> {
        vec![
            Value::String(self.symbol),
            number_value(self.quantity),
            number_value(self.purchase_price),
            Value::String(self.sector),
            Value::String(self.date.unwrap_or_default()),
        ]
    }
}

/// Lenient numeric read of a store cell: JSON numbers pass through, strings are parsed after
/// dropping thousands separators, everything else is zero.
pub fn coerce_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => parse_decimal(s).unwrap_or(0.0),
        _ => 0.0,
    }
}

pub(crate) fn parse_decimal(s: &str) -> Option<f64> {
    let t = s.trim().replace(',', "");
    if t.is_empty() {
        return None;
    }
    t.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn number_value(v: f64) -> Value {
    // Whole numbers go out as integers.
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Value::from(v as i64)
    } else {
        serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
