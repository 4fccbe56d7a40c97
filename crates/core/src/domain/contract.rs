use crate::domain::holding::{parse_decimal, HoldingRecord, DEFAULT_SECTOR};
use crate::domain::turnover::TurnoverRow;
use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /add`. Every field is optional at the wire level so missing fields can be
/// reported together instead of failing on the first one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddHoldingRequest {
    #[serde(default, alias = "scrip")]
    pub symbol: Option<String>,
    #[serde(default)]
    pub quantity: Option<Value>,
    #[serde(default, alias = "purchasePrice")]
    pub price: Option<Value>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
}

impl AddHoldingRequest {
    pub fn validate_and_into_holding(self) -> Result<HoldingRecord> {
        let symbol = non_empty(self.symbol);
        let date = non_empty(self.date);

        let mut missing = Vec::new();
        if symbol.is_none() {
            missing.push("symbol");
        }
        if self.quantity.is_none() {
            missing.push("quantity");
        }
        if self.price.is_none() {
            missing.push("price");
        }
        if date.is_none() {
            missing.push("date");
        }
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let quantity = non_negative_number("quantity", self.quantity.as_ref())?;
        let purchase_price = non_negative_number("price", self.price.as_ref())?;

        Ok(HoldingRecord {
            symbol: symbol.unwrap_or_default(),
            quantity,
            purchase_price,
            sector: non_empty(self.sector).unwrap_or_else(|| DEFAULT_SECTOR.to_string()),
            date,
        })
    }
}

/// Body of `POST /turnover`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddTurnoverRequest {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub turnover: Option<String>,
    #[serde(default)]
    pub traded_shares: Option<String>,
    #[serde(default)]
    pub transactions: Option<String>,
    #[serde(default)]
    pub scrips_traded: Option<String>,
    #[serde(default)]
    pub market_capitalization: Option<String>,
    #[serde(default)]
    pub float_market_capitalization: Option<String>,
}

impl AddTurnoverRequest {
    pub fn validate_and_into_row(self) -> Result<TurnoverRow> {
        let date = non_empty(self.date)
            .ok_or_else(|| Error::Validation("Missing required field: date".to_string()))?;
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|_| Error::Validation(format!("date must be YYYY-MM-DD (got {date})")))?;
        let turnover = non_empty(self.turnover)
            .ok_or_else(|| Error::Validation("Missing required field: turnover".to_string()))?;

        let na = |v: Option<String>| non_empty(v).unwrap_or_else(|| "N/A".to_string());
        Ok(TurnoverRow {
            date: date.format("%Y-%m-%d").to_string(),
            totals: vec![
                turnover,
                na(self.traded_shares),
                na(self.transactions),
                na(self.scrips_traded),
                na(self.market_capitalization),
                na(self.float_market_capitalization),
            ],
        })
    }
}

/// Body of `POST /watchlist`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchlistRequest {
    #[serde(default)]
    pub symbol: Option<String>,
}

impl WatchlistRequest {
    /// Trims surrounding whitespace but keeps case: watchlist keys are case-sensitive.
    pub fn validate_and_into_symbol(self) -> Result<String> {
        non_empty(self.symbol)
            .ok_or_else(|| Error::Validation("Missing required field: symbol".to_string()))
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn non_negative_number(field: &str, value: Option<&Value>) -> Result<f64> {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_decimal(s),
        _ => None,
    };
    match parsed {
        Some(v) if v >= 0.0 => Ok(v),
        Some(v) => Err(Error::Validation(format!("{field} must be non-negative (got {v})"))),
        None => Err(Error::Validation(format!("{field} must be a number"))),
    }
}
