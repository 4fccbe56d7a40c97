//! Joins holdings with the live price table into the per-holding valuation view.
//!
//! The join is a left outer join on symbol: a holding without a price row still appears,
//! valued at zero and with its profit percentage suppressed. Nothing here performs I/O or
//! fails; malformed price cells degrade to "unknown" rather than aborting the summary.

use crate::domain::holding::{parse_decimal, HoldingRecord};
use crate::market::types::MarketPriceRow;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    #[serde(rename = "Script")]
    pub symbol: String,
    #[serde(rename = "Sector")]
    pub sector: String,
    pub quantity: f64,
    #[serde(rename = "purchase price")]
    pub purchase_price: f64,
    #[serde(rename = "LTP")]
    pub last_traded_price: f64,
    #[serde(rename = "Current Value")]
    pub current_value: f64,
    #[serde(rename = "52 week high/low")]
    pub week_52_high_low: String,
    #[serde(rename = "Profit amount")]
    pub profit_amount: f64,
    #[serde(rename = "profit percentage")]
    pub profit_percentage: String,
    #[serde(rename = "Purchase value")]
    pub purchase_value: f64,
    #[serde(rename = "Weight%")]
    pub weight_percent: String,
}

pub fn compute_summary(holdings: &[HoldingRecord], prices: &[MarketPriceRow]) -> Vec<SummaryRow> {
    // Later rows overwrite earlier ones for a repeated symbol.
    let by_symbol: HashMap<&str, &MarketPriceRow> = prices
        .iter()
        .filter_map(|row| row.symbol().map(|s| (s, row)))
        .collect();

    let total: f64 = holdings.iter().map(HoldingRecord::purchase_value).sum();
    let total_purchase_value = if total == 0.0 { 1.0 } else { total };

    holdings
        .iter()
        .filter(|h| !h.symbol.is_empty() && h.quantity != 0.0)
        .map(|h| summarize(h, by_symbol.get(h.symbol.as_str()).copied(), total_purchase_value))
        .collect()
}

fn summarize(
    holding: &HoldingRecord,
    market: Option<&MarketPriceRow>,
    total_purchase_value: f64,
) -> SummaryRow {
    let ltp = market.map(last_traded_price).unwrap_or(0.0);
    let week_52_high_low = market
        .map(|m| {
            format!(
                "{} / {}",
                m.week_52_high().unwrap_or(NOT_AVAILABLE),
                m.week_52_low().unwrap_or(NOT_AVAILABLE)
            )
        })
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let quantity = holding.quantity;
    let purchase_price = holding.purchase_price;

    let purchase_value = purchase_price * quantity;
    let current_value = if ltp > 0.0 { ltp * quantity } else { 0.0 };
    let profit_amount = current_value - purchase_value;

    // Only meaningful with a real cost basis and a live price.
    let profit_percentage = if purchase_price > 0.0 && ltp > 0.0 {
        profit_amount / purchase_value * 100.0
    } else {
        0.0
    };
    let weight = purchase_value / total_purchase_value * 100.0;

    SummaryRow {
        symbol: holding.symbol.clone(),
        sector: holding.sector.clone(),
        quantity,
        purchase_price,
        last_traded_price: ltp,
        current_value: round2(current_value),
        week_52_high_low,
        profit_amount: round2(profit_amount),
        profit_percentage: percent(profit_percentage),
        purchase_value: round2(purchase_value),
        weight_percent: percent(weight),
    }
}

/// `LTP` with thousands separators removed; anything unparseable is 0.
pub fn last_traded_price(row: &MarketPriceRow) -> f64 {
    row.ltp().and_then(parse_decimal).unwrap_or(0.0)
}

fn round2(v: f64) -> f64 {
    // Half-to-even, like Python's round(x, 2) on the stored value.
    let r = (v * 100.0).round_ties_even() / 100.0;
    // Avoid rendering "-0".
    if r == 0.0 {
        0.0
    } else {
        r
    }
}

fn percent(v: f64) -> String {
    format!("{}%", round2(v))
}
