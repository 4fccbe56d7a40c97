use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SYMBOL_FIELD: &str = "Symbol";
pub const LTP_FIELD: &str = "LTP";
pub const WEEK_52_HIGH_FIELD: &str = "52 Weeks High";
pub const WEEK_52_LOW_FIELD: &str = "52 Weeks Low";
pub const DATE_FIELD: &str = "Date";

/// One row of the live price table: header label -> cell text, exactly as scraped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketPriceRow(pub BTreeMap<String, String>);

impl MarketPriceRow {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn symbol(&self) -> Option<&str> {
        self.get(SYMBOL_FIELD)
    }

    pub fn ltp(&self) -> Option<&str> {
        self.get(LTP_FIELD)
    }

    pub fn week_52_high(&self) -> Option<&str> {
        self.get(WEEK_52_HIGH_FIELD)
    }

    pub fn week_52_low(&self) -> Option<&str> {
        self.get(WEEK_52_LOW_FIELD)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MarketPriceRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Market-wide summary: cleaned label -> display value, with the trading date under `Date`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketSummary(pub BTreeMap<String, String>);

impl MarketSummary {
    pub fn get(&self, label: &str) -> Option<&str> {
        self.0.get(label).map(String::as_str)
    }

    pub fn trading_date(&self) -> Option<&str> {
        self.get(DATE_FIELD)
    }
}
