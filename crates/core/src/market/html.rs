//! Extraction of the price table and the market summary from the source's markup.
//!
//! Both functions are pure over the response body; anything structurally missing is a
//! `Error::Parse` so callers can tell "source unreachable" from "source format changed".

use crate::error::{Error, Result};
use crate::market::types::{MarketPriceRow, MarketSummary, DATE_FIELD};
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;

pub const PRICE_TABLE_SELECTOR: &str = "table#headFixed";
pub const SUMMARY_CONTAINER_SELECTOR: &str = "#market-summary";
pub const SUMMARY_DATE_SELECTOR: &str = "#market-summary-date";

const CURRENCY_ANNOTATIONS: [&str; 2] = ["(Rs.)", "(Rs)"];

pub fn parse_price_table(body: &str) -> Result<Vec<MarketPriceRow>> {
    let doc = Html::parse_document(body);

    let table = doc.select(&selector(PRICE_TABLE_SELECTOR)?).next().ok_or_else(|| {
        Error::Parse("Could not find the main data table with id='headFixed'.".to_string())
    })?;

    let thead = table
        .select(&selector("thead")?)
        .next()
        .ok_or_else(|| Error::Parse("Could not find the table header (<thead>).".to_string()))?;
    let header: Vec<String> = thead.select(&selector("th")?).map(element_text).collect();
    if header.is_empty() {
        return Err(Error::Parse("Table header has no columns.".to_string()));
    }

    let tbody = table
        .select(&selector("tbody")?)
        .next()
        .ok_or_else(|| Error::Parse("Could not find the table body (<tbody>).".to_string()))?;

    let tr = selector("tr")?;
    let td = selector("td")?;
    let mut rows: Vec<MarketPriceRow> = Vec::new();
    for row in tbody.select(&tr) {
        let cells: Vec<String> = row.select(&td).map(element_text).collect();
        if cells.is_empty() {
            continue;
        }
        rows.push(header.iter().cloned().zip(cells).collect());
    }
    Ok(rows)
}

pub fn parse_market_summary(body: &str) -> Result<MarketSummary> {
    let doc = Html::parse_document(body);

    let date = doc
        .select(&selector(SUMMARY_DATE_SELECTOR)?)
        .next()
        .map(element_text)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| Error::Parse("Could not find the market summary date.".to_string()))?;

    let container = doc
        .select(&selector(SUMMARY_CONTAINER_SELECTOR)?)
        .next()
        .ok_or_else(|| Error::Parse("Could not find the market summary container.".to_string()))?;

    let td = selector("td")?;
    let mut fields = BTreeMap::new();
    for row in container.select(&selector("tr")?) {
        let cells: Vec<String> = row.select(&td).map(element_text).collect();
        if let [label, value] = cells.as_slice() {
            fields.insert(clean_summary_label(label), value.clone());
        }
    }
    fields.insert(DATE_FIELD.to_string(), date);

    Ok(MarketSummary(fields))
}

/// "Total Turnover (Rs.)" -> "Total Turnover".
pub fn clean_summary_label(label: &str) -> String {
    let mut out = label.to_string();
    for annotation in CURRENCY_ANNOTATIONS {
        out = out.replace(annotation, "");
    }
    out.trim().to_string()
}

/// Text of an element with every text node trimmed and concatenated.
fn element_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).collect()
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Parse(format!("invalid selector {css}: {e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRICES: &str = r#"
        <html><body>
        <table id="headFixed" class="table">
          <thead>
            <tr><th>S.No</th><th>Symbol</th><th>LTP</th><th>52 Weeks High</th><th>52 Weeks Low</th></tr>
          </thead>
          <tbody>
            <tr><td>1</td><td><a href="/company/ADBL">ADBL</a></td><td> 1,234.50 </td><td>1,400.00</td><td>980.00</td></tr>
            <tr><td>2</td><td>NABIL</td><td>512.00</td><td>600.00</td></tr>
          </tbody>
        </table>
        </body></html>
    "#;

    #[test]
    fn parses_rows_by_header_label() {
        let rows = parse_price_table(PRICES).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].symbol(), Some("ADBL"));
        assert_eq!(rows[0].ltp(), Some("1,234.50"));
        assert_eq!(rows[0].week_52_low(), Some("980.00"));
        assert_eq!(rows[0].get("S.No"), Some("1"));
    }

    #[test]
    fn short_rows_zip_to_available_cells() {
        let rows = parse_price_table(PRICES).unwrap();
        assert_eq!(rows[1].symbol(), Some("NABIL"));
        assert_eq!(rows[1].week_52_high(), Some("600.00"));
        assert_eq!(rows[1].week_52_low(), None);
    }

    #[test]
    fn missing_table_is_a_parse_error() {
        let err = parse_price_table("<html><body><table id='other'></table></body></html>")
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn missing_header_is_a_parse_error() {
        let html = r#"<table id="headFixed"><tbody><tr><td>1</td></tr></tbody></table>"#;
        let err = parse_price_table(html).unwrap_err();
        assert!(matches!(err, Error::Parse(ref m) if m.contains("thead")));
    }

    #[test]
    fn missing_body_is_a_parse_error() {
        let html = r#"<table id="headFixed"><thead><tr><th>Symbol</th></tr></thead></table>"#;
        let err = parse_price_table(html).unwrap_err();
        assert!(matches!(err, Error::Parse(ref m) if m.contains("tbody")));
    }

    const SUMMARY: &str = r#"
        <html><body>
        <h5>Market Summary as of <span id="market-summary-date">2025-06-12</span></h5>
        <div id="market-summary">
          <table>
            <tr><th colspan="2">Summary</th></tr>
            <tr><td>Total Turnover (Rs.)</td><td>4,512,334,120.15</td></tr>
            <tr><td>Total Traded Shares</td><td>9,870,112</td></tr>
            <tr><td>Total Transactions</td><td>61,022</td></tr>
            <tr><td>Total Market Capitalization (Rs.)</td><td>4,401,234,567,890.10</td></tr>
            <tr><td>ignored</td><td>three</td><td>cells</td></tr>
          </table>
        </div>
        </body></html>
    "#;

    #[test]
    fn parses_summary_labels_and_date() {
        let summary = parse_market_summary(SUMMARY).unwrap();
        assert_eq!(summary.trading_date(), Some("2025-06-12"));
        assert_eq!(summary.get("Total Turnover"), Some("4,512,334,120.15"));
        assert_eq!(summary.get("Total Market Capitalization"), Some("4,401,234,567,890.10"));
        assert_eq!(summary.get("Total Transactions"), Some("61,022"));
        assert_eq!(summary.get("ignored"), None);
        assert_eq!(summary.0.len(), 5);
    }

    #[test]
    fn summary_without_container_is_a_parse_error() {
        let html = r#"<span id="market-summary-date">2025-06-12</span>"#;
        assert!(matches!(parse_market_summary(html), Err(Error::Parse(_))));
    }

    #[test]
    fn summary_without_date_is_a_parse_error() {
        let html = r#"<div id="market-summary"><table><tr><td>a</td><td>b</td></tr></table></div>"#;
        assert!(matches!(parse_market_summary(html), Err(Error::Parse(_))));
    }

    #[test]
    fn cleans_currency_annotation() {
        assert_eq!(clean_summary_label("Total Turnover (Rs.)"), "Total Turnover");
        assert_eq!(clean_summary_label(" Total Scrips Traded "), "Total Scrips Traded");
    }
}
