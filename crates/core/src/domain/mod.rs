pub mod contract;
pub mod holding;
pub mod turnover;

/// One tabular-store row keyed by its sheet header.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Cell text the way a spreadsheet displays it: strings as-is, numbers without quotes,
/// empty for null.
pub fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
