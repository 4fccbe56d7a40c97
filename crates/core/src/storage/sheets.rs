//! Google Sheets v4 backend. One worksheet per table, row 1 is the header.
//!
//! Authentication is the service-account JWT bearer grant; the access token is cached in
//! process and refreshed shortly before it expires.

use super::{find_in_rows, records_from_rows, CellRef, TabularStore};
use crate::config::Settings;
use crate::domain::{cell_text, Record};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

pub struct SheetsClient {
    http: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    client_email: String,
    token_uri: String,
    signing_key: EncodingKey,

    token_cache: tokio::sync::Mutex<Option<CachedToken>>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired_or_stale(&self, now: DateTime<Utc>) -> bool {
        // Refresh a bit early to avoid edge races.
        now + ChronoDuration::minutes(2) >= self.expires_at
    }
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

impl SheetsClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let creds_json = settings.require_google_credential()?;
        let key: ServiceAccountKey = serde_json::from_str(creds_json)
            .context("GOOGLE_CREDENTIAL is not a valid service-account JSON")?;
        let spreadsheet_id = settings.require_spreadsheet_id()?.to_string();

        let base_url = std::env::var("SHEETS_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| SHEETS_BASE_URL.to_string());

        Self::new(key, spreadsheet_id, base_url)
    }

    pub fn new(key: ServiceAccountKey, spreadsheet_id: String, base_url: String) -> Result<Self> {
        // Accept keys whose newlines arrive escaped.
        let pem = key.private_key.replace("\\n", "\n");
        let signing_key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .context("service-account private_key is not a valid RSA PEM")?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build sheets http client")?;

        Ok(Self {
            http,
            base_url,
            spreadsheet_id,
            client_email: key.client_email,
            token_uri: key
                .token_uri
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            signing_key,
            token_cache: tokio::sync::Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let mut guard = self.token_cache.lock().await;
        if let Some(cached) = guard.as_ref() {
            if !cached.is_expired_or_stale(Utc::now()) {
                return Ok(cached.access_token.clone());
            }
        }

        let token = self.fetch_access_token().await?;
        let access_token = token.access_token.clone();
        *guard = Some(token);
        Ok(access_token)
    }

    async fn fetch_access_token(&self) -> Result<CachedToken> {
        let now = Utc::now();
        let claims = JwtClaims {
            iss: &self.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + TOKEN_LIFETIME_SECS,
        };
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .context("failed to sign service-account JWT")?;

        let res = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .context("google token request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read google token response")?;
        if !status.is_success() {
            anyhow::bail!("google token HTTP {status}: {text}");
        }

        let parsed: TokenResponse =
            serde_json::from_str(&text).context("failed to parse google token response")?;
        let lifetime = if parsed.expires_in > 0 {
            parsed.expires_in
        } else {
            TOKEN_LIFETIME_SECS
        };

        tracing::debug!(expires_in = lifetime, "google access token issued");
        Ok(CachedToken {
            access_token: parsed.access_token,
            expires_at: now + ChronoDuration::seconds(lifetime),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("invalid sheets base url {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("sheets base url cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, req: reqwest::RequestBuilder, what: &str) -> Result<String> {
        let token = self.access_token().await?;
        let res = req
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("sheets {what} request failed"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .with_context(|| format!("failed to read sheets {what} response"))?;
        if !status.is_success() {
            anyhow::bail!("sheets {what} HTTP {status}: {text}");
        }
        Ok(text)
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<Value>>> {
        let url = self.url(&["v4", "spreadsheets", &self.spreadsheet_id, "values", range])?;
        let req = self
            .http
            .get(url)
            .query(&[("valueRenderOption", "FORMATTED_VALUE"), ("majorDimension", "ROWS")]);
        let text = self.send(req, "values.get").await?;
        let parsed: ValueRange =
            serde_json::from_str(&text).context("failed to parse sheets values.get response")?;
        Ok(parsed.values)
    }

    async fn append_values(&self, range: &str, rows: Vec<Vec<Value>>) -> Result<()> {
        let target = format!("{range}:append");
        let url = self.url(&["v4", "spreadsheets", &self.spreadsheet_id, "values", &target])?;
        let req = self
            .http
            .post(url)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "values": rows }));
        self.send(req, "values.append").await?;
        Ok(())
    }

    async fn batch_update(&self, requests: Value) -> Result<()> {
        let target = format!("{}:batchUpdate", self.spreadsheet_id);
        let url = self.url(&["v4", "spreadsheets", &target])?;
        let req = self.http.post(url).json(&json!({ "requests": requests }));
        self.send(req, "batchUpdate").await?;
        Ok(())
    }

    async fn sheet_ids(&self) -> Result<Vec<SheetProperties>> {
        let url = self.url(&["v4", "spreadsheets", &self.spreadsheet_id])?;
        let req = self
            .http
            .get(url)
            .query(&[("fields", "sheets.properties(sheetId,title)")]);
        let text = self.send(req, "spreadsheets.get").await?;
        let meta: SpreadsheetMeta =
            serde_json::from_str(&text).context("failed to parse spreadsheet metadata")?;
        Ok(meta.sheets.into_iter().map(|s| s.properties).collect())
    }

    async fn sheet_id(&self, title: &str) -> Result<i64> {
        self.sheet_ids()
            .await?
            .into_iter()
            .find(|p| p.title == title)
            .map(|p| p.sheet_id)
            .with_context(|| format!("worksheet {title:?} not found"))
    }

    /// Creates the worksheet if needed and writes the header into an empty one.
    pub async fn ensure_table(self: &Arc<Self>, title: &str, headers: &[&str]) -> Result<SheetsTable> {
        let exists = self.sheet_ids().await?.iter().any(|p| p.title == title);
        if !exists {
            self.batch_update(json!([{ "addSheet": { "properties": { "title": title } } }]))
                .await
                .with_context(|| format!("failed to create worksheet {title:?}"))?;
            tracing::info!(sheet = title, "created worksheet");
        }

        let table = SheetsTable {
            client: Arc::clone(self),
            title: title.to_string(),
        };

        let first_row = self.get_values(&format!("{}!1:1", table.range())).await?;
        if first_row.first().map_or(true, |r| r.is_empty()) {
            let header = headers.iter().map(|h| Value::String(h.to_string())).collect();
            table.append_rows(vec![header]).await?;
            tracing::info!(sheet = title, "wrote worksheet header");
        }

        Ok(table)
    }
}

pub struct SheetsTable {
    client: Arc<SheetsClient>,
    title: String,
}

impl SheetsTable {
    /// A1-notation sheet reference, quoted so titles with spaces work.
    fn range(&self) -> String {
        quote_title(&self.title)
    }
}

#[async_trait::async_trait]
impl TabularStore for SheetsTable {
    fn name(&self) -> &str {
        &self.title
    }

    async fn get_all_records(&self) -> Result<Vec<Record>> {
        let mut values = self.client.get_values(&self.range()).await?.into_iter();
        let Some(header) = values.next() else {
            return Ok(Vec::new());
        };
        let headers: Vec<String> = header.iter().map(cell_text).collect();
        let rows = values
            .map(|row| row.into_iter().map(numericise).collect())
            .collect();
        Ok(records_from_rows(&headers, rows))
    }

    async fn append_rows(&self, rows: Vec<Vec<Value>>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.client
            .append_values(&format!("{}!A1", self.range()), rows)
            .await
    }

    async fn find_cell(&self, value: &str, column: usize) -> Result<Option<CellRef>> {
        let values = self.client.get_values(&self.range()).await?;
        Ok(find_in_rows(values.get(1..).unwrap_or_default(), value, column))
    }

    async fn delete_row(&self, row_index: usize) -> Result<()> {
        anyhow::ensure!(row_index >= super::FIRST_DATA_ROW, "cannot delete header row");
        let sheet_id = self.client.sheet_id(&self.title).await?;
        self.client
            .batch_update(json!([{
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": row_index - 1,
                        "endIndex": row_index,
                    }
                }
            }]))
            .await
            .with_context(|| format!("failed to delete row {row_index} of {:?}", self.title))
    }
}

fn quote_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// Formatted cells come back as strings; whole and decimal numbers are turned back into JSON
/// numbers the way gspread's `get_all_records` does. Empty cells stay empty strings.
fn numericise(value: Value) -> Value {
    let Value::String(s) = &value else {
        return value;
    };
    if let Ok(i) = s.parse::<i64>() {
        return Value::from(i);
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(value),
        _ => value,
    }
}
