use crate::config::Settings;
use crate::error::{Error, Result};
use crate::market::html::{parse_market_summary, parse_price_table};
use crate::market::types::{MarketPriceRow, MarketSummary};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
// SCRAPE_API is the price page itself unless a path is configured.
const DEFAULT_PRICES_PATH: &str = "";
const DEFAULT_SUMMARY_PATH: &str = "/market-summary";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";

/// Source of live market data. Implementations do not retry; callers decide.
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_price_table(&self) -> Result<Vec<MarketPriceRow>>;

    async fn fetch_market_summary(&self) -> Result<MarketSummary>;
}

#[derive(Debug, Clone)]
pub struct ScrapingMarketSource {
    http: reqwest::Client,
    base_url: String,
    prices_path: String,
    summary_path: String,
}

impl ScrapingMarketSource {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings.require_scrape_base_url()?.to_string();

        let timeout_secs = std::env::var("SCRAPE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let prices_path = env_path("SCRAPE_PRICES_PATH", DEFAULT_PRICES_PATH);
        let summary_path = env_path("SCRAPE_SUMMARY_PATH", DEFAULT_SUMMARY_PATH);

        Self::new(base_url, prices_path, summary_path, Duration::from_secs(timeout_secs))
    }

    pub fn new(
        base_url: String,
        prices_path: String,
        summary_path: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build market source http client")?;

        Ok(Self {
            http,
            base_url,
            prices_path,
            summary_path,
        })
    }

    fn url(&self, path: &str) -> String {
        if path.is_empty() {
            return self.base_url.clone();
        }
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn fetch_page(&self, path: &str) -> Result<String> {
        let url = self.url(path);

        let res = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Retrieval(format!("GET {url}: {e}")))?;

        let status = res.status();
        if !status.is_success() {
            return Err(Error::Retrieval(format!("GET {url}: HTTP {status}")));
        }

        res.text()
            .await
            .map_err(|e| Error::Retrieval(format!("failed to read response from {url}: {e}")))
    }
}

#[async_trait::async_trait]
impl MarketDataSource for ScrapingMarketSource {
    fn source_name(&self) -> &'static str {
        "html_scrape"
    }

    async fn fetch_price_table(&self) -> Result<Vec<MarketPriceRow>> {
        let body = self.fetch_page(&self.prices_path).await?;
        let rows = parse_price_table(&body)?;
        tracing::debug!(rows = rows.len(), "parsed price table");
        Ok(rows)
    }

    async fn fetch_market_summary(&self) -> Result<MarketSummary> {
        let body = self.fetch_page(&self.summary_path).await?;
        let summary = parse_market_summary(&body)?;
        tracing::debug!(
            date = summary.trading_date().unwrap_or_default(),
            fields = summary.0.len(),
            "parsed market summary"
        );
        Ok(summary)
    }
}

/// Empty string is allowed and means "the base URL itself".
fn env_path(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| default.to_string())
}
