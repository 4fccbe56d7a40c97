pub mod domain;
pub mod error;
pub mod market;
pub mod portfolio;
pub mod storage;
pub mod time;

pub use error::{Error, Result};

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub scrape_base_url: Option<String>,
        pub store_backend: Option<String>,
        pub google_credential: Option<String>,
        pub spreadsheet_id: Option<String>,
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                scrape_base_url: std::env::var("SCRAPE_API").ok(),
                store_backend: std::env::var("STORE_BACKEND").ok(),
                google_credential: std::env::var("GOOGLE_CREDENTIAL").ok(),
                spreadsheet_id: std::env::var("SPREADSHEET_ID").ok(),
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn require_scrape_base_url(&self) -> anyhow::Result<&str> {
            self.scrape_base_url
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .context("SCRAPE_API is required")
        }

        pub fn require_google_credential(&self) -> anyhow::Result<&str> {
            self.google_credential
                .as_deref()
                .context("GOOGLE_CREDENTIAL environment variable not set")
        }

        pub fn require_spreadsheet_id(&self) -> anyhow::Result<&str> {
            self.spreadsheet_id
                .as_deref()
                .context("SPREADSHEET_ID is required")
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }
    }
}
