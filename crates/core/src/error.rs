//! Error taxonomy shared by the fetcher, the stores and the HTTP layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The market-data source could not be reached (connect, timeout, non-2xx).
    #[error("Failed to retrieve data from the website: {0}")]
    Retrieval(String),

    /// The source answered but the expected markup is missing.
    #[error("Error processing the website's HTML content: {0}")]
    Parse(String),

    #[error("Store not connected: {0}")]
    StoreUnavailable(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl Error {
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::Retrieval(_) | Error::Parse(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
