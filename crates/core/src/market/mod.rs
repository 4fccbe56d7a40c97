pub mod html;
pub mod provider;
pub mod types;

pub use provider::{MarketDataSource, ScrapingMarketSource};
pub use types::{MarketPriceRow, MarketSummary};
