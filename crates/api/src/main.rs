use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sharefolio_core::domain::contract::{AddHoldingRequest, AddTurnoverRequest, WatchlistRequest};
use sharefolio_core::domain::Record;
use sharefolio_core::market::{MarketDataSource, MarketPriceRow, MarketSummary, ScrapingMarketSource};
use sharefolio_core::portfolio::{compute_summary, SummaryRow};
use sharefolio_core::storage::snapshots::{record_turnover, save_daily_snapshot};
use sharefolio_core::storage::StoreStatus;
use sharefolio_core::time::market_date::market_today;
use sharefolio_core::Error;

const API_PREFIX: &str = "/api/v1/portfolio";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = sharefolio_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let market: Option<Arc<dyn MarketDataSource>> =
        match ScrapingMarketSource::from_settings(&settings) {
            Ok(source) => Some(Arc::new(source)),
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "market source not configured; price endpoints disabled");
                None
            }
        };

    let connected = sharefolio_core::storage::connect(&settings).await;
    if let Err(e) = &connected {
        sentry_anyhow::capture_anyhow(e);
        tracing::error!(error = %e, "could not connect to store; starting API in degraded mode");
    }
    let store = StoreStatus::from(connected);
    tracing::info!(store_connected = store.is_connected(), "store initialized");

    let app = router(AppState { market, store });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    let p = |path: &str| format!("{API_PREFIX}{path}");

    Router::new()
        .route("/health", get(health))
        .route(API_PREFIX, get(get_portfolio))
        .route(&p("/"), get(get_portfolio))
        .route(&p("/add"), post(add_stock))
        .route(&p("/prices"), get(get_share_prices))
        .route(&p("/market-summary"), get(get_market_summary))
        .route(&p("/summary"), get(get_portfolio_summary))
        .route(&p("/turnover"), get(get_turnover).post(add_turnover))
        .route(&p("/watchlist"), get(get_watchlist).post(add_to_watchlist))
        .route(&p("/watchlist/:symbol"), delete(remove_from_watchlist))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Clone)]
struct AppState {
    market: Option<Arc<dyn MarketDataSource>>,
    store: StoreStatus,
}

impl AppState {
    fn market(&self) -> Result<&dyn MarketDataSource, ApiError> {
        self.market
            .as_deref()
            .ok_or_else(|| Error::Retrieval("market source not configured (SCRAPE_API)".to_string()).into())
    }
}

/// Maps the core taxonomy onto HTTP; the body is always `{"error": "..."}`.
#[derive(Debug)]
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Retrieval(_) | Error::Parse(_) => StatusCode::BAD_GATEWAY,
            Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if matches!(self.0, Error::Store(_)) {
            sentry::capture_error(&self.0);
            tracing::error!(error = %self.0, "store request failed");
        } else if self.0.is_upstream() {
            tracing::warn!(error = %self.0, "market source request failed");
        } else {
            tracing::debug!(%status, error = %self.0, "request rejected");
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

fn invalid_json(rejection: JsonRejection) -> ApiError {
    tracing::debug!(error = %rejection, "invalid JSON payload");
    Error::Validation("Invalid JSON payload.".to_string()).into()
}

fn success(message: String) -> Json<Value> {
    Json(json!({ "status": "success", "message": message }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Live price table. Also files today's snapshot; that never affects the response.
async fn get_share_prices(
    State(state): State<AppState>,
) -> Result<Json<Vec<MarketPriceRow>>, ApiError> {
    let rows = state.market()?.fetch_price_table().await?;
    if rows.is_empty() {
        return Err(Error::NotFound("No data found on the page.".to_string()).into());
    }

    match market_today(chrono::Utc::now()) {
        Ok(today) => {
            save_daily_snapshot(&state.store, &rows, today).await;
        }
        Err(e) => tracing::error!(error = %e, "could not resolve market date; snapshot skipped"),
    }

    Ok(Json(rows))
}

async fn get_market_summary(
    State(state): State<AppState>,
) -> Result<Json<MarketSummary>, ApiError> {
    let summary = state.market()?.fetch_market_summary().await?;
    record_turnover(&state.store, &summary).await;
    Ok(Json(summary))
}

async fn get_portfolio(State(state): State<AppState>) -> Result<Json<Vec<Record>>, ApiError> {
    let records = state.store.workbook()?.holdings_records().await?;
    Ok(Json(records))
}

async fn add_stock(
    State(state): State<AppState>,
    payload: Result<Json<AddHoldingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let book = state.store.workbook()?;
    let Json(req) = payload.map_err(invalid_json)?;
    let holding = req.validate_and_into_holding()?;

    book.add_holding(holding).await?;
    Ok((StatusCode::CREATED, success("Stock purchase added.".to_string())))
}

async fn get_portfolio_summary(
    State(state): State<AppState>,
) -> Result<Json<Vec<SummaryRow>>, ApiError> {
    let holdings = state.store.workbook()?.holdings().await?;
    let prices = state.market()?.fetch_price_table().await?;

    let rows = compute_summary(&holdings, &prices);
    tracing::debug!(holdings = holdings.len(), prices = prices.len(), rows = rows.len(), "portfolio summary");
    Ok(Json(rows))
}

async fn get_turnover(State(state): State<AppState>) -> Result<Json<Vec<Record>>, ApiError> {
    let records = state.store.workbook()?.turnover_records().await?;
    Ok(Json(records))
}

async fn add_turnover(
    State(state): State<AppState>,
    payload: Result<Json<AddTurnoverRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let book = state.store.workbook()?;
    let Json(req) = payload.map_err(invalid_json)?;
    let row = req.validate_and_into_row()?;
    let date = row.date.clone();

    book.add_turnover(row).await?;
    Ok((StatusCode::CREATED, success(format!("Turnover for {date} added."))))
}

async fn get_watchlist(State(state): State<AppState>) -> Result<Json<Vec<Record>>, ApiError> {
    let records = state.store.workbook()?.watchlist_records().await?;
    Ok(Json(records))
}

async fn add_to_watchlist(
    State(state): State<AppState>,
    payload: Result<Json<WatchlistRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let book = state.store.workbook()?;
    let Json(req) = payload.map_err(invalid_json)?;
    let symbol = req.validate_and_into_symbol()?;

    book.add_to_watchlist(&symbol).await?;
    Ok((StatusCode::CREATED, success(format!("{symbol} added to watchlist."))))
}

async fn remove_from_watchlist(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.store.workbook()?.remove_from_watchlist(&symbol).await?;
    Ok(success(format!("{symbol} removed from watchlist.")))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &sharefolio_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharefolio_core::storage::Workbook;

    struct FixedMarket {
        rows: Vec<MarketPriceRow>,
    }

    #[async_trait::async_trait]
    impl MarketDataSource for FixedMarket {
        fn source_name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch_price_table(&self) -> sharefolio_core::Result<Vec<MarketPriceRow>> {
            Ok(self.rows.clone())
        }

        async fn fetch_market_summary(&self) -> sharefolio_core::Result<MarketSummary> {
            Err(Error::Parse("no summary in fixture".to_string()))
        }
    }

    fn state_with(rows: Vec<MarketPriceRow>) -> AppState {
        AppState {
            market: Some(Arc::new(FixedMarket { rows })),
            store: StoreStatus::Connected(Arc::new(Workbook::in_memory())),
        }
    }

    fn status_of(err: Error) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn maps_error_taxonomy_to_status() {
        assert_eq!(status_of(Error::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(Error::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(Error::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(Error::Retrieval("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status_of(Error::Parse("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status_of(Error::StoreUnavailable("x".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(Error::Store(anyhow::anyhow!("x"))), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn summary_joins_added_holdings_with_prices() {
        let prices: MarketPriceRow = [
            ("Symbol", "ABC"),
            ("LTP", "150.00"),
            ("52 Weeks High", "200"),
            ("52 Weeks Low", "90"),
        ]
        .into_iter()
        .collect();
        let state = state_with(vec![prices]);

        let req = AddHoldingRequest {
            symbol: Some("ABC".to_string()),
            quantity: Some(json!(10)),
            price: Some(json!(100)),
            date: Some("2025-06-01".to_string()),
            sector: Some("Bank".to_string()),
        };
        let res = add_stock(State(state.clone()), Ok(Json(req))).await;
        assert!(matches!(res, Ok((StatusCode::CREATED, _))));

        let Json(rows) = get_portfolio_summary(State(state)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].purchase_value, 1000.0);
        assert_eq!(rows[0].current_value, 1500.0);
        assert_eq!(rows[0].profit_percentage, "50%");
        assert_eq!(rows[0].weight_percent, "100%");
    }

    #[tokio::test]
    async fn prices_endpoint_saves_snapshot_once() {
        let row: MarketPriceRow = [("Symbol", "ABC"), ("LTP", "10")].into_iter().collect();
        let state = state_with(vec![row]);

        for _ in 0..2 {
            let Json(rows) = get_share_prices(State(state.clone())).await.unwrap();
            assert_eq!(rows.len(), 1);
        }

        let book = state.store.workbook().unwrap();
        assert_eq!(book.snapshot_records().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn prices_still_served_without_store() {
        let row: MarketPriceRow = [("Symbol", "ABC"), ("LTP", "10")].into_iter().collect();
        let state = AppState {
            market: Some(Arc::new(FixedMarket { rows: vec![row] })),
            store: StoreStatus::Unavailable("GOOGLE_CREDENTIAL environment variable not set".to_string()),
        };

        assert!(get_share_prices(State(state.clone())).await.is_ok());

        let err = get_portfolio(State(state)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn empty_price_table_is_not_found() {
        let state = state_with(Vec::new());
        let err = get_share_prices(State(state)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn watchlist_duplicate_is_conflict() {
        let state = state_with(Vec::new());
        let req = || WatchlistRequest { symbol: Some("NABIL".to_string()) };

        assert!(add_to_watchlist(State(state.clone()), Ok(Json(req()))).await.is_ok());
        let err = add_to_watchlist(State(state.clone()), Ok(Json(req()))).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);

        let Json(records) = get_watchlist(State(state.clone())).await.unwrap();
        assert_eq!(records.len(), 1);

        assert!(remove_from_watchlist(State(state.clone()), Path("NABIL".to_string())).await.is_ok());
        let err = remove_from_watchlist(State(state), Path("NABIL".to_string())).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
