use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sharefolio_core::market::{MarketDataSource, ScrapingMarketSource};
use sharefolio_core::storage::StoreStatus;
use sharefolio_core::time::market_date::{is_trading_day, resolve_as_of_date};

mod eod;

#[derive(Debug, Parser)]
#[command(name = "sharefolio_worker")]
struct Args {
    /// Market as-of date (YYYY-MM-DD). Defaults to today's NPT date; other dates only with --dry-run.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Fetch and parse only; nothing is written to the store.
    #[arg(long)]
    dry_run: bool,

    /// Do not record the market summary in the turnover history.
    #[arg(long)]
    skip_turnover: bool,

    /// Run even when the as-of date is not a trading day.
    #[arg(long)]
    force: bool,
}

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

    let args = Args::parse();

    let now_utc = chrono::Utc::now();
    let as_of_date = resolve_as_of_date(args.as_of_date.as_deref(), now_utc)?;

    if !is_trading_day(as_of_date) && !args.force {
        tracing::info!(%as_of_date, "not a trading day; nothing to capture");
        return Ok(());
    }

    let source = ScrapingMarketSource::from_settings(&settings)?;

    if args.dry_run {
        let rows = source.fetch_price_table().await?;
        let summary = source.fetch_market_summary().await?;
        tracing::info!(
            %as_of_date,
            dry_run = true,
            prices_len = rows.len(),
            trading_date = summary.trading_date().unwrap_or("unknown"),
            "eod capture (dry-run)"
        );
        return Ok(());
    }

    // No degraded mode here: a missing store fails the run.
    let book = sharefolio_core::storage::connect(&settings).await?;
    let store = StoreStatus::Connected(std::sync::Arc::new(book));

    let opts = eod::EodOptions {
        skip_turnover: args.skip_turnover,
    };

    match eod::run_eod(&source, &store, as_of_date, now_utc, opts).await {
        Ok(report) if report.failed() => {
            let err = anyhow::anyhow!("eod capture incomplete: {report:?}");
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%as_of_date, ?report, "eod capture incomplete");
            Err(err)
        }
        Ok(report) => {
            tracing::info!(%as_of_date, ?report, "eod capture finished");
            Ok(())
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%as_of_date, error = %err, "eod capture failed");
            Err(err)
        }
    }
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
