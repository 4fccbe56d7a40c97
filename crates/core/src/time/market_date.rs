use anyhow::Context;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc, Weekday};
use std::collections::HashSet;

// Nepal Standard Time, UTC+05:45.
const NPT_OFFSET_SECS: i32 = 5 * 3600 + 45 * 60;

pub fn npt() -> anyhow::Result<FixedOffset> {
    FixedOffset::east_opt(NPT_OFFSET_SECS).context("invalid NPT offset")
}

/// Calendar date at the exchange for `now_utc`; snapshots are keyed by this date.
pub fn market_today(now_utc: DateTime<Utc>) -> anyhow::Result<NaiveDate> {
    Ok(now_utc.with_timezone(&npt()?).date_naive())
}

/// An explicit `YYYY-MM-DD` wins; otherwise today's exchange date.
pub fn resolve_as_of_date(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid as-of date {s:?} (expected YYYY-MM-DD)"));
    }
    market_today(now_utc)
}

/// The exchange trades Sunday through Thursday, minus configured holidays.
pub fn is_trading_day(date: NaiveDate) -> bool {
    !is_weekend(date) && !configured_holidays().contains(&date)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Fri | Weekday::Sat)
}

fn configured_holidays() -> HashSet<NaiveDate> {
    // Holidays follow the lunar calendar, so there is no built-in list.
    // Configure via MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD".
    parse_holidays(std::env::var("MARKET_HOLIDAYS").ok().as_deref())
}

fn parse_holidays(v: Option<&str>) -> HashSet<NaiveDate> {
    let mut out = HashSet::new();
    let Some(s) = v else {
        return out;
    };
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match NaiveDate::parse_from_str(part, "%Y-%m-%d") {
            Ok(d) => {
                out.insert(d);
            }
            Err(_) => tracing::warn!(value = part, "ignoring invalid MARKET_HOLIDAYS entry"),
        }
    }
    out
}
