use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::collector::Collector;
use crate::config::Config;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::exchanges::kalshi::KalshiApi;
use crate::news::{correlate, load_news_file, NewsLink};

const HEAD_ROWS: usize = 5;

/// Longest accepted `--watch` interval.
pub const MAX_WATCH_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy)]
pub struct CorrelateOptions {
    /// How far before a market's status change news may be published.
    pub window: chrono::Duration,
    pub min_overlap: usize,
    /// How far back to look for closed markets.
    pub lookback: chrono::Duration,
}

impl Default for CorrelateOptions {
    fn default() -> Self {
        Self {
            window: chrono::Duration::hours(48),
            min_overlap: 2,
            lookback: chrono::Duration::days(30),
        }
    }
}

impl CorrelateOptions {
    /// Builds options from command-line hours and days.
    pub fn from_args(window_hours: i64, min_overlap: usize, days: i64) -> Result<Self> {
        if window_hours <= 0 {
            return Err(Error::Config("--window-hours must be positive".into()));
        }
        if days <= 0 {
            return Err(Error::Config("--days must be positive".into()));
        }
        let window = chrono::Duration::try_hours(window_hours)
            .ok_or_else(|| Error::Config(format!("--window-hours {} is out of range", window_hours)))?;
        let lookback = chrono::Duration::try_days(days)
            .ok_or_else(|| Error::Config(format!("--days {} is out of range", days)))?;
        Ok(Self {
            window,
            min_overlap,
            lookback,
        })
    }

    /// Start of the closed-market range and start of the news range.
    fn range_start(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let markets_from = now
            .checked_sub_signed(self.lookback)
            .ok_or_else(|| Error::Config("correlation lookback reaches past the calendar".into()))?;
        let news_from = markets_from
            .checked_sub_signed(self.window)
            .ok_or_else(|| Error::Config("correlation window reaches past the calendar".into()))?;
        Ok((markets_from, news_from))
    }
}

/// Checks a `--watch` interval before it reaches the timer.
pub fn watch_interval(watch: Option<Duration>) -> Result<Option<Duration>> {
    match watch {
        Some(every) if every.is_zero() => {
            Err(Error::Config("--watch interval must be positive".into()))
        }
        Some(every) if every > MAX_WATCH_INTERVAL => Err(Error::Config(format!(
            "--watch interval must be at most {} seconds",
            MAX_WATCH_INTERVAL.as_secs()
        ))),
        other => Ok(other),
    }
}

/// Runs one collection, or keeps collecting every `watch` if given.
pub async fn collect(config: Config, watch: Option<Duration>) -> Result<()> {
    let watch = watch_interval(watch)?;

    info!("Kalshi collector started");
    info!("================================");

    let api = KalshiApi::new(&config.kalshi)?;
    if api.is_authenticated() {
        info!("Signing requests with API key");
    }
    let db = Db::new(&config.database_url).await?;
    let collector = Collector::new(api, db, config.collector.clone());

    match watch {
        Some(every) => collector.watch(every).await,
        None => {
            let summary = collector.run_once().await?;
            for record in summary.records.iter().take(HEAD_ROWS) {
                info!(
                    "{} | {} | {} | {}",
                    record.market_ticker,
                    record.event_title.as_deref().unwrap_or("-"),
                    record.market_title.as_deref().unwrap_or("-"),
                    record.status
                );
            }
            Ok(())
        }
    }
}

pub async fn import_news(config: Config, path: &Path) -> Result<()> {
    let events = load_news_file(path).await?;
    info!("Read {} news events from {}", events.len(), path.display());

    let db = Db::new(&config.database_url).await?;
    db.insert_news_events(&events).await?;
    Ok(())
}

pub async fn correlate_news(config: Config, options: CorrelateOptions) -> Result<()> {
    let now = Utc::now();
    options.range_start(now)?;

    let db = Db::new(&config.database_url).await?;
    let stored = correlate_stored(&db, options, now).await?;

    for link in stored.iter().take(HEAD_ROWS * 4) {
        info!(
            "{} <- {} (score {}, {}m before close: {})",
            link.market_ticker,
            link.news_id,
            link.score,
            link.lead.num_minutes(),
            link.keywords.join(", ")
        );
    }
    info!("Stored {} market/news links", stored.len());
    Ok(())
}

/// Correlates markets closed in the lookback range with stored news,
/// replaces their links and returns the links as stored.
pub async fn correlate_stored(
    db: &Db,
    options: CorrelateOptions,
    now: DateTime<Utc>,
) -> Result<Vec<NewsLink>> {
    let (markets_from, news_from) = options.range_start(now)?;
    let markets = db.closed_markets_between(markets_from, now).await?;
    let news = db.news_events_between(news_from, now).await?;
    info!(
        "Correlating {} closed markets with {} news events",
        markets.len(),
        news.len()
    );

    let links = correlate(&markets, &news, options.window, options.min_overlap);

    let mut tickers: Vec<String> = markets.iter().map(|m| m.market_ticker.clone()).collect();
    tickers.sort();
    tickers.dedup();
    db.replace_links(&tickers, &links).await?;

    let mut stored = Vec::new();
    for ticker in &tickers {
        stored.extend(db.links_for_market(ticker).await?);
    }
    Ok(stored)
}
