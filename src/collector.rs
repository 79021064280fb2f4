//! Snapshot → diff → persist cycle for the active market table.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::CollectorConfig;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::exchanges::kalshi::KalshiMarketStatus;
use crate::exchanges::EventSource;
use crate::record::{flatten, MarketRecord};

const ACTIVE: &str = "active";

/// What a snapshot changes in the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Active markets not stored yet.
    pub opened: Vec<MarketRecord>,
    /// Stored active markets the snapshot reports as closed, stamped with
    /// their status change time.
    pub closed: Vec<MarketRecord>,
    /// Stored active markets absent from the snapshot.
    pub missing: Vec<String>,
}

pub fn reconcile(
    records: &[MarketRecord],
    stored: &HashMap<String, String>,
    now: DateTime<Utc>,
) -> Reconciliation {
    let mut plan = Reconciliation::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for record in records {
        if !seen.insert(record.market_ticker.as_str()) {
            continue;
        }
        match stored.get(&record.market_ticker) {
            None if record.status.is_active() => plan.opened.push(record.clone()),
            Some(old) if old == ACTIVE && record.status.is_closed() => {
                let mut closed = record.clone();
                closed.status_change_time = Some(now);
                plan.closed.push(closed);
            }
            _ => {}
        }
    }

    let mut missing: Vec<String> = stored
        .iter()
        .filter(|(ticker, status)| *status == ACTIVE && !seen.contains(ticker.as_str()))
        .map(|(ticker, _)| ticker.clone())
        .collect();
    missing.sort();
    plan.missing = missing;

    plan
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub date: NaiveDate,
    pub active: u64,
    pub opened: usize,
    pub closed: usize,
    /// The flattened snapshot, with change times filled in for closed markets.
    pub records: Vec<MarketRecord>,
}

impl RunSummary {
    pub fn log(&self) {
        info!("Summary for {}:", self.date.format("%Y-%m-%d"));
        info!("   {}: number of active markets", self.active);
        info!("   {}: number of markets closed since last run", self.closed);
        info!("   {}: number of markets opened since last run", self.opened);
    }
}

pub struct Collector<S> {
    source: S,
    db: Db,
    config: CollectorConfig,
}

impl<S: EventSource> Collector<S> {
    pub fn new(source: S, db: Db, config: CollectorConfig) -> Self {
        Self { source, db, config }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        let events = self
            .source
            .fetch_all_events(&self.config.status, self.config.page_limit, self.config.page_delay)
            .await?;
        let mut records = flatten(&events);
        debug!("Snapshot holds {} markets across {} events", records.len(), events.len());

        let stored = self.db.market_status_map().await?;
        let now = Utc::now();
        let plan = reconcile(&records, &stored, now);

        let opened = plan.opened.len();
        if opened > 0 {
            self.db.insert_markets(&plan.opened, now).await?;
            info!("Inserted {} new active records.", opened);
        }

        let mut closed = 0;
        for record in &plan.closed {
            self.db.archive_market(record, now).await?;
            closed += 1;
        }

        let closed_tickers: HashSet<&str> =
            plan.closed.iter().map(|r| r.market_ticker.as_str()).collect();
        for record in records.iter_mut() {
            if closed_tickers.contains(record.market_ticker.as_str()) {
                record.status_change_time = Some(now);
            }
        }

        if self.config.resolve_missing && !plan.missing.is_empty() {
            debug!("Resolving {} markets missing from the snapshot", plan.missing.len());
            for ticker in &plan.missing {
                match self.resolve_missing(ticker, now).await {
                    Ok(true) => closed += 1,
                    Ok(false) => {}
                    Err(e) => warn!("Could not resolve market '{}': {}", ticker, e),
                }
            }
        }

        let summary = RunSummary {
            date: now.date_naive(),
            active: self.db.count_active().await?,
            opened,
            closed,
            records,
        };
        summary.log();
        Ok(summary)
    }

    /// Archives a stored active market that dropped out of the snapshot if
    /// the API says it closed. Returns whether it was archived.
    async fn resolve_missing(&self, ticker: &str, now: DateTime<Utc>) -> Result<bool> {
        let Some(mut record) = self.db.find_market(ticker).await? else {
            return Ok(false);
        };

        match self.source.fetch_market(ticker).await {
            Ok(market) => {
                record.apply_market(&market);
                if !record.status.is_closed() {
                    debug!("Market '{}' is {} but outside the snapshot", ticker, record.status);
                    return Ok(false);
                }
            }
            Err(Error::MarketNotFound(_)) => {
                warn!("Market '{}' is no longer listed, archiving as inactive", ticker);
                record.status = KalshiMarketStatus::Inactive;
            }
            Err(e) => return Err(e),
        }

        record.status_change_time = Some(now);
        self.db.archive_market(&record, now).await?;
        Ok(true)
    }

    /// Repeats `run_once` every `every` until Ctrl-C. Failed runs are logged.
    pub async fn watch(&self, every: Duration) -> Result<()> {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!("Collecting every {:?}", every);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!("Collection run failed: {}", e);
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutting down collector");
                    break;
                }
            }
        }
        Ok(())
    }
}
