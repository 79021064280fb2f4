//! One flat row per market, joined with the fields of its parent event.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::exchanges::kalshi::{KalshiEvent, KalshiMarket, KalshiMarketStatus, Ticker};

const DROPPED_FIELD_PREFIX: &str = "custom_strike";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketRecord {
    pub market_ticker: String,
    pub event_ticker: String,
    pub series_ticker: Option<String>,
    pub event_title: Option<String>,
    pub event_sub_title: Option<String>,
    pub market_title: Option<String>,
    pub market_subtitle: Option<String>,
    pub rules_primary: Option<String>,
    pub rules_secondary: Option<String>,
    pub status: KalshiMarketStatus,
    pub category: Option<String>,
    pub open_time: Option<DateTime<Utc>>,
    pub close_time: Option<DateTime<Utc>>,
    pub expiration_time: Option<DateTime<Utc>>,
    pub yes_bid: Option<i64>,
    pub yes_ask: Option<i64>,
    pub no_bid: Option<i64>,
    pub no_ask: Option<i64>,
    pub last_price: Option<i64>,
    pub volume: Option<i64>,
    pub volume_24h: Option<i64>,
    pub open_interest: Option<i64>,
    pub liquidity: Option<i64>,
    pub result: Option<String>,
    /// Set when the market leaves the active state.
    pub status_change_time: Option<DateTime<Utc>>,
    pub raw: Value,
}

impl MarketRecord {
    pub fn from_event_market(event: &KalshiEvent, market: &KalshiMarket) -> Self {
        let event_ticker = market
            .event_ticker
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| Some(event.event_ticker.clone()).filter(|t| !t.is_empty()))
            .or_else(|| Ticker::event_of(&market.ticker).map(str::to_string))
            .unwrap_or_default();

        let series_ticker = event
            .series_ticker
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| Ticker::series_of(&event_ticker).map(str::to_string));

        let mut record = Self {
            market_ticker: market.ticker.clone(),
            event_ticker,
            series_ticker,
            event_title: event.title.clone(),
            event_sub_title: event.sub_title.clone(),
            market_title: None,
            market_subtitle: None,
            rules_primary: None,
            rules_secondary: None,
            status: market.status.clone(),
            category: event.category.clone(),
            open_time: None,
            close_time: None,
            expiration_time: None,
            yes_bid: None,
            yes_ask: None,
            no_bid: None,
            no_ask: None,
            last_price: None,
            volume: None,
            volume_24h: None,
            open_interest: None,
            liquidity: None,
            result: None,
            status_change_time: None,
            raw: Value::Null,
        };
        record.apply_market(market);
        record
    }

    /// Refreshes the market-level columns from a newer copy of the market,
    /// keeping the event-level columns.
    pub fn apply_market(&mut self, market: &KalshiMarket) {
        self.market_title = market.title.clone();
        self.market_subtitle = market.subtitle.clone();
        self.rules_primary = market.rules_primary.clone();
        self.rules_secondary = market.rules_secondary.clone();
        self.status = market.status.clone();
        self.open_time = market.open_time;
        self.close_time = market.close_time;
        self.expiration_time = market.expiration_time;
        self.yes_bid = market.yes_bid;
        self.yes_ask = market.yes_ask;
        self.no_bid = market.no_bid;
        self.no_ask = market.no_ask;
        self.last_price = market.last_price;
        self.volume = market.volume;
        self.volume_24h = market.volume_24h;
        self.open_interest = market.open_interest;
        self.liquidity = market.liquidity;
        self.result = market.result.clone().filter(|r| !r.is_empty());
        self.raw = raw_market_json(market);
    }

    /// Text used for keyword matching against news.
    pub fn searchable_text(&self) -> String {
        [
            self.event_title.as_deref(),
            self.event_sub_title.as_deref(),
            self.market_title.as_deref(),
            self.market_subtitle.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Every nested market of every event, in API order.
pub fn flatten(events: &[KalshiEvent]) -> Vec<MarketRecord> {
    events
        .iter()
        .flat_map(|event| {
            event
                .markets
                .iter()
                .map(move |market| MarketRecord::from_event_market(event, market))
        })
        .collect()
}

fn raw_market_json(market: &KalshiMarket) -> Value {
    let mut value = serde_json::to_value(market).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.retain(|key, _| !key.starts_with(DROPPED_FIELD_PREFIX));
    }
    value
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn event(ticker: &str, markets: Vec<Value>) -> KalshiEvent {
        serde_json::from_value(json!({
            "event_ticker": ticker,
            "series_ticker": Ticker::series_of(ticker),
            "title": format!("{} title", ticker),
            "sub_title": "sub",
            "category": "Economics",
            "markets": markets,
        }))
        .unwrap()
    }

    pub(crate) fn market(ticker: &str, status: &str) -> Value {
        json!({
            "ticker": ticker,
            "event_ticker": Ticker::event_of(ticker),
            "title": format!("{} market", ticker),
            "status": status,
            "rules_primary": "Resolves Yes if ...",
            "yes_bid": 40,
            "yes_ask": 42,
            "custom_strike": {"Fed": "No change"},
            "custom_strike_extra": 1,
            "tick_size": 1
        })
    }

    pub(crate) fn record(ticker: &str, status: &str) -> MarketRecord {
        let event_ticker = Ticker::event_of(ticker).unwrap_or(ticker);
        flatten(&[event(event_ticker, vec![market(ticker, status)])]).remove(0)
    }

    #[test]
    fn flatten_joins_event_fields_onto_each_market() {
        let events = vec![
            event(
                "KXFEDDECISION-25MAY",
                vec![
                    market("KXFEDDECISION-25MAY-H0", "active"),
                    market("KXFEDDECISION-25MAY-H25", "active"),
                ],
            ),
            event("KXEMPTY-25", vec![]),
            event("KXCPI-25JUN", vec![market("KXCPI-25JUN-T3.0", "closed")]),
        ];

        let records = flatten(&events);
        let tickers: Vec<_> = records.iter().map(|r| r.market_ticker.as_str()).collect();
        assert_eq!(
            tickers,
            ["KXFEDDECISION-25MAY-H0", "KXFEDDECISION-25MAY-H25", "KXCPI-25JUN-T3.0"]
        );

        let first = &records[0];
        assert_eq!(first.event_ticker, "KXFEDDECISION-25MAY");
        assert_eq!(first.series_ticker.as_deref(), Some("KXFEDDECISION"));
        assert_eq!(first.event_title.as_deref(), Some("KXFEDDECISION-25MAY title"));
        assert_eq!(first.rules_primary.as_deref(), Some("Resolves Yes if ..."));
        assert_eq!(first.yes_ask, Some(42));
        assert!(first.status_change_time.is_none());
        assert!(records[2].status.is_closed());
    }

    #[test]
    fn custom_strike_fields_are_dropped_from_raw() {
        let r = record("KXFEDDECISION-25MAY-H0", "active");
        let raw = r.raw.as_object().unwrap();
        assert!(!raw.keys().any(|k| k.starts_with("custom_strike")));
        assert_eq!(raw.get("tick_size"), Some(&json!(1)));
        assert_eq!(raw.get("ticker"), Some(&json!("KXFEDDECISION-25MAY-H0")));
    }

    #[test]
    fn missing_parent_tickers_are_derived() {
        let ev: KalshiEvent = serde_json::from_value(json!({
            "event_ticker": "KXCPI-25JUN",
            "markets": [{"ticker": "KXCPI-25JUN-T3.0", "status": "active"}]
        }))
        .unwrap();
        let r = &flatten(&[ev])[0];
        assert_eq!(r.event_ticker, "KXCPI-25JUN");
        assert_eq!(r.series_ticker.as_deref(), Some("KXCPI"));
    }

    #[test]
    fn blank_event_ticker_falls_back_to_the_market_ticker() {
        let ev: KalshiEvent = serde_json::from_value(json!({
            "event_ticker": "",
            "markets": [{"ticker": "KXFEDDECISION-25MAY-H0", "status": "active"}]
        }))
        .unwrap();
        let r = &flatten(&[ev])[0];
        assert_eq!(r.event_ticker, "KXFEDDECISION-25MAY");
        assert_eq!(r.series_ticker.as_deref(), Some("KXFEDDECISION"));
    }

    #[test]
    fn apply_market_keeps_event_columns() {
        let mut r = record("KXFEDDECISION-25MAY-H0", "active");
        let newer: KalshiMarket = serde_json::from_value(json!({
            "ticker": "KXFEDDECISION-25MAY-H0",
            "status": "settled",
            "result": "yes",
            "last_price": 99
        }))
        .unwrap();
        r.apply_market(&newer);
        assert!(r.status.is_closed());
        assert_eq!(r.result.as_deref(), Some("yes"));
        assert_eq!(r.last_price, Some(99));
        assert_eq!(r.event_title.as_deref(), Some("KXFEDDECISION-25MAY title"));
    }

    #[test]
    fn searchable_text_joins_titles() {
        let r = record("KXFEDDECISION-25MAY-H0", "active");
        assert_eq!(
            r.searchable_text(),
            "KXFEDDECISION-25MAY title sub KXFEDDECISION-25MAY-H0 market"
        );
    }
}
