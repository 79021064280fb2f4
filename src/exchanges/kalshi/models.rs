use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum KalshiMarketStatus {
    Unopened,
    Open,
    Active,
    Paused,
    Closed,
    Determined,
    Settled,
    Finalized,
    Inactive,
    Other(String),
}

impl KalshiMarketStatus {
    pub fn as_str(&self) -> &str {
        match self {
            KalshiMarketStatus::Unopened => "unopened",
            KalshiMarketStatus::Open => "open",
            KalshiMarketStatus::Active => "active",
            KalshiMarketStatus::Paused => "paused",
            KalshiMarketStatus::Closed => "closed",
            KalshiMarketStatus::Determined => "determined",
            KalshiMarketStatus::Settled => "settled",
            KalshiMarketStatus::Finalized => "finalized",
            KalshiMarketStatus::Inactive => "inactive",
            KalshiMarketStatus::Other(s) => s,
        }
    }

    /// Statuses that end a market's life in the active table.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            KalshiMarketStatus::Finalized
                | KalshiMarketStatus::Inactive
                | KalshiMarketStatus::Closed
                | KalshiMarketStatus::Settled
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, KalshiMarketStatus::Active)
    }
}

impl From<String> for KalshiMarketStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "unopened" => KalshiMarketStatus::Unopened,
            "open" => KalshiMarketStatus::Open,
            "active" => KalshiMarketStatus::Active,
            "paused" => KalshiMarketStatus::Paused,
            "closed" => KalshiMarketStatus::Closed,
            "determined" => KalshiMarketStatus::Determined,
            "settled" => KalshiMarketStatus::Settled,
            "finalized" => KalshiMarketStatus::Finalized,
            "inactive" => KalshiMarketStatus::Inactive,
            _ => KalshiMarketStatus::Other(s),
        }
    }
}

impl From<&str> for KalshiMarketStatus {
    fn from(s: &str) -> Self {
        KalshiMarketStatus::from(s.to_string())
    }
}

impl From<KalshiMarketStatus> for String {
    fn from(status: KalshiMarketStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for KalshiMarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KalshiMarket {
    pub ticker: String,
    #[serde(default)]
    pub event_ticker: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    pub status: KalshiMarketStatus,
    #[serde(default)]
    pub rules_primary: Option<String>,
    #[serde(default)]
    pub rules_secondary: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub open_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub close_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub expiration_time: Option<DateTime<Utc>>,
    // Prices are in cents (1-99)
    #[serde(default)]
    pub yes_bid: Option<i64>,
    #[serde(default)]
    pub yes_ask: Option<i64>,
    #[serde(default)]
    pub no_bid: Option<i64>,
    #[serde(default)]
    pub no_ask: Option<i64>,
    #[serde(default)]
    pub last_price: Option<i64>,
    #[serde(default)]
    pub volume: Option<i64>,
    #[serde(default)]
    pub volume_24h: Option<i64>,
    #[serde(default)]
    pub open_interest: Option<i64>,
    #[serde(default)]
    pub liquidity: Option<i64>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KalshiEvent {
    pub event_ticker: String,
    #[serde(default)]
    pub series_ticker: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sub_title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub mutually_exclusive: Option<bool>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub strike_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub markets: Vec<KalshiMarket>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsResponse {
    #[serde(default)]
    pub events: Vec<KalshiEvent>,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl EventsResponse {
    /// Cursor for the next page, if there is one.
    pub fn next_cursor(&self) -> Option<&str> {
        self.cursor.as_deref().filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct MarketResponse {
    pub market: KalshiMarket,
}

// The API sends "" for some unset timestamps.
fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}

/// Helpers for Kalshi's `SERIES-EVENT-MARKET` ticker layout.
pub struct Ticker;

impl Ticker {
    /// `KXFEDDECISION-25MAY-H0` -> `KXFEDDECISION-25MAY`
    pub fn event_of(market_ticker: &str) -> Option<&str> {
        market_ticker.rsplit_once('-').map(|(event, _)| event)
    }

    /// `KXFEDDECISION-25MAY` -> `KXFEDDECISION`
    pub fn series_of(ticker: &str) -> Option<&str> {
        ticker.split_once('-').map(|(series, _)| series)
    }
}
