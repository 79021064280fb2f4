use sea_orm::entity::prelude::*;

/// A market that was active at the last collection run.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "markets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub market_ticker: String,

    pub event_ticker: String,
    pub series_ticker: Option<String>,
    pub event_title: Option<String>,
    pub event_sub_title: Option<String>,
    pub market_title: Option<String>,
    pub market_subtitle: Option<String>,
    pub rules_primary: Option<String>,
    pub rules_secondary: Option<String>,
    pub status: String,
    pub category: Option<String>,
    pub open_time: Option<DateTimeUtc>,
    pub close_time: Option<DateTimeUtc>,
    pub expiration_time: Option<DateTimeUtc>,
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
    pub status_change_time: Option<DateTimeUtc>,
    pub raw: Option<String>,
    pub first_seen_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
