use sea_orm::entity::prelude::*;

/// History row written when a market leaves the active table.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "closed_markets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i32,

    pub market_ticker: String,
    pub event_ticker: String,
    pub series_ticker: Option<String>,
    pub event_title: Option<String>,
    pub event_sub_title: Option<String>,
    pub market_title: Option<String>,
    pub market_subtitle: Option<String>,
    pub rules_primary: Option<String>,
    pub rules_secondary: Option<String>,
    pub final_status: String,
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
    pub raw: Option<String>,
    pub first_seen_at: Option<DateTimeUtc>,
    pub status_change_time: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
