use sea_orm::entity::prelude::*;

/// A closed market paired with a news event published shortly before it closed.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "market_news_links")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i32,

    pub market_ticker: String,
    pub news_id: String,
    pub score: i32,
    pub keywords: String,
    pub lead_minutes: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
