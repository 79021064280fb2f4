pub mod closed_market;
pub mod market;
pub mod news_event;
pub mod news_link;
