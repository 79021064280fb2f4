pub mod app;
pub mod collector;
pub mod config;
pub mod db;
pub mod error;
pub mod exchanges;
pub mod logging;
pub mod news;
pub mod record;

pub use config::Config;
pub use error::{Error, Result};
