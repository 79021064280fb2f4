pub mod api;
pub mod auth;
pub mod models;

pub use api::KalshiApi;
pub use auth::KalshiAuth;
pub use models::*;
