pub mod kalshi;
pub mod traits;

pub use traits::EventSource;
