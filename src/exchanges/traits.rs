use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;
use crate::exchanges::kalshi::{EventsResponse, KalshiEvent, KalshiMarket};

/// Where the collector gets its snapshot of events from.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_events_page(
        &self,
        status: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<EventsResponse>;

    async fn fetch_market(&self, ticker: &str) -> Result<KalshiMarket>;

    /// Follows the cursor until the API stops returning one.
    async fn fetch_all_events(
        &self,
        status: &str,
        limit: u32,
        page_delay: Duration,
    ) -> Result<Vec<KalshiEvent>> {
        let first = self.fetch_events_page(status, None, limit).await?;
        let mut cursor = first.next_cursor().map(str::to_string);
        let mut events = first.events;

        while let Some(c) = cursor {
            debug!("Fetching page with cursor {}", c);
            if !page_delay.is_zero() {
                tokio::time::sleep(page_delay).await;
            }
            let page = self.fetch_events_page(status, Some(&c), limit).await?;
            let next = page.next_cursor().map(str::to_string);
            events.extend(page.events);
            if next.as_deref() == Some(c.as_str()) {
                warn!("API repeated cursor {}, stopping pagination", c);
                break;
            }
            cursor = next;
        }

        debug!("Fetched {} events", events.len());
        Ok(events)
    }
}
