//! Kalshi trade API (REST)

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use super::auth::KalshiAuth;
use super::models::*;
use crate::config::KalshiConfig;
use crate::error::{Error, Result};
use crate::exchanges::traits::EventSource;

const BACKOFF_BASE: Duration = Duration::from_millis(250);
const MAX_BODY_CHARS: usize = 800;

pub struct KalshiApi {
    http: HttpClient,
    base_url: Url,
    auth: Option<Arc<KalshiAuth>>,
    max_retries: u32,
}

impl KalshiApi {
    pub fn new(config: &KalshiConfig) -> Result<Self> {
        let auth = config
            .credentials
            .as_ref()
            .map(KalshiAuth::from_credentials)
            .transpose()?
            .map(Arc::new);

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            auth,
            max_retries: config.max_retries,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        endpoint_url(&self.base_url, path)
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &Url, query: &[(&str, String)]) -> Result<T> {
        let mut req = self
            .http
            .get(url.clone())
            .header("accept", "application/json")
            .query(query);

        if let Some(auth) = &self.auth {
            for (name, value) in auth.generate_headers("GET", url.path()).to_header_tuples() {
                req = req.header(name, value);
            }
        }

        let resp = req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                body: summarize_body(&body),
            });
        }

        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Decode(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.endpoint(path)?;
        retry(self.max_retries, url.path(), || self.get_once(&url, query)).await
    }

    pub async fn fetch_events(
        &self,
        status: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<EventsResponse> {
        let query = events_query(status, cursor, limit);
        let data: EventsResponse = self.get_json("/events", &query).await?;
        debug!(
            "Fetched {} events (cursor: {})",
            data.events.len(),
            data.next_cursor().unwrap_or("none")
        );
        Ok(data)
    }

    pub async fn fetch_market_by_ticker(&self, ticker: &str) -> Result<KalshiMarket> {
        let path = format!("/markets/{}", ticker);
        match self.get_json::<MarketResponse>(&path, &[]).await {
            Ok(data) => Ok(data.market),
            Err(Error::Api { status: 404, .. }) => Err(Error::MarketNotFound(ticker.to_string())),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl EventSource for KalshiApi {
    async fn fetch_events_page(
        &self,
        status: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<EventsResponse> {
        self.fetch_events(status, cursor, limit).await
    }

    async fn fetch_market(&self, ticker: &str) -> Result<KalshiMarket> {
        self.fetch_market_by_ticker(ticker).await
    }
}

fn endpoint_url(base: &Url, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(Url::parse(&joined)?)
}

fn events_query(status: &str, cursor: Option<&str>, limit: u32) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("limit", limit.to_string()),
        ("status", status.to_string()),
        ("with_nested_markets", "true".to_string()),
    ];
    if let Some(c) = cursor {
        query.push(("cursor", c.to_string()));
    }
    query
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or has
/// been retried `max_retries` times.
async fn retry<T, F, Fut>(max_retries: u32, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = backoff_delay(attempt);
                warn!(
                    "GET {} failed ({}), retrying in {:?} ({}/{})",
                    label,
                    e,
                    delay,
                    attempt + 1,
                    max_retries
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    BACKOFF_BASE * 2u32.saturating_pow(attempt.min(6))
}

fn summarize_body(raw: &str) -> String {
    let compact = raw.replace(['\n', '\r'], " ");
    if compact.chars().count() > MAX_BODY_CHARS {
        let truncated: String = compact.chars().take(MAX_BODY_CHARS).collect();
        format!("{}…", truncated)
    } else {
        compact
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const EVENTS_BODY: &str = r#"{"cursor":"","events":[{"event_ticker":"KXFEDDECISION-25MAY","markets":[{"ticker":"KXFEDDECISION-25MAY-H0","status":"active"}]}]}"#;

    /// Answers one connection per canned response, in order, and records
    /// each request line.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (Url, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&buf);
                let line = request.lines().next().unwrap_or_default().to_string();
                seen.lock().unwrap().push(line);

                let reply = format!(
                    "HTTP/1.1 {} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        let base = Url::parse(&format!("http://{}/trade-api/v2", addr)).unwrap();
        (base, requests)
    }

    fn loopback_client(base_url: Url, max_retries: u32) -> KalshiApi {
        KalshiApi {
            http: HttpClient::builder().no_proxy().build().unwrap(),
            base_url,
            auth: None,
            max_retries,
        }
    }

    #[test]
    fn endpoints_keep_the_api_prefix() {
        let base = Url::parse("https://api.elections.kalshi.com/trade-api/v2").unwrap();
        let url = endpoint_url(&base, "/events").unwrap();
        assert_eq!(url.as_str(), "https://api.elections.kalshi.com/trade-api/v2/events");
        assert_eq!(url.path(), "/trade-api/v2/events");

        let url = endpoint_url(&base, "markets/KXFEDDECISION-25MAY-H0").unwrap();
        assert_eq!(url.path(), "/trade-api/v2/markets/KXFEDDECISION-25MAY-H0");
    }

    #[test]
    fn events_query_requests_nested_markets() {
        let query = events_query("open", None, 200);
        assert!(query.contains(&("with_nested_markets", "true".to_string())));
        assert!(query.contains(&("limit", "200".to_string())));
        assert!(query.contains(&("status", "open".to_string())));
        assert!(!query.iter().any(|(k, _)| *k == "cursor"));

        let query = events_query("open", Some("CgsI"), 50);
        assert!(query.contains(&("cursor", "CgsI".to_string())));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_millis(250));
        assert_eq!(backoff_delay(1), Duration::from_millis(500));
        assert_eq!(backoff_delay(3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(40), backoff_delay(6));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        let summary = summarize_body(&body);
        assert_eq!(summary.chars().count(), MAX_BODY_CHARS + 1);
        assert_eq!(summarize_body("a\nb"), "a b");
    }

    #[test]
    fn client_without_credentials_is_unsigned() {
        let config = KalshiConfig {
            base_url: Url::parse(crate::config::DEFAULT_API_BASE_URL).unwrap(),
            credentials: None,
            max_retries: 0,
        };
        let api = KalshiApi::new(&config).unwrap();
        assert!(!api.is_authenticated());
    }

    #[tokio::test]
    async fn events_request_retries_server_errors() {
        let (base, requests) = serve(vec![(503, "busy"), (200, EVENTS_BODY)]).await;
        let api = loopback_client(base, 2);

        let page = api.fetch_events("open", None, 200).await.unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.next_cursor(), None);

        let requests = requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].starts_with("GET /trade-api/v2/events?"));
        assert!(requests[1].contains("with_nested_markets=true"));
        assert!(requests[1].contains("status=open"));
    }

    #[tokio::test]
    async fn client_errors_are_returned_without_retry() {
        let (base, requests) = serve(vec![(400, r#"{"error":"bad limit"}"#)]).await;
        let api = loopback_client(base, 3);

        let err = api.fetch_events("open", None, 500).await.unwrap_err();
        assert!(matches!(&err, Error::Api { status: 400, body } if body.contains("bad limit")));
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rate_limits_give_up_after_max_retries() {
        let (base, requests) = serve(vec![(429, ""), (429, ""), (429, "")]).await;
        let api = loopback_client(base, 1);

        let err = api.fetch_events("open", Some("p2"), 200).await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 429, .. }));

        let requests = requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].contains("cursor=p2"));
    }

    #[tokio::test]
    async fn unknown_market_is_not_found() {
        let (base, requests) = serve(vec![(404, r#"{"error":"not found"}"#)]).await;
        let api = loopback_client(base, 3);

        let err = api.fetch_market_by_ticker("KXCPI-25JUN-T3.0").await.unwrap_err();
        assert!(matches!(&err, Error::MarketNotFound(t) if t == "KXCPI-25JUN-T3.0"));
        assert!(requests.lock().unwrap()[0].starts_with("GET /trade-api/v2/markets/KXCPI-25JUN-T3.0 "));
    }

    #[tokio::test]
    async fn market_lookup_decodes_the_market() {
        let body = r#"{"market":{"ticker":"KXCPI-25JUN-T3.0","status":"settled","result":"no"}}"#;
        let (base, _) = serve(vec![(200, body)]).await;
        let api = loopback_client(base, 0);

        let market = api.fetch_market("KXCPI-25JUN-T3.0").await.unwrap();
        assert_eq!(market.status, KalshiMarketStatus::Settled);
        assert_eq!(market.result.as_deref(), Some("no"));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let (base, requests) = serve(vec![(200, r#"{"events": 5}"#)]).await;
        let api = loopback_client(base, 3);

        let err = api.fetch_events("open", None, 200).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retry_recovers_from_transport_errors() {
        let calls = AtomicU32::new(0);
        let value = retry(2, "/events", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(Error::Http("connection reset".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_stops_on_errors_that_will_not_change() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(3, "/events", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Decode("unexpected field".into())) }
        })
        .await;
        assert!(matches!(result, Err(Error::Decode(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
