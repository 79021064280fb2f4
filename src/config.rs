use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_API_BASE_URL: &str = "https://api.elections.kalshi.com/trade-api/v2";
pub const MAX_PAGE_LIMIT: u32 = 200;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub kalshi: KalshiConfig,
    pub collector: CollectorConfig,
    pub debug: bool,
}

#[derive(Debug, Clone)]
pub struct KalshiConfig {
    pub base_url: Url,
    pub credentials: Option<Credentials>,
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key_id: String,
    pub private_key_path: String,
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub status: String,
    pub page_limit: u32,
    pub page_delay: Duration,
    /// Look up stored active markets that dropped out of the snapshot.
    pub resolve_missing: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        if let Some(parent) = sqlite_parent_dir(&config.database_url) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(config)
    }

    /// Builds the config from any key lookup. Does not touch the filesystem.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let raw_db = var("DATABASE_URL")
            .ok_or_else(|| Error::Config("DATABASE_URL not set".into()))?;
        let cwd = std::env::current_dir()?;
        let database_url = resolve_database_url(&raw_db, &cwd);

        let base_url = var("KALSHI_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let base_url = Url::parse(base_url.trim_end_matches('/'))?;

        let credentials = match (var("KALSHI_API_KEY_ID"), var("KALSHI_PRIVATE_KEY_PATH")) {
            (Some(api_key_id), Some(private_key_path)) => Some(Credentials {
                api_key_id,
                private_key_path,
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(Error::Config(
                    "KALSHI_API_KEY_ID set without KALSHI_PRIVATE_KEY_PATH".into(),
                ))
            }
            (None, Some(_)) => {
                return Err(Error::Config(
                    "KALSHI_PRIVATE_KEY_PATH set without KALSHI_API_KEY_ID".into(),
                ))
            }
        };

        let page_limit: u32 = parse_var(&var, "COLLECTOR_PAGE_LIMIT", MAX_PAGE_LIMIT)?;
        if page_limit == 0 || page_limit > MAX_PAGE_LIMIT {
            return Err(Error::Config(format!(
                "COLLECTOR_PAGE_LIMIT must be between 1 and {}, got {}",
                MAX_PAGE_LIMIT, page_limit
            )));
        }

        let page_delay_ms: u64 = parse_var(&var, "COLLECTOR_PAGE_DELAY_MS", 100)?;
        let max_retries: u32 = parse_var(&var, "COLLECTOR_MAX_RETRIES", 3)?;
        let resolve_missing = var("COLLECTOR_RESOLVE_MISSING")
            .map(|v| v != "0")
            .unwrap_or(true);

        Ok(Config {
            database_url,
            kalshi: KalshiConfig {
                base_url,
                credentials,
                max_retries,
            },
            collector: CollectorConfig {
                status: var("COLLECTOR_STATUS").unwrap_or_else(|| "open".to_string()),
                page_limit,
                page_delay: Duration::from_millis(page_delay_ms),
                resolve_missing,
            },
            debug: var("DEBUG").as_deref() == Some("1"),
        })
    }
}

fn parse_var<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{} is not a valid number: {}", key, raw))),
        None => Ok(default),
    }
}

/// Turns a bare file path into a SQLite URL; full URLs pass through.
pub fn resolve_database_url(raw: &str, cwd: &Path) -> String {
    if raw.contains("://") || raw.starts_with("sqlite:") {
        return raw.to_string();
    }
    let path = Path::new(raw);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };
    format!("sqlite://{}?mode=rwc", absolute.display())
}

fn sqlite_parent_dir(database_url: &str) -> Option<PathBuf> {
    let rest = database_url.strip_prefix("sqlite://")?;
    let path = rest.split('?').next()?;
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            status: "open".to_string(),
            page_limit: MAX_PAGE_LIMIT,
            page_delay: Duration::from_millis(100),
            resolve_missing: true,
        }
    }
}
