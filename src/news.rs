//! Externally collected news and its correlation with closed markets.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::record::MarketRecord;

const MIN_TOKEN_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "will", "with", "from", "that", "this", "than", "over", "under", "into",
    "after", "before", "above", "below", "between", "are", "was", "were", "has", "have", "had",
    "not", "yes", "but", "its", "his", "her", "their", "who", "what", "when", "which", "how",
    "about", "more", "less", "new", "says", "said", "market", "markets", "price", "any", "all",
    "out", "per", "end", "top",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsEvent {
    pub id: String,
    pub published_at: DateTime<Utc>,
    pub headline: String,
    pub source: Option<String>,
    pub url: Option<String>,
    pub summary: Option<String>,
}

/// News as it appears in an input file; `id` is optional there.
#[derive(Debug, Deserialize)]
struct NewsFileEntry {
    #[serde(default)]
    id: Option<String>,
    published_at: DateTime<Utc>,
    headline: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

impl From<NewsFileEntry> for NewsEvent {
    fn from(entry: NewsFileEntry) -> Self {
        let id = entry
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| derived_id(entry.published_at, &entry.headline, entry.url.as_deref()));
        NewsEvent {
            id,
            published_at: entry.published_at,
            headline: entry.headline,
            source: entry.source,
            url: entry.url,
            summary: entry.summary,
        }
    }
}

impl NewsEvent {
    pub fn searchable_text(&self) -> String {
        match &self.summary {
            Some(summary) => format!("{} {}", self.headline, summary),
            None => self.headline.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewsLink {
    pub market_ticker: String,
    pub news_id: String,
    pub score: u32,
    pub keywords: Vec<String>,
    /// How long before the market's status change the news was published.
    pub lead: Duration,
}

fn derived_id(published_at: DateTime<Utc>, headline: &str, url: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(published_at.timestamp().to_be_bytes());
    hasher.update(headline.as_bytes());
    if let Some(url) = url {
        hasher.update(url.as_bytes());
    }
    let digest = hasher.finalize();
    digest[..12].iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn parse_news(json: &str) -> Result<Vec<NewsEvent>> {
    let entries: Vec<NewsFileEntry> =
        serde_json::from_str(json).map_err(|e| Error::Decode(format!("news file: {}", e)))?;
    Ok(entries.into_iter().map(NewsEvent::from).collect())
}

/// Reads a JSON array of news entries.
pub async fn load_news_file(path: impl AsRef<Path>) -> Result<Vec<NewsEvent>> {
    let contents = tokio::fs::read_to_string(path.as_ref()).await?;
    parse_news(&contents)
}

/// Lowercase alphanumeric words, minus stopwords and short tokens. Numbers
/// only count when they look like a year.
pub fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()) || w.len() == 4)
        .collect()
}

/// Links each closed market to news published within `window` before it
/// changed status, sharing at least `min_overlap` keywords.
pub fn correlate(
    markets: &[MarketRecord],
    news: &[NewsEvent],
    window: Duration,
    min_overlap: usize,
) -> Vec<NewsLink> {
    let news_keywords: Vec<BTreeSet<String>> =
        news.iter().map(|n| keywords(&n.searchable_text())).collect();

    let mut links = Vec::new();
    let mut seen: HashSet<(&str, &str)> = HashSet::new();

    for market in markets {
        let Some(changed_at) = market.status_change_time else {
            continue;
        };
        let market_keywords = keywords(&market.searchable_text());
        if market_keywords.is_empty() {
            continue;
        }

        for (item, item_keywords) in news.iter().zip(&news_keywords) {
            let lead = changed_at - item.published_at;
            if lead < Duration::zero() || lead > window {
                continue;
            }

            let shared: Vec<String> = market_keywords
                .intersection(item_keywords)
                .cloned()
                .collect();
            if shared.len() < min_overlap.max(1) {
                continue;
            }
            if !seen.insert((market.market_ticker.as_str(), item.id.as_str())) {
                continue;
            }

            links.push(NewsLink {
                market_ticker: market.market_ticker.clone(),
                news_id: item.id.clone(),
                score: shared.len() as u32,
                keywords: shared,
                lead,
            });
        }
    }

    links.sort_by(|a, b| {
        a.market_ticker
            .cmp(&b.market_ticker)
            .then(b.score.cmp(&a.score))
            .then(a.lead.cmp(&b.lead))
    });
    links
}
