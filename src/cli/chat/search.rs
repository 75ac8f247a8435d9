//! Best-effort web augmentation: search snippets and local news headlines.
//!
//! Scrapes the HTML-only DuckDuckGo endpoint for search and the Google News
//! RSS feed for headlines. Both are unstable against upstream markup
//! changes; that fragility is accepted, since every failure here degrades to
//! an empty digest and the pipeline proceeds without one. Every fetch is
//! bounded by [`SEARCH_TIMEOUT_SECS`] so a slow upstream can never stall a
//! turn indefinitely.

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::time::Duration;

use super::error::AugmentationError;

const DDG_HTML_URL: &str = "https://html.duckduckgo.com/html/";
const NEWS_RSS_URL: &str = "https://news.google.com/rss/search";
const GEOLOCATION_URL: &str = "http://ip-api.com/json";

/// Upper bound on any single augmentation fetch.
pub const SEARCH_TIMEOUT_SECS: u64 = 8;
/// Maximum snippets per digest.
pub const MAX_SNIPPETS: usize = 3;

/// Fallback location when IP geolocation fails.
pub const UNKNOWN_LOCATION: &str = "your area";

/// Rough user location from IP geolocation.
#[derive(Debug, Clone, Deserialize)]
pub struct GeoLocation {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
}

impl GeoLocation {
    pub fn display(&self) -> String {
        match (self.city.is_empty(), self.country.is_empty()) {
            (false, false) => format!("{}, {}", self.city, self.country),
            (false, true) => self.city.clone(),
            (true, false) => self.country.clone(),
            (true, true) => UNKNOWN_LOCATION.to_string(),
        }
    }
}

/// Resolve the user's rough location from their public IP.
///
/// Callers are expected to fall back to [`UNKNOWN_LOCATION`] on error.
pub async fn geolocate(client: &reqwest::Client) -> Result<GeoLocation, AugmentationError> {
    let location: GeoLocation = client
        .get(GEOLOCATION_URL)
        .send()
        .await
        .map_err(|e| AugmentationError::Http(e.to_string()))?
        .json()
        .await
        .map_err(|e| AugmentationError::Parse(e.to_string()))?;
    Ok(location)
}

/// Third-party lookups that enrich the generation context.
#[async_trait]
pub trait WebAugmenter {
    /// Fetch up to [`MAX_SNIPPETS`] search result snippets for `query`,
    /// rendered as a bulleted digest.
    async fn search(&self, query: &str) -> Result<String, AugmentationError>;

    /// Fetch up to [`MAX_SNIPPETS`] news headlines scoped to
    /// `location_hint`, rendered as bulleted `[title](url)` links.
    async fn local_news(&self, location_hint: &str) -> Result<String, AugmentationError>;
}

/// Augmenter scraping DuckDuckGo HTML and the Google News RSS feed.
pub struct DuckDuckGoAugmenter {
    client: reqwest::Client,
}

impl DuckDuckGoAugmenter {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    async fn fetch_search_html(&self, query: &str) -> Result<String, AugmentationError> {
        let response = self
            .client
            .post(DDG_HTML_URL)
            .form(&[("q", query)])
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| AugmentationError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| AugmentationError::Http(e.to_string()))?;

        response
            .text()
            .await
            .map_err(|e| AugmentationError::Http(e.to_string()))
    }
}

#[async_trait]
impl WebAugmenter for DuckDuckGoAugmenter {
    async fn search(&self, query: &str) -> Result<String, AugmentationError> {
        tracing::debug!(query, "web search");
        let fetch = self.fetch_search_html(query);
        let html = tokio::time::timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS), fetch)
            .await
            .map_err(|_| AugmentationError::Timeout(SEARCH_TIMEOUT_SECS))??;
        Ok(render_search_digest(&parse_search_snippets(&html)?))
    }

    async fn local_news(&self, location_hint: &str) -> Result<String, AugmentationError> {
        tracing::debug!(location = location_hint, "local news lookup");
        let fetch = async {
            let response = self
                .client
                .get(NEWS_RSS_URL)
                .query(&[("q", location_hint)])
                .send()
                .await
                .map_err(|e| AugmentationError::Http(e.to_string()))?
                .error_for_status()
                .map_err(|e| AugmentationError::Http(e.to_string()))?;
            response
                .text()
                .await
                .map_err(|e| AugmentationError::Http(e.to_string()))
        };
        let rss = tokio::time::timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS), fetch)
            .await
            .map_err(|_| AugmentationError::Timeout(SEARCH_TIMEOUT_SECS))??;
        Ok(render_news_digest(&parse_rss_items(&rss)))
    }
}

/// Pull result snippets out of the DuckDuckGo HTML page.
fn parse_search_snippets(html: &str) -> Result<Vec<String>, AugmentationError> {
    let selector = Selector::parse(".result__snippet")
        .map_err(|e| AugmentationError::Parse(e.to_string()))?;

    let document = Html::parse_document(html);
    let snippets = document
        .select(&selector)
        .map(|node| node.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .take(MAX_SNIPPETS)
        .collect();
    Ok(snippets)
}

fn render_search_digest(snippets: &[String]) -> String {
    snippets
        .iter()
        .map(|s| format!("- {s}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One news headline from the RSS feed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NewsItem {
    title: String,
    link: String,
}

/// Minimal RSS item extraction. A full XML parser is overkill for two tags
/// in a feed whose shape we do not control anyway.
fn parse_rss_items(rss: &str) -> Vec<NewsItem> {
    let mut items = Vec::new();
    for chunk in rss.split("<item>").skip(1) {
        let title = extract_tag(chunk, "title");
        let link = extract_tag(chunk, "link");
        if let (Some(title), Some(link)) = (title, link) {
            items.push(NewsItem { title, link });
            if items.len() == MAX_SNIPPETS {
                break;
            }
        }
    }
    items
}

fn extract_tag(chunk: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = chunk.find(&open)? + open.len();
    let end = chunk[start..].find(&close)? + start;
    let value = chunk[start..end]
        .trim()
        .trim_start_matches("<![CDATA[")
        .trim_end_matches("]]>")
        .trim()
        .to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn render_news_digest(items: &[NewsItem]) -> String {
    items
        .iter()
        .map(|item| format!("- [{}]({})", item.title, item.link))
        .collect::<Vec<_>>()
        .join("\n")
}
