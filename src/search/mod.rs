//! Web search: question in, ranked candidate URLs out.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub description: String,
}

impl SearchHit {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            description: String::new(),
        }
    }
}

/// Trait for search providers.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Return at most `count` hits for `query`, best first.
    async fn search(&self, query: &str, count: usize) -> anyhow::Result<Vec<SearchHit>>;
}

/// Brave web search API client.
pub struct BraveSearch {
    client: reqwest::Client,
    api_key: String,
}

impl BraveSearch {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }
}

#[async_trait]
impl WebSearch for BraveSearch {
    async fn search(&self, query: &str, count: usize) -> anyhow::Result<Vec<SearchHit>> {
        let response = self
            .client
            .get(BRAVE_SEARCH_URL)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("q", query)])
            .send()
            .await
            .context("Brave search request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Brave search returned HTTP {}: {}", status, body);
        }

        let parsed: BraveResponse = response
            .json()
            .await
            .context("Failed to parse Brave search response")?;

        Ok(parsed.into_hits(count))
    }
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

impl BraveResponse {
    fn into_hits(self, count: usize) -> Vec<SearchHit> {
        self.web
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .take(count)
            .map(|r| SearchHit {
                url: r.url,
                title: r.title,
                description: r.description,
            })
            .collect()
    }
}
